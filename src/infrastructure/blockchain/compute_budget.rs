use solana_sdk::{compute_budget::ComputeBudgetInstruction, instruction::Instruction, pubkey::Pubkey};

/// Per-transaction compute unit cap enforced by the runtime
pub const MAX_COMPUTE_UNITS: u32 = 1_400_000;

/// Create ComputeBudget instruction to set priority fee
pub fn create_priority_fee_instruction(micro_lamports: u64) -> Instruction {
    ComputeBudgetInstruction::set_compute_unit_price(micro_lamports)
}

/// Create ComputeBudget instruction to set compute unit limit
pub fn create_compute_unit_limit_instruction(compute_units: u32) -> Instruction {
    ComputeBudgetInstruction::set_compute_unit_limit(compute_units)
}

/// Limit and price instructions for a sweep transaction; the limit is clamped
/// to the runtime cap.
pub fn create_compute_budget_instructions(resource_limit: u64, micro_lamports: u64) -> Vec<Instruction> {
    vec![
        create_compute_unit_limit_instruction(clamp_compute_units(resource_limit)),
        create_priority_fee_instruction(micro_lamports),
    ]
}

pub fn clamp_compute_units(resource_limit: u64) -> u32 {
    resource_limit.clamp(1, MAX_COMPUTE_UNITS as u64) as u32
}

pub fn is_compute_budget_program(program_id: &Pubkey) -> bool {
    *program_id == solana_sdk::compute_budget::id()
}
