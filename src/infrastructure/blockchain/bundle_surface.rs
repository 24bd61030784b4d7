//! Execution surface that bundles several aggregator swaps into one v0 transaction
//!
//! Each step's route payload is the aggregator quote document. It is patched
//! with the step's slippage bound, exchanged for swap instructions, and the
//! instructions of all steps are compiled into a single versioned transaction
//! so the batch lands or fails as a whole.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use futures::future::try_join_all;
use serde_json::{json, Value};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcSendTransactionConfig, RpcSimulateTransactionConfig};
use solana_sdk::{
    address_lookup_table::{state::AddressLookupTable, AddressLookupTableAccount},
    commitment_config::CommitmentConfig,
    instruction::{AccountMeta, Instruction},
    message::{v0::Message as MessageV0, VersionedMessage},
    packet::PACKET_DATA_SIZE,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::VersionedTransaction,
};
use solana_transaction_status::UiTransactionEncoding;
use spl_associated_token_account::get_associated_token_address;
use tracing::{debug, info, warn};

use super::compute_budget::{create_compute_budget_instructions, is_compute_budget_program};
use super::error_classifier::{classify, classify_client_error};
use crate::domain::execution::{DryRun, ExecutionSurface, Receipt, Submission};
use crate::domain::plan::SwapStep;
use crate::infrastructure::aggregator::schema::{InstructionData, SwapInstructionsResponse};
use crate::infrastructure::aggregator::AggregatorClient;
use crate::shared::errors::SurfaceError;

#[derive(Debug, Clone)]
pub struct SurfaceConfig {
    pub capacity: usize,
    pub priority_fee_microlamports: u64,
    /// Compute limit used for dry runs, before the real estimate is known.
    pub simulation_compute_units: u32,
    pub poll_interval: Duration,
    pub commitment: CommitmentConfig,
}

pub struct SolanaBundleSurface {
    rpc_client: Arc<RpcClient>,
    aggregator: Arc<AggregatorClient>,
    payer: Arc<Keypair>,
    config: SurfaceConfig,
}

/// Instructions for a whole batch plus the lookup tables they reference
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledSwaps {
    pub instructions: Vec<Instruction>,
    pub lookup_tables: Vec<Pubkey>,
}

/// Route payload with the step's own bound written into it.
pub fn patch_route(step: &SwapStep) -> Result<Value, SurfaceError> {
    let mut quote: Value = serde_json::from_slice(&step.route_payload)
        .map_err(|e| SurfaceError::Encoding(format!("route payload for {}: {}", step.input_mint, e)))?;

    let obj = quote
        .as_object_mut()
        .ok_or_else(|| SurfaceError::Encoding(format!("route payload for {} is not an object", step.input_mint)))?;
    obj.insert("slippageBps".to_string(), json!(step.slippage_bps));
    obj.insert("otherAmountThreshold".to_string(), json!(step.min_out.to_string()));

    Ok(quote)
}

pub fn decode_instruction(data: &InstructionData) -> Result<Instruction, SurfaceError> {
    let program_id = Pubkey::from_str(&data.program_id)
        .map_err(|e| SurfaceError::Encoding(format!("invalid program id {}: {}", data.program_id, e)))?;

    let accounts = data
        .accounts
        .iter()
        .map(|account| {
            Pubkey::from_str(&account.pubkey)
                .map(|pubkey| AccountMeta {
                    pubkey,
                    is_signer: account.is_signer,
                    is_writable: account.is_writable,
                })
                .map_err(|e| SurfaceError::Encoding(format!("invalid account {}: {}", account.pubkey, e)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let bytes = BASE64_STANDARD
        .decode(&data.data)
        .map_err(|e| SurfaceError::Encoding(format!("base64 decode error: {}", e)))?;

    Ok(Instruction::new_with_bytes(program_id, &bytes, accounts))
}

/// Merge the per-step responses into one instruction list:
/// our compute budget, then setup (deduplicated), swaps in step order and
/// cleanup (deduplicated). The aggregator's own budget instructions are dropped.
pub fn assemble(
    responses: &[SwapInstructionsResponse],
    resource_limit: u64,
    priority_fee_microlamports: u64,
) -> Result<AssembledSwaps, SurfaceError> {
    let mut setup: Vec<Instruction> = Vec::new();
    let mut swaps = Vec::with_capacity(responses.len());
    let mut cleanup: Vec<Instruction> = Vec::new();
    let mut seen_tables = HashSet::new();
    let mut lookup_tables = Vec::new();

    for response in responses {
        for data in &response.setup_instructions {
            let ix = decode_instruction(data)?;
            if !is_compute_budget_program(&ix.program_id) && !setup.contains(&ix) {
                setup.push(ix);
            }
        }

        swaps.push(decode_instruction(&response.swap_instruction)?);

        if let Some(data) = &response.cleanup_instruction {
            let ix = decode_instruction(data)?;
            if !cleanup.contains(&ix) {
                cleanup.push(ix);
            }
        }

        for address in &response.address_lookup_table_addresses {
            let key = Pubkey::from_str(address)
                .map_err(|e| SurfaceError::Encoding(format!("invalid lookup table {}: {}", address, e)))?;
            if seen_tables.insert(key) {
                lookup_tables.push(key);
            }
        }
    }

    let mut instructions = create_compute_budget_instructions(resource_limit, priority_fee_microlamports);
    instructions.extend(setup);
    instructions.extend(swaps);
    instructions.extend(cleanup);

    Ok(AssembledSwaps {
        instructions,
        lookup_tables,
    })
}

impl SolanaBundleSurface {
    pub fn new(
        rpc_client: Arc<RpcClient>,
        aggregator: Arc<AggregatorClient>,
        payer: Arc<Keypair>,
        config: SurfaceConfig,
    ) -> Self {
        Self {
            rpc_client,
            aggregator,
            payer,
            config,
        }
    }

    async fn build_transaction(
        &self,
        steps: &[SwapStep],
        recipient: &str,
        resource_limit: u64,
    ) -> Result<VersionedTransaction, SurfaceError> {
        let payer = self.payer.pubkey();
        let user = payer.to_string();

        let patched = steps.iter().map(patch_route).collect::<Result<Vec<_>, _>>()?;
        let destinations = steps
            .iter()
            .map(|step| self.destination_account(recipient, &step.output_mint))
            .collect::<Result<Vec<_>, _>>()?;

        let responses = try_join_all(patched.iter().zip(&destinations).map(|(quote, destination)| {
            self.aggregator
                .swap_instructions(quote, &user, destination.as_deref())
        }))
        .await?;

        let assembled = assemble(&responses, resource_limit, self.config.priority_fee_microlamports)?;
        let lookup_tables = self.load_lookup_tables(&assembled.lookup_tables).await?;

        let blockhash = self
            .rpc_client
            .get_latest_blockhash()
            .await
            .map_err(|e| SurfaceError::Submission(format!("failed to get blockhash: {}", e)))?;

        let message = MessageV0::try_compile(&payer, &assembled.instructions, &lookup_tables, blockhash)
            .map_err(|e| SurfaceError::Encoding(format!("message compile failed: {}", e)))?;
        let tx = VersionedTransaction::try_new(VersionedMessage::V0(message), &[self.payer.as_ref()])
            .map_err(|e| SurfaceError::Encoding(format!("signing failed: {}", e)))?;

        let size = bincode::serialized_size(&tx)
            .map_err(|e| SurfaceError::Encoding(format!("serialization failed: {}", e)))?;
        if size as usize > PACKET_DATA_SIZE {
            return Err(SurfaceError::Encoding(format!(
                "transaction too large: {} bytes for {} steps",
                size,
                steps.len()
            )));
        }

        debug!(
            "🔨 Built transaction: {} steps, {} instructions, {} lookup tables, {} bytes",
            steps.len(),
            assembled.instructions.len(),
            lookup_tables.len(),
            size
        );
        Ok(tx)
    }

    /// Output token account of `recipient`, or `None` to let the aggregator use the payer's.
    fn destination_account(&self, recipient: &str, output_mint: &str) -> Result<Option<String>, SurfaceError> {
        if recipient == self.payer.pubkey().to_string() {
            return Ok(None);
        }
        let owner = Pubkey::from_str(recipient)
            .map_err(|e| SurfaceError::Encoding(format!("invalid recipient {}: {}", recipient, e)))?;
        let mint = Pubkey::from_str(output_mint)
            .map_err(|e| SurfaceError::Encoding(format!("invalid output mint {}: {}", output_mint, e)))?;
        Ok(Some(get_associated_token_address(&owner, &mint).to_string()))
    }

    async fn load_lookup_tables(&self, keys: &[Pubkey]) -> Result<Vec<AddressLookupTableAccount>, SurfaceError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let accounts = self
            .rpc_client
            .get_multiple_accounts(keys)
            .await
            .map_err(|e| SurfaceError::Submission(format!("lookup table fetch failed: {}", e)))?;

        let mut tables = Vec::with_capacity(keys.len());
        for (key, account) in keys.iter().zip(accounts) {
            let Some(account) = account else {
                warn!("⚠️  Lookup table {} not found, compiling without it", key);
                continue;
            };
            let table = AddressLookupTable::deserialize(&account.data)
                .map_err(|e| SurfaceError::Encoding(format!("lookup table {}: {}", key, e)))?;
            tables.push(AddressLookupTableAccount {
                key: *key,
                addresses: table.addresses.to_vec(),
            });
        }
        Ok(tables)
    }
}

#[async_trait]
impl ExecutionSurface for SolanaBundleSurface {
    fn name(&self) -> &str {
        "solana-bundle"
    }

    fn capacity_limit(&self) -> usize {
        self.config.capacity
    }

    async fn validate(&self, steps: &[SwapStep], recipient: &str) -> Result<DryRun, SurfaceError> {
        let tx = match self
            .build_transaction(steps, recipient, self.config.simulation_compute_units as u64)
            .await
        {
            Ok(tx) => tx,
            Err(SurfaceError::Encoding(reason)) => return Ok(DryRun::Invalid { reason }),
            Err(e) => return Err(e),
        };

        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            replace_recent_blockhash: true,
            commitment: Some(self.config.commitment),
            encoding: Some(UiTransactionEncoding::Base64),
            ..RpcSimulateTransactionConfig::default()
        };

        let simulation = self
            .rpc_client
            .simulate_transaction_with_config(&tx, config)
            .await
            .map_err(|e| SurfaceError::Submission(format!("simulation request failed: {}", e)))?
            .value;

        match simulation.err {
            None => {
                let used = simulation
                    .units_consumed
                    .unwrap_or(self.config.simulation_compute_units as u64);
                debug!("🧪 Simulation of {} steps consumed {} CU", steps.len(), used);
                Ok(DryRun::Valid { resource_estimate: used })
            }
            Some(err) => {
                let logs = simulation.logs.unwrap_or_default();
                let kind = classify(Some(&err), &logs);
                Ok(DryRun::Invalid {
                    reason: format!("{} ({})", kind, err),
                })
            }
        }
    }

    async fn submit(&self, steps: &[SwapStep], recipient: &str, resource_limit: u64) -> Result<Submission, SurfaceError> {
        let tx = self.build_transaction(steps, recipient, resource_limit).await?;

        let config = RpcSendTransactionConfig {
            skip_preflight: false,
            preflight_commitment: Some(self.config.commitment.commitment),
            max_retries: Some(3),
            ..RpcSendTransactionConfig::default()
        };

        let signature = self
            .rpc_client
            .send_transaction_with_config(&tx, config)
            .await
            .map_err(|e| classify_client_error(&e))?;

        info!("📤 Sent transaction {} with {} swaps", signature, steps.len());
        Ok(Submission {
            id: signature.to_string(),
            step_count: steps.len(),
        })
    }

    async fn confirm(&self, submission: &Submission) -> Result<Receipt, SurfaceError> {
        let signature = Signature::from_str(&submission.id)
            .map_err(|e| SurfaceError::Encoding(format!("invalid signature {}: {}", submission.id, e)))?;

        loop {
            match self.rpc_client.get_signature_statuses(&[signature]).await {
                Ok(response) => {
                    if let Some(Some(status)) = response.value.first() {
                        if let Some(err) = &status.err {
                            return Err(SurfaceError::Reverted {
                                kind: classify(Some(err), &[]),
                                message: err.to_string(),
                            });
                        }
                        if status.satisfies_commitment(self.config.commitment) {
                            return Ok(Receipt {
                                id: submission.id.clone(),
                            });
                        }
                    }
                }
                Err(e) => debug!("Status poll for {} failed: {}", submission.id, e),
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}
