//! Utility functions and helpers

pub const BPS_DENOMINATOR: u32 = 10_000;

/// Format amount with proper decimals
pub fn format_amount(amount: u64, decimals: u8) -> String {
    format!("{:.6}", to_ui_amount(amount, decimals))
}

pub fn to_ui_amount(amount: u64, decimals: u8) -> f64 {
    amount as f64 / 10_f64.powi(decimals as i32)
}

pub fn from_ui_amount(amount: f64, decimals: u8) -> u64 {
    if !amount.is_finite() || amount <= 0.0 {
        return 0;
    }
    (amount * 10_f64.powi(decimals as i32)) as u64
}

/// Minimum acceptable output after tolerating `slippage_bps` of adverse movement.
pub fn apply_slippage(amount_out: u64, slippage_bps: u32) -> u64 {
    let keep = BPS_DENOMINATOR.saturating_sub(slippage_bps.min(BPS_DENOMINATOR)) as u128;
    ((amount_out as u128 * keep) / BPS_DENOMINATOR as u128) as u64
}

/// Scale `value` up by `pct` percent, rounding up.
pub fn with_headroom(value: u64, pct: u32) -> u64 {
    let scaled = (value as u128 * (100 + pct as u128)).div_ceil(100);
    scaled.min(u64::MAX as u128) as u64
}

/// Convert a percentage (e.g. `0.25` for 0.25%) into basis points.
pub fn pct_to_bps(pct: f64) -> u32 {
    if !pct.is_finite() || pct <= 0.0 {
        return 0;
    }
    (pct * 100.0).round().min(BPS_DENOMINATOR as f64) as u32
}

/// Generate unique ID
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
