use std::time::Duration;

/// Delay before reconnect attempt number `attempt` (1-based):
/// `base * 2^(attempt - 1)`, saturating instead of overflowing.
pub fn reconnect_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32
        .checked_shl(attempt.saturating_sub(1))
        .unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}
