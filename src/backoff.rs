use rand::Rng;
use std::time::Duration;

/// Exponential backoff with additive jitter for user-driven retries.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub base_ms: u64,
    pub factor: f64,
    pub jitter_ms: u64,
}

impl Default for Backoff {
    fn default() -> Self { Self { base_ms: 250, factor: 2.0, jitter_ms: 100 } }
}

impl Backoff {
    /// Delay before retry `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let pow = self.factor.powi(attempt.saturating_sub(1) as i32);
        let core = (self.base_ms as f64 * pow).round() as u64;
        let jitter = if self.jitter_ms > 0 { rand::rng().random_range(0..=self.jitter_ms) } else { 0 };
        Duration::from_millis(core + jitter)
    }
}
