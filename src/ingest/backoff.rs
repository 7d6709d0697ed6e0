use rand::Rng;
use std::time::Duration;

use crate::config::BackoffConfig;

/// 指数退避（全抖动）/ Exponential backoff with full jitter
///
/// 第 n 次等待取 `[0, min(max, initial * 2^n)]` 内的随机值。
/// The n-th wait is drawn uniformly from `[0, min(max, initial * 2^n)]`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: &BackoffConfig) -> Self {
        let initial = config.initial.max(Duration::from_millis(1));
        Self {
            initial,
            max: config.max.max(initial),
            attempt: 0,
        }
    }

    /// 当前上限 / Current ceiling before jitter
    pub fn ceiling(&self) -> Duration {
        let factor = 1u32.checked_shl(self.attempt.min(31)).unwrap_or(u32::MAX);
        self.initial
            .checked_mul(factor)
            .map_or(self.max, |d| d.min(self.max))
    }

    /// 下一次等待时长 / Next delay; advances the attempt counter
    pub fn next_delay(&mut self) -> Duration {
        let ceiling = self.ceiling();
        self.attempt = self.attempt.saturating_add(1);
        let millis = ceiling.as_millis().min(u64::MAX as u128) as u64;
        Duration::from_millis(rand::thread_rng().gen_range(0..=millis))
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
