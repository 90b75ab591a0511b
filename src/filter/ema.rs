use crate::config::SmoothingConfig;

use super::ScalarFilter;

/// ジャンプガード付き EMA
///
/// `|raw - prev| > jump_threshold` の入力は1フレームの検出グリッチとして棄却し、
/// 直前の平滑値をそのまま返す。
#[derive(Debug, Clone)]
pub struct EmaFilter {
    alpha: f64,
    jump_threshold: f64,
    /// 連続棄却がこの回数に達したら生値で再初期化
    reseed_after: Option<u32>,
    prev: Option<f64>,
    rejected: u32,
}

impl EmaFilter {
    pub fn new(alpha: f64, jump_threshold: f64) -> Self {
        Self {
            alpha,
            jump_threshold,
            reseed_after: None,
            prev: None,
            rejected: 0,
        }
    }

    pub fn from_config(config: &SmoothingConfig) -> Self {
        Self::new(config.alpha, config.jump_threshold_deg).with_reseed_after(config.reseed_after)
    }

    pub fn with_reseed_after(mut self, reseed_after: Option<u32>) -> Self {
        self.reseed_after = reseed_after;
        self
    }

    /// 直近の連続棄却回数
    pub fn rejected(&self) -> u32 {
        self.rejected
    }
}

impl ScalarFilter for EmaFilter {
    fn update(&mut self, _timestamp_ms: f64, raw: f64) -> f64 {
        let prev = match self.prev {
            Some(prev) => prev,
            None => {
                self.prev = Some(raw);
                return raw;
            }
        };

        if (raw - prev).abs() > self.jump_threshold {
            self.rejected += 1;
            if self.reseed_after.is_some_and(|n| self.rejected >= n) {
                self.rejected = 0;
                self.prev = Some(raw);
                return raw;
            }
            return prev;
        }

        self.rejected = 0;
        let smoothed = self.alpha * raw + (1.0 - self.alpha) * prev;
        self.prev = Some(smoothed);
        smoothed
    }

    fn value(&self) -> Option<f64> {
        self.prev
    }

    fn reset(&mut self) {
        self.prev = None;
        self.rejected = 0;
    }
}
