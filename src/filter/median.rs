use std::collections::VecDeque;

use crate::config::SmoothingConfig;

use super::ema::EmaFilter;
use super::ScalarFilter;

/// 中央値が有効になる最小サンプル数
const MIN_MEDIAN_SAMPLES: usize = 3;

/// 直近ウィンドウの中央値で外れ値を落としてから EMA + ジャンプガードに通す
#[derive(Debug, Clone)]
pub struct MedianEmaFilter {
    history: VecDeque<f64>,
    window_size: usize,
    ema: EmaFilter,
}

impl MedianEmaFilter {
    pub fn new(window_size: usize, ema: EmaFilter) -> Self {
        Self {
            history: VecDeque::with_capacity(window_size),
            window_size,
            ema,
        }
    }

    pub fn from_config(config: &SmoothingConfig) -> Self {
        Self::new(config.median_window, EmaFilter::from_config(config))
    }

    fn median(&self) -> f64 {
        let mut values: Vec<f64> = self.history.iter().copied().collect();
        values.sort_by(|a, b| a.total_cmp(b));
        let mid = values.len() / 2;
        if values.len() % 2 == 0 {
            (values[mid - 1] + values[mid]) / 2.0
        } else {
            values[mid]
        }
    }
}

impl ScalarFilter for MedianEmaFilter {
    fn update(&mut self, timestamp_ms: f64, raw: f64) -> f64 {
        self.history.push_back(raw);
        if self.history.len() > self.window_size {
            self.history.pop_front();
        }

        let input = if self.history.len() >= MIN_MEDIAN_SAMPLES {
            self.median()
        } else {
            raw
        };
        self.ema.update(timestamp_ms, input)
    }

    fn value(&self) -> Option<f64> {
        self.ema.value()
    }

    fn reset(&mut self) {
        self.history.clear();
        self.ema.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make(alpha: f64) -> MedianEmaFilter {
        MedianEmaFilter::new(5, EmaFilter::new(alpha, 15.0))
    }

    #[test]
    fn test_first_value_passthrough() {
        let mut f = make(0.2);
        assert_eq!(f.update(0.0, 41.0), 41.0);
    }

    #[test]
    fn test_raw_used_until_three_samples() {
        // alpha=1 で EMA を素通しにして中央値段だけを見る
        let mut f = make(1.0);
        assert_eq!(f.update(0.0, 30.0), 30.0);
        assert_eq!(f.update(1.0, 38.0), 38.0);
        // [30, 38, 32] の中央値
        assert_eq!(f.update(2.0, 32.0), 32.0);
        // [30, 38, 32, 36] → (32 + 36) / 2
        assert_eq!(f.update(3.0, 36.0), 34.0);
    }

    #[test]
    fn test_window_is_bounded() {
        let mut f = make(1.0);
        for (i, v) in [10.0, 10.0, 10.0, 10.0, 10.0, 20.0, 20.0, 20.0].iter().enumerate() {
            f.update(i as f64, *v);
        }
        assert_eq!(f.history.len(), 5);
        // [10, 10, 20, 20, 20]
        assert_eq!(f.median(), 20.0);
    }

    #[test]
    fn test_single_spike_rejected_by_median() {
        let mut f = make(1.0);
        for i in 0..4 {
            f.update(i as f64, 35.0);
        }
        // 単発スパイクは中央値で消える
        assert_eq!(f.update(4.0, 48.0), 35.0);
    }

    #[test]
    fn test_converges_on_constant_input() {
        let mut f = make(0.12);
        f.update(0.0, 30.0);
        let mut out = 0.0;
        for i in 1..=50 {
            out = f.update(i as f64 * 33.0, 30.5);
        }
        assert!((out - 30.5).abs() < 1e-3, "got {}", out);
    }

    #[test]
    fn test_reset_clears_window() {
        let mut f = make(0.5);
        f.update(0.0, 10.0);
        f.update(1.0, 11.0);
        f.reset();
        assert!(f.history.is_empty());
        assert_eq!(f.value(), None);
    }
}
