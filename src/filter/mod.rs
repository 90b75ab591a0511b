pub mod bank;
pub mod ema;
pub mod median;
pub mod one_euro;

pub use bank::LandmarkFilterBank;
pub use ema::EmaFilter;
pub use median::MedianEmaFilter;
pub use one_euro::OneEuroFilter;

use crate::config::{SmoothingConfig, SmoothingStrategy};

/// スカラー1本分の時系列フィルタ
///
/// 追跡するスカラー（ランドマーク座標軸、または左右の角度）ごとに1インスタンス。
/// 最初の観測は素通しで状態を初期化する。
pub trait ScalarFilter {
    /// `timestamp_ms` は単調増加を想定。進まない場合は各実装が最小 dt に丸める
    fn update(&mut self, timestamp_ms: f64, raw: f64) -> f64;

    /// 直近の平滑値。未初期化なら None
    fn value(&self) -> Option<f64>;

    fn reset(&mut self);
}

/// 設定で選択する平滑化フィルタ
#[derive(Debug, Clone)]
pub enum SignalFilter {
    Identity,
    Ema(EmaFilter),
    MedianEma(MedianEmaFilter),
    OneEuro(OneEuroFilter),
}

impl SignalFilter {
    /// 角度（左右）に掛けるフィルタ。
    /// One Euro はランドマーク座標側に掛けるので角度は素通し
    pub fn for_angle(config: &SmoothingConfig) -> Self {
        match config.strategy {
            SmoothingStrategy::Identity | SmoothingStrategy::OneEuro => Self::Identity,
            SmoothingStrategy::Ema => Self::Ema(EmaFilter::from_config(config)),
            SmoothingStrategy::MedianEma => Self::MedianEma(MedianEmaFilter::from_config(config)),
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity)
    }
}

impl ScalarFilter for SignalFilter {
    fn update(&mut self, timestamp_ms: f64, raw: f64) -> f64 {
        match self {
            Self::Identity => raw,
            Self::Ema(f) => f.update(timestamp_ms, raw),
            Self::MedianEma(f) => f.update(timestamp_ms, raw),
            Self::OneEuro(f) => f.update(timestamp_ms, raw),
        }
    }

    fn value(&self) -> Option<f64> {
        match self {
            Self::Identity => None,
            Self::Ema(f) => f.value(),
            Self::MedianEma(f) => f.value(),
            Self::OneEuro(f) => f.value(),
        }
    }

    fn reset(&mut self) {
        match self {
            Self::Identity => {}
            Self::Ema(f) => f.reset(),
            Self::MedianEma(f) => f.reset(),
            Self::OneEuro(f) => f.reset(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(strategy: SmoothingStrategy) -> SmoothingConfig {
        SmoothingConfig {
            strategy,
            ..SmoothingConfig::default()
        }
    }

    #[test]
    fn test_for_angle_selection() {
        assert!(SignalFilter::for_angle(&config(SmoothingStrategy::Identity)).is_identity());
        assert!(SignalFilter::for_angle(&config(SmoothingStrategy::OneEuro)).is_identity());
        assert!(matches!(
            SignalFilter::for_angle(&config(SmoothingStrategy::Ema)),
            SignalFilter::Ema(_)
        ));
        assert!(matches!(
            SignalFilter::for_angle(&config(SmoothingStrategy::MedianEma)),
            SignalFilter::MedianEma(_)
        ));
    }

    #[test]
    fn test_identity_passthrough() {
        let mut f = SignalFilter::Identity;
        assert_eq!(f.update(0.0, 12.0), 12.0);
        assert_eq!(f.update(1.0, 80.0), 80.0);
        assert_eq!(f.value(), None);
    }

    #[test]
    fn test_dispatch_reaches_inner_filter() {
        let mut f = SignalFilter::Ema(EmaFilter::new(0.5, 100.0));
        f.update(0.0, 10.0);
        assert_eq!(f.update(1.0, 20.0), 15.0);
        assert_eq!(f.value(), Some(15.0));
        f.reset();
        assert_eq!(f.value(), None);
    }

    #[test]
    fn test_jump_guard_through_every_guarded_variant() {
        for strategy in [SmoothingStrategy::Ema, SmoothingStrategy::MedianEma] {
            let mut f = SignalFilter::for_angle(&config(strategy));
            f.update(0.0, 40.0);
            let held = f.update(33.0, 40.0);
            assert_eq!(f.update(66.0, 75.0), held, "{:?}", strategy);
        }
    }
}
