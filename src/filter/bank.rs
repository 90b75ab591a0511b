use crate::config::SmoothingConfig;
use crate::pose::Landmark;

use super::one_euro::OneEuroFilter;
use super::ScalarFilter;

/// ランドマーク1点分 (x, y, z)
#[derive(Debug, Clone)]
struct AxisFilters {
    x: OneEuroFilter,
    y: OneEuroFilter,
    z: OneEuroFilter,
}

/// 全ランドマークの座標軸ごとの One Euro フィルタ
///
/// x/y は位置用、z は深度用の定数を使う。可視性はそのまま通す。
#[derive(Debug, Clone)]
pub struct LandmarkFilterBank {
    filters: Vec<AxisFilters>,
    config: SmoothingConfig,
}

impl LandmarkFilterBank {
    pub fn new(count: usize, config: &SmoothingConfig) -> Self {
        let mut bank = Self {
            filters: Vec::with_capacity(count),
            config: config.clone(),
        };
        bank.ensure_len(count);
        bank
    }

    fn ensure_len(&mut self, count: usize) {
        let position = self.config.position;
        let depth = self.config.depth;
        while self.filters.len() < count {
            self.filters.push(AxisFilters {
                x: OneEuroFilter::from_config(&position),
                y: OneEuroFilter::from_config(&position),
                z: OneEuroFilter::from_config(&depth),
            });
        }
    }

    /// 追跡中のスカラー数（ランドマーク数 × 3）
    pub fn scalar_count(&self) -> usize {
        self.filters.len() * 3
    }

    pub fn apply(&mut self, timestamp_ms: f64, landmarks: &[Landmark]) -> Vec<Landmark> {
        self.ensure_len(landmarks.len());
        landmarks
            .iter()
            .zip(self.filters.iter_mut())
            .map(|(lm, f)| Landmark {
                x: f.x.update(timestamp_ms, lm.x),
                y: f.y.update(timestamp_ms, lm.y),
                z: f.z.update(timestamp_ms, lm.z),
                visibility: lm.visibility,
            })
            .collect()
    }

    /// 直近の平滑値（未初期化の点は None）
    pub fn snapshot(&self) -> Vec<Option<[f64; 3]>> {
        self.filters
            .iter()
            .map(|f| match (f.x.value(), f.y.value(), f.z.value()) {
                (Some(x), Some(y), Some(z)) => Some([x, y, z]),
                _ => None,
            })
            .collect()
    }

    pub fn reset(&mut self) {
        for f in &mut self.filters {
            f.x.reset();
            f.y.reset();
            f.z.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn landmarks(v: f64) -> Vec<Landmark> {
        vec![Landmark::new(v, v, v, 0.8); 4]
    }

    #[test]
    fn test_first_frame_passthrough() {
        let mut bank = LandmarkFilterBank::new(4, &SmoothingConfig::default());
        let input = landmarks(0.5);
        assert_eq!(bank.apply(0.0, &input), input);
        assert_eq!(bank.scalar_count(), 12);
    }

    #[test]
    fn test_depth_uses_own_constants() {
        let mut bank = LandmarkFilterBank::new(1, &SmoothingConfig::default());
        bank.apply(0.0, &[Landmark::new(0.0, 0.0, 0.0, 1.0)]);
        let out = bank.apply(33.0, &[Landmark::new(0.2, 0.2, 0.2, 1.0)]);
        // 位置の min_cutoff (2.0) は深度 (1.0) より高いので追従が速い
        assert!(out[0].x > out[0].z, "x={} z={}", out[0].x, out[0].z);
        assert_eq!(out[0].x, out[0].y);
    }

    #[test]
    fn test_visibility_passthrough() {
        let mut bank = LandmarkFilterBank::new(1, &SmoothingConfig::default());
        bank.apply(0.0, &[Landmark::new(0.3, 0.3, 0.0, 0.9)]);
        let out = bank.apply(33.0, &[Landmark::new(0.3, 0.3, 0.0, 0.2)]);
        assert_eq!(out[0].visibility, 0.2);
    }

    #[test]
    fn test_grows_with_longer_input() {
        let mut bank = LandmarkFilterBank::new(2, &SmoothingConfig::default());
        let out = bank.apply(0.0, &landmarks(0.1));
        assert_eq!(out.len(), 4);
        assert_eq!(bank.snapshot().len(), 4);
    }

    #[test]
    fn test_reset() {
        let mut bank = LandmarkFilterBank::new(1, &SmoothingConfig::default());
        bank.apply(0.0, &[Landmark::new(0.3, 0.3, 0.0, 0.9)]);
        assert!(bank.snapshot()[0].is_some());
        bank.reset();
        assert!(bank.snapshot()[0].is_none());
    }
}
