use crate::config::MidlineStrategy;

use super::landmark::{Landmark, LandmarkIndex};

/// 股関節外転の計測に必要なランドマークの組
///
/// 肩は正中線を肩-腰軸で作る場合のみ必須。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseFrame {
    pub left_hip: Landmark,
    pub right_hip: Landmark,
    pub left_knee: Landmark,
    pub right_knee: Landmark,
    pub shoulders: Option<(Landmark, Landmark)>,
}

impl PoseFrame {
    /// ランドマーク配列から固定インデックスで抽出する。
    /// 必須ランドマークが欠けているか可視性不足なら None（使用不可フレーム）
    pub fn extract(
        landmarks: &[Landmark],
        strategy: MidlineStrategy,
        visibility_threshold: f64,
    ) -> Option<Self> {
        let visible = |idx: LandmarkIndex| {
            landmarks
                .get(idx as usize)
                .copied()
                .filter(|lm| lm.is_visible(visibility_threshold))
        };

        let left_hip = visible(LandmarkIndex::LeftHip)?;
        let right_hip = visible(LandmarkIndex::RightHip)?;
        let left_knee = visible(LandmarkIndex::LeftKnee)?;
        let right_knee = visible(LandmarkIndex::RightKnee)?;

        let shoulders = match (
            visible(LandmarkIndex::LeftShoulder),
            visible(LandmarkIndex::RightShoulder),
        ) {
            (Some(l), Some(r)) => Some((l, r)),
            _ => None,
        };
        if strategy == MidlineStrategy::ShoulderHip && shoulders.is_none() {
            return None;
        }

        Some(Self {
            left_hip,
            right_hip,
            left_knee,
            right_knee,
            shoulders,
        })
    }

    /// 記録用に名前付きで列挙
    pub fn named(&self) -> Vec<(LandmarkIndex, Landmark)> {
        let mut out = Vec::with_capacity(6);
        if let Some((l, r)) = self.shoulders {
            out.push((LandmarkIndex::LeftShoulder, l));
            out.push((LandmarkIndex::RightShoulder, r));
        }
        out.push((LandmarkIndex::LeftHip, self.left_hip));
        out.push((LandmarkIndex::RightHip, self.right_hip));
        out.push((LandmarkIndex::LeftKnee, self.left_knee));
        out.push((LandmarkIndex::RightKnee, self.right_knee));
        out
    }
}
