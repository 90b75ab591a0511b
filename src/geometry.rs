use std::ops::{Add, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

use crate::config::MidlineStrategy;
use crate::pose::{Landmark, PoseFrame};

/// 正規化で零ベクトル扱いにする長さ
pub const DEGENERATE_EPS: f64 = 1e-6;

/// 画像平面上の2Dベクトル（y は下向き正）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn dot(self, other: Vec2) -> f64 {
        self.x * other.x + self.y * other.y
    }

    pub fn length(self) -> f64 {
        self.x.hypot(self.y)
    }

    /// 単位ベクトル。長さが DEGENERATE_EPS 未満なら零ベクトル
    pub fn unit(self) -> Vec2 {
        let n = self.length();
        if n > DEGENERATE_EPS {
            Vec2::new(self.x / n, self.y / n)
        } else {
            Vec2::ZERO
        }
    }

    pub fn is_zero(self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }

    pub fn midpoint(self, other: Vec2) -> Vec2 {
        Vec2::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    /// y 成分が負なら反転して下向きにそろえる
    pub fn oriented_down(self) -> Vec2 {
        if self.y < 0.0 {
            -self
        } else {
            self
        }
    }
}

impl From<Landmark> for Vec2 {
    fn from(lm: Landmark) -> Self {
        Vec2::new(lm.x, lm.y)
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f64) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

impl Neg for Vec2 {
    type Output = Vec2;
    fn neg(self) -> Vec2 {
        Vec2::new(-self.x, -self.y)
    }
}

/// 2ベクトル間の角度（度）。内積は [-1, 1] にクランプ
pub fn angle_between(a: Vec2, b: Vec2) -> f64 {
    let c = a.unit().dot(b.unit()).clamp(-1.0, 1.0);
    c.acos().to_degrees()
}

/// 体幹の正中線
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Midline {
    /// 下向きにそろえた単位ベクトル。退化時は零ベクトル
    pub direction: Vec2,
    pub hip_mid: Vec2,
    pub shoulder_mid: Option<Vec2>,
}

impl Midline {
    pub fn is_defined(&self) -> bool {
        !self.direction.is_zero()
    }
}

/// 肩中点→腰中点の軸
pub fn midline_from_shoulders(
    left_shoulder: Vec2,
    right_shoulder: Vec2,
    left_hip: Vec2,
    right_hip: Vec2,
) -> Midline {
    let shoulder_mid = left_shoulder.midpoint(right_shoulder);
    let hip_mid = left_hip.midpoint(right_hip);
    Midline {
        direction: (shoulder_mid - hip_mid).unit().oriented_down(),
        hip_mid,
        shoulder_mid: Some(shoulder_mid),
    }
}

/// 左右ヒップを結ぶ線の垂線
pub fn midline_from_hips(left_hip: Vec2, right_hip: Vec2) -> Midline {
    let across = right_hip - left_hip;
    let perpendicular = Vec2::new(-across.y, across.x);
    Midline {
        direction: perpendicular.unit().oriented_down(),
        hip_mid: left_hip.midpoint(right_hip),
        shoulder_mid: None,
    }
}

/// 片側の外転角（度）: 大腿ベクトル (knee - hip) と正中線のなす角
pub fn abduction_angle(hip: Vec2, knee: Vec2, midline: Vec2) -> f64 {
    let a = angle_between(knee - hip, midline);
    if a > 180.0 {
        360.0 - a
    } else {
        a
    }
}

/// 1フレーム分の計測結果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HipGeometry {
    pub midline: Midline,
    pub abduction_left: f64,
    pub abduction_right: f64,
}

impl HipGeometry {
    pub fn average(&self) -> f64 {
        (self.abduction_left + self.abduction_right) / 2.0
    }
}

/// 正中線と左右の外転角を計算する。
///
/// 正中線か大腿ベクトルが退化している場合は角度が定義できないので None。
pub fn measure(frame: &PoseFrame, strategy: MidlineStrategy) -> Option<HipGeometry> {
    let left_hip = Vec2::from(frame.left_hip);
    let right_hip = Vec2::from(frame.right_hip);
    let left_knee = Vec2::from(frame.left_knee);
    let right_knee = Vec2::from(frame.right_knee);

    let midline = match (strategy, frame.shoulders) {
        (MidlineStrategy::ShoulderHip, Some((ls, rs))) => {
            midline_from_shoulders(ls.into(), rs.into(), left_hip, right_hip)
        }
        (MidlineStrategy::ShoulderHip, None) => return None,
        (MidlineStrategy::HipPerpendicular, _) => midline_from_hips(left_hip, right_hip),
    };
    if !midline.is_defined() {
        return None;
    }

    let thigh_ok =
        |hip: Vec2, knee: Vec2| (knee - hip).length() > DEGENERATE_EPS;
    if !thigh_ok(left_hip, left_knee) || !thigh_ok(right_hip, right_knee) {
        return None;
    }

    Some(HipGeometry {
        midline,
        abduction_left: abduction_angle(left_hip, left_knee, midline.direction),
        abduction_right: abduction_angle(right_hip, right_knee, midline.direction),
    })
}
