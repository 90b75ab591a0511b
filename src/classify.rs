//! 外転角のゾーン判定と表示用の読み値

use serde::{Deserialize, Serialize};

use crate::config::ZoneConfig;

/// 判定ゾーン
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Zone {
    Safe,
    Warning,
    /// 外転不足（不安定のリスク）
    DangerLow,
    /// 外転過大（大腿骨頭壊死のリスク）
    DangerHigh,
}

pub const COLOR_SAFE: &str = "#34a853";
pub const COLOR_WARNING: &str = "#f9ab00";
pub const COLOR_DANGER: &str = "#ea4335";

impl Zone {
    pub fn color(self) -> &'static str {
        match self {
            Zone::Safe => COLOR_SAFE,
            Zone::Warning => COLOR_WARNING,
            Zone::DangerLow | Zone::DangerHigh => COLOR_DANGER,
        }
    }

    pub fn is_danger(self) -> bool {
        matches!(self, Zone::DangerLow | Zone::DangerHigh)
    }
}

/// 判定結果
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub zone: Zone,
    pub color: &'static str,
    pub message: String,
}

/// ゾーン閾値（度）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub safe_min: f64,
    pub safe_max: f64,
    pub warning_max: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::from_config(&ZoneConfig::default())
    }
}

impl Thresholds {
    pub fn from_config(config: &ZoneConfig) -> Self {
        Self {
            safe_min: config.safe_min_deg,
            safe_max: config.safe_max_deg,
            warning_max: config.warning_max_deg,
        }
    }

    /// [safe_min, safe_max] は安全、(safe_max, warning_max] は警告、それ以外は危険
    pub fn zone(&self, angle_deg: f64) -> Zone {
        if angle_deg < self.safe_min {
            Zone::DangerLow
        } else if angle_deg <= self.safe_max {
            Zone::Safe
        } else if angle_deg <= self.warning_max {
            Zone::Warning
        } else {
            Zone::DangerHigh
        }
    }

    pub fn message(&self, zone: Zone) -> String {
        match zone {
            Zone::DangerHigh => format!("Abduction too high (>{}°).", self.warning_max),
            Zone::DangerLow => format!("Abduction too low (<{}°).", self.safe_min),
            Zone::Safe => format!("Good position ({}–{}°).", self.safe_min, self.safe_max),
            Zone::Warning => format!(
                "Warning: {}–{}° (yellow zone).",
                self.safe_max, self.warning_max
            ),
        }
    }

    pub fn classify(&self, angle_deg: f64) -> Classification {
        let zone = self.zone(angle_deg);
        Classification {
            zone,
            color: zone.color(),
            message: self.message(zone),
        }
    }
}

/// 数値とゾーン色の表示値。使用可能なフレームが無ければプレースホルダ
#[derive(Debug, Clone, PartialEq)]
pub struct Readout {
    pub average: String,
    pub left: String,
    pub right: String,
    pub color_average: &'static str,
    pub color_left: &'static str,
    pub color_right: &'static str,
    pub message: String,
    /// 端末が傾いている間だけ表示する警告
    pub tilt_warning: Option<String>,
}

pub const PLACEHOLDER: &str = "–";
const NEUTRAL_COLOR: &str = "#9aa0a6";

impl Readout {
    pub fn new(left: f64, right: f64, average: f64, thresholds: &Thresholds) -> Self {
        let avg = thresholds.classify(average);
        Self {
            average: format!("{:.1}°", average),
            left: format!("{:.0}°", left),
            right: format!("{:.0}°", right),
            color_average: avg.color,
            color_left: thresholds.zone(left).color(),
            color_right: thresholds.zone(right).color(),
            message: avg.message,
            tilt_warning: None,
        }
    }

    pub fn placeholder(message: &str) -> Self {
        Self {
            average: PLACEHOLDER.to_string(),
            left: PLACEHOLDER.to_string(),
            right: PLACEHOLDER.to_string(),
            color_average: NEUTRAL_COLOR,
            color_left: NEUTRAL_COLOR,
            color_right: NEUTRAL_COLOR,
            message: message.to_string(),
            tilt_warning: None,
        }
    }

    pub fn with_tilt_warning(mut self, warning: Option<String>) -> Self {
        self.tilt_warning = warning;
        self
    }
}
