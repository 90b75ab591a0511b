//! Device tilt handling.
//!
//! The orientation sensor itself is external. We receive raw orientation
//! readings, reduce them to one tilt angle, and decide whether a recording
//! may start.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{TiltConfig, TiltPolicy};
use crate::error::{MonitorError, MonitorResult};

/// Raw device-orientation event (degrees). Components the platform does not
/// report are `None`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OrientationReading {
    /// Front-back tilt.
    pub beta: Option<f64>,
    /// Left-right tilt.
    pub gamma: Option<f64>,
    pub portrait: bool,
}

impl OrientationReading {
    /// Portrait screens tilt sideways around gamma, landscape around beta.
    pub fn primary_tilt(&self) -> f64 {
        let v = if self.portrait { self.gamma } else { self.beta };
        v.filter(|v| v.is_finite()).unwrap_or(0.0)
    }
}

/// Tilt snapshot stored in each sample record.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TiltSample {
    pub tilt_deg: Option<f64>,
    #[serde(rename = "tiltOK")]
    pub tilt_ok: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct TiltMonitor {
    threshold_deg: f64,
    policy: TiltPolicy,
    tilt_deg: Option<f64>,
}

impl TiltMonitor {
    pub fn new(config: &TiltConfig) -> Self {
        Self {
            threshold_deg: config.threshold_deg,
            policy: config.policy,
            tilt_deg: None,
        }
    }

    pub fn update(&mut self, reading: OrientationReading) {
        let tilt = reading.primary_tilt();
        self.tilt_deg = Some(tilt);
        if tilt.abs() > self.threshold_deg {
            debug!("device tilted {:.1}°", tilt);
        }
    }

    /// No reading yet means the sensor is unavailable, not that the device
    /// is level.
    pub fn sample(&self) -> TiltSample {
        TiltSample {
            tilt_deg: self.tilt_deg,
            tilt_ok: self.tilt_deg.map(|t| t.abs() <= self.threshold_deg),
        }
    }

    pub fn warning(&self) -> Option<String> {
        let tilt = self.tilt_deg?;
        (tilt.abs() > self.threshold_deg).then(|| {
            format!(
                "Device tilted {:.1}° (>{}°). Straighten the device.",
                tilt, self.threshold_deg
            )
        })
    }

    /// Gate the start of a recording session according to the tilt policy.
    pub fn check_recording_start(&self) -> MonitorResult<()> {
        let tilt = match self.tilt_deg {
            Some(t) if t.abs() > self.threshold_deg => t,
            _ => return Ok(()),
        };
        match self.policy {
            TiltPolicy::Ignore => Ok(()),
            TiltPolicy::Warn => {
                warn!(
                    "starting recording with device tilted {:.1}° (limit {}°)",
                    tilt, self.threshold_deg
                );
                Ok(())
            }
            TiltPolicy::Block => Err(MonitorError::TiltExceeded {
                tilt_deg: tilt,
                threshold_deg: self.threshold_deg,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(policy: TiltPolicy) -> TiltMonitor {
        TiltMonitor::new(&TiltConfig {
            threshold_deg: 5.0,
            policy,
        })
    }

    #[test]
    fn test_primary_tilt_axis() {
        let portrait = OrientationReading { beta: Some(80.0), gamma: Some(3.0), portrait: true };
        assert_eq!(portrait.primary_tilt(), 3.0);
        let landscape = OrientationReading { portrait: false, ..portrait };
        assert_eq!(landscape.primary_tilt(), 80.0);
        let missing = OrientationReading { beta: None, gamma: None, portrait: true };
        assert_eq!(missing.primary_tilt(), 0.0);
    }

    #[test]
    fn test_sample_without_sensor() {
        let m = monitor(TiltPolicy::Warn);
        assert_eq!(m.sample(), TiltSample { tilt_deg: None, tilt_ok: None });
        assert!(m.warning().is_none());
        assert!(m.check_recording_start().is_ok());
    }

    #[test]
    fn test_threshold() {
        let mut m = monitor(TiltPolicy::Warn);
        m.update(OrientationReading { beta: None, gamma: Some(-5.0), portrait: true });
        assert_eq!(m.sample().tilt_ok, Some(true));
        assert!(m.warning().is_none());

        m.update(OrientationReading { beta: None, gamma: Some(-6.3), portrait: true });
        assert_eq!(m.sample().tilt_ok, Some(false));
        assert_eq!(
            m.warning().unwrap(),
            "Device tilted -6.3° (>5°). Straighten the device."
        );
    }

    #[test]
    fn test_policies() {
        let tilted = OrientationReading { beta: None, gamma: Some(12.0), portrait: true };
        for (policy, blocked) in [
            (TiltPolicy::Ignore, false),
            (TiltPolicy::Warn, false),
            (TiltPolicy::Block, true),
        ] {
            let mut m = monitor(policy);
            m.update(tilted);
            assert_eq!(m.check_recording_start().is_err(), blocked, "{:?}", policy);
        }
    }

    #[test]
    fn test_sample_serialization_keys() {
        let s = TiltSample { tilt_deg: Some(1.5), tilt_ok: Some(true) };
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, r#"{"tiltDeg":1.5,"tiltOK":true}"#);
    }
}
