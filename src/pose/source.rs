//! Landmark sources.
//!
//! The pose model itself lives outside this crate. Anything that can hand over
//! per-frame landmark arrays implements [`LandmarkSource`]; the bundled
//! [`ReplaySource`] reads a JSON-lines capture so sessions can be replayed
//! deterministically.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::landmark::Landmark;
use crate::error::{MonitorError, MonitorResult};

/// One detector result. An empty `poses` list means no pose was found this
/// frame, which is a normal outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "t")]
    pub timestamp_ms: f64,
    #[serde(rename = "landmarks", default)]
    pub poses: Vec<Vec<Landmark>>,
}

impl Detection {
    pub fn empty(timestamp_ms: f64) -> Self {
        Self {
            timestamp_ms,
            poses: Vec::new(),
        }
    }

    /// Single-person tracking: only the first pose is used.
    pub fn primary(&self) -> Option<&[Landmark]> {
        self.poses.first().map(Vec::as_slice).filter(|p| !p.is_empty())
    }
}

pub trait LandmarkSource {
    /// Run detection for the frame at `timestamp_ms`.
    ///
    /// Returns `None` once the source is exhausted. The returned detection
    /// carries the timestamp the filters should use, which a replay source
    /// takes from its recording rather than from the caller.
    fn detect(&mut self, timestamp_ms: f64) -> Option<Detection>;
}

/// Replays a recorded JSON-lines landmark stream.
///
/// Each non-empty line is `{"t": <ms>, "landmarks": [[{x, y, z?, visibility?}, ...]]}`.
pub struct ReplaySource {
    frames: VecDeque<Detection>,
}

impl ReplaySource {
    pub fn from_frames(frames: impl IntoIterator<Item = Detection>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    pub fn from_reader<R: BufRead>(reader: R) -> MonitorResult<Self> {
        let mut frames = VecDeque::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let detection: Detection =
                serde_json::from_str(trimmed).map_err(|e| MonitorError::Replay {
                    line: i + 1,
                    message: e.to_string(),
                })?;
            if let Some(prev) = frames.back().map(|d: &Detection| d.timestamp_ms) {
                if detection.timestamp_ms <= prev {
                    return Err(MonitorError::Replay {
                        line: i + 1,
                        message: format!(
                            "timestamp {} does not advance past {}",
                            detection.timestamp_ms, prev
                        ),
                    });
                }
            }
            frames.push_back(detection);
        }
        Ok(Self { frames })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> MonitorResult<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl LandmarkSource for ReplaySource {
    fn detect(&mut self, _timestamp_ms: f64) -> Option<Detection> {
        self.frames.pop_front()
    }
}
