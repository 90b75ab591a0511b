//! Per-frame processing: landmarks → filter → geometry → classification.
//!
//! The render loop calls [`FrameProcessor::process`] once per detection and
//! publishes the result into a [`FrameSlot`]. The fixed-interval sampler only
//! ever reads that slot.

use std::sync::{Arc, Mutex, PoisonError};

use crate::classify::{Classification, Readout, Thresholds};
use crate::config::{Config, MidlineStrategy, SmoothingConfig, SmoothingStrategy};
use crate::filter::{LandmarkFilterBank, ScalarFilter, SignalFilter};
use crate::geometry::{self, Midline};
use crate::pose::{Detection, Landmark, LandmarkIndex, PoseFrame};

/// Smoothed angles for one frame, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Angles {
    pub left: f64,
    pub right: f64,
    pub average: f64,
}

/// A complete, usable frame. Published wholesale; never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedFrame {
    pub timestamp_ms: f64,
    pub angles: Angles,
    pub midline: Midline,
    pub classification: Classification,
    /// Landmarks the angles were computed from.
    pub landmarks: Vec<(LandmarkIndex, Landmark)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Usable(Arc<ProcessedFrame>),
    NoPose,
    LowVisibility,
    /// Zero-length midline or thigh vector: angle undefined.
    Degenerate,
}

impl FrameOutcome {
    pub fn frame(&self) -> Option<Arc<ProcessedFrame>> {
        match self {
            FrameOutcome::Usable(frame) => Some(Arc::clone(frame)),
            _ => None,
        }
    }

    pub fn readout(&self, thresholds: &Thresholds) -> Readout {
        match self {
            FrameOutcome::Usable(f) => {
                Readout::new(f.angles.left, f.angles.right, f.angles.average, thresholds)
            }
            FrameOutcome::NoPose => Readout::placeholder("No pose found."),
            FrameOutcome::LowVisibility => Readout::placeholder("Low visibility / weak pose."),
            FrameOutcome::Degenerate => Readout::placeholder("Pose geometry undefined."),
        }
    }
}

/// Owns every piece of filter state for one monitoring session.
pub struct FrameProcessor {
    midline: MidlineStrategy,
    visibility_threshold: f64,
    smoothing: SmoothingConfig,
    thresholds: Thresholds,
    landmark_filters: Option<LandmarkFilterBank>,
    angle_filters: Option<[SignalFilter; 2]>,
}

impl FrameProcessor {
    pub fn new(config: &Config) -> Self {
        Self {
            midline: config.pose.midline,
            visibility_threshold: config.pose.visibility_threshold,
            smoothing: config.smoothing.clone(),
            thresholds: Thresholds::from_config(&config.zones),
            landmark_filters: None,
            angle_filters: None,
        }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn process(&mut self, detection: &Detection) -> FrameOutcome {
        let raw = match detection.primary() {
            Some(raw) => raw,
            None => return FrameOutcome::NoPose,
        };
        let t = detection.timestamp_ms;

        let landmarks = if self.smoothing.strategy == SmoothingStrategy::OneEuro {
            let smoothing = &self.smoothing;
            self.landmark_filters
                .get_or_insert_with(|| LandmarkFilterBank::new(raw.len(), smoothing))
                .apply(t, raw)
        } else {
            raw.to_vec()
        };

        let frame = match PoseFrame::extract(&landmarks, self.midline, self.visibility_threshold) {
            Some(frame) => frame,
            None => return FrameOutcome::LowVisibility,
        };
        let geom = match geometry::measure(&frame, self.midline) {
            Some(geom) => geom,
            None => return FrameOutcome::Degenerate,
        };

        let smoothing = &self.smoothing;
        let [left_filter, right_filter] = self.angle_filters.get_or_insert_with(|| {
            [SignalFilter::for_angle(smoothing), SignalFilter::for_angle(smoothing)]
        });
        let left = left_filter.update(t, geom.abduction_left);
        let right = right_filter.update(t, geom.abduction_right);
        let average = (left + right) / 2.0;

        FrameOutcome::Usable(Arc::new(ProcessedFrame {
            timestamp_ms: t,
            angles: Angles { left, right, average },
            midline: geom.midline,
            classification: self.thresholds.classify(average),
            landmarks: frame.named(),
        }))
    }

    /// Number of scalars currently carrying filter state.
    pub fn tracked_scalars(&self) -> usize {
        let landmark = self
            .landmark_filters
            .as_ref()
            .map_or(0, LandmarkFilterBank::scalar_count);
        let angle = self
            .angle_filters
            .as_ref()
            .map_or(0, |fs| fs.iter().filter(|f| !f.is_identity()).count());
        landmark + angle
    }

    /// Snapshot of filter state, used to check that misses leave it alone.
    pub fn filter_state(&self) -> (Vec<Option<[f64; 3]>>, Option<[Option<f64>; 2]>) {
        (
            self.landmark_filters
                .as_ref()
                .map(LandmarkFilterBank::snapshot)
                .unwrap_or_default(),
            self.angle_filters
                .as_ref()
                .map(|[l, r]| [l.value(), r.value()]),
        )
    }

    pub fn reset(&mut self) {
        self.landmark_filters = None;
        self.angle_filters = None;
    }
}

/// Single-slot, last-write-wins cell holding the most recent usable frame.
///
/// Writers replace the whole `Arc`, so a reader sees either the previous
/// frame or the new one, never a mix.
#[derive(Debug, Clone, Default)]
pub struct FrameSlot {
    inner: Arc<Mutex<Option<Arc<ProcessedFrame>>>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, frame: Option<Arc<ProcessedFrame>>) {
        let mut lock = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        *lock = frame;
    }

    pub fn latest(&self) -> Option<Arc<ProcessedFrame>> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
