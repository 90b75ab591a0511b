//! Sampler/recorder state machine.
//!
//! `Idle → Armed → Finalized → (re-arm) Armed …`. While armed, records are
//! appended either on a fixed-interval tick ([`Recorder::tick`]) or on camera
//! frame arrival inside an interior window ([`Recorder::on_frame`]),
//! depending on the [`SamplerConfig`] the session was armed with.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::SamplerConfig;
use crate::error::{MonitorError, MonitorResult};
use crate::patient::PatientCode;
use crate::pipeline::ProcessedFrame;
use crate::tilt::TiltSample;

const ANGLE_DECIMALS: i32 = 2;
const VECTOR_DECIMALS: i32 = 4;
const TIME_DECIMALS: i32 = 3;

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedAngles {
    pub abduction_left: f64,
    pub abduction_right: f64,
    pub abduction_avg: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecordedVector {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecordedLandmark {
    pub x: f64,
    pub y: f64,
    pub v: f64,
}

/// One captured snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleRecord {
    /// Epoch milliseconds.
    pub timestamp: i64,
    /// Elapsed milliseconds since the session was armed.
    pub time: f64,
    pub angles: RecordedAngles,
    pub midline: RecordedVector,
    pub landmarks: BTreeMap<String, RecordedLandmark>,
    pub patient_code: Option<PatientCode>,
    pub device_tilt: TiltSample,
}

impl SampleRecord {
    /// Build a record, applying the export rounding up front so that the
    /// serialized values round-trip exactly.
    pub fn capture(
        frame: &ProcessedFrame,
        elapsed_ms: f64,
        armed_epoch_ms: i64,
        patient_code: Option<PatientCode>,
        tilt: TiltSample,
    ) -> Self {
        let landmarks = frame
            .landmarks
            .iter()
            .map(|(idx, lm)| {
                (
                    idx.name().to_string(),
                    RecordedLandmark {
                        x: round_to(lm.x, VECTOR_DECIMALS),
                        y: round_to(lm.y, VECTOR_DECIMALS),
                        v: round_to(lm.visibility, VECTOR_DECIMALS),
                    },
                )
            })
            .collect();

        Self {
            timestamp: armed_epoch_ms + elapsed_ms.round() as i64,
            time: round_to(elapsed_ms, TIME_DECIMALS),
            angles: RecordedAngles {
                abduction_left: round_to(frame.angles.left, ANGLE_DECIMALS),
                abduction_right: round_to(frame.angles.right, ANGLE_DECIMALS),
                abduction_avg: round_to(frame.angles.average, ANGLE_DECIMALS),
            },
            midline: RecordedVector {
                x: round_to(frame.midline.direction.x, VECTOR_DECIMALS),
                y: round_to(frame.midline.direction.y, VECTOR_DECIMALS),
            },
            landmarks,
            patient_code,
            device_tilt: TiltSample {
                tilt_deg: tilt.tilt_deg.map(|t| round_to(t, ANGLE_DECIMALS)),
                tilt_ok: tilt.tilt_ok,
            },
        }
    }
}

/// Ordered, append-only sequence of records from one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dataset {
    records: Vec<SampleRecord>,
}

impl Dataset {
    pub fn records(&self) -> &[SampleRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SampleRecord> {
        self.records.iter()
    }

    fn push(&mut self, record: SampleRecord) {
        self.records.push(record);
    }

    fn clear(&mut self) {
        self.records.clear();
    }

    pub fn to_json(&self) -> MonitorResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> MonitorResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a SampleRecord;
    type IntoIter = std::slice::Iter<'a, SampleRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Armed,
    Finalized,
}

/// What happened to one tick or frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// Not armed, or driven by the wrong timing discipline.
    Ignored,
    Captured,
    /// Counted, but no usable frame was available.
    Skipped,
    OutsideWindow,
}

/// Parameters for one recording session.
#[derive(Debug, Clone)]
pub struct ArmRequest {
    pub sampler: SamplerConfig,
    pub patient_code: Option<PatientCode>,
    /// Wall clock at arm time, used for record timestamps.
    pub epoch_ms: i64,
    /// Frame clock at arm time. For the windowed discipline `None` latches the
    /// first frame seen after arming as the start.
    pub start_ms: Option<f64>,
}

pub struct Recorder {
    state: RecorderState,
    sampler: SamplerConfig,
    patient_code: Option<PatientCode>,
    armed_epoch_ms: i64,
    start_ms: Option<f64>,
    ticks: u64,
    dataset: Dataset,
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Recorder {
    pub fn new() -> Self {
        Self {
            state: RecorderState::Idle,
            sampler: SamplerConfig::default(),
            patient_code: None,
            armed_epoch_ms: 0,
            start_ms: None,
            ticks: 0,
            dataset: Dataset::default(),
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        self.state == RecorderState::Armed
    }

    pub fn is_finalized(&self) -> bool {
        self.state == RecorderState::Finalized
    }

    /// Upper bound on records for the armed discipline, if one exists.
    pub fn capacity(&self) -> Option<u64> {
        match self.sampler {
            SamplerConfig::FixedInterval { duration_ms, sample_ms } => {
                Some(duration_ms / sample_ms.max(1))
            }
            SamplerConfig::Windowed { .. } => None,
        }
    }

    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Returns `false` (and changes nothing) if a session is already armed.
    /// Otherwise the dataset is cleared and a new session starts.
    pub fn arm(&mut self, request: ArmRequest) -> bool {
        if self.is_armed() {
            info!("recording already in progress; ignoring arm request");
            return false;
        }
        self.sampler = request.sampler;
        self.patient_code = request.patient_code;
        self.armed_epoch_ms = request.epoch_ms;
        self.start_ms = request.start_ms;
        self.ticks = 0;
        self.dataset.clear();
        self.state = RecorderState::Armed;
        info!("recording armed ({:?})", self.sampler);
        true
    }

    /// Fixed-interval discipline: one timer tick.
    ///
    /// The tick counter always advances, so elapsed time stays an exact
    /// multiple of the interval even when `frame` is `None`.
    pub fn tick(&mut self, frame: Option<&ProcessedFrame>, tilt: TiltSample) -> SampleOutcome {
        if !self.is_armed() {
            return SampleOutcome::Ignored;
        }
        let (duration_ms, sample_ms) = match self.sampler {
            SamplerConfig::FixedInterval { duration_ms, sample_ms } => {
                (duration_ms, sample_ms.max(1))
            }
            SamplerConfig::Windowed { .. } => return SampleOutcome::Ignored,
        };
        let total = duration_ms / sample_ms;
        if self.ticks >= total {
            // 区間より短い記録時間では 1 件も取らない
            self.finalize();
            return SampleOutcome::Ignored;
        }

        self.ticks += 1;
        let elapsed_ms = (self.ticks * sample_ms) as f64;
        let outcome = match frame {
            Some(frame) => {
                self.capture(frame, elapsed_ms, tilt);
                SampleOutcome::Captured
            }
            None => {
                debug!("tick {} at {}ms: no usable frame", self.ticks, elapsed_ms);
                SampleOutcome::Skipped
            }
        };

        if self.ticks >= total {
            self.finalize();
        }
        outcome
    }

    /// Windowed discipline: one camera frame arrival at `frame_ts_ms`.
    pub fn on_frame(
        &mut self,
        frame_ts_ms: f64,
        frame: Option<&ProcessedFrame>,
        tilt: TiltSample,
    ) -> SampleOutcome {
        if !self.is_armed() {
            return SampleOutcome::Ignored;
        }
        let (duration_ms, window_start_ms, window_end_ms) = match self.sampler {
            SamplerConfig::Windowed { duration_ms, window_start_ms, window_end_ms } => {
                (duration_ms as f64, window_start_ms as f64, window_end_ms as f64)
            }
            SamplerConfig::FixedInterval { .. } => return SampleOutcome::Ignored,
        };
        let start = *self.start_ms.get_or_insert(frame_ts_ms);
        let elapsed_ms = frame_ts_ms - start;

        let outcome = if elapsed_ms < window_start_ms || elapsed_ms > window_end_ms {
            SampleOutcome::OutsideWindow
        } else if let Some(frame) = frame {
            self.capture(frame, elapsed_ms, tilt);
            SampleOutcome::Captured
        } else {
            SampleOutcome::Skipped
        };

        if elapsed_ms >= duration_ms {
            self.finalize();
        }
        outcome
    }

    fn capture(&mut self, frame: &ProcessedFrame, elapsed_ms: f64, tilt: TiltSample) {
        let record = SampleRecord::capture(
            frame,
            elapsed_ms,
            self.armed_epoch_ms,
            self.patient_code.clone(),
            tilt,
        );
        self.dataset.push(record);
    }

    /// Stop sampling. Returns `false` if nothing was armed.
    pub fn finalize(&mut self) -> bool {
        if !self.is_armed() {
            return false;
        }
        self.state = RecorderState::Finalized;
        info!("recording finalized with {} samples", self.dataset.len());
        true
    }

    pub fn reset(&mut self) {
        self.state = RecorderState::Idle;
        self.ticks = 0;
        self.start_ms = None;
        self.dataset.clear();
        debug!("recorder reset");
    }

    /// The finalized dataset. Repeated calls return the same data.
    pub fn dataset(&self) -> MonitorResult<&Dataset> {
        if self.is_finalized() {
            Ok(&self.dataset)
        } else {
            Err(MonitorError::NotFinalized)
        }
    }
}

/// Recorder shared between the UI controls, the render loop and the sampler
/// timer.
#[derive(Clone, Default)]
pub struct RecorderHandle {
    inner: Arc<Mutex<Recorder>>,
}

impl RecorderHandle {
    pub fn new(recorder: Recorder) -> Self {
        Self {
            inner: Arc::new(Mutex::new(recorder)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Recorder> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::pipeline::tests::detection;
    use crate::pipeline::FrameProcessor;

    fn frame(spread: f64) -> Arc<ProcessedFrame> {
        let mut config = Config::default();
        config.smoothing.strategy = crate::config::SmoothingStrategy::Identity;
        FrameProcessor::new(&config)
            .process(&detection(0.0, spread))
            .frame()
            .unwrap()
    }

    fn fixed(duration_ms: u64, sample_ms: u64) -> ArmRequest {
        ArmRequest {
            sampler: SamplerConfig::FixedInterval { duration_ms, sample_ms },
            patient_code: None,
            epoch_ms: 1_700_000_000_000,
            start_ms: None,
        }
    }

    fn windowed() -> ArmRequest {
        ArmRequest {
            sampler: SamplerConfig::windowed_default(),
            patient_code: Some(PatientCode::parse("1234").unwrap()),
            epoch_ms: 1_700_000_000_000,
            start_ms: Some(0.0),
        }
    }

    #[test]
    fn test_initial_state() {
        let r = Recorder::new();
        assert_eq!(r.state(), RecorderState::Idle);
        assert!(matches!(r.dataset(), Err(MonitorError::NotFinalized)));
    }

    #[test]
    fn test_fixed_interval_exact_cadence() {
        let f = frame(40.0);
        let mut r = Recorder::new();
        assert!(r.arm(fixed(2000, 10)));
        assert_eq!(r.capacity(), Some(200));

        // 終了後の余分なティックは無視される
        for _ in 0..250 {
            r.tick(Some(&f), TiltSample::default());
        }
        assert!(r.is_finalized());
        let ds = r.dataset().unwrap();
        assert_eq!(ds.len(), 200);
        for (i, rec) in ds.iter().enumerate() {
            assert_eq!(rec.time, ((i as u64 + 1) * 10) as f64);
            assert_eq!(rec.timestamp, 1_700_000_000_000 + (i as i64 + 1) * 10);
        }
    }

    #[test]
    fn test_fixed_interval_never_exceeds_capacity() {
        let f = frame(40.0);
        let mut r = Recorder::new();
        r.arm(fixed(5, 10));
        assert_eq!(r.capacity(), Some(0));
        assert_eq!(r.tick(Some(&f), TiltSample::default()), SampleOutcome::Ignored);
        for _ in 0..4 {
            r.tick(Some(&f), TiltSample::default());
        }
        assert!(r.is_finalized());
        assert!(r.dataset().unwrap().is_empty());

        r.arm(fixed(25, 10));
        for _ in 0..5 {
            r.tick(Some(&f), TiltSample::default());
        }
        assert_eq!(r.dataset().unwrap().len(), 2);
    }

    #[test]
    fn test_fixed_interval_skips_without_frame() {
        let f = frame(40.0);
        let mut r = Recorder::new();
        r.arm(fixed(100, 10));
        for i in 0..10 {
            let outcome = if i < 3 {
                r.tick(None, TiltSample::default())
            } else {
                r.tick(Some(&f), TiltSample::default())
            };
            let expected = if i < 3 { SampleOutcome::Skipped } else { SampleOutcome::Captured };
            assert_eq!(outcome, expected);
        }
        let ds = r.dataset().unwrap();
        assert_eq!(ds.len(), 7);
        // スキップしたティックも経過時間に数える
        assert_eq!(ds.records()[0].time, 40.0);
        assert_eq!(ds.records()[6].time, 100.0);
    }

    #[test]
    fn test_arm_while_armed_is_ignored() {
        let f = frame(40.0);
        let mut r = Recorder::new();
        r.arm(fixed(100, 10));
        r.tick(Some(&f), TiltSample::default());
        assert!(!r.arm(fixed(2000, 10)));
        assert_eq!(r.len(), 1);
        assert_eq!(r.capacity(), Some(10));
    }

    #[test]
    fn test_rearm_clears_dataset() {
        let f = frame(40.0);
        let mut r = Recorder::new();
        r.arm(fixed(30, 10));
        for _ in 0..3 {
            r.tick(Some(&f), TiltSample::default());
        }
        assert_eq!(r.dataset().unwrap().len(), 3);

        assert!(r.arm(fixed(30, 10)));
        assert!(r.is_empty());
        r.tick(Some(&f), TiltSample::default());
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn test_dataset_read_is_idempotent() {
        let f = frame(40.0);
        let mut r = Recorder::new();
        r.arm(fixed(50, 10));
        for _ in 0..5 {
            r.tick(Some(&f), TiltSample::default());
        }
        let first = r.dataset().unwrap().clone();
        assert!(!r.finalize());
        assert_eq!(r.dataset().unwrap(), &first);
    }

    #[test]
    fn test_finalize_early_and_reset() {
        let f = frame(40.0);
        let mut r = Recorder::new();
        r.arm(fixed(2000, 10));
        r.tick(Some(&f), TiltSample::default());
        assert!(r.finalize());
        assert_eq!(r.tick(Some(&f), TiltSample::default()), SampleOutcome::Ignored);
        assert_eq!(r.dataset().unwrap().len(), 1);

        r.reset();
        assert_eq!(r.state(), RecorderState::Idle);
        assert!(r.is_empty());
    }

    #[test]
    fn test_windowed_capture_bounds() {
        let f = frame(40.0);
        let mut r = Recorder::new();
        r.arm(windowed());

        let mut t = 0.0;
        while r.is_armed() {
            r.on_frame(t, Some(&f), TiltSample::default());
            t += 33.3;
        }
        let ds = r.dataset().unwrap();
        assert!(!ds.is_empty());
        for rec in ds {
            assert!(rec.time >= 1000.0 && rec.time <= 2000.0, "time {}", rec.time);
            assert_eq!(rec.patient_code.as_ref().map(PatientCode::as_str), Some("1234"));
        }
        // 30fps で 1 秒分
        assert_eq!(ds.len(), 30);
        assert!(t > 3000.0);
    }

    #[test]
    fn test_windowed_latches_first_frame() {
        let f = frame(40.0);
        let mut r = Recorder::new();
        r.arm(ArmRequest { start_ms: None, ..windowed() });
        assert_eq!(r.on_frame(5000.0, Some(&f), TiltSample::default()), SampleOutcome::OutsideWindow);
        assert_eq!(r.on_frame(6500.0, None, TiltSample::default()), SampleOutcome::Skipped);
        assert_eq!(r.on_frame(6600.0, Some(&f), TiltSample::default()), SampleOutcome::Captured);
        assert_eq!(r.on_frame(8000.0, Some(&f), TiltSample::default()), SampleOutcome::OutsideWindow);
        assert!(r.is_finalized());
        assert_eq!(r.dataset().unwrap().records()[0].time, 1600.0);
    }

    #[test]
    fn test_discipline_mismatch_ignored() {
        let f = frame(40.0);
        let mut r = Recorder::new();
        r.arm(windowed());
        assert_eq!(r.tick(Some(&f), TiltSample::default()), SampleOutcome::Ignored);

        let mut r = Recorder::new();
        r.arm(fixed(100, 10));
        assert_eq!(r.on_frame(0.0, Some(&f), TiltSample::default()), SampleOutcome::Ignored);
    }

    #[test]
    fn test_record_rounding() {
        let f = frame(37.123456);
        let tilt = TiltSample { tilt_deg: Some(2.34567), tilt_ok: Some(true) };
        let rec = SampleRecord::capture(&f, 10.0, 0, None, tilt);
        assert_eq!(rec.angles.abduction_left, 37.12);
        assert_eq!(rec.angles.abduction_avg, 37.12);
        assert_eq!(rec.midline.y, 1.0);
        assert_eq!(rec.device_tilt.tilt_deg, Some(2.35));
        assert_eq!(rec.landmarks["left_hip"], RecordedLandmark { x: 0.55, y: 0.5, v: 0.9 });
        assert_eq!(rec.landmarks.len(), 6);
    }

    #[test]
    fn test_round_trip_json() {
        let f = frame(52.987654);
        let mut r = Recorder::new();
        r.arm(ArmRequest {
            patient_code: Some(PatientCode::parse("42").unwrap()),
            ..fixed(50, 10)
        });
        for i in 0..5 {
            let tilt = TiltSample { tilt_deg: Some(i as f64 * 1.111), tilt_ok: Some(i < 4) };
            r.tick(Some(&f), tilt);
        }
        let ds = r.dataset().unwrap();
        let json = ds.to_json().unwrap();
        let parsed = Dataset::from_json(&json).unwrap();
        assert_eq!(&parsed, ds);
    }

    #[test]
    fn test_record_json_shape() {
        let f = frame(40.0);
        let rec = SampleRecord::capture(&f, 10.0, 1000, None, TiltSample::default());
        let value = serde_json::to_value(&rec).unwrap();
        assert_eq!(value["timestamp"], 1010);
        assert_eq!(value["time"], 10.0);
        assert!(value["angles"]["abductionLeft"].is_number());
        assert!(value["angles"]["abductionAvg"].is_number());
        assert!(value["landmarks"]["right_knee"]["v"].is_number());
        assert!(value["patientCode"].is_null());
        assert!(value["deviceTilt"]["tiltDeg"].is_null());
        assert!(value["deviceTilt"]["tiltOK"].is_null());
    }

    #[test]
    fn test_handle_shares_state() {
        let handle = RecorderHandle::default();
        let other = handle.clone();
        handle.lock().arm(fixed(100, 10));
        assert!(other.lock().is_armed());
    }
}
