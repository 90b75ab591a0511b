//! Session object and the two periodic drivers.
//!
//! The render loop runs detection + processing once per frame and publishes
//! into the [`FrameSlot`]. The sampler timer (fixed-interval discipline only)
//! ticks on its own period and reads whatever the slot holds. The slot is the
//! only state the two drivers share besides the recorder itself.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::classify::Readout;
use crate::config::{Config, SamplerConfig};
use crate::error::MonitorResult;
use crate::patient::PatientCode;
use crate::pipeline::{FrameOutcome, FrameProcessor, FrameSlot};
use crate::pose::LandmarkSource;
use crate::recorder::{ArmRequest, Dataset, Recorder, RecorderHandle};
use crate::tilt::{OrientationReading, TiltMonitor};

/// Status indicator shown next to the readout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorStatus {
    Idle,
    Detecting,
    Recording,
}

/// Handles shared by the controls and both drivers. Cloning is cheap.
#[derive(Clone)]
pub struct MonitorSession {
    pub slot: FrameSlot,
    pub recorder: RecorderHandle,
    tilt: Arc<Mutex<TiltMonitor>>,
    sampler: SamplerConfig,
    patient: Option<PatientCode>,
}

impl MonitorSession {
    pub fn new(config: &Config, patient: Option<PatientCode>) -> Self {
        Self {
            slot: FrameSlot::new(),
            recorder: RecorderHandle::new(Recorder::new()),
            tilt: Arc::new(Mutex::new(TiltMonitor::new(&config.tilt))),
            sampler: config.sampler,
            patient,
        }
    }

    pub fn sampler(&self) -> SamplerConfig {
        self.sampler
    }

    pub fn tilt(&self) -> MutexGuard<'_, TiltMonitor> {
        self.tilt.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Feed one orientation event from the tilt sensor.
    pub fn on_orientation(&self, reading: OrientationReading) {
        self.tilt().update(reading);
    }

    /// Current tilt warning, if the device is past the threshold.
    pub fn tilt_warning(&self) -> Option<String> {
        self.tilt().warning()
    }

    /// Start a recording. `Ok(false)` means one is already running.
    pub fn arm(&self, epoch_ms: i64, start_ms: Option<f64>) -> MonitorResult<bool> {
        self.tilt().check_recording_start()?;
        Ok(self.recorder.lock().arm(ArmRequest {
            sampler: self.sampler,
            patient_code: self.patient.clone(),
            epoch_ms,
            start_ms,
        }))
    }

    pub fn finalize(&self) -> bool {
        self.recorder.lock().finalize()
    }

    pub fn reset(&self) {
        self.recorder.lock().reset();
    }

    /// Read-only copy of the finalized dataset.
    pub fn dataset(&self) -> MonitorResult<Dataset> {
        self.recorder.lock().dataset().cloned()
    }

    pub fn status(&self) -> MonitorStatus {
        if self.recorder.lock().is_armed() {
            MonitorStatus::Recording
        } else if self.slot.latest().is_some() {
            MonitorStatus::Detecting
        } else {
            MonitorStatus::Idle
        }
    }
}

/// Summary of one render-loop run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub frames: u64,
    pub usable: u64,
}

/// Render/inference loop. One detection in flight at a time; returns when
/// the source is exhausted, or when `stop_when_finalized` is set and the
/// recorder has finalized.
pub async fn run_render_loop<S, F>(
    mut source: S,
    mut processor: FrameProcessor,
    session: MonitorSession,
    frame_period: Duration,
    stop_when_finalized: bool,
    mut on_readout: F,
) -> RenderStats
where
    S: LandmarkSource,
    F: FnMut(MonitorStatus, &Readout),
{
    let mut interval = time::interval(frame_period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let started = Instant::now();
    let mut stats = RenderStats::default();
    let windowed = matches!(session.sampler, SamplerConfig::Windowed { .. });

    loop {
        interval.tick().await;
        let now_ms = started.elapsed().as_secs_f64() * 1000.0;
        let detection = match source.detect(now_ms) {
            Some(d) => d,
            None => {
                debug!("landmark source exhausted after {} frames", stats.frames);
                break;
            }
        };

        let outcome = processor.process(&detection);
        stats.frames += 1;
        if matches!(outcome, FrameOutcome::Usable(_)) {
            stats.usable += 1;
        }

        let frame = outcome.frame();
        session.slot.publish(frame.clone());

        if windowed {
            let tilt = session.tilt().sample();
            session
                .recorder
                .lock()
                .on_frame(detection.timestamp_ms, frame.as_deref(), tilt);
        }

        let readout = outcome
            .readout(processor.thresholds())
            .with_tilt_warning(session.tilt_warning());
        on_readout(session.status(), &readout);

        if stop_when_finalized && session.recorder.lock().is_finalized() {
            break;
        }
    }
    stats
}

/// Fixed-interval sampler timer. The first tick fires one period after the
/// call; returns once the recorder is no longer armed.
pub async fn run_sampler(session: MonitorSession) {
    let sample_ms = match session.sampler {
        SamplerConfig::FixedInterval { sample_ms, .. } => sample_ms,
        SamplerConfig::Windowed { .. } => return,
    };
    let period = Duration::from_millis(sample_ms);
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Burst);

    loop {
        interval.tick().await;
        let frame = session.slot.latest();
        let tilt = session.tilt().sample();
        let mut recorder = session.recorder.lock();
        if !recorder.is_armed() {
            break;
        }
        recorder.tick(frame.as_deref(), tilt);
        if !recorder.is_armed() {
            break;
        }
    }
}

/// Arm a recording immediately, drive both loops until it finalizes (or the
/// source runs dry), and hand back the dataset.
pub async fn record_session<S, F>(
    source: S,
    config: &Config,
    session: MonitorSession,
    on_readout: F,
) -> MonitorResult<Dataset>
where
    S: LandmarkSource + Send + 'static,
    F: FnMut(MonitorStatus, &Readout) + Send + 'static,
{
    let processor = FrameProcessor::new(config);
    let frame_period = Duration::from_secs_f64(1.0 / f64::from(config.app.frame_rate));

    session.arm(chrono::Utc::now().timestamp_millis(), None)?;

    let sampler = tokio::spawn(run_sampler(session.clone()));
    let render = tokio::spawn(run_render_loop(
        source,
        processor,
        session.clone(),
        frame_period,
        true,
        on_readout,
    ));

    match session.sampler {
        SamplerConfig::FixedInterval { .. } => {
            let finished = sampler.await;
            render.abort();
            finished?;
        }
        SamplerConfig::Windowed { .. } => {
            let stats = render.await?;
            info!("render loop: {} frames, {} usable", stats.frames, stats.usable);
            sampler.await?;
        }
    }

    if session.finalize() {
        info!("source ended before the recording window closed");
    }
    session.dataset()
}
