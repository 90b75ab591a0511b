//! Dataset export: one pretty-printed JSON array per recording session.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::info;

use crate::config::ExportConfig;
use crate::error::MonitorResult;
use crate::patient::PatientCode;
use crate::recorder::Dataset;

/// `<prefix>_<YYYYmmdd_HHMMSS_mmm>[_<patient>].json`
pub fn export_filename(prefix: &str, patient: Option<&PatientCode>, at: DateTime<Local>) -> String {
    let ts = at.format("%Y%m%d_%H%M%S_%3f");
    match patient {
        Some(code) => format!("{}_{}_{}.json", prefix, ts, code),
        None => format!("{}_{}.json", prefix, ts),
    }
}

/// Pick a path that does not exist yet by appending `-1`, `-2`, … to the stem.
fn unique_path(dir: &Path, filename: &str) -> PathBuf {
    let candidate = dir.join(filename);
    if !candidate.exists() {
        return candidate;
    }
    let stem = filename.trim_end_matches(".json");
    (1..)
        .map(|n| dir.join(format!("{}-{}.json", stem, n)))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

pub fn write_dataset_at(
    dataset: &Dataset,
    config: &ExportConfig,
    patient: Option<&PatientCode>,
    at: DateTime<Local>,
) -> MonitorResult<PathBuf> {
    let dir = Path::new(&config.dir);
    fs::create_dir_all(dir)?;
    let path = unique_path(dir, &export_filename(&config.prefix, patient, at));
    fs::write(&path, dataset.to_json()?)?;
    info!("exported {} samples to {}", dataset.len(), path.display());
    Ok(path)
}

pub fn write_dataset(
    dataset: &Dataset,
    config: &ExportConfig,
    patient: Option<&PatientCode>,
) -> MonitorResult<PathBuf> {
    write_dataset_at(dataset, config, patient, Local::now())
}

pub fn read_dataset<P: AsRef<Path>>(path: P) -> MonitorResult<Dataset> {
    let content = fs::read_to_string(path)?;
    Dataset::from_json(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, SamplerConfig, SmoothingStrategy};
    use crate::pipeline::tests::detection;
    use crate::pipeline::FrameProcessor;
    use crate::recorder::{ArmRequest, Recorder};
    use crate::tilt::TiltSample;
    use chrono::TimeZone;

    fn sample_dataset() -> Dataset {
        let mut config = Config::default();
        config.smoothing.strategy = SmoothingStrategy::Ema;
        let mut processor = FrameProcessor::new(&config);
        let mut recorder = Recorder::new();
        recorder.arm(ArmRequest {
            sampler: SamplerConfig::FixedInterval { duration_ms: 100, sample_ms: 10 },
            patient_code: None,
            epoch_ms: 1_700_000_000_000,
            start_ms: None,
        });
        for i in 0..10 {
            let frame = processor.process(&detection(i as f64 * 10.0, 38.0 + i as f64 * 0.37)).frame();
            recorder.tick(frame.as_deref(), TiltSample::default());
        }
        recorder.dataset().unwrap().clone()
    }

    #[test]
    fn test_filename_format() {
        let at = Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
        assert_eq!(export_filename("abduction", None, at), "abduction_20240305_140709_000.json");
        let code = PatientCode::parse("0042").unwrap();
        assert_eq!(
            export_filename("abduction", Some(&code), at),
            "abduction_20240305_140709_000_0042.json"
        );
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExportConfig {
            dir: dir.path().join("out").to_string_lossy().into_owned(),
            prefix: "test".to_string(),
        };
        let dataset = sample_dataset();
        assert_eq!(dataset.len(), 10);

        let path = write_dataset(&dataset, &config, None).unwrap();
        assert!(path.exists());
        let parsed = read_dataset(&path).unwrap();
        assert_eq!(parsed, dataset);
    }

    #[test]
    fn test_repeated_export_gets_unique_names() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExportConfig {
            dir: dir.path().to_string_lossy().into_owned(),
            prefix: "dup".to_string(),
        };
        let at = Local.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let dataset = sample_dataset();
        let a = write_dataset_at(&dataset, &config, None, at).unwrap();
        let b = write_dataset_at(&dataset, &config, None, at).unwrap();
        assert_ne!(a, b);
        assert_eq!(read_dataset(&a).unwrap(), read_dataset(&b).unwrap());
    }

    #[test]
    fn test_payload_is_array() {
        let json = sample_dataset().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value.as_array().map(Vec::len), Some(10));
    }
}
