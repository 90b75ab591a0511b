use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub pose: PoseConfig,
    #[serde(default)]
    pub smoothing: SmoothingConfig,
    #[serde(default)]
    pub zones: ZoneConfig,
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub tilt: TiltConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub app: AppConfig,
}

/// 正中線の構成方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MidlineStrategy {
    /// 肩中点→腰中点（立位・座位向け）
    ShoulderHip,
    /// 左右ヒップを結ぶ線の垂線（肩が映らない仰臥位向け）
    HipPerpendicular,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoseConfig {
    /// 必須ランドマークの可視性閾値
    #[serde(default = "default_visibility_threshold")]
    pub visibility_threshold: f64,
    #[serde(default = "default_midline")]
    pub midline: MidlineStrategy,
}

fn default_visibility_threshold() -> f64 { 0.6 }
fn default_midline() -> MidlineStrategy { MidlineStrategy::ShoulderHip }

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            visibility_threshold: default_visibility_threshold(),
            midline: default_midline(),
        }
    }
}

/// 平滑化方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingStrategy {
    Identity,
    Ema,
    MedianEma,
    /// ランドマーク座標ごとに適用（角度ではなく）
    OneEuro,
}

/// One Euro フィルタ定数
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct OneEuroConfig {
    pub min_cutoff: f64,
    pub beta: f64,
    pub d_cutoff: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SmoothingConfig {
    #[serde(default = "default_strategy")]
    pub strategy: SmoothingStrategy,
    /// EMA係数
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// これ以上の急変は1フレームのグリッチとして棄却（度）
    #[serde(default = "default_jump_threshold")]
    pub jump_threshold_deg: f64,
    /// 中央値ウィンドウ長
    #[serde(default = "default_median_window")]
    pub median_window: usize,
    /// 連続棄却がこの回数に達したら生値で再初期化。None なら再初期化しない
    #[serde(default)]
    pub reseed_after: Option<u32>,
    /// x/y 軸用
    #[serde(default = "default_position_euro")]
    pub position: OneEuroConfig,
    /// z 軸用
    #[serde(default = "default_depth_euro")]
    pub depth: OneEuroConfig,
}

fn default_strategy() -> SmoothingStrategy { SmoothingStrategy::OneEuro }
fn default_alpha() -> f64 { 0.12 }
fn default_jump_threshold() -> f64 { 10.0 }
fn default_median_window() -> usize { 5 }
fn default_position_euro() -> OneEuroConfig {
    OneEuroConfig { min_cutoff: 2.0, beta: 0.3, d_cutoff: 1.0 }
}
fn default_depth_euro() -> OneEuroConfig {
    OneEuroConfig { min_cutoff: 1.0, beta: 0.1, d_cutoff: 1.0 }
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            alpha: default_alpha(),
            jump_threshold_deg: default_jump_threshold(),
            median_window: default_median_window(),
            reseed_after: None,
            position: default_position_euro(),
            depth: default_depth_euro(),
        }
    }
}

/// 判定ゾーン閾値（度）
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ZoneConfig {
    #[serde(default = "default_safe_min")]
    pub safe_min_deg: f64,
    #[serde(default = "default_safe_max")]
    pub safe_max_deg: f64,
    #[serde(default = "default_warning_max")]
    pub warning_max_deg: f64,
}

fn default_safe_min() -> f64 { 30.0 }
fn default_safe_max() -> f64 { 45.0 }
fn default_warning_max() -> f64 { 60.0 }

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            safe_min_deg: default_safe_min(),
            safe_max_deg: default_safe_max(),
            warning_max_deg: default_warning_max(),
        }
    }
}

/// 記録のタイミング方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SamplerConfig {
    /// 独立タイマーで sample_ms ごとに最新フレームを読む
    FixedInterval {
        #[serde(default = "default_fixed_duration")]
        duration_ms: u64,
        #[serde(default = "default_sample_ms")]
        sample_ms: u64,
    },
    /// カメラフレーム到着ごとに、内側ウィンドウ内のものだけ記録
    Windowed {
        #[serde(default = "default_windowed_duration")]
        duration_ms: u64,
        #[serde(default = "default_window_start")]
        window_start_ms: u64,
        #[serde(default = "default_window_end")]
        window_end_ms: u64,
    },
}

fn default_fixed_duration() -> u64 { 2000 }
fn default_sample_ms() -> u64 { 10 }
fn default_windowed_duration() -> u64 { 3000 }
fn default_window_start() -> u64 { 1000 }
fn default_window_end() -> u64 { 2000 }

impl Default for SamplerConfig {
    fn default() -> Self {
        Self::FixedInterval {
            duration_ms: default_fixed_duration(),
            sample_ms: default_sample_ms(),
        }
    }
}

impl SamplerConfig {
    pub fn windowed_default() -> Self {
        Self::Windowed {
            duration_ms: default_windowed_duration(),
            window_start_ms: default_window_start(),
            window_end_ms: default_window_end(),
        }
    }
}

/// 記録開始時の傾き判定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TiltPolicy {
    Ignore,
    Warn,
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct TiltConfig {
    #[serde(default = "default_tilt_threshold")]
    pub threshold_deg: f64,
    #[serde(default = "default_tilt_policy")]
    pub policy: TiltPolicy,
}

fn default_tilt_threshold() -> f64 { 5.0 }
fn default_tilt_policy() -> TiltPolicy { TiltPolicy::Warn }

impl Default for TiltConfig {
    fn default() -> Self {
        Self {
            threshold_deg: default_tilt_threshold(),
            policy: default_tilt_policy(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExportConfig {
    /// 保存先ディレクトリ
    #[serde(default = "default_export_dir")]
    pub dir: String,
    /// ファイル名の接頭辞
    #[serde(default = "default_export_prefix")]
    pub prefix: String,
}

fn default_export_dir() -> String { "recordings".to_string() }
fn default_export_prefix() -> String { "abduction".to_string() }

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dir: default_export_dir(),
            prefix: default_export_prefix(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// 描画・推論ループの周期（リプレイ時）
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
}

fn default_frame_rate() -> u32 { 30 }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            frame_rate: default_frame_rate(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// 読み込みに失敗したらデフォルト値で続行
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                warn!("{:#}; using default configuration", e);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.smoothing;
        if !(s.alpha > 0.0 && s.alpha <= 1.0) {
            bail!("smoothing.alpha must be in (0, 1], got {}", s.alpha);
        }
        if s.jump_threshold_deg <= 0.0 {
            bail!("smoothing.jump_threshold_deg must be positive");
        }
        if s.median_window < 3 {
            bail!("smoothing.median_window must be at least 3, got {}", s.median_window);
        }

        let z = &self.zones;
        if !(z.safe_min_deg < z.safe_max_deg && z.safe_max_deg < z.warning_max_deg) {
            bail!(
                "zones must satisfy safe_min < safe_max < warning_max ({} / {} / {})",
                z.safe_min_deg, z.safe_max_deg, z.warning_max_deg
            );
        }

        if !(0.0..=1.0).contains(&self.pose.visibility_threshold) {
            bail!("pose.visibility_threshold must be in [0, 1]");
        }

        match self.sampler {
            SamplerConfig::FixedInterval { duration_ms, sample_ms } => {
                if sample_ms == 0 {
                    bail!("sampler.sample_ms must be positive");
                }
                if duration_ms < sample_ms {
                    bail!("sampler.duration_ms ({duration_ms}) is shorter than sample_ms ({sample_ms})");
                }
            }
            SamplerConfig::Windowed { duration_ms, window_start_ms, window_end_ms } => {
                if window_start_ms > window_end_ms || window_end_ms > duration_ms {
                    bail!(
                        "sampler window [{window_start_ms}, {window_end_ms}] must lie inside [0, {duration_ms}]"
                    );
                }
            }
        }

        if self.app.frame_rate == 0 {
            bail!("app.frame_rate must be positive");
        }
        Ok(())
    }
}
