use crate::config::OneEuroConfig;

use super::ScalarFilter;

/// タイムスタンプが進まない場合の最小 dt（秒）
pub const MIN_DT_SECS: f64 = 1e-6;

/// 一次の指数平滑。最初の入力はそのまま状態になる
#[derive(Debug, Clone, Default)]
struct ExpSmoother {
    state: Option<f64>,
}

impl ExpSmoother {
    fn step(&mut self, input: f64, alpha: f64) -> f64 {
        let next = self.state.map_or(input, |s| s + alpha * (input - s));
        self.state = Some(next);
        next
    }

    fn current(&self) -> Option<f64> {
        self.state
    }

    fn clear(&mut self) {
        self.state = None;
    }
}

/// カットオフ周波数 `cutoff` (Hz) と間隔 `dt` (秒) から重みを求める。
/// tau = 1/(2πfc) として 1/(1 + tau/dt)
fn cutoff_alpha(dt: f64, cutoff: f64) -> f64 {
    let tau = 1.0 / (2.0 * std::f64::consts::PI * cutoff);
    1.0 / (1.0 + tau / dt)
}

/// スカラー 1 本分の One Euro フィルタ
///
/// 速度推定（微分）を固定カットオフで平滑化し、その大きさに応じて
/// 本体のカットオフを `min_cutoff + beta * |dx|` に上げる。
#[derive(Debug, Clone)]
pub struct OneEuroFilter {
    min_cutoff: f64,
    beta: f64,
    d_cutoff: f64,
    x_filter: ExpSmoother,
    dx_filter: ExpSmoother,
    last_time: Option<f64>,
}

impl OneEuroFilter {
    pub fn new(min_cutoff: f64, beta: f64, d_cutoff: f64) -> Self {
        Self {
            min_cutoff,
            beta,
            d_cutoff,
            x_filter: ExpSmoother::default(),
            dx_filter: ExpSmoother::default(),
            last_time: None,
        }
    }

    pub fn from_config(config: &OneEuroConfig) -> Self {
        Self::new(config.min_cutoff, config.beta, config.d_cutoff)
    }

    /// 直近の微分推定値（単位/秒）
    pub fn derivative(&self) -> Option<f64> {
        self.dx_filter.current()
    }
}

impl ScalarFilter for OneEuroFilter {
    fn update(&mut self, timestamp_ms: f64, raw: f64) -> f64 {
        let (last_time, prev) = match (self.last_time, self.x_filter.current()) {
            (Some(t), Some(prev)) => (t, prev),
            _ => {
                self.last_time = Some(timestamp_ms);
                self.dx_filter.step(0.0, 1.0);
                return self.x_filter.step(raw, 1.0);
            }
        };
        self.last_time = Some(timestamp_ms);

        let dt = ((timestamp_ms - last_time) / 1000.0).max(MIN_DT_SECS);
        let dx = (raw - prev) / dt;
        let edx = self
            .dx_filter
            .step(dx, cutoff_alpha(dt, self.d_cutoff));
        let cutoff = self.min_cutoff + self.beta * edx.abs();
        self.x_filter.step(raw, cutoff_alpha(dt, cutoff))
    }

    fn value(&self) -> Option<f64> {
        self.x_filter.current()
    }

    fn reset(&mut self) {
        self.x_filter.clear();
        self.dx_filter.clear();
        self.last_time = None;
    }
}
