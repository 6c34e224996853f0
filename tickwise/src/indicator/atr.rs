use super::window::RollingWindow;

/// Average True Range as a rolling mean of true range.
///
/// True range needs the previous close, so the first bar contributes nothing and the first
/// value is reported on bar `window + 1`.
#[derive(Debug, Clone)]
pub struct Atr {
    prev_close: Option<f64>,
    ranges: RollingWindow,
}

impl Atr {
    pub fn new(window: usize) -> Self {
        Self {
            prev_close: None,
            ranges: RollingWindow::new(window),
        }
    }

    pub fn update(&mut self, high: f64, low: f64, close: f64) -> Option<f64> {
        let prev_close = self.prev_close.replace(close)?;

        let true_range = (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs());
        self.ranges.push(true_range);
        self.ranges.mean()
    }
}
