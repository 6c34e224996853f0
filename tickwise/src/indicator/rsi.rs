/// Relative Strength Index with Wilder smoothing of average gain and loss.
///
/// The first `window` changes seed the averages with a simple mean, so the first value is
/// reported on observation `window + 1`.
#[derive(Debug, Clone)]
pub struct Rsi {
    window: usize,
    prev_close: Option<f64>,
    changes: usize,
    gain_sum: f64,
    loss_sum: f64,
    avg_gain: f64,
    avg_loss: f64,
}

impl Rsi {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            prev_close: None,
            changes: 0,
            gain_sum: 0.0,
            loss_sum: 0.0,
            avg_gain: 0.0,
            avg_loss: 0.0,
        }
    }

    pub fn update(&mut self, close: f64) -> Option<f64> {
        let Some(prev_close) = self.prev_close.replace(close) else {
            return None;
        };

        let change = close - prev_close;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        self.changes += 1;

        let window = self.window as f64;
        if self.changes < self.window {
            self.gain_sum += gain;
            self.loss_sum += loss;
            return None;
        } else if self.changes == self.window {
            self.avg_gain = (self.gain_sum + gain) / window;
            self.avg_loss = (self.loss_sum + loss) / window;
        } else {
            self.avg_gain = (self.avg_gain * (window - 1.0) + gain) / window;
            self.avg_loss = (self.avg_loss * (window - 1.0) + loss) / window;
        }

        Some(match (self.avg_gain > 0.0, self.avg_loss > 0.0) {
            (false, false) => 50.0,
            (_, false) => 100.0,
            _ => 100.0 - 100.0 / (1.0 + self.avg_gain / self.avg_loss),
        })
    }
}
