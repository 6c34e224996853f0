use super::window::RollingWindow;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerOutput {
    pub middle: f64,
    pub upper: f64,
    pub lower: f64,
    /// `(upper - lower) / middle`
    pub width: f64,
    /// `(close - lower) / (upper - lower)`, 0.5 when the bands collapse onto the mean.
    pub percent: f64,
}

/// Bollinger Bands over a rolling SMA with sample standard deviation.
#[derive(Debug, Clone)]
pub struct BollingerBands {
    closes: RollingWindow,
    num_std: f64,
}

impl BollingerBands {
    pub fn new(window: usize, num_std: f64) -> Self {
        Self {
            closes: RollingWindow::new(window),
            num_std,
        }
    }

    pub fn update(&mut self, close: f64) -> Option<BollingerOutput> {
        self.closes.push(close);
        let middle = self.closes.mean()?;
        let std = self.closes.std_sample()?;

        let upper = middle + self.num_std * std;
        let lower = middle - self.num_std * std;
        let band = upper - lower;

        Some(BollingerOutput {
            middle,
            upper,
            lower,
            width: if middle != 0.0 { band / middle } else { 0.0 },
            percent: if band > 0.0 { (close - lower) / band } else { 0.5 },
        })
    }
}
