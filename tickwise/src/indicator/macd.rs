use super::ema::Ema;

/// MACD line, signal line and histogram for one bar.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MacdOutput {
    pub line: Option<f64>,
    pub signal: Option<f64>,
    pub hist: Option<f64>,
}

/// MACD: `EMA(fast) - EMA(slow)`, signal = `EMA(signal)` of the line.
///
/// The line is defined once the slow EMA is warm; the signal EMA only starts consuming the
/// line from that point, so the first histogram appears `signal - 1` bars later.
#[derive(Debug, Clone)]
pub struct Macd {
    fast: Ema,
    slow: Ema,
    signal: Ema,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        Self {
            fast: Ema::new(fast),
            slow: Ema::new(slow),
            signal: Ema::new(signal),
        }
    }

    pub fn update(&mut self, close: f64) -> MacdOutput {
        let fast = self.fast.update(close);
        let slow = self.slow.update(close);

        let Some(line) = fast.zip(slow).map(|(fast, slow)| fast - slow) else {
            return MacdOutput::default();
        };

        let signal = self.signal.update(line);
        MacdOutput {
            line: Some(line),
            signal,
            hist: signal.map(|signal| line - signal),
        }
    }
}
