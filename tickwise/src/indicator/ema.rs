/// Exponential moving average, `α = 2 / (span + 1)`, seeded with the first observation.
///
/// Reports `None` until `span` observations have been folded in.
#[derive(Debug, Clone)]
pub struct Ema {
    alpha: f64,
    span: usize,
    count: usize,
    value: f64,
}

impl Ema {
    pub fn new(span: usize) -> Self {
        let span = span.max(1);
        Self {
            alpha: 2.0 / (span as f64 + 1.0),
            span,
            count: 0,
            value: 0.0,
        }
    }

    pub fn update(&mut self, price: f64) -> Option<f64> {
        self.value = if self.count == 0 {
            price
        } else {
            self.alpha * price + (1.0 - self.alpha) * self.value
        };
        self.count += 1;
        self.value()
    }

    pub fn value(&self) -> Option<f64> {
        (self.count >= self.span).then_some(self.value)
    }
}
