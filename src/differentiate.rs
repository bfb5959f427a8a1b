/// Taps for the four-sample GPS ground speed window
pub const GPS_TAPS: [f64; 4] = [0.6, 0.3, 0.07, 0.03];

/// Halving low-pass taps: 0.5, 0.25, ... with the last two equal so the
/// weights sum to one.
pub fn halving_taps(count: usize) -> Vec<f64> {
    let mut taps = Vec::with_capacity(count);
    let mut weight = 0.5;
    for i in 0..count {
        if i + 1 == count && count > 1 {
            taps.push(taps[i - 1]);
        } else {
            taps.push(weight);
            weight /= 2.0;
        }
    }
    if count == 1 {
        taps[0] = 1.0;
    }
    taps
}

/// First-derivative estimator over a fixed ring of integer sample deltas.
///
/// The short window is a weighted sum of the newest deltas. When every delta
/// in that window is within ±1 the signal is moving too slowly to resolve,
/// so a long window averages the raw deltas back through history until a
/// jump larger than one count or a sign reversal.
#[derive(Clone, Debug)]
pub struct Differentiator {
    history: Vec<i64>,
    taps: Vec<f64>,
    t0_index: usize,
    filled: usize,
    last_value: i64,
}

impl Differentiator {
    /// # Panics
    ///
    /// Panics if `history_size` is zero.
    pub fn new(history_size: usize, taps: &[f64]) -> Self {
        assert!(history_size > 0, "differentiator history must be non-empty");
        Differentiator {
            history: vec![0; history_size],
            taps: taps.to_vec(),
            t0_index: 0,
            filled: 0,
            last_value: 0,
        }
    }

    /// Record a raw sample. The first sample only sets the baseline.
    pub fn add_sample(&mut self, value: i32) {
        let value = i64::from(value);
        self.t0_index = (self.t0_index + 1) % self.history.len();
        self.history[self.t0_index] = if self.filled == 0 {
            0
        } else {
            value - self.last_value
        };
        self.filled = (self.filled + 1).min(self.history.len());
        self.last_value = value;
    }

    /// Derivative in counts per sample.
    pub fn differentiate(&self) -> f64 {
        let mut index = self.t0_index;
        let mut acc = 0.0;
        let mut resolved = false;

        for (count, tap) in self.taps.iter().enumerate() {
            if count >= self.filled {
                break;
            }
            let h = self.history[index];
            if h.abs() > 1 {
                resolved = true;
            }
            acc += tap * h as f64;
            index = self.previous(index);
        }

        if resolved || self.filled <= self.taps.len() {
            return acc;
        }

        let mut index = self.t0_index;
        let mut sum = 0i64;
        let mut count = 0usize;
        let mut seen_rise = false;
        let mut seen_fall = false;
        while count < self.filled {
            let h = self.history[index];
            if h.abs() > 1 {
                break;
            }
            if h > 0 {
                if seen_fall {
                    break;
                }
                seen_rise = true;
            } else if h < 0 {
                if seen_rise {
                    break;
                }
                seen_fall = true;
            }
            sum += h;
            count += 1;
            index = self.previous(index);
        }

        if count == 0 {
            0.0
        } else {
            sum as f64 / count as f64
        }
    }

    pub fn filled(&self) -> usize {
        self.filled
    }

    pub fn capacity(&self) -> usize {
        self.history.len()
    }

    fn previous(&self, index: usize) -> usize {
        if index == 0 {
            self.history.len() - 1
        } else {
            index - 1
        }
    }
}
