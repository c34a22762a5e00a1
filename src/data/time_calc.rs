use std::time::Duration;

/// Accumulated durations of the stages of a repeated operation.
#[derive(Debug, Default, Clone)]
pub struct TimeCalc {
    n: usize,
    duration: Vec<Duration>,
}

impl TimeCalc {
    pub fn total(&self) -> Duration {
        self.duration.iter().sum::<Duration>()
    }

    /// Number of completed rounds.
    pub fn n(&self) -> usize {
        if self.duration.is_empty() {
            return 0;
        }
        self.n / self.duration.len()
    }

    pub fn avg(&self) -> Duration {
        match self.n() {
            0 => Duration::ZERO,
            n => self.total() / n as u32,
        }
    }

    pub fn avg_i(&self, i: usize) -> Duration {
        match (self.duration.get(i), self.n()) {
            (Some(d), n) if n > 0 => *d / n as u32,
            _ => Duration::ZERO,
        }
    }

    pub fn add_or_push(&mut self, i: usize, x: Duration) {
        match self.duration.get_mut(i) {
            Some(elem) => *elem += x,
            None => {
                if i >= self.duration.len() {
                    self.duration.push(x)
                }
            }
        }
        self.n += 1;
    }

    /// Folds another accumulator with the same stages into this one.
    pub fn merge(&mut self, other: &TimeCalc) {
        for (i, d) in other.duration.iter().enumerate() {
            match self.duration.get_mut(i) {
                Some(elem) => *elem += *d,
                None => self.duration.push(*d),
            }
        }
        self.n += other.n;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_averages() {
        let mut t = TimeCalc::default();
        for _ in 0..2 {
            t.add_or_push(0, Duration::from_millis(10));
            t.add_or_push(1, Duration::from_millis(30));
        }
        assert_eq!(t.n(), 2);
        assert_eq!(t.avg(), Duration::from_millis(40));
        assert_eq!(t.avg_i(1), Duration::from_millis(30));
        assert_eq!(t.avg_i(5), Duration::ZERO);

        let mut merged = TimeCalc::default();
        merged.merge(&t);
        merged.merge(&t);
        assert_eq!(merged.n(), 4);
        assert_eq!(merged.avg_i(0), Duration::from_millis(10));
    }
}
