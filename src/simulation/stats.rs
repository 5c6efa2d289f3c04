//! Aggregate statistics collected for post-run analysis

/// Running gap statistics over every recorded inter-vehicle gap
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GapStats {
    samples: Vec<f64>,
    min: Option<f64>,
    max: Option<f64>,
    sum: f64,
}

impl GapStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, gap: f64) {
        self.samples.push(gap);
        self.sum += gap;
        self.min = Some(self.min.map_or(gap, |min| min.min(gap)));
        self.max = Some(self.max.map_or(gap, |max| max.max(gap)));
    }

    pub fn min(&self) -> Option<f64> {
        self.min
    }

    pub fn max(&self) -> Option<f64> {
        self.max
    }

    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            None
        } else {
            Some(self.sum / self.samples.len() as f64)
        }
    }

    /// Every sample in recording order
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn empty_stats_have_no_extremes() {
        let stats = GapStats::new();
        assert!(stats.is_empty());
        assert_eq!(stats.min(), None);
        assert_eq!(stats.max(), None);
        assert_eq!(stats.mean(), None);
    }

    #[test]
    fn tracks_running_extremes() {
        let mut stats = GapStats::new();
        for gap in [6.0, 2.5, 9.0, 4.5] {
            stats.record(gap);
        }
        assert_eq!(stats.min(), Some(2.5));
        assert_eq!(stats.max(), Some(9.0));
        assert_abs_diff_eq!(stats.mean().unwrap(), 5.5);
        assert_eq!(stats.samples(), &[6.0, 2.5, 9.0, 4.5]);
    }
}
