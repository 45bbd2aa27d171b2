// Time-series buffer of acquisition samples
use super::sample::MeasurementSample;
use std::ops::Range;

/// Idle length above which the buffer is trimmed.
pub const IDLE_CAPACITY: usize = 1800;
/// Samples kept when an idle buffer is trimmed.
pub const RETAINED_ON_TRIM: usize = 10;

/// Append-only sequence of samples. Index order is acquisition order.
///
/// While pinned (a test or ripple capture is using the indices) the buffer is
/// never trimmed.
#[derive(Debug, Clone)]
pub struct TimeSeriesBuffer {
    samples: Vec<MeasurementSample>,
    idle_capacity: usize,
    pinned: bool,
}

impl Default for TimeSeriesBuffer {
    fn default() -> Self {
        Self::new(IDLE_CAPACITY)
    }
}

impl TimeSeriesBuffer {
    pub fn new(idle_capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(idle_capacity + 1),
            idle_capacity,
            pinned: false,
        }
    }

    /// Appends a sample. Returns `true` when the buffer was trimmed first.
    pub fn push(&mut self, sample: MeasurementSample) -> bool {
        let trimmed = !self.pinned && self.samples.len() > self.idle_capacity;
        if trimmed {
            let keep_from = self.samples.len() - RETAINED_ON_TRIM;
            self.samples.drain(..keep_from);
        }
        self.samples.push(sample);
        trimmed
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&MeasurementSample> {
        self.samples.get(index)
    }

    pub fn last(&self) -> Option<&MeasurementSample> {
        self.samples.last()
    }

    pub fn samples(&self) -> &[MeasurementSample] {
        &self.samples
    }

    pub fn range(&self, range: Range<usize>) -> &[MeasurementSample] {
        let end = range.end.min(self.samples.len());
        let start = range.start.min(end);
        &self.samples[start..end]
    }

    /// The most recent `n` samples (fewer if the buffer is shorter).
    pub fn tail(&self, n: usize) -> &[MeasurementSample] {
        let start = self.samples.len().saturating_sub(n);
        &self.samples[start..]
    }

    /// Counts samples at or after `from` matching `predicate`.
    pub fn count_from<F>(&self, from: usize, predicate: F) -> usize
    where
        F: Fn(&MeasurementSample) -> bool,
    {
        self.samples
            .iter()
            .skip(from)
            .filter(|s| predicate(s))
            .count()
    }

    /// Index of the oldest sample at or after `from` matching `predicate`.
    pub fn first_matching_from<F>(&self, from: usize, predicate: F) -> Option<usize>
    where
        F: Fn(&MeasurementSample) -> bool,
    {
        (from..self.samples.len()).find(|&i| predicate(&self.samples[i]))
    }

    /// Index of the newest sample at or after `from` matching `predicate`.
    pub fn last_matching_from<F>(&self, from: usize, predicate: F) -> Option<usize>
    where
        F: Fn(&MeasurementSample) -> bool,
    {
        (from..self.samples.len())
            .rev()
            .find(|&i| predicate(&self.samples[i]))
    }

    pub fn set_pinned(&mut self, pinned: bool) {
        self.pinned = pinned;
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sample::LoadCommand;

    fn sample(load: f64) -> MeasurementSample {
        MeasurementSample::new(12.0, 0.0, LoadCommand::Percent(load), true)
    }

    #[test]
    fn test_idle_buffer_is_trimmed_past_capacity() {
        let mut buffer = TimeSeriesBuffer::new(20);
        for i in 0..21 {
            assert!(!buffer.push(sample(i as f64)));
        }
        assert!(buffer.push(sample(99.0)));
        assert_eq!(buffer.len(), RETAINED_ON_TRIM + 1);
        assert_eq!(buffer.get(0).unwrap().load, LoadCommand::Percent(11.0));
        assert_eq!(buffer.last().unwrap().load, LoadCommand::Percent(99.0));
    }

    #[test]
    fn test_pinned_buffer_is_never_trimmed() {
        let mut buffer = TimeSeriesBuffer::new(20);
        buffer.set_pinned(true);
        for i in 0..100 {
            assert!(!buffer.push(sample(i as f64)));
        }
        assert_eq!(buffer.len(), 100);
    }

    #[test]
    fn test_count_and_tail() {
        let mut buffer = TimeSeriesBuffer::default();
        for load in [0.0, 10.0, 10.0, 20.0, 10.0] {
            buffer.push(sample(load));
        }
        assert_eq!(buffer.count_from(0, |s| s.load.is_level(10.0)), 3);
        assert_eq!(buffer.count_from(3, |s| s.load.is_level(10.0)), 1);
        assert_eq!(buffer.tail(2).len(), 2);
        assert_eq!(buffer.tail(50).len(), 5);
        assert_eq!(buffer.last_matching_from(0, |s| s.load.is_level(10.0)), Some(4));
        assert_eq!(buffer.first_matching_from(2, |s| s.load.is_level(10.0)), Some(2));
        assert_eq!(buffer.first_matching_from(5, |s| s.load.is_level(10.0)), None);
        assert_eq!(buffer.range(3..50).len(), 2);
    }
}
