//! Bounded per-id history for live plotting
//!
//! Each arbitration id gets its own ring buffer of `(sequence, value)`
//! samples, created the first time a sample for that id arrives. When a
//! series is full the oldest sample is evicted, so memory stays bounded no
//! matter how long the session runs.
//!
//! The plot renderer reads series through [`PlotBuffer::snapshot`], which
//! copies the samples out; it never holds a reference into the buffer
//! across an ingestion step.

use std::collections::{BTreeMap, VecDeque};

use crate::config::DEFAULT_PLOT_CAPACITY;

/// One plotted sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotSample {
    /// Session sequence number of the frame the sample came from
    pub sequence: u64,
    /// Sampled value
    pub value: f64,
}

impl PlotSample {
    pub fn new(sequence: u64, value: f64) -> Self {
        Self { sequence, value }
    }
}

/// Ring buffer of samples for a single id
#[derive(Debug, Clone)]
pub struct PlotSeries {
    samples: VecDeque<PlotSample>,
    capacity: usize,
}

impl PlotSeries {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest if the series is full
    pub fn push(&mut self, sample: PlotSample) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlotSample> {
        self.samples.iter()
    }

    pub fn last(&self) -> Option<&PlotSample> {
        self.samples.back()
    }

    /// Samples as `[x, y]` points, x being the sequence number
    pub fn as_plot_points(&self) -> Vec<[f64; 2]> {
        self.samples
            .iter()
            .map(|s| [s.sequence as f64, s.value])
            .collect()
    }

    /// Get the value range of the data
    pub fn value_range(&self) -> Option<(f64, f64)> {
        if self.samples.is_empty() {
            return None;
        }
        let mut min = f64::MAX;
        let mut max = f64::MIN;
        for s in &self.samples {
            min = min.min(s.value);
            max = max.max(s.value);
        }
        Some((min, max))
    }
}

/// All plotted series of a session
#[derive(Debug, Clone)]
pub struct PlotBuffer {
    capacity: usize,
    series: BTreeMap<u32, PlotSeries>,
}

impl Default for PlotBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_PLOT_CAPACITY)
    }
}

impl PlotBuffer {
    /// Create an empty buffer; every series will hold at most `capacity` samples
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            series: BTreeMap::new(),
        }
    }

    /// Append a sample to the series for `id`, creating it on first sight
    pub fn upsert(&mut self, id: u32, sample: PlotSample) {
        let capacity = self.capacity;
        let series = self.series.entry(id).or_insert_with(|| {
            tracing::debug!("Created plot series for ID {:X}", id);
            PlotSeries::new(capacity)
        });
        series.push(sample);
    }

    /// Copy of the samples for `id`, oldest first
    pub fn snapshot(&self, id: u32) -> Vec<PlotSample> {
        self.series
            .get(&id)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn series(&self, id: u32) -> Option<&PlotSeries> {
        self.series.get(&id)
    }

    /// Ids that have at least one sample, ascending
    pub fn ids(&self) -> Vec<u32> {
        self.series.keys().copied().collect()
    }

    pub fn len(&self, id: u32) -> usize {
        self.series.get(&id).map(PlotSeries::len).unwrap_or(0)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn clear(&mut self) {
        self.series.clear();
    }
}
