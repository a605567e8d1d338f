//! Latency and backpressure model.
//!
//! Nothing here is stored: every figure is recomputed from the source queue so the
//! delay query, the available-space query, `wait` and both write paths agree.

use crate::registry::Registry;
use crate::source::Source;

/// Frame accounting for one source at a point in time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueMetrics {
    /// Frames across every queued buffer.
    pub queued_frames: usize,
    /// Frames in buffers already handed to the consumer.
    pub position: usize,
    /// Buffers queued, processed ones included.
    pub queued_buffers: usize,
    /// Buffers already handed to the consumer.
    pub processed_buffers: usize,
}

impl QueueMetrics {
    /// Measure `source`, resolving frame counts through `registry`.
    pub fn measure(source: &Source, registry: &Registry) -> Self {
        let frames_of = |id| registry.buffer(id).map_or(0, |b| b.frame_count());
        let position = source.processed().map(frames_of).sum::<usize>();
        let pending = source.pending().map(frames_of).sum::<usize>();
        Self {
            queued_frames: position + pending,
            position,
            queued_buffers: source.len(),
            processed_buffers: source.processed_count(),
        }
    }

    /// Frames queued but not yet consumed.
    pub fn latency(&self) -> usize {
        self.queued_frames - self.position
    }

    /// Free space left in a device holding `capacity` frames.
    pub fn available(&self, capacity: usize) -> usize {
        capacity.saturating_sub(self.latency())
    }

    /// Whether a blocking write must wait: the device is already full.
    ///
    /// A write starting below `capacity` is admitted whole, so latency may exceed
    /// the capacity afterwards.
    pub fn would_block(&self, capacity: usize) -> bool {
        self.latency() >= capacity
    }
}

/// Convert a frame count to milliseconds at `rate` Hz.
pub fn frames_to_ms(frames: usize, rate: u32) -> f32 {
    if rate == 0 {
        return 0.0;
    }
    frames as f32 * 1_000.0 / rate as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferId, BufferParams};
    use crate::format::SampleFormat;
    use crate::source::{SourceId, SourceKind};

    fn queue_of(frames: &[usize]) -> (Registry, SourceId) {
        let mut registry = Registry::new();
        let source = registry.create_source(SourceKind::Streaming);
        for &count in frames {
            let id: BufferId = registry.create_buffer(BufferParams {
                format: SampleFormat::S16Le,
                channels: 2,
                frequency: 48_000,
            });
            registry.buffer_mut(id).unwrap().resize(count);
            registry.source_mut(source).unwrap().push(id);
        }
        (registry, source)
    }

    #[test]
    fn latency_excludes_processed_prefix() {
        let (mut registry, source) = queue_of(&[0, 2048, 1024, 512]);
        let metrics = QueueMetrics::measure(registry.source(source).unwrap(), &registry);
        assert_eq!(metrics.queued_frames, 3584);
        assert_eq!(metrics.position, 0);
        assert_eq!(metrics.latency(), 3584);

        registry.source_mut(source).unwrap().advance(2);
        let metrics = QueueMetrics::measure(registry.source(source).unwrap(), &registry);
        assert_eq!(metrics.position, 2048);
        assert_eq!(metrics.latency(), 1536);
        assert_eq!(metrics.processed_buffers, 2);
        assert_eq!(metrics.queued_buffers, 4);
    }

    #[test]
    fn available_saturates_at_zero() {
        let (registry, source) = queue_of(&[3000, 3000]);
        let metrics = QueueMetrics::measure(registry.source(source).unwrap(), &registry);
        assert_eq!(metrics.available(4096), 0);
        assert_eq!(metrics.available(8192), 2192);
    }

    #[test]
    fn available_and_latency_partition_capacity() {
        for frames in [0usize, 1, 1000, 4095, 4096] {
            let (registry, source) = queue_of(&[frames]);
            let metrics = QueueMetrics::measure(registry.source(source).unwrap(), &registry);
            assert_eq!(metrics.available(4096) + metrics.latency(), 4096);
        }
    }

    #[test]
    fn blocking_rule() {
        let (registry, source) = queue_of(&[2048, 2048]);
        let metrics = QueueMetrics::measure(registry.source(source).unwrap(), &registry);
        assert!(metrics.would_block(4096));
        assert!(!metrics.would_block(8192));

        let (registry, source) = queue_of(&[1000, 1000, 1000, 1000]);
        let metrics = QueueMetrics::measure(registry.source(source).unwrap(), &registry);
        assert!(!metrics.would_block(4096));

        let (registry, source) = queue_of(&[3000, 3000]);
        let metrics = QueueMetrics::measure(registry.source(source).unwrap(), &registry);
        assert!(metrics.would_block(4096));
        assert_eq!(metrics.available(4096), 0);
    }

    #[test]
    fn frames_to_ms_handles_zero_rate() {
        assert_eq!(frames_to_ms(4800, 48_000), 100.0);
        assert_eq!(frames_to_ms(4800, 0), 0.0);
    }
}
