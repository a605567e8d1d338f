//! Process-wide owner of buffers and sources.
//!
//! Buffers live in an arena addressed by [`BufferId`]; sources hold FIFOs of those
//! ids. Every read and write goes through the single [`SharedRegistry`] lock.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::PcmError;
use crate::buffer::{AudioBuffer, BufferId, BufferParams};
use crate::source::{Source, SourceId, SourceKind};

/// Registry guarded by its one exclusive lock.
pub type SharedRegistry = Arc<Mutex<Registry>>;

/// Arena of buffers plus the table of sources referencing them.
#[derive(Debug, Default)]
pub struct Registry {
    buffers: Vec<Option<AudioBuffer>>,
    free_slots: Vec<u32>,
    sources: HashMap<SourceId, Source>,
    next_source_id: u32,
}

impl Registry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty registry wrapped in its lock.
    pub fn shared() -> SharedRegistry {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Allocate an empty buffer carrying `params`.
    pub fn create_buffer(&mut self, params: BufferParams) -> BufferId {
        let buffer = AudioBuffer::new(params);
        if let Some(slot) = self.free_slots.pop() {
            self.buffers[slot as usize] = Some(buffer);
            return BufferId(slot);
        }
        self.buffers.push(Some(buffer));
        BufferId((self.buffers.len() - 1) as u32)
    }

    /// Look up a live buffer.
    pub fn buffer(&self, id: BufferId) -> Option<&AudioBuffer> {
        self.buffers.get(id.index())?.as_ref()
    }

    /// Look up a live buffer mutably.
    pub fn buffer_mut(&mut self, id: BufferId) -> Option<&mut AudioBuffer> {
        self.buffers.get_mut(id.index())?.as_mut()
    }

    /// Destroy a buffer no source references. Returns `false` if it is still queued
    /// or does not exist.
    pub fn evict_buffer(&mut self, id: BufferId) -> bool {
        if self.is_queued(id) {
            return false;
        }
        match self.buffers.get_mut(id.index()) {
            Some(slot @ Some(_)) => {
                *slot = None;
                self.free_slots.push(id.0);
                true
            }
            _ => false,
        }
    }

    fn is_queued(&self, id: BufferId) -> bool {
        self.sources.values().any(|s| s.queue().contains(&id))
    }

    /// Register a new empty source.
    pub fn create_source(&mut self, kind: SourceKind) -> SourceId {
        let id = SourceId(self.next_source_id);
        self.next_source_id += 1;
        self.sources.insert(id, Source::new(kind));
        id
    }

    /// Look up a source.
    pub fn source(&self, id: SourceId) -> Option<&Source> {
        self.sources.get(&id)
    }

    /// Look up a source mutably.
    pub fn source_mut(&mut self, id: SourceId) -> Option<&mut Source> {
        self.sources.get_mut(&id)
    }

    /// Look up a source, failing with [`PcmError::UnknownSource`].
    pub fn require_source(&self, id: SourceId) -> Result<&Source, PcmError> {
        self.sources.get(&id).ok_or(PcmError::UnknownSource(id.0))
    }

    /// Look up a source mutably, failing with [`PcmError::UnknownSource`].
    pub fn require_source_mut(&mut self, id: SourceId) -> Result<&mut Source, PcmError> {
        self.sources.get_mut(&id).ok_or(PcmError::UnknownSource(id.0))
    }

    /// Reference buffer of a source: the queue head whose parameters new buffers
    /// inherit.
    pub fn reference_buffer(&self, id: SourceId) -> Result<&AudioBuffer, PcmError> {
        let reference = self
            .require_source(id)?
            .reference()
            .ok_or(PcmError::EmptyQueueCannotInferParameters)?;
        self.buffer(reference)
            .ok_or(PcmError::EmptyQueueCannotInferParameters)
    }

    /// Mutable reference buffer of a source.
    pub fn reference_buffer_mut(&mut self, id: SourceId) -> Result<&mut AudioBuffer, PcmError> {
        let reference = self
            .require_source(id)?
            .reference()
            .ok_or(PcmError::EmptyQueueCannotInferParameters)?;
        self.buffer_mut(reference)
            .ok_or(PcmError::EmptyQueueCannotInferParameters)
    }

    /// Obtain a buffer for the next queue entry of `source`.
    ///
    /// The oldest processed buffer is recycled when one exists, otherwise a new
    /// buffer is allocated. Either way it takes the reference buffer's parameters.
    /// The returned buffer is not queued yet.
    pub fn acquire_buffer(&mut self, source: SourceId) -> Result<BufferId, PcmError> {
        let params = self.reference_buffer(source)?.params();
        let recycled = self.require_source_mut(source)?.pop_processed();
        match recycled {
            Some(id) => {
                debug!(buffer = id.0, "recycling processed buffer");
                if let Some(buffer) = self.buffer_mut(id) {
                    buffer.set_params(params);
                }
                Ok(id)
            }
            None => Ok(self.create_buffer(params)),
        }
    }

    /// Remove a source and evict every buffer it queued. Returns the number of
    /// buffers evicted.
    pub fn release_source(&mut self, id: SourceId) -> usize {
        let Some(mut source) = self.sources.remove(&id) else {
            return 0;
        };
        source
            .drain()
            .into_iter()
            .filter(|buffer| self.evict_buffer(*buffer))
            .count()
    }

    /// Live buffer count.
    pub fn buffer_count(&self) -> usize {
        self.buffers.iter().filter(|b| b.is_some()).count()
    }

    /// Registered source count.
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Every queued id refers to a live buffer and every cursor is in range.
    pub fn is_consistent(&self) -> bool {
        self.sources.values().all(|source| {
            source.cursor() <= source.len()
                && source.queue().iter().all(|id| self.buffer(*id).is_some())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SampleFormat;

    fn params() -> BufferParams {
        BufferParams {
            format: SampleFormat::S16Le,
            channels: 2,
            frequency: 44_100,
        }
    }

    #[test]
    fn acquire_allocates_until_something_is_processed() {
        let mut registry = Registry::new();
        let placeholder = registry.create_buffer(params());
        let source = registry.create_source(SourceKind::Streaming);
        registry.source_mut(source).unwrap().push(placeholder);

        let first = registry.acquire_buffer(source).unwrap();
        assert_ne!(first, placeholder);
        registry.source_mut(source).unwrap().push(first);
        assert_eq!(registry.buffer_count(), 2);

        registry.source_mut(source).unwrap().advance(1);
        let recycled = registry.acquire_buffer(source).unwrap();
        assert_eq!(recycled, placeholder);
        assert_eq!(registry.source(source).unwrap().cursor(), 0);
        assert_eq!(registry.buffer_count(), 2);
    }

    #[test]
    fn acquire_on_empty_queue_fails() {
        let mut registry = Registry::new();
        let source = registry.create_source(SourceKind::Streaming);
        assert!(matches!(
            registry.acquire_buffer(source),
            Err(PcmError::EmptyQueueCannotInferParameters)
        ));
        assert_eq!(registry.buffer_count(), 0);
    }

    #[test]
    fn recycled_buffer_inherits_reference_params() {
        let mut registry = Registry::new();
        let source = registry.create_source(SourceKind::Streaming);
        let head = registry.create_buffer(params());
        registry.source_mut(source).unwrap().push(head);
        registry
            .reference_buffer_mut(source)
            .unwrap()
            .set_format(SampleFormat::F32Le);

        let id = registry.acquire_buffer(source).unwrap();
        assert_eq!(registry.buffer(id).unwrap().format(), SampleFormat::F32Le);
        assert_eq!(registry.buffer(id).unwrap().align_size(), 8);
    }

    #[test]
    fn queued_buffers_are_not_evicted_or_reused() {
        let mut registry = Registry::new();
        let source = registry.create_source(SourceKind::Streaming);
        let queued = registry.create_buffer(params());
        let loose = registry.create_buffer(params());
        registry.source_mut(source).unwrap().push(queued);

        assert!(!registry.evict_buffer(queued));
        assert!(registry.evict_buffer(loose));
        assert!(!registry.evict_buffer(loose));

        let reused = registry.create_buffer(params());
        assert_eq!(reused, loose);
        assert_ne!(reused, queued);
        assert!(registry.is_consistent());
    }

    #[test]
    fn release_source_evicts_its_buffers() {
        let mut registry = Registry::new();
        let source = registry.create_source(SourceKind::Streaming);
        for _ in 0..3 {
            let id = registry.create_buffer(params());
            registry.source_mut(source).unwrap().push(id);
        }
        assert_eq!(registry.release_source(source), 3);
        assert_eq!(registry.buffer_count(), 0);
        assert_eq!(registry.source_count(), 0);
    }
}
