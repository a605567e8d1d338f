//! Playback stream: FIFO of buffer ids with a consumer cursor.

use std::collections::VecDeque;

use crate::buffer::BufferId;

/// Handle referencing a registered source.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SourceId(pub(crate) u32);

/// Play state of a source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SourceState {
    /// Opened, parameters not yet committed.
    #[default]
    Stopped,
    /// Armed and consumed by the mixer.
    Playing,
}

/// How a source is fed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SourceKind {
    /// Buffers are queued over time and recycled once played.
    #[default]
    Streaming,
}

/// One logical playback stream.
///
/// Buffers at indices below `cursor` have been handed to the consumer and may be
/// recycled; they always form a prefix of the queue.
#[derive(Debug, Default)]
pub struct Source {
    queue: VecDeque<BufferId>,
    cursor: usize,
    state: SourceState,
    kind: SourceKind,
}

impl Source {
    /// Empty, stopped source of the given kind.
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Current play state.
    pub fn state(&self) -> SourceState {
        self.state
    }

    /// Force the play state.
    pub fn set_state(&mut self, state: SourceState) {
        self.state = state;
    }

    /// Feed kind.
    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Index of the next buffer the consumer will read.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Queued buffer ids in play order.
    pub fn queue(&self) -> &VecDeque<BufferId> {
        &self.queue
    }

    /// Number of queued buffers, processed ones included.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether no buffer is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Buffer whose parameters new allocations inherit.
    pub fn reference(&self) -> Option<BufferId> {
        self.queue.front().copied()
    }

    /// Buffers already handed to the consumer, oldest first.
    pub fn processed(&self) -> impl Iterator<Item = BufferId> + '_ {
        self.queue.iter().take(self.cursor).copied()
    }

    /// Buffers still waiting for the consumer, in play order.
    pub fn pending(&self) -> impl Iterator<Item = BufferId> + '_ {
        self.queue.iter().skip(self.cursor).copied()
    }

    /// Number of buffers already handed to the consumer.
    pub fn processed_count(&self) -> usize {
        self.cursor
    }

    /// Buffer the consumer reads next, if any.
    pub fn current(&self) -> Option<BufferId> {
        self.queue.get(self.cursor).copied()
    }

    /// Append a buffer at the tail.
    pub fn push(&mut self, id: BufferId) {
        self.queue.push_back(id);
    }

    /// Remove the oldest processed buffer for reuse.
    pub fn pop_processed(&mut self) -> Option<BufferId> {
        if self.cursor == 0 {
            return None;
        }
        let id = self.queue.pop_front()?;
        self.cursor -= 1;
        Some(id)
    }

    /// Advance the cursor by up to `buffers`, returning how far it moved.
    pub fn advance(&mut self, buffers: usize) -> usize {
        let step = buffers.min(self.queue.len() - self.cursor);
        self.cursor += step;
        step
    }

    /// Drain every queued id, leaving the source empty.
    pub fn drain(&mut self) -> Vec<BufferId> {
        self.cursor = 0;
        self.queue.drain(..).collect()
    }
}
