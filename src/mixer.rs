//! Reference consumer stage.
//!
//! Pulls queued frames in FIFO order, converts them to stereo `f32` and moves the
//! source cursor past every buffer it finishes. It is the only writer of the cursor.

use dasp_frame::{Frame, Stereo};

use crate::buffer::AudioBuffer;
use crate::registry::SharedRegistry;
use crate::source::{SourceId, SourceState};

/// Consumer draining one source.
pub struct MixStage {
    registry: SharedRegistry,
    source: SourceId,
    frame_offset: usize,
    rms: f32,
    frames_mixed: u64,
}

impl MixStage {
    /// Consumer for `source`.
    pub fn new(registry: SharedRegistry, source: SourceId) -> Self {
        Self {
            registry,
            source,
            frame_offset: 0,
            rms: 0.0,
            frames_mixed: 0,
        }
    }

    /// Fill `out` with the next queued frames, padding with silence once the queue
    /// runs dry. Returns the frames taken from the queue.
    ///
    /// A stopped source yields silence and keeps its queue.
    pub fn render(&mut self, out: &mut [Stereo<f32>]) -> usize {
        let mut registry = self.registry.lock();
        let mut produced = 0usize;

        while produced < out.len() {
            let Some(source) = registry.source(self.source) else {
                break;
            };
            if source.state() != SourceState::Playing {
                break;
            }
            let Some(id) = source.current() else {
                break;
            };
            let Some(buffer) = registry.buffer(id) else {
                break;
            };

            let remaining = buffer.frame_count().saturating_sub(self.frame_offset);
            let take = remaining.min(out.len() - produced);
            for (i, frame) in out[produced..produced + take].iter_mut().enumerate() {
                *frame = decode_frame(buffer, self.frame_offset + i);
            }
            produced += take;
            self.frame_offset += take;

            let finished = self.frame_offset >= buffer.frame_count();
            if finished {
                if let Some(source) = registry.source_mut(self.source) {
                    source.advance(1);
                }
                self.frame_offset = 0;
            }
        }
        drop(registry);

        out[produced..].fill(Stereo::EQUILIBRIUM);
        self.frames_mixed += produced as u64;
        self.rms = rms(&out[..produced]);
        produced
    }

    /// Mark the next `buffers` queued buffers as played without decoding them.
    /// Returns how many buffers were marked.
    pub fn mark_processed(&mut self, buffers: usize) -> usize {
        let mut registry = self.registry.lock();
        let Some(source) = registry.source_mut(self.source) else {
            return 0;
        };
        self.frame_offset = 0;
        source.advance(buffers)
    }

    /// RMS level of the last rendered block.
    pub fn rms(&self) -> f32 {
        self.rms
    }

    /// Total frames taken from the queue.
    pub fn frames_mixed(&self) -> u64 {
        self.frames_mixed
    }
}

fn decode_frame(buffer: &AudioBuffer, frame: usize) -> Stereo<f32> {
    let channels = buffer.channels() as usize;
    if channels == 0 {
        return Stereo::EQUILIBRIUM;
    }
    let format = buffer.format();
    let width = format.bytes_per_sample();
    let base = frame * buffer.align_size();
    let samples = buffer.samples();
    let left = format.decode(&samples[base..base + width]);
    let right = if channels > 1 {
        format.decode(&samples[base + width..base + 2 * width])
    } else {
        left
    };
    [left, right]
}

fn rms(frames: &[Stereo<f32>]) -> f32 {
    if frames.is_empty() {
        return 0.0;
    }
    let energy: f32 = frames.iter().map(|[l, r]| (l * l + r * r) * 0.5).sum();
    (energy / frames.len() as f32).sqrt()
}
