//! Interleaved sample storage owned by the registry.

use crate::format::SampleFormat;

/// Arena index of a buffer inside the registry.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub(crate) u32);

impl BufferId {
    /// Raw arena slot.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Format parameters a buffer carries and that new buffers inherit from the
/// queue's reference buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferParams {
    /// Sample encoding.
    pub format: SampleFormat,
    /// Interleaved channel count.
    pub channels: u32,
    /// Sample rate in Hz.
    pub frequency: u32,
}

impl BufferParams {
    /// Bytes per interleaved frame.
    pub fn align_size(&self) -> usize {
        self.format.bytes_per_sample() * self.channels as usize
    }
}

/// One chunk of interleaved audio plus its format metadata.
#[derive(Debug)]
pub struct AudioBuffer {
    format: SampleFormat,
    channels: u32,
    frequency: u32,
    align_size: usize,
    frame_count: usize,
    byte_size: usize,
    storage: Vec<u8>,
}

impl AudioBuffer {
    /// Empty buffer carrying `params`.
    pub fn new(params: BufferParams) -> Self {
        let mut buffer = Self {
            format: params.format,
            channels: params.channels,
            frequency: params.frequency,
            align_size: 0,
            frame_count: 0,
            byte_size: 0,
            storage: Vec::new(),
        };
        buffer.update();
        buffer
    }

    /// Current format parameters.
    pub fn params(&self) -> BufferParams {
        BufferParams {
            format: self.format,
            channels: self.channels,
            frequency: self.frequency,
        }
    }

    /// Adopt new format parameters, keeping the frame count.
    pub fn set_params(&mut self, params: BufferParams) {
        self.format = params.format;
        self.channels = params.channels;
        self.frequency = params.frequency;
        self.update();
    }

    /// Change the sample encoding.
    pub fn set_format(&mut self, format: SampleFormat) {
        self.format = format;
        self.update();
    }

    /// Change the channel count.
    pub fn set_channels(&mut self, channels: u32) {
        self.channels = channels;
        self.update();
    }

    /// Change the sample rate.
    pub fn set_frequency(&mut self, frequency: u32) {
        self.frequency = frequency;
    }

    /// Sample encoding.
    pub fn format(&self) -> SampleFormat {
        self.format
    }

    /// Interleaved channel count.
    pub fn channels(&self) -> u32 {
        self.channels
    }

    /// Sample rate in Hz.
    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    /// Bytes per frame.
    pub fn align_size(&self) -> usize {
        self.align_size
    }

    /// Bits per sample of a single channel.
    pub fn bit_depth(&self) -> u32 {
        self.format.bits_per_sample()
    }

    /// Payload size in frames.
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Payload size in bytes.
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    /// Payload bytes.
    pub fn samples(&self) -> &[u8] {
        &self.storage
    }

    /// Writable payload bytes.
    pub fn samples_mut(&mut self) -> &mut [u8] {
        &mut self.storage
    }

    /// Resize the payload to `frames`, keeping leading bytes and zero-filling growth.
    pub fn resize(&mut self, frames: usize) {
        self.frame_count = frames;
        self.update();
    }

    /// Replace the payload with `frames` frames copied from `bytes`.
    ///
    /// Missing input bytes are zero-filled and surplus bytes are ignored. Returns the
    /// number of bytes taken from `bytes`.
    pub fn fill(&mut self, frames: usize, bytes: &[u8]) -> usize {
        self.frame_count = frames;
        self.align_size = self.params().align_size();
        self.byte_size = frames * self.align_size;
        let copied = bytes.len().min(self.byte_size);
        self.storage.clear();
        self.storage.extend_from_slice(&bytes[..copied]);
        self.storage.resize(self.byte_size, 0);
        copied
    }

    // Keeps align_size, byte_size and storage length consistent.
    fn update(&mut self) {
        self.align_size = self.params().align_size();
        self.byte_size = self.frame_count * self.align_size;
        self.storage.resize(self.byte_size, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo_s16() -> BufferParams {
        BufferParams {
            format: SampleFormat::S16Le,
            channels: 2,
            frequency: 48_000,
        }
    }

    #[test]
    fn align_size_tracks_format_and_channels() {
        let mut buffer = AudioBuffer::new(stereo_s16());
        assert_eq!(buffer.align_size(), 4);
        buffer.set_format(SampleFormat::F32Le);
        assert_eq!(buffer.align_size(), 8);
        buffer.set_channels(1);
        assert_eq!(buffer.align_size(), 4);
        assert_eq!(buffer.bit_depth(), 32);
    }

    #[test]
    fn byte_size_follows_frame_count() {
        let mut buffer = AudioBuffer::new(stereo_s16());
        buffer.resize(100);
        assert_eq!(buffer.byte_size(), 400);
        assert_eq!(buffer.samples().len(), 400);
        buffer.set_channels(1);
        assert_eq!(buffer.byte_size(), 200);
        assert_eq!(buffer.samples().len(), 200);
    }

    #[test]
    fn fill_pads_short_input() {
        let mut buffer = AudioBuffer::new(stereo_s16());
        let copied = buffer.fill(2, &[1, 2, 3]);
        assert_eq!(copied, 3);
        assert_eq!(buffer.samples(), &[1, 2, 3, 0, 0, 0, 0, 0]);

        let copied = buffer.fill(1, &[9; 16]);
        assert_eq!(copied, 4);
        assert_eq!(buffer.samples(), &[9, 9, 9, 9]);
    }
}
