//! Sample format, access and stream vocabulary shared by the device and the façade.
//!
//! Raw values follow the platform PCM API numbering so that codes handed over the
//! C boundary can be forwarded to a native backend untouched.

use std::fmt;

use crate::PcmError;

/// Raw platform sample format code.
///
/// Only four codes are backed by the emulated device (see [`SampleFormat`]); every
/// other value is representable so that it can be rejected or passed through.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PcmFormat(pub i32);

impl PcmFormat {
    /// Unknown / unset format.
    pub const UNKNOWN: Self = Self(-1);
    /// Signed 8 bit.
    pub const S8: Self = Self(0);
    /// Unsigned 8 bit.
    pub const U8: Self = Self(1);
    /// Signed 16 bit little endian.
    pub const S16_LE: Self = Self(2);
    /// Signed 16 bit big endian.
    pub const S16_BE: Self = Self(3);
    /// Signed 24 bit little endian (in 32 bit container).
    pub const S24_LE: Self = Self(6);
    /// Signed 32 bit little endian.
    pub const S32_LE: Self = Self(10);
    /// Signed 32 bit big endian.
    pub const S32_BE: Self = Self(11);
    /// 32 bit float little endian.
    pub const FLOAT_LE: Self = Self(14);
    /// 64 bit float little endian.
    pub const FLOAT64_LE: Self = Self(16);
    /// Mu-law.
    pub const MU_LAW: Self = Self(20);
    /// A-law.
    pub const A_LAW: Self = Self(21);
}

impl fmt::Display for PcmFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match SampleFormat::try_from(*self) {
            Ok(format) => write!(f, "{format}"),
            Err(_) => write!(f, "format#{}", self.0),
        }
    }
}

/// Sample formats the emulated device can store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// Unsigned 8 bit, silence at 128.
    U8,
    /// Signed 16 bit little endian.
    #[default]
    S16Le,
    /// Signed 32 bit little endian.
    S32Le,
    /// IEEE 754 32 bit float little endian.
    F32Le,
}

impl SampleFormat {
    /// Bytes occupied by one sample of one channel.
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::S16Le => 2,
            SampleFormat::S32Le | SampleFormat::F32Le => 4,
        }
    }

    /// Bits occupied by one sample of one channel.
    pub const fn bits_per_sample(self) -> u32 {
        self.bytes_per_sample() as u32 * 8
    }

    /// Raw platform code for this format.
    pub const fn code(self) -> PcmFormat {
        match self {
            SampleFormat::U8 => PcmFormat::U8,
            SampleFormat::S16Le => PcmFormat::S16_LE,
            SampleFormat::S32Le => PcmFormat::S32_LE,
            SampleFormat::F32Le => PcmFormat::FLOAT_LE,
        }
    }

    /// Decode one sample to the `[-1.0, 1.0)` range.
    ///
    /// `bytes` must hold at least [`bytes_per_sample`](Self::bytes_per_sample) bytes.
    pub fn decode(self, bytes: &[u8]) -> f32 {
        match self {
            SampleFormat::U8 => (bytes[0] as f32 - 128.0) / 128.0,
            SampleFormat::S16Le => i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / 32_768.0,
            SampleFormat::S32Le => {
                i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32
                    / 2_147_483_648.0
            }
            SampleFormat::F32Le => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    }
}

impl TryFrom<PcmFormat> for SampleFormat {
    type Error = PcmError;

    fn try_from(value: PcmFormat) -> Result<Self, Self::Error> {
        match value {
            PcmFormat::U8 => Ok(SampleFormat::U8),
            PcmFormat::S16_LE => Ok(SampleFormat::S16Le),
            PcmFormat::S32_LE => Ok(SampleFormat::S32Le),
            PcmFormat::FLOAT_LE => Ok(SampleFormat::F32Le),
            other => Err(PcmError::UnsupportedFormat(other)),
        }
    }
}

impl From<SampleFormat> for PcmFormat {
    fn from(value: SampleFormat) -> Self {
        value.code()
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SampleFormat::U8 => "U8",
            SampleFormat::S16Le => "S16_LE",
            SampleFormat::S32Le => "S32_LE",
            SampleFormat::F32Le => "FLOAT_LE",
        };
        f.write_str(name)
    }
}

/// Raw platform access mode code.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AccessMode(pub u32);

impl AccessMode {
    /// Zero-copy interleaved access.
    pub const MMAP_INTERLEAVED: Self = Self(0);
    /// Zero-copy non-interleaved access.
    pub const MMAP_NONINTERLEAVED: Self = Self(1);
    /// Zero-copy complex layout.
    pub const MMAP_COMPLEX: Self = Self(2);
    /// Read/write interleaved access.
    pub const RW_INTERLEAVED: Self = Self(3);
    /// Read/write non-interleaved access.
    pub const RW_NONINTERLEAVED: Self = Self(4);

    /// Whether the emulated device models this layout.
    pub fn is_interleaved(self) -> bool {
        matches!(self, Self::MMAP_INTERLEAVED | Self::RW_INTERLEAVED)
    }
}

/// Direction requested when opening a stream.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamDirection {
    /// Application produces samples.
    Playback = 0,
    /// Application consumes samples.
    Capture = 1,
}

impl StreamDirection {
    /// Direction for a raw platform code.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(StreamDirection::Playback),
            1 => Some(StreamDirection::Capture),
            _ => None,
        }
    }
}

/// Blocking behaviour requested through `nonblock`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockMode {
    /// Calls may block.
    Block,
    /// Calls return immediately.
    NonBlock,
    /// Abort pending operations.
    Abort,
}

impl From<i32> for BlockMode {
    fn from(value: i32) -> Self {
        match value {
            0 => BlockMode::Block,
            1 => BlockMode::NonBlock,
            _ => BlockMode::Abort,
        }
    }
}

/// Speaker position of one channel in a channel map.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelPosition {
    /// Unspecified position.
    Unknown = 0,
    /// Front left.
    FrontLeft = 3,
    /// Front right.
    FrontRight = 4,
}

/// Channel map reported by the device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelMap {
    /// Position of each channel, in interleave order.
    pub positions: Vec<ChannelPosition>,
}

impl ChannelMap {
    /// Plain front-left / front-right stereo.
    pub fn stereo() -> Self {
        Self {
            positions: vec![ChannelPosition::FrontLeft, ChannelPosition::FrontRight],
        }
    }

    /// Number of channels described.
    pub fn channels(&self) -> usize {
        self.positions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_four_formats_are_backed() {
        for code in [PcmFormat::U8, PcmFormat::S16_LE, PcmFormat::S32_LE, PcmFormat::FLOAT_LE] {
            let format = SampleFormat::try_from(code).unwrap();
            assert_eq!(format.code(), code);
        }
        for code in [PcmFormat::S8, PcmFormat::S24_LE, PcmFormat::MU_LAW, PcmFormat::UNKNOWN] {
            assert!(matches!(
                SampleFormat::try_from(code),
                Err(PcmError::UnsupportedFormat(c)) if c == code
            ));
        }
    }

    #[test]
    fn decode_covers_full_scale() {
        assert_eq!(SampleFormat::U8.decode(&[128]), 0.0);
        assert_eq!(SampleFormat::U8.decode(&[0]), -1.0);
        assert_eq!(SampleFormat::S16Le.decode(&i16::MIN.to_le_bytes()), -1.0);
        assert_eq!(SampleFormat::S32Le.decode(&0i32.to_le_bytes()), 0.0);
        assert_eq!(SampleFormat::F32Le.decode(&0.25f32.to_le_bytes()), 0.25);
    }

    #[test]
    fn interleaved_access_modes() {
        assert!(AccessMode::RW_INTERLEAVED.is_interleaved());
        assert!(AccessMode::MMAP_INTERLEAVED.is_interleaved());
        assert!(!AccessMode::RW_NONINTERLEAVED.is_interleaved());
        assert!(!AccessMode::MMAP_COMPLEX.is_interleaved());
    }
}
