#![deny(missing_docs)]

//! Deterministic virtual playback device for runtime interception layers.
//!
//! A [`Pcm`] façade answers the platform PCM operation set. In native mode every
//! call is forwarded unchanged to a lazily resolved [`NativeBackend`]; in emulated
//! mode an [`EmulatedPcm`] answers from memory instead. Emulated devices queue
//! interleaved [`AudioBuffer`]s on a registry [`Source`], and an external consumer
//! such as [`MixStage`] drains them at a pace set by the process clock rather than
//! by real hardware, which keeps audio timing reproducible between runs.

use std::collections::VecDeque;
use std::sync::Once;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

pub mod buffer;
pub mod config;
/// Developer-facing status API and console.
pub mod control;
pub mod device;
pub mod ffi;
pub mod format;
pub mod latency;
pub mod mixer;
pub mod native;
pub mod pcm;
pub mod registry;
pub mod runtime;
pub mod source;


pub use buffer::{AudioBuffer, BufferId, BufferParams};
pub use config::DeviceConfig;
pub use device::{ChannelArea, EmulatedPcm, MmapGrant, PcmStatus};
pub use format::{
    AccessMode, BlockMode, ChannelMap, ChannelPosition, PcmFormat, SampleFormat, StreamDirection,
};
pub use latency::QueueMetrics;
pub use mixer::MixStage;
pub use native::{NativeBackend, UnresolvedBackend};
pub use pcm::Pcm;
pub use registry::{Registry, SharedRegistry};
pub use runtime::{Clock, ModeSource, Runtime, ShutdownSignal, VirtualClock};
pub use source::{Source, SourceId, SourceKind, SourceState};

const LOG_CAPACITY: usize = 256;

static LOG_BUFFER: Lazy<Mutex<VecDeque<String>>> =
    Lazy::new(|| Mutex::new(VecDeque::with_capacity(64)));
static TRACING_INIT: Once = Once::new();

/// Install the fmt subscriber once per process.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt::try_init();
    });
}

pub(crate) fn push_log(line: impl Into<String>) {
    let mut guard = LOG_BUFFER.lock();
    guard.push_back(line.into());
    while guard.len() > LOG_CAPACITY {
        guard.pop_front();
    }
}

/// Take the oldest device event, if any.
pub fn pop_log() -> Option<String> {
    LOG_BUFFER.lock().pop_front()
}

/// Opaque handle to an opened device.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PcmHandle(pub u64);

impl std::fmt::Display for PcmHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque hardware parameter object. Emulated devices ignore its contents.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HwParams(pub u64);

/// Opaque software parameter object. Emulated devices ignore its contents.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SwParams(pub u64);

/// Result of waiting for free space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Space is available.
    Ready,
    /// The timeout elapsed or the process is exiting.
    Timeout,
}

/// Error enumeration surfaced across the public API.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PcmError {
    /// Only playback streams are emulated.
    #[error("unsupported stream direction {0:?}")]
    UnsupportedStreamDirection(StreamDirection),
    /// Format outside U8, S16_LE, S32_LE and FLOAT_LE.
    #[error("unsupported audio format {0}")]
    UnsupportedFormat(PcmFormat),
    /// No reference buffer to take parameters from.
    #[error("empty queue, cannot guess buffer parameters")]
    EmptyQueueCannotInferParameters,
    /// Handle not produced by this façade.
    #[error("unknown device handle: {0}")]
    UnknownDevice(PcmHandle),
    /// Source id not registered.
    #[error("unknown source id: {0}")]
    UnknownSource(u32),
    /// Native implementation reported a failure code.
    #[error("native {op} failed with code {code}")]
    Native {
        /// Operation name.
        op: &'static str,
        /// Negative platform return code.
        code: i32,
    },
    /// No native implementation could be resolved for the operation.
    #[error("native {0} is unavailable")]
    NativeUnavailable(&'static str),
}

impl PcmError {
    /// Negative return code used at the C boundary.
    pub fn code(&self) -> i32 {
        match self {
            PcmError::UnsupportedStreamDirection(_)
            | PcmError::UnsupportedFormat(_)
            | PcmError::EmptyQueueCannotInferParameters => -1,
            PcmError::UnknownDevice(_) | PcmError::UnknownSource(_) => -19,
            PcmError::Native { code, .. } => *code,
            PcmError::NativeUnavailable(_) => -38,
        }
    }
}
