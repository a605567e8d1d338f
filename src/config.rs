//! Device defaults and their environment overrides.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::buffer::BufferParams;
use crate::format::SampleFormat;

/// Environment variable overriding [`DeviceConfig::buffer_size`].
pub const ENV_BUFFER_SIZE: &str = "PCM_KIT_BUFFER_SIZE";
/// Environment variable overriding [`DeviceConfig::periods`].
pub const ENV_PERIODS: &str = "PCM_KIT_PERIODS";
/// Environment variable overriding [`DeviceConfig::poll_interval`], in microseconds.
pub const ENV_POLL_INTERVAL_US: &str = "PCM_KIT_POLL_INTERVAL_US";

/// Defaults applied to every device a façade opens.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceConfig {
    /// Initial capacity in frames.
    pub buffer_size: usize,
    /// Initial period divisor.
    pub periods: u32,
    /// Sleep between two checks of a blocking poll loop.
    pub poll_interval: Duration,
    /// Parameters of the placeholder buffer queued on open.
    pub placeholder: BufferParams,
    /// Reported size of opaque hardware/software parameter objects.
    pub params_object_size: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            buffer_size: 4096,
            periods: 2,
            poll_interval: Duration::from_millis(1),
            placeholder: BufferParams {
                format: SampleFormat::S16Le,
                channels: 2,
                frequency: 44_100,
            },
            params_object_size: 8,
        }
    }
}

impl DeviceConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(frames) = read_var::<usize>(ENV_BUFFER_SIZE) {
            config.buffer_size = frames;
        }
        if let Some(periods) = read_var::<u32>(ENV_PERIODS).filter(|p| *p > 0) {
            config.periods = periods;
        }
        if let Some(micros) = read_var::<u64>(ENV_POLL_INTERVAL_US) {
            config.poll_interval = Duration::from_micros(micros);
        }
        config
    }
}

fn read_var<T: FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = name, value = %raw, "ignoring unparsable override");
            None
        }
    }
}
