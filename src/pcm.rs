//! The `Pcm` façade.
//!
//! Every operation reads the mode exactly once. Native calls go to the backend
//! resolved on first use; emulated calls go to the [`EmulatedPcm`] registered under
//! the handle. Handles are explicit, so several devices can be open at once.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use tracing::debug;

use crate::config::DeviceConfig;
use crate::device::{EmulatedPcm, MmapGrant, PcmStatus};
use crate::format::{AccessMode, BlockMode, ChannelMap, PcmFormat, StreamDirection};
use crate::mixer::MixStage;
use crate::native::{NativeBackend, UnresolvedBackend};
use crate::registry::{Registry, SharedRegistry};
use crate::runtime::Runtime;
use crate::{HwParams, PcmError, PcmHandle, SwParams, WaitOutcome};

type Resolver = Box<dyn Fn() -> Box<dyn NativeBackend> + Send + Sync>;

/// Token returned by emulated `hw_params_malloc`; never dereferenced.
pub const EMULATED_PARAMS_TOKEN: HwParams = HwParams(1);

// Reads the mode once, then runs exactly one of the two arms.
macro_rules! dispatch {
    ($self:ident, $pcm:expr, |$native:ident| $native_call:expr, |$device:ident| $emulated_call:expr) => {
        if $self.runtime.mode.is_native() {
            let $native = $self.native();
            $native_call
        } else {
            let $device = $self.device($pcm)?;
            $emulated_call
        }
    };
}

/// PCM operation surface with per-call native/emulated dispatch.
pub struct Pcm {
    runtime: Runtime,
    config: DeviceConfig,
    registry: SharedRegistry,
    devices: RwLock<HashMap<PcmHandle, Arc<EmulatedPcm>>>,
    next_handle: AtomicU64,
    native: OnceCell<Box<dyn NativeBackend>>,
    resolver: Resolver,
}

impl Pcm {
    /// Façade without a native implementation.
    pub fn new(runtime: Runtime, config: DeviceConfig) -> Self {
        Self::with_native(runtime, config, || Box::new(UnresolvedBackend))
    }

    /// Façade whose native backend is built by `resolver` on first native call.
    pub fn with_native<F>(runtime: Runtime, config: DeviceConfig, resolver: F) -> Self
    where
        F: Fn() -> Box<dyn NativeBackend> + Send + Sync + 'static,
    {
        Self {
            runtime,
            config,
            registry: Registry::shared(),
            devices: RwLock::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
            native: OnceCell::new(),
            resolver: Box::new(resolver),
        }
    }

    /// Registry shared by every emulated device of this façade.
    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Defaults applied on open.
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    fn native(&self) -> &dyn NativeBackend {
        let backend = self.native.get_or_init(|| {
            debug!("resolving native backend");
            (self.resolver)()
        });
        &**backend
    }

    /// Emulated device registered under `pcm`.
    pub fn device(&self, pcm: PcmHandle) -> Result<Arc<EmulatedPcm>, PcmError> {
        self.devices
            .read()
            .get(&pcm)
            .cloned()
            .ok_or(PcmError::UnknownDevice(pcm))
    }

    /// Handles of the open emulated devices, oldest first.
    pub fn handles(&self) -> Vec<PcmHandle> {
        let mut handles: Vec<_> = self.devices.read().keys().copied().collect();
        handles.sort_by_key(|h| h.0);
        handles
    }

    /// Open a device.
    pub fn open(
        &self,
        name: &str,
        direction: StreamDirection,
        mode: i32,
    ) -> Result<PcmHandle, PcmError> {
        if self.runtime.mode.is_native() {
            return self.native().open(name, direction, mode);
        }
        debug!(name, mode, "emulated open");
        let device = EmulatedPcm::open(self.registry.clone(), direction, &self.config, &self.runtime)?;
        let handle = PcmHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.devices.write().insert(handle, Arc::new(device));
        Ok(handle)
    }

    /// Close a device. The emulated device stays registered; see [`release`](Self::release).
    pub fn close(&self, pcm: PcmHandle) -> Result<(), PcmError> {
        dispatch!(self, pcm, |native| native.close(pcm), |device| device.close())
    }

    /// Drop an emulated device and evict its buffers once no caller holds it.
    pub fn release(&self, pcm: PcmHandle) -> Result<(), PcmError> {
        self.devices
            .write()
            .remove(&pcm)
            .map(drop)
            .ok_or(PcmError::UnknownDevice(pcm))
    }

    /// Prepare for playback.
    pub fn prepare(&self, pcm: PcmHandle) -> Result<(), PcmError> {
        dispatch!(self, pcm, |native| native.prepare(pcm), |device| device.prepare())
    }

    /// Blocking mode change.
    pub fn nonblock(&self, pcm: PcmHandle, mode: BlockMode) -> Result<(), PcmError> {
        dispatch!(self, pcm, |native| native.nonblock(pcm, mode), |device| device.nonblock(mode))
    }

    /// Start playback.
    pub fn start(&self, pcm: PcmHandle) -> Result<(), PcmError> {
        dispatch!(self, pcm, |native| native.start(pcm), |device| device.start())
    }

    /// Resume playback.
    pub fn resume(&self, pcm: PcmHandle) -> Result<(), PcmError> {
        dispatch!(self, pcm, |native| native.resume(pcm), |device| device.resume())
    }

    /// Commit hardware parameters.
    pub fn hw_params(&self, pcm: PcmHandle, params: &HwParams) -> Result<(), PcmError> {
        dispatch!(self, pcm, |native| native.hw_params(pcm, params), |device| device.commit_params())
    }

    /// Fill `params` with the full configuration space.
    pub fn hw_params_any(&self, pcm: PcmHandle, params: &mut HwParams) -> Result<(), PcmError> {
        dispatch!(self, pcm, |native| native.hw_params_any(pcm, params), |device| {
            debug!(source = device.source_id().0, "hw_params_any");
            Ok(())
        })
    }

    /// Size of a hardware parameter object.
    pub fn hw_params_sizeof(&self) -> Result<usize, PcmError> {
        if self.runtime.mode.is_native() {
            return self.native().hw_params_sizeof();
        }
        Ok(self.config.params_object_size)
    }

    /// Allocate a hardware parameter object.
    pub fn hw_params_malloc(&self) -> Result<HwParams, PcmError> {
        if self.runtime.mode.is_native() {
            return self.native().hw_params_malloc();
        }
        Ok(EMULATED_PARAMS_TOKEN)
    }

    /// Free a hardware parameter object.
    pub fn hw_params_free(&self, params: HwParams) -> Result<(), PcmError> {
        if self.runtime.mode.is_native() {
            return self.native().hw_params_free(params);
        }
        Ok(())
    }

    /// Copy a hardware parameter object.
    pub fn hw_params_copy(&self, dst: &mut HwParams, src: &HwParams) -> Result<(), PcmError> {
        if self.runtime.mode.is_native() {
            return self.native().hw_params_copy(dst, src);
        }
        Ok(())
    }

    /// Commit software parameters.
    pub fn sw_params(&self, pcm: PcmHandle, params: &SwParams) -> Result<(), PcmError> {
        dispatch!(self, pcm, |native| native.sw_params(pcm, params), |device| device.commit_params())
    }

    /// Fill `params` with the current software configuration.
    pub fn sw_params_current(&self, pcm: PcmHandle, params: &mut SwParams) -> Result<(), PcmError> {
        dispatch!(self, pcm, |native| native.sw_params_current(pcm, params), |device| {
            debug!(source = device.source_id().0, "sw_params_current");
            Ok(())
        })
    }

    /// Size of a software parameter object.
    pub fn sw_params_sizeof(&self) -> Result<usize, PcmError> {
        if self.runtime.mode.is_native() {
            return self.native().sw_params_sizeof();
        }
        Ok(self.config.params_object_size)
    }

    /// Frames queued before playback starts.
    pub fn sw_params_set_start_threshold(
        &self,
        pcm: PcmHandle,
        params: &mut SwParams,
        frames: usize,
    ) -> Result<(), PcmError> {
        dispatch!(
            self,
            pcm,
            |native| native.sw_params_set_start_threshold(pcm, params, frames),
            |device| device.set_start_threshold(frames)
        )
    }

    /// Minimum free space before a wait returns.
    pub fn sw_params_set_avail_min(
        &self,
        pcm: PcmHandle,
        params: &mut SwParams,
        frames: usize,
    ) -> Result<(), PcmError> {
        dispatch!(
            self,
            pcm,
            |native| native.sw_params_set_avail_min(pcm, params, frames),
            |device| device.set_avail_min(frames)
        )
    }

    /// Access layout.
    pub fn get_access(&self, pcm: PcmHandle, params: &HwParams) -> Result<AccessMode, PcmError> {
        dispatch!(self, pcm, |native| native.get_access(pcm, params), |device| Ok(device.access()))
    }

    /// Request an access layout.
    pub fn set_access(
        &self,
        pcm: PcmHandle,
        params: &mut HwParams,
        access: AccessMode,
    ) -> Result<(), PcmError> {
        dispatch!(
            self,
            pcm,
            |native| native.set_access(pcm, params, access),
            |device| device.set_access(access)
        )
    }

    /// Sample format.
    pub fn get_format(&self, pcm: PcmHandle, params: &HwParams) -> Result<PcmFormat, PcmError> {
        dispatch!(self, pcm, |native| native.get_format(pcm, params), |device| device.format())
    }

    /// Request a sample format.
    pub fn set_format(
        &self,
        pcm: PcmHandle,
        params: &mut HwParams,
        format: PcmFormat,
    ) -> Result<(), PcmError> {
        dispatch!(
            self,
            pcm,
            |native| native.set_format(pcm, params, format),
            |device| device.set_format(format)
        )
    }

    /// Channel count.
    pub fn get_channels(&self, pcm: PcmHandle, params: &HwParams) -> Result<u32, PcmError> {
        dispatch!(self, pcm, |native| native.get_channels(pcm, params), |device| device.channels())
    }

    /// Highest channel count.
    pub fn get_channels_max(&self, pcm: PcmHandle, params: &HwParams) -> Result<u32, PcmError> {
        dispatch!(
            self,
            pcm,
            |native| native.get_channels_max(pcm, params),
            |device| device.channels_max()
        )
    }

    /// Request a channel count.
    pub fn set_channels(
        &self,
        pcm: PcmHandle,
        params: &mut HwParams,
        channels: u32,
    ) -> Result<(), PcmError> {
        dispatch!(
            self,
            pcm,
            |native| native.set_channels(pcm, params, channels),
            |device| device.set_channels(channels)
        )
    }

    /// Sample rate.
    pub fn get_rate(&self, pcm: PcmHandle, params: &HwParams) -> Result<u32, PcmError> {
        dispatch!(self, pcm, |native| native.get_rate(pcm, params), |device| device.rate())
    }

    /// Request an exact sample rate.
    pub fn set_rate(&self, pcm: PcmHandle, params: &mut HwParams, rate: u32) -> Result<(), PcmError> {
        dispatch!(self, pcm, |native| native.set_rate(pcm, params, rate), |device| device.set_rate(rate))
    }

    /// Request the nearest sample rate; `rate` receives the rate obtained.
    pub fn set_rate_near(
        &self,
        pcm: PcmHandle,
        params: &mut HwParams,
        rate: &mut u32,
    ) -> Result<(), PcmError> {
        dispatch!(
            self,
            pcm,
            |native| native.set_rate_near(pcm, params, rate),
            |device| device.set_rate_near(rate)
        )
    }

    /// Allow or forbid resampling.
    pub fn set_rate_resample(
        &self,
        pcm: PcmHandle,
        params: &mut HwParams,
        resample: bool,
    ) -> Result<(), PcmError> {
        dispatch!(
            self,
            pcm,
            |native| native.set_rate_resample(pcm, params, resample),
            |device| device.set_rate_resample(resample)
        )
    }

    /// Check whether a rate is supported.
    pub fn test_rate(&self, pcm: PcmHandle, params: &HwParams, rate: u32) -> Result<(), PcmError> {
        dispatch!(self, pcm, |native| native.test_rate(pcm, params, rate), |device| device.test_rate(rate))
    }

    /// Period size in frames.
    pub fn get_period_size(&self, pcm: PcmHandle, params: &HwParams) -> Result<usize, PcmError> {
        dispatch!(
            self,
            pcm,
            |native| native.get_period_size(pcm, params),
            |device| Ok(device.period_size())
        )
    }

    /// Shortest period duration in microseconds.
    pub fn get_period_time_min(&self, pcm: PcmHandle, params: &HwParams) -> Result<u32, PcmError> {
        dispatch!(
            self,
            pcm,
            |native| native.get_period_time_min(pcm, params),
            |device| Ok(device.period_time_min())
        )
    }

    /// Request a period size.
    pub fn set_period_size_near(
        &self,
        pcm: PcmHandle,
        params: &mut HwParams,
        frames: &mut usize,
    ) -> Result<(), PcmError> {
        dispatch!(
            self,
            pcm,
            |native| native.set_period_size_near(pcm, params, frames),
            |device| device.set_period_size_near(frames)
        )
    }

    /// Request a period count.
    pub fn set_periods_near(
        &self,
        pcm: PcmHandle,
        params: &mut HwParams,
        periods: &mut u32,
    ) -> Result<(), PcmError> {
        dispatch!(
            self,
            pcm,
            |native| native.set_periods_near(pcm, params, periods),
            |device| device.set_periods_near(periods)
        )
    }

    /// Capacity in frames.
    pub fn get_buffer_size(&self, pcm: PcmHandle, params: &HwParams) -> Result<usize, PcmError> {
        dispatch!(
            self,
            pcm,
            |native| native.get_buffer_size(pcm, params),
            |device| Ok(device.buffer_size())
        )
    }

    /// Request a capacity; zero queries the current one.
    pub fn set_buffer_size_near(
        &self,
        pcm: PcmHandle,
        params: &mut HwParams,
        frames: &mut usize,
    ) -> Result<(), PcmError> {
        dispatch!(
            self,
            pcm,
            |native| native.set_buffer_size_near(pcm, params, frames),
            |device| device.set_buffer_size_near(frames)
        )
    }

    /// Capacity in microseconds.
    pub fn get_buffer_time_max(&self, pcm: PcmHandle, params: &HwParams) -> Result<u32, PcmError> {
        dispatch!(
            self,
            pcm,
            |native| native.get_buffer_time_max(pcm, params),
            |device| device.buffer_time_max()
        )
    }

    /// Request a capacity in microseconds; zero queries the current one.
    pub fn set_buffer_time_near(
        &self,
        pcm: PcmHandle,
        params: &mut HwParams,
        micros: &mut u32,
    ) -> Result<(), PcmError> {
        dispatch!(
            self,
            pcm,
            |native| native.set_buffer_time_near(pcm, params, micros),
            |device| device.set_buffer_time_near(micros)
        )
    }

    /// Channel positions.
    pub fn get_chmap(&self, pcm: PcmHandle) -> Result<ChannelMap, PcmError> {
        dispatch!(self, pcm, |native| native.get_chmap(pcm), |device| Ok(device.channel_map()))
    }

    /// Write interleaved frames, blocking while the device is full.
    pub fn writei(&self, pcm: PcmHandle, data: &[u8], frames: usize) -> Result<usize, PcmError> {
        dispatch!(self, pcm, |native| native.writei(pcm, data, frames), |device| device.writei(data, frames))
    }

    /// Map up to `frames` frames for direct writing.
    pub fn mmap_begin(&self, pcm: PcmHandle, frames: usize) -> Result<MmapGrant, PcmError> {
        dispatch!(self, pcm, |native| native.mmap_begin(pcm, frames), |device| device.mmap_begin(frames))
    }

    /// Finalize a mapping with `frames` frames written.
    pub fn mmap_commit(&self, pcm: PcmHandle, offset: usize, frames: usize) -> Result<usize, PcmError> {
        dispatch!(
            self,
            pcm,
            |native| native.mmap_commit(pcm, offset, frames),
            |device| device.mmap_commit(offset, frames)
        )
    }

    /// Wait for free space.
    pub fn wait(&self, pcm: PcmHandle, timeout_ms: i32) -> Result<WaitOutcome, PcmError> {
        dispatch!(self, pcm, |native| native.wait(pcm, timeout_ms), |device| device.wait(timeout_ms))
    }

    /// Frames queued but not yet played.
    pub fn delay(&self, pcm: PcmHandle) -> Result<usize, PcmError> {
        dispatch!(self, pcm, |native| native.delay(pcm), |device| device.delay())
    }

    /// Free space in frames.
    pub fn avail_update(&self, pcm: PcmHandle) -> Result<usize, PcmError> {
        dispatch!(self, pcm, |native| native.avail_update(pcm), |device| device.avail_update())
    }

    /// Status of an emulated device.
    pub fn status(&self, pcm: PcmHandle) -> Result<PcmStatus, PcmError> {
        self.device(pcm)?.status()
    }

    /// Consumer stage for an emulated device.
    pub fn mix_stage(&self, pcm: PcmHandle) -> Result<MixStage, PcmError> {
        Ok(self.device(pcm)?.mix_stage())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;
    use crate::runtime::{ExitFlag, ModeFlag, VirtualClock};

    fn runtime(mode: Arc<ModeFlag>) -> Runtime {
        Runtime {
            mode,
            clock: Arc::new(VirtualClock::with_sleep_step(Duration::from_millis(1))),
            shutdown: Arc::new(ExitFlag::new()),
        }
    }

    #[test]
    fn emulated_handles_are_independent() {
        let pcm = Pcm::new(runtime(Arc::new(ModeFlag::new(false))), DeviceConfig::default());
        let a = pcm.open("default", StreamDirection::Playback, 0).unwrap();
        let b = pcm.open("default", StreamDirection::Playback, 0).unwrap();
        assert_ne!(a, b);

        let mut params = HwParams::default();
        pcm.set_rate(a, &mut params, 48_000).unwrap();
        assert_eq!(pcm.get_rate(a, &params).unwrap(), 48_000);
        assert_eq!(pcm.get_rate(b, &params).unwrap(), 44_100);
        assert_eq!(pcm.handles(), vec![a, b]);
    }

    #[test]
    fn unknown_handle_is_reported() {
        let pcm = Pcm::new(runtime(Arc::new(ModeFlag::new(false))), DeviceConfig::default());
        let err = pcm.delay(PcmHandle(42)).unwrap_err();
        assert_eq!(err, PcmError::UnknownDevice(PcmHandle(42)));
        assert_eq!(err.code(), -19);
    }

    #[test]
    fn release_evicts_device_buffers() {
        let pcm = Pcm::new(runtime(Arc::new(ModeFlag::new(false))), DeviceConfig::default());
        let handle = pcm.open("default", StreamDirection::Playback, 0).unwrap();
        assert_eq!(pcm.registry().lock().buffer_count(), 1);
        pcm.release(handle).unwrap();
        assert_eq!(pcm.registry().lock().buffer_count(), 0);
        assert!(pcm.release(handle).is_err());
    }

    #[test]
    fn emulated_params_objects_are_placeholders() {
        let pcm = Pcm::new(runtime(Arc::new(ModeFlag::new(false))), DeviceConfig::default());
        assert_eq!(pcm.hw_params_sizeof().unwrap(), 8);
        assert_eq!(pcm.sw_params_sizeof().unwrap(), 8);
        let params = pcm.hw_params_malloc().unwrap();
        assert_ne!(params, HwParams(0));
        let mut copy = HwParams::default();
        pcm.hw_params_copy(&mut copy, &params).unwrap();
        pcm.hw_params_free(params).unwrap();
    }

    #[test]
    fn native_backend_resolves_once() {
        let resolutions = Arc::new(AtomicUsize::new(0));
        let counter = resolutions.clone();
        let pcm = Pcm::with_native(
            runtime(Arc::new(ModeFlag::new(true))),
            DeviceConfig::default(),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Box::new(UnresolvedBackend)
            },
        );
        assert!(pcm.delay(PcmHandle(1)).is_err());
        assert!(pcm.avail_update(PcmHandle(1)).is_err());
        assert_eq!(resolutions.load(Ordering::SeqCst), 1);
    }
}
