//! Passthrough seam to the platform's own PCM implementation.
//!
//! Each method mirrors one façade operation with the same arguments. The default
//! bodies report [`PcmError::NativeUnavailable`] naming the platform symbol, so an
//! adapter only overrides what it can actually reach.

use crate::device::MmapGrant;
use crate::format::{AccessMode, BlockMode, ChannelMap, PcmFormat, StreamDirection};
use crate::{HwParams, PcmError, PcmHandle, SwParams, WaitOutcome};

/// Real platform implementation, resolved lazily and at most once per façade.
#[allow(unused_variables)]
pub trait NativeBackend: Send + Sync {
    /// `snd_pcm_open`.
    fn open(&self, name: &str, direction: StreamDirection, mode: i32) -> Result<PcmHandle, PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_open"))
    }
    /// `snd_pcm_close`.
    fn close(&self, pcm: PcmHandle) -> Result<(), PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_close"))
    }
    /// `snd_pcm_prepare`.
    fn prepare(&self, pcm: PcmHandle) -> Result<(), PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_prepare"))
    }
    /// `snd_pcm_nonblock`.
    fn nonblock(&self, pcm: PcmHandle, mode: BlockMode) -> Result<(), PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_nonblock"))
    }
    /// `snd_pcm_start`.
    fn start(&self, pcm: PcmHandle) -> Result<(), PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_start"))
    }
    /// `snd_pcm_resume`.
    fn resume(&self, pcm: PcmHandle) -> Result<(), PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_resume"))
    }

    /// `snd_pcm_hw_params`.
    fn hw_params(&self, pcm: PcmHandle, params: &HwParams) -> Result<(), PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_hw_params"))
    }
    /// `snd_pcm_hw_params_any`.
    fn hw_params_any(&self, pcm: PcmHandle, params: &mut HwParams) -> Result<(), PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_hw_params_any"))
    }
    /// `snd_pcm_hw_params_sizeof`.
    fn hw_params_sizeof(&self) -> Result<usize, PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_hw_params_sizeof"))
    }
    /// `snd_pcm_hw_params_malloc`.
    fn hw_params_malloc(&self) -> Result<HwParams, PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_hw_params_malloc"))
    }
    /// `snd_pcm_hw_params_free`.
    fn hw_params_free(&self, params: HwParams) -> Result<(), PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_hw_params_free"))
    }
    /// `snd_pcm_hw_params_copy`.
    fn hw_params_copy(&self, dst: &mut HwParams, src: &HwParams) -> Result<(), PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_hw_params_copy"))
    }

    /// `snd_pcm_sw_params`.
    fn sw_params(&self, pcm: PcmHandle, params: &SwParams) -> Result<(), PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_sw_params"))
    }
    /// `snd_pcm_sw_params_current`.
    fn sw_params_current(&self, pcm: PcmHandle, params: &mut SwParams) -> Result<(), PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_sw_params_current"))
    }
    /// `snd_pcm_sw_params_sizeof`.
    fn sw_params_sizeof(&self) -> Result<usize, PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_sw_params_sizeof"))
    }
    /// `snd_pcm_sw_params_set_start_threshold`.
    fn sw_params_set_start_threshold(
        &self,
        pcm: PcmHandle,
        params: &mut SwParams,
        frames: usize,
    ) -> Result<(), PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_sw_params_set_start_threshold"))
    }
    /// `snd_pcm_sw_params_set_avail_min`.
    fn sw_params_set_avail_min(
        &self,
        pcm: PcmHandle,
        params: &mut SwParams,
        frames: usize,
    ) -> Result<(), PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_sw_params_set_avail_min"))
    }

    /// `snd_pcm_hw_params_get_access`.
    fn get_access(&self, pcm: PcmHandle, params: &HwParams) -> Result<AccessMode, PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_hw_params_get_access"))
    }
    /// `snd_pcm_hw_params_set_access`.
    fn set_access(
        &self,
        pcm: PcmHandle,
        params: &mut HwParams,
        access: AccessMode,
    ) -> Result<(), PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_hw_params_set_access"))
    }
    /// `snd_pcm_hw_params_get_format`.
    fn get_format(&self, pcm: PcmHandle, params: &HwParams) -> Result<PcmFormat, PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_hw_params_get_format"))
    }
    /// `snd_pcm_hw_params_set_format`.
    fn set_format(
        &self,
        pcm: PcmHandle,
        params: &mut HwParams,
        format: PcmFormat,
    ) -> Result<(), PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_hw_params_set_format"))
    }
    /// `snd_pcm_hw_params_get_channels`.
    fn get_channels(&self, pcm: PcmHandle, params: &HwParams) -> Result<u32, PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_hw_params_get_channels"))
    }
    /// `snd_pcm_hw_params_get_channels_max`.
    fn get_channels_max(&self, pcm: PcmHandle, params: &HwParams) -> Result<u32, PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_hw_params_get_channels_max"))
    }
    /// `snd_pcm_hw_params_set_channels`.
    fn set_channels(
        &self,
        pcm: PcmHandle,
        params: &mut HwParams,
        channels: u32,
    ) -> Result<(), PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_hw_params_set_channels"))
    }
    /// `snd_pcm_hw_params_get_rate`.
    fn get_rate(&self, pcm: PcmHandle, params: &HwParams) -> Result<u32, PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_hw_params_get_rate"))
    }
    /// `snd_pcm_hw_params_set_rate`.
    fn set_rate(&self, pcm: PcmHandle, params: &mut HwParams, rate: u32) -> Result<(), PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_hw_params_set_rate"))
    }
    /// `snd_pcm_hw_params_set_rate_near`.
    fn set_rate_near(
        &self,
        pcm: PcmHandle,
        params: &mut HwParams,
        rate: &mut u32,
    ) -> Result<(), PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_hw_params_set_rate_near"))
    }
    /// `snd_pcm_hw_params_set_rate_resample`.
    fn set_rate_resample(
        &self,
        pcm: PcmHandle,
        params: &mut HwParams,
        resample: bool,
    ) -> Result<(), PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_hw_params_set_rate_resample"))
    }
    /// `snd_pcm_hw_params_test_rate`.
    fn test_rate(&self, pcm: PcmHandle, params: &HwParams, rate: u32) -> Result<(), PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_hw_params_test_rate"))
    }

    /// `snd_pcm_hw_params_get_period_size`.
    fn get_period_size(&self, pcm: PcmHandle, params: &HwParams) -> Result<usize, PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_hw_params_get_period_size"))
    }
    /// `snd_pcm_hw_params_get_period_time_min`.
    fn get_period_time_min(&self, pcm: PcmHandle, params: &HwParams) -> Result<u32, PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_hw_params_get_period_time_min"))
    }
    /// `snd_pcm_hw_params_set_period_size_near`.
    fn set_period_size_near(
        &self,
        pcm: PcmHandle,
        params: &mut HwParams,
        frames: &mut usize,
    ) -> Result<(), PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_hw_params_set_period_size_near"))
    }
    /// `snd_pcm_hw_params_set_periods_near`.
    fn set_periods_near(
        &self,
        pcm: PcmHandle,
        params: &mut HwParams,
        periods: &mut u32,
    ) -> Result<(), PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_hw_params_set_periods_near"))
    }
    /// `snd_pcm_hw_params_get_buffer_size`.
    fn get_buffer_size(&self, pcm: PcmHandle, params: &HwParams) -> Result<usize, PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_hw_params_get_buffer_size"))
    }
    /// `snd_pcm_hw_params_set_buffer_size_near`.
    fn set_buffer_size_near(
        &self,
        pcm: PcmHandle,
        params: &mut HwParams,
        frames: &mut usize,
    ) -> Result<(), PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_hw_params_set_buffer_size_near"))
    }
    /// `snd_pcm_hw_params_get_buffer_time_max`.
    fn get_buffer_time_max(&self, pcm: PcmHandle, params: &HwParams) -> Result<u32, PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_hw_params_get_buffer_time_max"))
    }
    /// `snd_pcm_hw_params_set_buffer_time_near`.
    fn set_buffer_time_near(
        &self,
        pcm: PcmHandle,
        params: &mut HwParams,
        micros: &mut u32,
    ) -> Result<(), PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_hw_params_set_buffer_time_near"))
    }
    /// `snd_pcm_get_chmap`.
    fn get_chmap(&self, pcm: PcmHandle) -> Result<ChannelMap, PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_get_chmap"))
    }

    /// `snd_pcm_writei`.
    fn writei(&self, pcm: PcmHandle, data: &[u8], frames: usize) -> Result<usize, PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_writei"))
    }
    /// `snd_pcm_mmap_begin`.
    fn mmap_begin(&self, pcm: PcmHandle, frames: usize) -> Result<MmapGrant, PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_mmap_begin"))
    }
    /// `snd_pcm_mmap_commit`.
    fn mmap_commit(&self, pcm: PcmHandle, offset: usize, frames: usize) -> Result<usize, PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_mmap_commit"))
    }
    /// `snd_pcm_wait`.
    fn wait(&self, pcm: PcmHandle, timeout_ms: i32) -> Result<WaitOutcome, PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_wait"))
    }
    /// `snd_pcm_delay`.
    fn delay(&self, pcm: PcmHandle) -> Result<usize, PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_delay"))
    }
    /// `snd_pcm_avail_update`.
    fn avail_update(&self, pcm: PcmHandle) -> Result<usize, PcmError> {
        Err(PcmError::NativeUnavailable("snd_pcm_avail_update"))
    }
}

/// Backend used when no platform library was supplied; every call is unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnresolvedBackend;

impl NativeBackend for UnresolvedBackend {}
