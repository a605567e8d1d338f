//! C ABI over the [`Pcm`] façade.
//!
//! Functions return a non-negative value on success and [`PcmError::code`] on
//! failure. A null façade pointer yields -22.

use std::ffi::{CStr, CString, c_char};
use std::ptr;
use std::slice;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::config::DeviceConfig;
use crate::device::ChannelArea;
use crate::format::{BlockMode, PcmFormat, StreamDirection};
use crate::pcm::Pcm;
use crate::runtime::{Runtime, process_exit, process_mode};
use crate::{HwParams, PcmError, PcmHandle, SwParams, WaitOutcome, init_tracing, pop_log};

const EINVAL: i64 = -22;

static LOG_CACHE: Lazy<Mutex<Option<CString>>> = Lazy::new(|| Mutex::new(None));

fn status<T>(result: Result<T, PcmError>, value: impl FnOnce(T) -> i64) -> i64 {
    match result {
        Ok(v) => value(v),
        Err(err) => err.code() as i64,
    }
}

/// Create a façade driven by the process-wide flags and environment config.
#[unsafe(no_mangle)]
pub extern "C" fn pcm_kit_create() -> *mut Pcm {
    init_tracing();
    Box::into_raw(Box::new(Pcm::new(Runtime::process(), DeviceConfig::from_env())))
}

/// Destroy a façade and every device it opened.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pcm_kit_destroy(pcm: *mut Pcm) {
    if !pcm.is_null() {
        unsafe {
            drop(Box::from_raw(pcm));
        }
    }
}

/// Route later calls to the native implementation (`true`) or the emulation.
#[unsafe(no_mangle)]
pub extern "C" fn pcm_kit_set_native(native: bool) {
    process_mode().set_native(native);
}

/// Signal process termination; blocked writes and waits return.
#[unsafe(no_mangle)]
pub extern "C" fn pcm_kit_set_exiting() {
    process_exit().raise();
}

/// Open a device. Returns the handle, or a negative code.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pcm_kit_open(
    pcm: *const Pcm,
    name: *const c_char,
    stream: u32,
    mode: i32,
) -> i64 {
    let Some(pcm) = (unsafe { pcm.as_ref() }) else {
        return EINVAL;
    };
    let name = if name.is_null() {
        String::from("default")
    } else {
        unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned()
    };
    let Some(direction) = StreamDirection::from_code(stream) else {
        return EINVAL;
    };
    status(pcm.open(&name, direction, mode), |handle| handle.0 as i64)
}

/// Close a device.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pcm_kit_close(pcm: *const Pcm, handle: u64) -> i64 {
    let Some(pcm) = (unsafe { pcm.as_ref() }) else {
        return EINVAL;
    };
    status(pcm.close(PcmHandle(handle)), |_| 0)
}

/// Change the blocking mode.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pcm_kit_nonblock(pcm: *const Pcm, handle: u64, mode: i32) -> i64 {
    let Some(pcm) = (unsafe { pcm.as_ref() }) else {
        return EINVAL;
    };
    status(pcm.nonblock(PcmHandle(handle), BlockMode::from(mode)), |_| 0)
}

/// Configure format, channels and rate, then commit hardware and software
/// parameters.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pcm_kit_configure(
    pcm: *const Pcm,
    handle: u64,
    format: i32,
    channels: u32,
    rate: u32,
) -> i64 {
    let Some(pcm) = (unsafe { pcm.as_ref() }) else {
        return EINVAL;
    };
    let handle = PcmHandle(handle);
    let mut hw = HwParams::default();
    let mut rate = rate;
    let result = pcm
        .hw_params_any(handle, &mut hw)
        .and_then(|_| pcm.set_format(handle, &mut hw, PcmFormat(format)))
        .and_then(|_| pcm.set_channels(handle, &mut hw, channels))
        .and_then(|_| pcm.set_rate_near(handle, &mut hw, &mut rate))
        .and_then(|_| pcm.hw_params(handle, &hw))
        .and_then(|_| pcm.sw_params(handle, &SwParams::default()));
    status(result, |_| rate as i64)
}

/// Request a capacity in frames. Returns the capacity obtained.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pcm_kit_set_buffer_size(pcm: *const Pcm, handle: u64, frames: u64) -> i64 {
    let Some(pcm) = (unsafe { pcm.as_ref() }) else {
        return EINVAL;
    };
    let mut frames = frames as usize;
    let result = pcm.set_buffer_size_near(PcmHandle(handle), &mut HwParams::default(), &mut frames);
    status(result, |_| frames as i64)
}

/// Write `frames` interleaved frames from `len` bytes at `data`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pcm_kit_writei(
    pcm: *const Pcm,
    handle: u64,
    data: *const u8,
    len: usize,
    frames: u64,
) -> i64 {
    let Some(pcm) = (unsafe { pcm.as_ref() }) else {
        return EINVAL;
    };
    let bytes = if data.is_null() || len == 0 {
        &[][..]
    } else {
        unsafe { slice::from_raw_parts(data, len) }
    };
    status(pcm.writei(PcmHandle(handle), bytes, frames as usize), |n| n as i64)
}

/// Map writable storage. `frames` carries the request in and the grant out;
/// up to `max_areas` channel descriptors are written to `areas`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pcm_kit_mmap_begin(
    pcm: *const Pcm,
    handle: u64,
    areas: *mut ChannelArea,
    max_areas: u32,
    offset: *mut u64,
    frames: *mut u64,
) -> i64 {
    let Some(pcm) = (unsafe { pcm.as_ref() }) else {
        return EINVAL;
    };
    let Some(frames) = (unsafe { frames.as_mut() }) else {
        return EINVAL;
    };
    let grant = match pcm.mmap_begin(PcmHandle(handle), *frames as usize) {
        Ok(grant) => grant,
        Err(err) => return err.code() as i64,
    };
    *frames = grant.frames as u64;
    if let Some(offset) = unsafe { offset.as_mut() } {
        *offset = grant.offset as u64;
    }
    if !areas.is_null() {
        let count = grant.areas.len().min(max_areas as usize);
        unsafe {
            ptr::copy_nonoverlapping(grant.areas.as_ptr(), areas, count);
        }
    }
    0
}

/// Finalize the last mapping. Returns `frames`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pcm_kit_mmap_commit(
    pcm: *const Pcm,
    handle: u64,
    offset: u64,
    frames: u64,
) -> i64 {
    let Some(pcm) = (unsafe { pcm.as_ref() }) else {
        return EINVAL;
    };
    status(
        pcm.mmap_commit(PcmHandle(handle), offset as usize, frames as usize),
        |n| n as i64,
    )
}

/// Wait for free space. Returns 1 when ready, 0 on timeout.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pcm_kit_wait(pcm: *const Pcm, handle: u64, timeout_ms: i32) -> i64 {
    let Some(pcm) = (unsafe { pcm.as_ref() }) else {
        return EINVAL;
    };
    status(pcm.wait(PcmHandle(handle), timeout_ms), |outcome| match outcome {
        WaitOutcome::Ready => 1,
        WaitOutcome::Timeout => 0,
    })
}

/// Frames queued but not yet played.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pcm_kit_delay(pcm: *const Pcm, handle: u64) -> i64 {
    let Some(pcm) = (unsafe { pcm.as_ref() }) else {
        return EINVAL;
    };
    status(pcm.delay(PcmHandle(handle)), |n| n as i64)
}

/// Free space in frames.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pcm_kit_avail_update(pcm: *const Pcm, handle: u64) -> i64 {
    let Some(pcm) = (unsafe { pcm.as_ref() }) else {
        return EINVAL;
    };
    status(pcm.avail_update(PcmHandle(handle)), |n| n as i64)
}

/// Pop the next device event. Returns `NULL` when no events remain; the string
/// stays valid until the next call.
#[unsafe(no_mangle)]
pub extern "C" fn pcm_kit_pop_log() -> *const c_char {
    if let Some(message) = pop_log() {
        let mut cache = LOG_CACHE.lock();
        *cache = Some(CString::new(message).unwrap_or_default());
        cache.as_ref().map(|c| c.as_ptr()).unwrap_or(ptr::null())
    } else {
        ptr::null()
    }
}
