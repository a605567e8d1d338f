use crate::device::PcmStatus;
use crate::pcm::Pcm;
use crate::{HwParams, PcmHandle};

/// Status snapshot of one emulated device, if it is open.
pub fn get_status(pcm: &Pcm, handle: PcmHandle) -> Option<PcmStatus> {
    pcm.status(handle).ok()
}

/// Status snapshots of every open emulated device.
pub fn list(pcm: &Pcm) -> Vec<(PcmHandle, PcmStatus)> {
    pcm.handles()
        .into_iter()
        .filter_map(|handle| Some((handle, get_status(pcm, handle)?)))
        .collect()
}

/// Change the capacity of a device. Returns the capacity now in effect.
pub fn set_buffer_size(pcm: &Pcm, handle: PcmHandle, frames: usize) -> Option<usize> {
    let mut frames = frames.max(1);
    pcm.set_buffer_size_near(handle, &mut HwParams::default(), &mut frames)
        .ok()?;
    Some(frames)
}
