use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use dasp_frame::{Frame, Stereo};
use dasp_signal::Signal;
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::config::DeviceConfig;
use crate::control::api;
use crate::device::PcmStatus;
use crate::format::{PcmFormat, StreamDirection};
use crate::pcm::Pcm;
use crate::runtime::{Clock, ExitFlag, Runtime, ShutdownSignal, VirtualClock};
use crate::{HwParams, PcmError, PcmHandle, SwParams};

/// Demo session parameters.
#[derive(Clone, Debug)]
pub struct SessionOptions {
    /// Sample rate of the tone.
    pub rate: u32,
    /// Interleaved channels, each carrying the same tone.
    pub channels: u32,
    /// Tone frequency in Hz.
    pub tone_hz: f64,
    /// Frames per producer write and per consumer render.
    pub block_frames: usize,
    /// Device capacity in frames.
    pub buffer_size: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            rate: 48_000,
            channels: 2,
            tone_hz: 440.0,
            block_frames: 512,
            buffer_size: 4096,
        }
    }
}

/// Snapshot of a running session.
#[derive(Clone, Debug)]
pub struct SessionStatus {
    /// Device snapshot.
    pub device: PcmStatus,
    /// RMS of the consumer's last block.
    pub rms: f32,
    /// Frames the consumer has taken so far.
    pub frames_mixed: u64,
    /// Whether the consumer is paused.
    pub paused: bool,
    /// Virtual clock position.
    pub clock: Duration,
}

#[derive(Default)]
struct ConsumerLevels {
    rms: f32,
    frames_mixed: u64,
}

/// A sine producer writing through `writei` and a [`crate::MixStage`] consumer
/// advancing a virtual clock by one block per render.
pub struct DemoSession {
    pcm: Arc<Pcm>,
    handle: PcmHandle,
    clock: Arc<VirtualClock>,
    exit: Arc<ExitFlag>,
    paused: Arc<AtomicBool>,
    levels: Arc<Mutex<ConsumerLevels>>,
    threads: Vec<JoinHandle<()>>,
}

impl DemoSession {
    /// Open and configure a device, then spawn both threads.
    pub fn start(options: SessionOptions) -> Result<Self, PcmError> {
        let clock = Arc::new(VirtualClock::new());
        let exit = Arc::new(ExitFlag::new());
        let runtime = Runtime::emulated(clock.clone(), exit.clone());
        let config = DeviceConfig {
            buffer_size: options.buffer_size,
            ..DeviceConfig::from_env()
        };
        let pcm = Arc::new(Pcm::new(runtime, config));
        let handle = pcm.open("pcmctl", StreamDirection::Playback, 0)?;

        let mut hw = HwParams::default();
        let mut rate = options.rate;
        pcm.hw_params_any(handle, &mut hw)?;
        pcm.set_format(handle, &mut hw, PcmFormat::S16_LE)?;
        pcm.set_channels(handle, &mut hw, options.channels)?;
        pcm.set_rate_near(handle, &mut hw, &mut rate)?;
        pcm.hw_params(handle, &hw)?;
        pcm.sw_params(handle, &SwParams::default())?;

        let mut session = Self {
            pcm,
            handle,
            clock,
            exit,
            paused: Arc::new(AtomicBool::new(false)),
            levels: Arc::new(Mutex::new(ConsumerLevels::default())),
            threads: Vec::new(),
        };
        session.spawn_producer(&options);
        session.spawn_consumer(&options)?;
        debug!(handle = handle.0, "demo session started");
        Ok(session)
    }

    fn spawn_producer(&mut self, options: &SessionOptions) {
        let pcm = self.pcm.clone();
        let exit = self.exit.clone();
        let handle = self.handle;
        let block = options.block_frames;
        let channels = options.channels as usize;
        let mut tone = dasp_signal::rate(options.rate as f64)
            .const_hz(options.tone_hz)
            .sine();

        self.threads.push(thread::spawn(move || {
            let mut bytes = Vec::with_capacity(block * channels * 2);
            while !exit.is_exiting() {
                bytes.clear();
                for _ in 0..block {
                    let sample = (tone.next() * 0.25 * i16::MAX as f64) as i16;
                    for _ in 0..channels {
                        bytes.extend_from_slice(&sample.to_le_bytes());
                    }
                }
                match pcm.writei(handle, &bytes, block) {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(err) => {
                        error!(%err, "demo producer stopped");
                        break;
                    }
                }
            }
        }));
    }

    fn spawn_consumer(&mut self, options: &SessionOptions) -> Result<(), PcmError> {
        let mut stage = self.pcm.mix_stage(self.handle)?;
        let clock = self.clock.clone();
        let exit = self.exit.clone();
        let paused = self.paused.clone();
        let levels = self.levels.clone();
        let block = options.block_frames.max(1);
        let period = Duration::from_secs_f64(block as f64 / options.rate.max(1) as f64);

        self.threads.push(thread::spawn(move || {
            let mut out = vec![Stereo::<f32>::EQUILIBRIUM; block];
            while !exit.is_exiting() {
                if !paused.load(Ordering::Relaxed) {
                    stage.render(&mut out);
                    clock.advance(period);
                    let mut levels = levels.lock();
                    levels.rms = stage.rms();
                    levels.frames_mixed = stage.frames_mixed();
                }
                thread::sleep(period);
            }
        }));
        Ok(())
    }

    /// Façade the session writes through.
    pub fn pcm(&self) -> &Arc<Pcm> {
        &self.pcm
    }

    /// Handle of the session's device.
    pub fn handle(&self) -> PcmHandle {
        self.handle
    }

    /// Current snapshot, or `None` once the device is gone.
    pub fn status(&self) -> Option<SessionStatus> {
        let device = api::get_status(&self.pcm, self.handle)?;
        let levels = self.levels.lock();
        Some(SessionStatus {
            device,
            rms: levels.rms,
            frames_mixed: levels.frames_mixed,
            paused: self.paused.load(Ordering::Relaxed),
            clock: self.clock.now(),
        })
    }

    /// Pause or resume the consumer. Returns the new paused state.
    pub fn toggle_pause(&self) -> bool {
        !self.paused.fetch_xor(true, Ordering::Relaxed)
    }

    /// Change the device capacity.
    pub fn resize(&self, frames: usize) -> Option<usize> {
        api::set_buffer_size(&self.pcm, self.handle, frames)
    }

    /// Stop both threads and wait for them.
    pub fn stop(&mut self) {
        self.exit.raise();
        for thread in self.threads.drain(..) {
            let _ = thread.join();
        }
    }
}

impl Drop for DemoSession {
    fn drop(&mut self) {
        self.stop();
    }
}
