//! Emulated playback device.
//!
//! [`EmulatedPcm`] answers every operation from memory: buffers are queued on a
//! registry source and drained by an external consumer (see [`crate::mixer`]).
//! It never consults the native/emulated mode; the façade in [`crate::pcm`] does.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::buffer::{AudioBuffer, BufferId};
use crate::config::DeviceConfig;
use crate::format::{AccessMode, BlockMode, ChannelMap, PcmFormat, SampleFormat, StreamDirection};
use crate::latency::{QueueMetrics, frames_to_ms};
use crate::mixer::MixStage;
use crate::registry::{Registry, SharedRegistry};
use crate::runtime::{Clock, Runtime, ShutdownSignal};
use crate::source::{SourceId, SourceKind, SourceState};
use crate::{PcmError, WaitOutcome, push_log};

/// Channels reported by the max-channels query.
pub const MAX_CHANNELS: u32 = 2;

/// Location of one channel inside a zero-copy mapping.
///
/// Layout matches the platform's channel area descriptor.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelArea {
    /// Base address of the mapped storage.
    pub addr: *mut u8,
    /// Bit offset of this channel's first sample within a frame.
    pub first: u32,
    /// Bits between two successive samples of this channel.
    pub step: u32,
}

/// Storage handed out by [`EmulatedPcm::mmap_begin`].
///
/// The buffer is already queued. Area addresses stay valid until the next
/// [`EmulatedPcm::mmap_commit`] or until the consumer processes the buffer and a
/// later write recycles it.
#[derive(Debug)]
pub struct MmapGrant {
    /// Buffer backing the mapping; `None` for mappings made by a native backend.
    pub buffer: Option<BufferId>,
    /// Frame offset of the mapping inside the buffer; always 0.
    pub offset: usize,
    /// Frames granted, never more than were available.
    pub frames: usize,
    /// One descriptor per channel.
    pub areas: Vec<ChannelArea>,
}

/// Snapshot of a device for control surfaces.
#[derive(Clone, Debug)]
pub struct PcmStatus {
    /// Play state.
    pub state: SourceState,
    /// Reference buffer sample format.
    pub format: SampleFormat,
    /// Reference buffer channel count.
    pub channels: u32,
    /// Reference buffer sample rate.
    pub rate: u32,
    /// Capacity in frames.
    pub buffer_size: usize,
    /// Period divisor.
    pub periods: u32,
    /// Capacity divided by periods.
    pub period_size: usize,
    /// Buffers queued, processed ones included.
    pub queued_buffers: usize,
    /// Buffers already handed to the consumer.
    pub processed_buffers: usize,
    /// Frames queued but not yet consumed.
    pub latency_frames: usize,
    /// Free space in frames.
    pub available_frames: usize,
    /// `latency_frames` expressed in milliseconds.
    pub latency_ms: f32,
}

/// In-memory playback device.
pub struct EmulatedPcm {
    registry: SharedRegistry,
    source: SourceId,
    capacity: AtomicUsize,
    periods: AtomicU32,
    access: AtomicU32,
    pending_mapping: Mutex<Option<BufferId>>,
    clock: Arc<dyn Clock>,
    shutdown: Arc<dyn ShutdownSignal>,
    poll_interval: Duration,
}

impl EmulatedPcm {
    /// Open a playback device on `registry`.
    ///
    /// Queues one empty placeholder buffer whose parameters the setters edit and
    /// later buffers inherit.
    pub fn open(
        registry: SharedRegistry,
        direction: StreamDirection,
        config: &DeviceConfig,
        runtime: &Runtime,
    ) -> Result<Self, PcmError> {
        debug!(?direction, "open");
        if direction != StreamDirection::Playback {
            error!(?direction, "unsupported stream direction");
            return Err(PcmError::UnsupportedStreamDirection(direction));
        }

        let source = {
            let mut guard = registry.lock();
            let placeholder = guard.create_buffer(config.placeholder);
            let source = guard.create_source(SourceKind::Streaming);
            guard.require_source_mut(source)?.push(placeholder);
            source
        };
        push_log(format!("playback device opened (source {})", source.0));

        Ok(Self {
            registry,
            source,
            capacity: AtomicUsize::new(config.buffer_size),
            periods: AtomicU32::new(config.periods.max(1)),
            access: AtomicU32::new(AccessMode::RW_INTERLEAVED.0),
            pending_mapping: Mutex::new(None),
            clock: runtime.clock.clone(),
            shutdown: runtime.shutdown.clone(),
            poll_interval: config.poll_interval,
        })
    }

    /// Source backing this device.
    pub fn source_id(&self) -> SourceId {
        self.source
    }

    /// Registry this device queues into.
    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Consumer stage draining this device.
    pub fn mix_stage(&self) -> MixStage {
        MixStage::new(self.registry.clone(), self.source)
    }

    /// Closing has no teardown; the source lives until the device is dropped.
    pub fn close(&self) -> Result<(), PcmError> {
        debug!("close");
        Ok(())
    }

    /// Accepted without effect.
    pub fn prepare(&self) -> Result<(), PcmError> {
        debug!("prepare");
        Ok(())
    }

    /// Accepted without effect; writes keep their blocking behaviour.
    pub fn nonblock(&self, mode: BlockMode) -> Result<(), PcmError> {
        debug!(?mode, "nonblock");
        Ok(())
    }

    /// Force the device into the playing state.
    pub fn start(&self) -> Result<(), PcmError> {
        debug!("start");
        self.set_state(SourceState::Playing)
    }

    /// Same as [`start`](Self::start).
    pub fn resume(&self) -> Result<(), PcmError> {
        debug!("resume");
        self.set_state(SourceState::Playing)
    }

    /// Current play state.
    pub fn state(&self) -> Result<SourceState, PcmError> {
        Ok(self.registry.lock().require_source(self.source)?.state())
    }

    fn set_state(&self, state: SourceState) -> Result<(), PcmError> {
        self.registry
            .lock()
            .require_source_mut(self.source)?
            .set_state(state);
        Ok(())
    }

    /// Commit hardware or software parameters.
    ///
    /// The platform prepares and starts the stream at this point, so the device is
    /// armed: the reference buffer is emptied and the source starts playing.
    pub fn commit_params(&self) -> Result<(), PcmError> {
        debug!("commit params");
        let mut registry = self.registry.lock();
        registry.reference_buffer_mut(self.source)?.resize(0);
        registry
            .require_source_mut(self.source)?
            .set_state(SourceState::Playing);
        push_log(format!("source {} playing", self.source.0));
        Ok(())
    }

    /// Access layout last requested.
    pub fn access(&self) -> AccessMode {
        AccessMode(self.access.load(Ordering::Relaxed))
    }

    /// Record the access layout; non-interleaved layouts are logged but accepted.
    pub fn set_access(&self, access: AccessMode) -> Result<(), PcmError> {
        debug!(access = access.0, "set_access");
        if !access.is_interleaved() {
            warn!(access = access.0, "unsupported access mode");
        }
        self.access.store(access.0, Ordering::Relaxed);
        Ok(())
    }

    /// Sample format of the reference buffer.
    pub fn format(&self) -> Result<PcmFormat, PcmError> {
        Ok(self.with_reference(|b| b.format())?.code())
    }

    /// Set the reference buffer's sample format.
    pub fn set_format(&self, format: PcmFormat) -> Result<(), PcmError> {
        debug!(format = format.0, "set_format");
        let format =
            SampleFormat::try_from(format).inspect_err(|err| error!(%err, "rejecting format"))?;
        self.registry
            .lock()
            .reference_buffer_mut(self.source)?
            .set_format(format);
        Ok(())
    }

    /// Channel count of the reference buffer.
    pub fn channels(&self) -> Result<u32, PcmError> {
        self.with_reference(|b| b.channels())
    }

    /// Highest channel count reported to callers.
    pub fn channels_max(&self) -> Result<u32, PcmError> {
        Ok(MAX_CHANNELS)
    }

    /// Set the reference buffer's channel count.
    pub fn set_channels(&self, channels: u32) -> Result<(), PcmError> {
        debug!(channels, "set_channels");
        self.registry
            .lock()
            .reference_buffer_mut(self.source)?
            .set_channels(channels);
        Ok(())
    }

    /// Sample rate of the reference buffer.
    pub fn rate(&self) -> Result<u32, PcmError> {
        self.with_reference(|b| b.frequency())
    }

    /// Set the reference buffer's sample rate.
    pub fn set_rate(&self, rate: u32) -> Result<(), PcmError> {
        debug!(rate, "set_rate");
        self.registry
            .lock()
            .reference_buffer_mut(self.source)?
            .set_frequency(rate);
        Ok(())
    }

    /// Any rate is honoured exactly; `rate` is left untouched.
    pub fn set_rate_near(&self, rate: &mut u32) -> Result<(), PcmError> {
        self.set_rate(*rate)
    }

    /// Accepted without effect.
    pub fn set_rate_resample(&self, resample: bool) -> Result<(), PcmError> {
        debug!(resample, "set_rate_resample");
        Ok(())
    }

    /// Every rate is supported.
    pub fn test_rate(&self, rate: u32) -> Result<(), PcmError> {
        debug!(rate, "test_rate");
        Ok(())
    }

    /// Capacity in frames.
    pub fn buffer_size(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    /// Set the capacity. A zero request reports the current capacity instead.
    pub fn set_buffer_size_near(&self, frames: &mut usize) -> Result<(), PcmError> {
        debug!(frames = *frames, "set_buffer_size_near");
        if *frames == 0 {
            *frames = self.buffer_size();
            return Ok(());
        }
        self.capacity.store(*frames, Ordering::Relaxed);
        Ok(())
    }

    /// Capacity expressed in microseconds at the reference rate.
    pub fn buffer_time_max(&self) -> Result<u32, PcmError> {
        let rate = self.rate()?;
        Ok(frames_to_micros(self.buffer_size(), rate))
    }

    /// Set the capacity from a duration in microseconds at the reference rate.
    ///
    /// A zero request reports the current capacity as a duration instead. With a
    /// zero reference rate the capacity is left unchanged.
    pub fn set_buffer_time_near(&self, micros: &mut u32) -> Result<(), PcmError> {
        debug!(micros = *micros, "set_buffer_time_near");
        let rate = self.rate()?;
        if *micros == 0 {
            *micros = frames_to_micros(self.buffer_size(), rate);
            return Ok(());
        }
        if rate != 0 {
            let frames = *micros as u64 * rate as u64 / 1_000_000;
            self.capacity.store(frames as usize, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Period divisor.
    pub fn periods(&self) -> u32 {
        self.periods.load(Ordering::Relaxed)
    }

    /// Capacity divided by the period count. Reporting only.
    pub fn period_size(&self) -> usize {
        self.buffer_size() / self.periods() as usize
    }

    /// Shortest period duration; the emulation has no lower bound.
    pub fn period_time_min(&self) -> u32 {
        0
    }

    /// Logged; the period size follows from capacity and periods.
    pub fn set_period_size_near(&self, frames: &mut usize) -> Result<(), PcmError> {
        debug!(frames = *frames, "set_period_size_near");
        Ok(())
    }

    /// Set the period divisor. Zero is stored as one.
    pub fn set_periods_near(&self, periods: &mut u32) -> Result<(), PcmError> {
        debug!(periods = *periods, "set_periods_near");
        self.periods.store((*periods).max(1), Ordering::Relaxed);
        Ok(())
    }

    /// Accepted without effect.
    pub fn set_start_threshold(&self, frames: usize) -> Result<(), PcmError> {
        debug!(frames, "set_start_threshold");
        Ok(())
    }

    /// Accepted without effect.
    pub fn set_avail_min(&self, frames: usize) -> Result<(), PcmError> {
        debug!(frames, "set_avail_min");
        Ok(())
    }

    /// Plain stereo, whatever the configured channel count.
    pub fn channel_map(&self) -> ChannelMap {
        ChannelMap::stereo()
    }

    /// Queue accounting for this device's source.
    pub fn metrics(&self) -> Result<QueueMetrics, PcmError> {
        let registry = self.registry.lock();
        Ok(QueueMetrics::measure(
            registry.require_source(self.source)?,
            &registry,
        ))
    }

    /// Frames queued but not yet consumed.
    pub fn delay(&self) -> Result<usize, PcmError> {
        let latency = self.metrics()?.latency();
        debug!(latency, "delay");
        Ok(latency)
    }

    /// Free space in frames, without blocking.
    pub fn avail_update(&self) -> Result<usize, PcmError> {
        let available = self.metrics()?.available(self.buffer_size());
        debug!(available, "avail_update");
        Ok(available)
    }

    /// Queue `frames` interleaved frames copied from `data`.
    ///
    /// Blocks in poll-interval steps while the device is full. A write starting
    /// below capacity is queued whole, even if it takes latency past capacity.
    /// Returns `frames` once queued, or 0 without queuing if the shutdown signal
    /// fires while waiting.
    pub fn writei(&self, data: &[u8], frames: usize) -> Result<usize, PcmError> {
        debug!(frames, "writei");
        if !self.wait_for_room()? {
            return Ok(0);
        }

        let mut registry = self.registry.lock();
        self.enqueue(&mut registry, |buffer| {
            let copied = buffer.fill(frames, data);
            if copied < buffer.byte_size() {
                warn!(
                    expected = buffer.byte_size(),
                    copied, "short write, padding with silence"
                );
            }
        })?;
        Ok(frames)
    }

    fn wait_for_room(&self) -> Result<bool, PcmError> {
        loop {
            if self.shutdown.is_exiting() {
                debug!("shutdown while waiting for room");
                return Ok(false);
            }
            if !self.metrics()?.would_block(self.buffer_size()) {
                return Ok(true);
            }
            self.clock.sleep(self.poll_interval);
        }
    }

    /// Grant up to `requested` frames of writable storage, clamped to the space
    /// available right now.
    ///
    /// The backing buffer is queued before the caller writes into it. No lock is
    /// held until [`mmap_commit`](Self::mmap_commit).
    pub fn mmap_begin(&self, requested: usize) -> Result<MmapGrant, PcmError> {
        debug!(requested, "mmap_begin");
        let mut registry = self.registry.lock();
        let available = QueueMetrics::measure(registry.require_source(self.source)?, &registry)
            .available(self.buffer_size());
        let frames = requested.min(available);

        let id = self.enqueue(&mut registry, |buffer| buffer.resize(frames))?;
        let areas = registry.buffer_mut(id).map(channel_areas).unwrap_or_default();
        *self.pending_mapping.lock() = Some(id);
        debug!(frames, buffer = id.0, "mmap_begin granted");

        Ok(MmapGrant {
            buffer: Some(id),
            offset: 0,
            frames,
            areas,
        })
    }

    /// Copy `bytes` into a granted mapping starting at `frame_offset`.
    ///
    /// Returns the bytes copied; 0 if the buffer no longer exists.
    pub fn write_mapped(&self, grant: &MmapGrant, frame_offset: usize, bytes: &[u8]) -> usize {
        let Some(id) = grant.buffer else {
            return 0;
        };
        let mut registry = self.registry.lock();
        let Some(buffer) = registry.buffer_mut(id) else {
            return 0;
        };
        let start = (grant.offset + frame_offset) * buffer.align_size();
        let storage = buffer.samples_mut();
        if start >= storage.len() {
            return 0;
        }
        let count = bytes.len().min(storage.len() - start);
        storage[start..start + count].copy_from_slice(&bytes[..count]);
        count
    }

    /// Finalize the last mapping with `frames` frames of payload.
    ///
    /// The count is trusted, not checked against the grant.
    pub fn mmap_commit(&self, offset: usize, frames: usize) -> Result<usize, PcmError> {
        debug!(offset, frames, "mmap_commit");
        let mut registry = self.registry.lock();
        if let Some(id) = self.pending_mapping.lock().take() {
            if let Some(buffer) = registry.buffer_mut(id) {
                buffer.resize(frames);
            }
        }
        Ok(frames)
    }

    /// Wait for free space for at most `timeout_ms` milliseconds of clock time.
    ///
    /// A negative timeout waits indefinitely. The shutdown signal ends the wait
    /// with [`WaitOutcome::Timeout`].
    pub fn wait(&self, timeout_ms: i32) -> Result<WaitOutcome, PcmError> {
        debug!(timeout_ms, "wait");
        if self.avail_update()? > 0 {
            return Ok(WaitOutcome::Ready);
        }

        let started = self.clock.now();
        let budget = u64::try_from(timeout_ms).ok().map(Duration::from_millis);
        loop {
            if self.shutdown.is_exiting() {
                return Ok(WaitOutcome::Timeout);
            }
            self.clock.sleep(self.poll_interval);
            if self.avail_update()? > 0 {
                return Ok(WaitOutcome::Ready);
            }
            let elapsed = self.clock.now().saturating_sub(started);
            if budget.is_some_and(|budget| elapsed >= budget) {
                return Ok(WaitOutcome::Timeout);
            }
        }
    }

    /// Status snapshot.
    pub fn status(&self) -> Result<PcmStatus, PcmError> {
        let registry = self.registry.lock();
        let source = registry.require_source(self.source)?;
        let metrics = QueueMetrics::measure(source, &registry);
        let reference = registry.reference_buffer(self.source)?;
        let buffer_size = self.buffer_size();
        Ok(PcmStatus {
            state: source.state(),
            format: reference.format(),
            channels: reference.channels(),
            rate: reference.frequency(),
            buffer_size,
            periods: self.periods(),
            period_size: self.period_size(),
            queued_buffers: metrics.queued_buffers,
            processed_buffers: metrics.processed_buffers,
            latency_frames: metrics.latency(),
            available_frames: metrics.available(buffer_size),
            latency_ms: frames_to_ms(metrics.latency(), reference.frequency()),
        })
    }

    fn with_reference<T>(&self, read: impl FnOnce(&AudioBuffer) -> T) -> Result<T, PcmError> {
        let registry = self.registry.lock();
        Ok(read(registry.reference_buffer(self.source)?))
    }

    // Recycle-or-allocate, shape the buffer, then append it to the queue.
    fn enqueue(
        &self,
        registry: &mut Registry,
        shape: impl FnOnce(&mut AudioBuffer),
    ) -> Result<BufferId, PcmError> {
        let id = registry
            .acquire_buffer(self.source)
            .inspect_err(|err| error!(%err, "cannot obtain a buffer"))?;
        if let Some(buffer) = registry.buffer_mut(id) {
            shape(buffer);
        }
        registry.require_source_mut(self.source)?.push(id);
        Ok(id)
    }
}

impl Drop for EmulatedPcm {
    fn drop(&mut self) {
        let evicted = self.registry.lock().release_source(self.source);
        debug!(source = self.source.0, evicted, "device released");
    }
}

fn frames_to_micros(frames: usize, rate: u32) -> u32 {
    if rate == 0 {
        return 0;
    }
    u32::try_from(frames as u64 * 1_000_000 / rate as u64).unwrap_or(u32::MAX)
}

fn channel_areas(buffer: &mut AudioBuffer) -> Vec<ChannelArea> {
    let bits = buffer.bit_depth();
    let step = buffer.align_size() as u32 * 8;
    let channels = buffer.channels();
    let addr = buffer.samples_mut().as_mut_ptr();
    (0..channels)
        .map(|channel| ChannelArea {
            addr,
            first: channel * bits,
            step,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{ExitFlag, VirtualClock};

    fn open_device() -> (EmulatedPcm, Arc<ExitFlag>) {
        let exit = Arc::new(ExitFlag::new());
        let runtime = Runtime::emulated(
            Arc::new(VirtualClock::with_sleep_step(Duration::from_millis(1))),
            exit.clone(),
        );
        let config = DeviceConfig {
            poll_interval: Duration::from_micros(50),
            ..DeviceConfig::default()
        };
        let device =
            EmulatedPcm::open(Registry::shared(), StreamDirection::Playback, &config, &runtime)
                .unwrap();
        (device, exit)
    }

    fn configure(device: &EmulatedPcm) {
        device.set_format(PcmFormat::S16_LE).unwrap();
        device.set_channels(2).unwrap();
        device.set_rate(48_000).unwrap();
        device.commit_params().unwrap();
    }

    #[test]
    fn open_queues_placeholder_and_stays_stopped() {
        let (device, _) = open_device();
        let metrics = device.metrics().unwrap();
        assert_eq!(metrics.queued_buffers, 1);
        assert_eq!(metrics.latency(), 0);
        assert_eq!(device.state().unwrap(), SourceState::Stopped);
        assert_eq!(device.registry().lock().buffer_count(), 1);
    }

    #[test]
    fn capture_is_rejected_without_allocating() {
        let registry = Registry::shared();
        let runtime = Runtime::emulated(Arc::new(VirtualClock::new()), Arc::new(ExitFlag::new()));
        let result = EmulatedPcm::open(
            registry.clone(),
            StreamDirection::Capture,
            &DeviceConfig::default(),
            &runtime,
        );
        assert!(matches!(
            result,
            Err(PcmError::UnsupportedStreamDirection(StreamDirection::Capture))
        ));
        assert_eq!(registry.lock().buffer_count(), 0);
        assert_eq!(registry.lock().source_count(), 0);
    }

    #[test]
    fn setters_round_trip_and_reject_unknown_formats() {
        let (device, _) = open_device();
        device.set_format(PcmFormat::FLOAT_LE).unwrap();
        device.set_channels(6).unwrap();
        let mut rate = 22_050;
        device.set_rate_near(&mut rate).unwrap();
        assert_eq!(rate, 22_050);

        assert!(matches!(
            device.set_format(PcmFormat::S24_LE),
            Err(PcmError::UnsupportedFormat(PcmFormat::S24_LE))
        ));
        assert_eq!(device.format().unwrap(), PcmFormat::FLOAT_LE);
        assert_eq!(device.channels().unwrap(), 6);
        assert_eq!(device.rate().unwrap(), 22_050);
        assert_eq!(device.channels_max().unwrap(), 2);
    }

    #[test]
    fn params_commit_and_start_arm_the_source() {
        let (device, _) = open_device();
        configure(&device);
        assert_eq!(device.state().unwrap(), SourceState::Playing);
        device.start().unwrap();
        device.resume().unwrap();
        assert_eq!(device.state().unwrap(), SourceState::Playing);
        device.close().unwrap();
        assert_eq!(device.state().unwrap(), SourceState::Playing);
    }

    #[test]
    fn unsupported_access_is_accepted() {
        let (device, _) = open_device();
        device.set_access(AccessMode::RW_NONINTERLEAVED).unwrap();
        assert_eq!(device.access(), AccessMode::RW_NONINTERLEAVED);
    }

    #[test]
    fn buffer_time_converts_through_reference_rate() {
        let (device, _) = open_device();
        device.set_rate(48_000).unwrap();
        let mut micros = 100_000;
        device.set_buffer_time_near(&mut micros).unwrap();
        assert_eq!(device.buffer_size(), 4_800);
        assert_eq!(device.buffer_time_max().unwrap(), 100_000);

        let mut query = 0;
        device.set_buffer_time_near(&mut query).unwrap();
        assert_eq!(query, 100_000);
        assert_eq!(device.buffer_size(), 4_800);

        let mut frames = 0;
        device.set_buffer_size_near(&mut frames).unwrap();
        assert_eq!(frames, 4_800);
    }

    #[test]
    fn zero_rate_leaves_capacity_alone() {
        let (device, _) = open_device();
        device.set_rate(0).unwrap();
        let mut micros = 50_000;
        device.set_buffer_time_near(&mut micros).unwrap();
        assert_eq!(device.buffer_size(), 4096);
        assert_eq!(device.buffer_time_max().unwrap(), 0);
    }

    #[test]
    fn buffer_time_saturates_for_huge_capacity() {
        let (device, _) = open_device();
        device.set_rate(1).unwrap();
        let mut frames = 1 << 40;
        device.set_buffer_size_near(&mut frames).unwrap();
        assert_eq!(device.buffer_time_max().unwrap(), u32::MAX);

        let mut query = 0;
        device.set_buffer_time_near(&mut query).unwrap();
        assert_eq!(query, u32::MAX);
    }

    #[test]
    fn period_size_divides_capacity() {
        let (device, _) = open_device();
        let mut frames = 4096;
        device.set_buffer_size_near(&mut frames).unwrap();
        assert_eq!(device.period_size(), 2048);
        let mut periods = 4;
        device.set_periods_near(&mut periods).unwrap();
        assert_eq!(device.period_size(), 1024);
        let mut period = 333;
        device.set_period_size_near(&mut period).unwrap();
        assert_eq!(period, 333);
        assert_eq!(device.period_size(), 1024);
        assert_eq!(device.period_time_min(), 0);
    }

    #[test]
    fn writes_accumulate_latency() {
        let (device, _) = open_device();
        configure(&device);
        let data = vec![0u8; 1000 * 4];
        for n in 1..=3 {
            assert_eq!(device.writei(&data, 1000).unwrap(), 1000);
            assert_eq!(device.delay().unwrap(), n * 1000);
            assert_eq!(device.avail_update().unwrap(), 4096 - n * 1000);
        }
    }

    #[test]
    fn write_below_capacity_may_overshoot_it() {
        let (device, _) = open_device();
        configure(&device);
        let data = vec![0u8; 1000 * 4];
        for _ in 0..4 {
            device.writei(&data, 1000).unwrap();
        }
        assert_eq!(device.avail_update().unwrap(), 96);

        assert_eq!(device.writei(&data, 1000).unwrap(), 1000);
        assert_eq!(device.delay().unwrap(), 5000);
        assert_eq!(device.avail_update().unwrap(), 0);

        let status = device.status().unwrap();
        assert_eq!(status.latency_frames, 5000);
        assert_eq!(status.available_frames, 0);
        assert_eq!(status.queued_buffers, 6);
        assert_eq!(status.processed_buffers, 0);
    }

    #[test]
    fn write_copies_payload_into_queue() {
        let (device, _) = open_device();
        configure(&device);
        let data: Vec<u8> = (0..16).collect();
        device.writei(&data, 4).unwrap();

        let registry = device.registry().lock();
        let source = registry.source(device.source_id()).unwrap();
        let last = *source.queue().back().unwrap();
        assert_eq!(registry.buffer(last).unwrap().samples(), data.as_slice());
    }

    #[test]
    fn write_recycles_processed_buffers() {
        let (device, _) = open_device();
        configure(&device);
        let data = vec![0u8; 512 * 4];
        device.writei(&data, 512).unwrap();
        device.mix_stage().mark_processed(2);
        let before = device.registry().lock().buffer_count();
        device.writei(&data, 512).unwrap();
        assert_eq!(device.registry().lock().buffer_count(), before);
        assert_eq!(device.delay().unwrap(), 512);
    }

    #[test]
    fn write_returns_zero_on_shutdown() {
        let (device, exit) = open_device();
        configure(&device);
        let data = vec![0u8; 4096 * 4];
        device.writei(&data, 4096).unwrap();
        exit.raise();
        assert_eq!(device.writei(&data, 1).unwrap(), 0);
        assert_eq!(device.delay().unwrap(), 4096);
    }

    #[test]
    fn mmap_begin_clamps_to_available() {
        let (device, _) = open_device();
        configure(&device);
        device.writei(&vec![0u8; 3096 * 4], 3096).unwrap();

        let grant = device.mmap_begin(4096).unwrap();
        assert_eq!(grant.frames, 1000);
        assert_eq!(grant.offset, 0);
        assert_eq!(grant.areas.len(), 2);
        assert_eq!(grant.areas[0].first, 0);
        assert_eq!(grant.areas[1].first, 16);
        assert!(grant.areas.iter().all(|a| a.step == 32));

        assert_eq!(device.mmap_commit(0, 1000).unwrap(), 1000);
        assert_eq!(device.delay().unwrap(), 4096);
        assert_eq!(device.avail_update().unwrap(), 0);
    }

    #[test]
    fn mmap_commit_sets_payload_size() {
        let (device, _) = open_device();
        configure(&device);
        let grant = device.mmap_begin(256).unwrap();
        assert_eq!(device.write_mapped(&grant, 0, &[7u8; 64]), 64);
        assert_eq!(device.mmap_commit(0, 100).unwrap(), 100);
        assert_eq!(device.delay().unwrap(), 100);
        let registry = device.registry().lock();
        let buffer = registry.buffer(grant.buffer.unwrap()).unwrap();
        assert_eq!(buffer.byte_size(), 400);
        assert_eq!(&buffer.samples()[..64], &[7u8; 64]);
    }

    #[test]
    fn wait_reports_ready_or_timeout() {
        let (device, _) = open_device();
        configure(&device);
        assert_eq!(device.wait(0).unwrap(), WaitOutcome::Ready);

        device.writei(&vec![0u8; 4096 * 4], 4096).unwrap();
        assert_eq!(device.wait(5).unwrap(), WaitOutcome::Timeout);
    }

    #[test]
    fn wait_stops_on_shutdown() {
        let (device, exit) = open_device();
        configure(&device);
        device.writei(&vec![0u8; 4096 * 4], 4096).unwrap();
        exit.raise();
        assert_eq!(device.wait(-1).unwrap(), WaitOutcome::Timeout);
    }

    #[test]
    fn drop_releases_registry_entries() {
        let (device, _) = open_device();
        configure(&device);
        device.writei(&vec![0u8; 64], 16).unwrap();
        let registry = device.registry().clone();
        drop(device);
        assert_eq!(registry.lock().buffer_count(), 0);
        assert_eq!(registry.lock().source_count(), 0);
    }
}
