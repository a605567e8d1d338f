use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use pcm_kit::runtime::{ExitFlag, ModeFlag, VirtualClock};
use pcm_kit::{
    DeviceConfig, HwParams, NativeBackend, Pcm, PcmError, PcmFormat, PcmHandle, Runtime,
    StreamDirection, WaitOutcome,
};

#[derive(Default)]
struct RecordingBackend {
    calls: Mutex<Vec<String>>,
}

impl RecordingBackend {
    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

impl NativeBackend for RecordingBackend {
    fn open(&self, name: &str, direction: StreamDirection, mode: i32) -> Result<PcmHandle, PcmError> {
        self.record(format!("open {name} {direction:?} {mode}"));
        Ok(PcmHandle(0xdead))
    }

    fn set_rate_near(
        &self,
        pcm: PcmHandle,
        _params: &mut HwParams,
        rate: &mut u32,
    ) -> Result<(), PcmError> {
        self.record(format!("set_rate_near {} {rate}", pcm.0));
        *rate = 44_100;
        Ok(())
    }

    fn writei(&self, pcm: PcmHandle, data: &[u8], frames: usize) -> Result<usize, PcmError> {
        self.record(format!("writei {} {} {frames}", pcm.0, data.len()));
        Ok(frames / 2)
    }

    fn delay(&self, pcm: PcmHandle) -> Result<usize, PcmError> {
        self.record(format!("delay {}", pcm.0));
        Err(PcmError::Native {
            op: "snd_pcm_delay",
            code: -32,
        })
    }

    fn wait(&self, pcm: PcmHandle, timeout_ms: i32) -> Result<WaitOutcome, PcmError> {
        self.record(format!("wait {} {timeout_ms}", pcm.0));
        Ok(WaitOutcome::Timeout)
    }
}

struct Harness {
    pcm: Pcm,
    mode: Arc<ModeFlag>,
    backend: Arc<RecordingBackend>,
    resolutions: Arc<AtomicUsize>,
}

struct SharedBackend(Arc<RecordingBackend>);

impl NativeBackend for SharedBackend {
    fn open(&self, name: &str, direction: StreamDirection, mode: i32) -> Result<PcmHandle, PcmError> {
        self.0.open(name, direction, mode)
    }

    fn set_rate_near(
        &self,
        pcm: PcmHandle,
        params: &mut HwParams,
        rate: &mut u32,
    ) -> Result<(), PcmError> {
        self.0.set_rate_near(pcm, params, rate)
    }

    fn writei(&self, pcm: PcmHandle, data: &[u8], frames: usize) -> Result<usize, PcmError> {
        self.0.writei(pcm, data, frames)
    }

    fn delay(&self, pcm: PcmHandle) -> Result<usize, PcmError> {
        self.0.delay(pcm)
    }

    fn wait(&self, pcm: PcmHandle, timeout_ms: i32) -> Result<WaitOutcome, PcmError> {
        self.0.wait(pcm, timeout_ms)
    }
}

fn harness(native: bool) -> Harness {
    let mode = Arc::new(ModeFlag::new(native));
    let backend = Arc::new(RecordingBackend::default());
    let resolutions = Arc::new(AtomicUsize::new(0));
    let runtime = Runtime {
        mode: mode.clone(),
        clock: Arc::new(VirtualClock::with_sleep_step(Duration::from_millis(1))),
        shutdown: Arc::new(ExitFlag::new()),
    };
    let pcm = {
        let backend = backend.clone();
        let resolutions = resolutions.clone();
        Pcm::with_native(runtime, DeviceConfig::default(), move || {
            resolutions.fetch_add(1, Ordering::SeqCst);
            Box::new(SharedBackend(backend.clone()))
        })
    };
    Harness {
        pcm,
        mode,
        backend,
        resolutions,
    }
}

#[test]
fn native_mode_forwards_arguments_and_results_verbatim() {
    let h = harness(true);
    let handle = h.pcm.open("hw:0", StreamDirection::Capture, 3).unwrap();
    assert_eq!(handle, PcmHandle(0xdead));

    let mut rate = 48_000;
    h.pcm
        .set_rate_near(handle, &mut HwParams::default(), &mut rate)
        .unwrap();
    assert_eq!(rate, 44_100);
    assert_eq!(h.pcm.writei(handle, &[0u8; 40], 10).unwrap(), 5);
    assert_eq!(
        h.pcm.delay(handle),
        Err(PcmError::Native {
            op: "snd_pcm_delay",
            code: -32
        })
    );
    assert_eq!(h.pcm.wait(handle, 7).unwrap(), WaitOutcome::Timeout);

    assert_eq!(
        *h.backend.calls.lock(),
        vec![
            "open hw:0 Capture 3".to_string(),
            "set_rate_near 57005 48000".to_string(),
            "writei 57005 40 10".to_string(),
            "delay 57005".to_string(),
            "wait 57005 7".to_string(),
        ]
    );
    assert_eq!(h.resolutions.load(Ordering::SeqCst), 1);
}

#[test]
fn native_mode_leaves_registry_untouched() {
    let h = harness(true);
    let handle = h.pcm.open("default", StreamDirection::Playback, 0).unwrap();
    h.pcm.writei(handle, &[0u8; 16], 4).unwrap();
    assert_eq!(h.pcm.registry().lock().buffer_count(), 0);
    assert_eq!(h.pcm.registry().lock().source_count(), 0);
    assert!(h.pcm.handles().is_empty());
}

#[test]
fn unimplemented_native_call_reports_unavailable() {
    let h = harness(true);
    let err = h.pcm.prepare(PcmHandle(1)).unwrap_err();
    assert_eq!(err, PcmError::NativeUnavailable("snd_pcm_prepare"));
}

#[test]
fn emulated_mode_never_resolves_native() {
    let h = harness(false);
    let handle = h.pcm.open("default", StreamDirection::Playback, 0).unwrap();
    let mut params = HwParams::default();
    h.pcm.set_format(handle, &mut params, PcmFormat::U8).unwrap();
    assert_eq!(h.pcm.get_format(handle, &params).unwrap(), PcmFormat::U8);
    assert_eq!(h.resolutions.load(Ordering::SeqCst), 0);
    assert!(h.backend.calls.lock().is_empty());
}

#[test]
fn mode_is_read_per_call() {
    let h = harness(false);
    let handle = h.pcm.open("default", StreamDirection::Playback, 0).unwrap();
    assert_eq!(h.pcm.delay(handle).unwrap(), 0);

    h.mode.set_native(true);
    assert!(h.pcm.delay(handle).is_err());
    assert_eq!(*h.backend.calls.lock(), vec![format!("delay {}", handle.0)]);

    h.mode.set_native(false);
    assert_eq!(h.pcm.delay(handle).unwrap(), 0);
}
