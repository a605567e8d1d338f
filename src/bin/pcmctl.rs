use std::env;
use std::process;
use std::thread;
use std::time::Duration;

use pcm_kit::control::session::{DemoSession, SessionOptions};

const USAGE: &str = "Usage: pcmctl [--status] [--rate HZ] [--buffer FRAMES] [--block FRAMES] [--tone HZ]

Runs an in-process demo device: a sine producer writes through the emulated PCM
device while a mixer consumer drains it. Without --status the interactive console
launches.";

fn print_status(session: &DemoSession) {
    // Let the producer fill the queue once.
    thread::sleep(Duration::from_millis(200));
    match session.status() {
        Some(status) => {
            let device = &status.device;
            println!("State       : {:?}", device.state);
            println!("Format      : {} x{} @ {} Hz", device.format, device.channels, device.rate);
            println!("Buffer Size : {} frames", device.buffer_size);
            println!("Periods     : {} x {} frames", device.periods, device.period_size);
            println!(
                "Queue       : {} buffers ({} processed)",
                device.queued_buffers, device.processed_buffers
            );
            println!("Latency     : {} frames ({:.2} ms)", device.latency_frames, device.latency_ms);
            println!("Available   : {} frames", device.available_frames);
            println!("Consumer    : rms={:.3} mixed={} frames", status.rms, status.frames_mixed);
            println!("Clock       : {:.3} s", status.clock.as_secs_f64());
        }
        None => {
            eprintln!("pcmctl: demo device vanished");
            process::exit(1);
        }
    }
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: Option<String>) -> T {
    match value.as_deref().map(str::parse) {
        Some(Ok(parsed)) => parsed,
        _ => {
            eprintln!("pcmctl: {flag} expects a number");
            process::exit(1);
        }
    }
}

fn main() {
    pcm_kit::init_tracing();

    let mut options = SessionOptions::default();
    let mut status_only = false;
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--status" | "-s" => status_only = true,
            "--rate" => options.rate = parse_value("--rate", args.next()),
            "--buffer" => options.buffer_size = parse_value("--buffer", args.next()),
            "--block" => options.block_frames = parse_value("--block", args.next()),
            "--tone" => options.tone_hz = parse_value("--tone", args.next()),
            "--help" | "-h" => {
                println!("{USAGE}");
                return;
            }
            other => {
                eprintln!("pcmctl: unknown argument '{other}'");
                process::exit(1);
            }
        }
    }

    let session = match DemoSession::start(options) {
        Ok(session) => session,
        Err(err) => {
            eprintln!("pcmctl: {err}");
            process::exit(1);
        }
    };

    if status_only {
        print_status(&session);
        return;
    }

    if let Err(err) = pcm_kit::control::ui::run(&session) {
        eprintln!("pcmctl: {err}");
        process::exit(1);
    }
}
