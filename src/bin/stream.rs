//! scopecam_stream - pull frames from a camera and report throughput.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use scopecam::config::StreamConfig;
use scopecam::driver::sim::{SimCamera, SimConfig};
use scopecam::{CaptureMode, CaptureSession, ControlId, FillStatus, SourceError};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file path (overrides SCOPECAM_CONFIG).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Capture mode: rgb24, raw12 or rgb48.
    #[arg(long)]
    mode: Option<String>,
    /// Stop after this many frames.
    #[arg(long)]
    frames: Option<u64>,
    /// Frame-ready events per second from the camera.
    #[arg(long)]
    fps: Option<u32>,
    /// Log a progress line every N delivered frames (0 disables).
    #[arg(long, default_value_t = 30)]
    report_every: u64,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut cfg = StreamConfig::load_from(args.config.as_deref())?;
    if let Some(mode) = args.mode.as_deref() {
        cfg.mode = mode.parse::<CaptureMode>().map_err(|e| anyhow!(e))?;
    }
    if let Some(frames) = args.frames {
        cfg.frame_limit = Some(frames);
    }
    if let Some(fps) = args.fps {
        if fps == 0 {
            return Err(anyhow!("fps must be >= 1"));
        }
        cfg.fps = fps;
    }

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
            .context("installing the interrupt handler")?;
    }

    let driver = SimCamera::new(SimConfig {
        resolutions: vec![
            (cfg.width, cfg.height),
            (cfg.width / 2, cfg.height / 2),
            (cfg.width / 4, cfg.height / 4),
        ],
        frame_interval: Duration::from_secs_f64(1.0 / f64::from(cfg.fps)),
        noise: true,
        ..SimConfig::default()
    });

    let mut session = CaptureSession::new(Box::new(driver), cfg.mode);
    session.set_frame_limit(cfg.frame_limit);
    session.set_control(ControlId::AutoExposure, cfg.controls.auto_exposure as i32)?;
    if !cfg.controls.auto_exposure {
        session.set_control(ControlId::ExposureTime, cfg.controls.exposure_us)?;
        session.set_control(ControlId::ExposureGain, cfg.controls.exposure_gain)?;
    }
    session.set_control(ControlId::HorizontalFlip, cfg.controls.hflip as i32)?;
    session.set_control(ControlId::VerticalFlip, cfg.controls.vflip as i32)?;

    session.start().context("starting capture")?;
    let spec = session.output_spec()?;
    log::info!(
        "streaming {:?} {} x {} at a nominal {} fps",
        spec.format,
        spec.width,
        spec.height,
        cfg.fps
    );

    let mut buffer = session.allocate_output_buffer()?;
    let started = Instant::now();
    let mut delivered = 0u64;
    let outcome = loop {
        if stop.load(Ordering::SeqCst) {
            break Ok("interrupted");
        }
        match session.fill_frame(&mut buffer) {
            Ok(FillStatus::Delivered(meta)) => {
                delivered += 1;
                if args.report_every > 0 && delivered % args.report_every == 0 {
                    log::info!("{delivered} frames delivered (device seq {})", meta.device_seq);
                }
            }
            Ok(FillStatus::Eos) => break Ok("frame limit reached"),
            Err(SourceError::Timeout(timeout)) => {
                log::error!("camera stalled: {timeout}");
                break Ok("stalled");
            }
            Err(err) => break Err(err),
        }
    };

    let elapsed = started.elapsed();
    let timeouts = session.timeout_count();
    session.stop();

    let reason = outcome.context("streaming failed")?;
    println!("stream summary:");
    println!("  mode: {}", cfg.mode);
    println!("  frames delivered: {delivered}");
    println!("  elapsed: {:.1}s", elapsed.as_secs_f64());
    if delivered > 0 {
        println!("  rate: {:.1} fps", delivered as f64 / elapsed.as_secs_f64());
    }
    println!("  timeouts: {timeouts}");
    println!("  stopped: {reason}");
    Ok(())
}
