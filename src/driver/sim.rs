//! Simulated camera.
//!
//! Stands in for real hardware in tests and the demo binaries: it produces
//! deterministic synthetic rasters in all three supported layouts and runs a
//! real notifier thread that invokes the event sink, so the full asynchronous
//! signal path is exercised. Configuration knobs cover the failure modes a
//! real device exhibits — absent, stalled, or with fewer resolutions than the
//! caller assumes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rand::Rng;

use super::{
    AwbKind, CameraDriver, DeviceInfo, DeviceOption, DriverError, DriverEvent, EventSink,
    PulledFrame,
};

// Failure statuses the simulated device reports, in vendor HRESULT style.
const STATUS_INVALID_ARG: u32 = 0x8007_0057;
const STATUS_BUFFER_TOO_SMALL: u32 = 0x8007_000e;
const STATUS_BUSY: u32 = 0x8000_000a;

/// Tuning for a [`SimCamera`].
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Whether a device is "plugged in" at all.
    pub present: bool,
    /// Selectable resolutions, largest first, indexed by the resolution option.
    pub resolutions: Vec<(u32, u32)>,
    /// Interval between frame-ready notifications.
    pub frame_interval: Duration,
    /// Capture starts but no frame event is ever delivered.
    pub stall: bool,
    /// Mix pseudo-random noise into the synthetic pixels.
    pub noise: bool,
    pub serial: String,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            present: true,
            resolutions: vec![(1280, 960), (640, 480), (320, 240)],
            frame_interval: Duration::from_millis(33),
            stall: false,
            noise: false,
            serial: "SIM-000042".to_string(),
        }
    }
}

/// Synthetic [`CameraDriver`] implementation.
pub struct SimCamera {
    cfg: SimConfig,
    open: bool,
    capturing: bool,
    options: HashMap<DeviceOption, i32>,
    sink: Option<EventSink>,
    seq: Arc<AtomicU32>,
    stop: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl SimCamera {
    pub fn new(cfg: SimConfig) -> Self {
        Self {
            cfg,
            open: false,
            capturing: false,
            options: HashMap::new(),
            sink: None,
            seq: Arc::new(AtomicU32::new(0)),
            stop: Arc::new(AtomicBool::new(false)),
            workers: Vec::new(),
        }
    }

    fn resolution_index(&self) -> usize {
        self.options
            .get(&DeviceOption::ResolutionIndex)
            .copied()
            .unwrap_or(0) as usize
    }

    fn current_geometry(&self) -> (u32, u32) {
        self.cfg.resolutions[self.resolution_index().min(self.cfg.resolutions.len() - 1)]
    }

    fn fill_rgb24(&self, dest: &mut [u8], width: u32, height: u32, seq: u32) {
        let mut rng = rand::thread_rng();
        for y in 0..height as usize {
            for x in 0..width as usize {
                let base = ((x + y + seq as usize) % 256) as u8;
                let offset = (y * width as usize + x) * 3;
                let noise = if self.cfg.noise { rng.gen::<u8>() & 0x07 } else { 0 };
                dest[offset] = base ^ noise;
                dest[offset + 1] = base.wrapping_add(85);
                dest[offset + 2] = base.wrapping_add(170);
            }
        }
    }

    fn fill_raw12(dest: &mut [u8], width: u32, height: u32, seq: u32) {
        for y in 0..height as usize {
            for x in 0..width as usize {
                let sample = ((x + 2 * y + seq as usize) % 4096) as u16;
                let offset = (y * width as usize + x) * 2;
                dest[offset..offset + 2].copy_from_slice(&(sample << 4).to_le_bytes());
            }
        }
    }

    fn fill_rgb48(dest: &mut [u8], width: u32, height: u32, seq: u32) {
        for y in 0..height as usize {
            for x in 0..width as usize {
                let r = ((x + seq as usize) % 4096) as u16;
                let g = ((y + seq as usize) % 4096) as u16;
                let b = ((x + y) % 4096) as u16;
                let offset = (y * width as usize + x) * 6;
                dest[offset..offset + 2].copy_from_slice(&(r << 4).to_le_bytes());
                dest[offset + 2..offset + 4].copy_from_slice(&(g << 4).to_le_bytes());
                dest[offset + 4..offset + 6].copy_from_slice(&(b << 4).to_le_bytes());
            }
        }
    }
}

impl CameraDriver for SimCamera {
    fn open(&mut self) -> Result<(), DriverError> {
        if !self.cfg.present {
            return Err(DriverError::NoDevice);
        }
        self.open = true;
        self.options.clear();
        self.seq.store(0, Ordering::SeqCst);
        log::debug!("sim camera {} opened", self.cfg.serial);
        Ok(())
    }

    fn close(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        self.sink = None;
        self.capturing = false;
        if self.open {
            log::debug!("sim camera {} closed", self.cfg.serial);
        }
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn describe(&self) -> Result<DeviceInfo, DriverError> {
        if !self.open {
            return Err(DriverError::NotOpen);
        }
        let interval_ms = self.cfg.frame_interval.as_millis().max(1) as u32;
        Ok(DeviceInfo {
            model: "SC-1200 (simulated)".to_string(),
            serial: self.cfg.serial.clone(),
            firmware: "3.1.0-sim".to_string(),
            hardware: "1.0".to_string(),
            max_bit_depth: 12,
            mono: false,
            max_fps: 1000 / interval_ms,
            resolutions: self.cfg.resolutions.clone(),
        })
    }

    fn geometry(&self) -> Result<(u32, u32), DriverError> {
        if !self.open {
            return Err(DriverError::NotOpen);
        }
        Ok(self.current_geometry())
    }

    fn set_option(&mut self, option: DeviceOption, value: i32) -> Result<(), DriverError> {
        if !self.open {
            return Err(DriverError::NotOpen);
        }
        if option == DeviceOption::ResolutionIndex {
            if self.capturing {
                return Err(DriverError::Status(STATUS_BUSY));
            }
            if value < 0 || value as usize >= self.cfg.resolutions.len() {
                return Err(DriverError::Status(STATUS_INVALID_ARG));
            }
        }
        self.options.insert(option, value);
        Ok(())
    }

    fn get_option(&self, option: DeviceOption) -> Result<i32, DriverError> {
        if !self.open {
            return Err(DriverError::NotOpen);
        }
        Ok(self.options.get(&option).copied().unwrap_or(0))
    }

    fn start_capture(&mut self, events: EventSink) -> Result<(), DriverError> {
        if !self.open {
            return Err(DriverError::NotOpen);
        }
        if self.capturing {
            return Err(DriverError::Status(STATUS_BUSY));
        }
        self.capturing = true;
        self.stop = Arc::new(AtomicBool::new(false));
        self.sink = Some(Arc::clone(&events));

        if self.cfg.stall {
            // Capture nominally runs, but the notifier never fires.
            return Ok(());
        }

        let stop = Arc::clone(&self.stop);
        let seq = Arc::clone(&self.seq);
        let interval = self.cfg.frame_interval;
        self.workers.push(thread::spawn(move || {
            loop {
                thread::sleep(interval);
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                seq.fetch_add(1, Ordering::SeqCst);
                events(DriverEvent::FrameReady);
            }
        }));
        Ok(())
    }

    fn pull_frame(
        &mut self,
        dest: &mut [u8],
        bits_per_pixel: u32,
    ) -> Result<PulledFrame, DriverError> {
        if !self.open {
            return Err(DriverError::NotOpen);
        }
        let (width, height) = self.current_geometry();
        let bytes_per_pixel = match bits_per_pixel {
            24 => 3,
            16 => 2,
            48 => 6,
            _ => return Err(DriverError::Status(STATUS_INVALID_ARG)),
        };
        let needed = width as usize * height as usize * bytes_per_pixel;
        if dest.len() < needed {
            return Err(DriverError::Status(STATUS_BUFFER_TOO_SMALL));
        }

        let seq = self.seq.load(Ordering::SeqCst);
        match bits_per_pixel {
            24 => self.fill_rgb24(dest, width, height, seq),
            16 => Self::fill_raw12(dest, width, height, seq),
            _ => Self::fill_rgb48(dest, width, height, seq),
        }
        Ok(PulledFrame {
            width,
            height,
            seq,
            flag: 0,
            timestamp_us: 0,
        })
    }

    fn start_white_balance(&mut self, kind: AwbKind) -> Result<(), DriverError> {
        let Some(sink) = self.sink.clone() else {
            return Err(DriverError::NotOpen);
        };
        let stop = Arc::clone(&self.stop);
        let delay = self.cfg.frame_interval * 3;
        self.workers.push(thread::spawn(move || {
            thread::sleep(delay);
            if !stop.load(Ordering::SeqCst) {
                sink(DriverEvent::AwbDone(kind));
            }
        }));
        Ok(())
    }
}

impl Drop for SimCamera {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config() -> SimConfig {
        SimConfig {
            frame_interval: Duration::from_millis(5),
            ..SimConfig::default()
        }
    }

    #[test]
    fn absent_device_fails_to_open() {
        let mut camera = SimCamera::new(SimConfig {
            present: false,
            ..quick_config()
        });
        assert!(matches!(camera.open(), Err(DriverError::NoDevice)));
        assert!(!camera.is_open());
    }

    #[test]
    fn resolution_selection_changes_geometry() {
        let mut camera = SimCamera::new(quick_config());
        camera.open().expect("open");
        assert_eq!(camera.geometry().unwrap(), (1280, 960));

        camera
            .set_option(DeviceOption::ResolutionIndex, 2)
            .expect("select smallest");
        assert_eq!(camera.geometry().unwrap(), (320, 240));

        let err = camera.set_option(DeviceOption::ResolutionIndex, 9).unwrap_err();
        assert!(matches!(err, DriverError::Status(STATUS_INVALID_ARG)));
    }

    #[test]
    fn resolution_is_locked_while_capturing() {
        let mut camera = SimCamera::new(quick_config());
        camera.open().expect("open");
        camera
            .start_capture(Arc::new(|_| {}))
            .expect("start capture");
        let err = camera.set_option(DeviceOption::ResolutionIndex, 1).unwrap_err();
        assert!(matches!(err, DriverError::Status(STATUS_BUSY)));
    }

    #[test]
    fn notifier_thread_delivers_frame_events() {
        let mut camera = SimCamera::new(quick_config());
        camera.open().expect("open");

        let arrivals = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&arrivals);
        camera
            .start_capture(Arc::new(move |event| {
                if event == DriverEvent::FrameReady {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }))
            .expect("start capture");

        thread::sleep(Duration::from_millis(60));
        camera.close();
        assert!(arrivals.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn stalled_device_never_signals() {
        let mut camera = SimCamera::new(SimConfig {
            stall: true,
            ..quick_config()
        });
        camera.open().expect("open");

        let arrivals = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&arrivals);
        camera
            .start_capture(Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .expect("start capture");

        thread::sleep(Duration::from_millis(40));
        camera.close();
        assert_eq!(arrivals.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn pull_rejects_a_short_destination() {
        let mut camera = SimCamera::new(quick_config());
        camera.open().expect("open");
        let mut dest = vec![0u8; 16];
        let err = camera.pull_frame(&mut dest, 24).unwrap_err();
        assert!(matches!(err, DriverError::Status(STATUS_BUFFER_TOO_SMALL)));
    }

    #[test]
    fn pull_honors_the_requested_layout() {
        let mut camera = SimCamera::new(quick_config());
        camera.open().expect("open");
        camera
            .set_option(DeviceOption::ResolutionIndex, 2)
            .expect("small sensor");

        let mut raw = vec![0u8; 320 * 240 * 2];
        let info = camera.pull_frame(&mut raw, 16).expect("raw12 pull");
        assert_eq!((info.width, info.height), (320, 240));

        // Every sample must be a left-justified 12-bit value.
        for pair in raw.chunks_exact(2) {
            let value = u16::from_le_bytes([pair[0], pair[1]]);
            assert_eq!(value & 0x000F, 0, "low nibble must stay clear");
        }
    }
}
