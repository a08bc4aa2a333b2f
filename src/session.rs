//! Capture session lifecycle.
//!
//! One `CaptureSession` owns one camera for one acquisition run: it opens the
//! device, applies the cached controls in the required order, derives the
//! frame geometry and byte sizes, and then serves the consumer's
//! wait-pull-decode cycle until stopped. The driver's notifier thread touches
//! only the shared [`FrameSignal`] and AWB marker; everything else belongs to
//! the streaming thread.

use std::sync::Arc;

use crate::controls::{AwbState, ControlId, ControlRange, Controls};
use crate::decode::{self, CaptureMode, OutputFormat};
use crate::driver::{
    byte_order, pixel_format, AwbKind, CameraDriver, DeviceInfo, DeviceOption, DriverEvent,
    EventSink, PulledFrame,
};
use crate::error::{Result, SourceError};
use crate::signal::FrameSignal;

/// Environment toggle: dump the extended device description at start.
const DEVICE_INFO_ENV: &str = "SCOPECAM_DEVICE_INFO";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Running,
    Stopping,
}

/// Output format tag plus fixed session geometry, as negotiated downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSpec {
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
}

/// Metadata for one delivered frame.
///
/// Timing fields stay `None`: this source does not synthesize timestamps,
/// the consumer's own clock is authoritative.
#[derive(Debug, Clone, Copy)]
pub struct FrameMeta {
    /// Zero-based index of the frame within this session.
    pub offset: u64,
    /// Device-side sequence number at pull time.
    pub device_seq: u32,
    pub pts: Option<u64>,
    pub dts: Option<u64>,
    pub duration: Option<u64>,
}

/// Outcome of a successful `fill_frame` call.
#[derive(Debug, Clone, Copy)]
pub enum FillStatus {
    Delivered(FrameMeta),
    /// The configured frame limit was reached; repeats indefinitely.
    Eos,
}

pub struct CaptureSession {
    driver: Box<dyn CameraDriver>,
    mode: CaptureMode,
    state: SessionState,
    controls: Controls,
    signal: Arc<FrameSignal>,
    awb: Arc<AwbState>,
    width: u32,
    height: u32,
    input_byte_size: usize,
    output_byte_size: usize,
    /// Raw pull destination for the 16-bit modes, sized at start.
    scratch: Vec<u8>,
    frames_pulled: u64,
    frames_emitted: u64,
    total_timeouts: u64,
    frame_limit: Option<u64>,
}

impl CaptureSession {
    /// A session starts idle; the mode is fixed for its whole lifetime.
    pub fn new(driver: Box<dyn CameraDriver>, mode: CaptureMode) -> Self {
        Self {
            driver,
            mode,
            state: SessionState::Idle,
            controls: Controls::default(),
            signal: Arc::new(FrameSignal::new()),
            awb: Arc::new(AwbState::new()),
            width: 0,
            height: 0,
            input_byte_size: 0,
            output_byte_size: 0,
            scratch: Vec::new(),
            frames_pulled: 0,
            frames_emitted: 0,
            total_timeouts: 0,
            frame_limit: None,
        }
    }

    /// Open the device, configure it and begin asynchronous capture.
    ///
    /// Any failure closes the partially opened device and leaves the session
    /// idle with the specific error.
    pub fn start(&mut self) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(SourceError::AlreadyRunning);
        }
        self.state = SessionState::Starting;
        match self.bring_up() {
            Ok(()) => {
                self.state = SessionState::Running;
                log::info!(
                    "capture running: {}x{} {} ({} bytes per frame)",
                    self.width,
                    self.height,
                    self.mode,
                    self.output_byte_size
                );
                Ok(())
            }
            Err(err) => {
                self.driver.close();
                self.reset();
                Err(err)
            }
        }
    }

    fn bring_up(&mut self) -> Result<()> {
        self.driver.open().map_err(SourceError::DeviceNotFound)?;

        if std::env::var_os(DEVICE_INFO_ENV).is_some() {
            match self.driver.describe() {
                Ok(info) => log_device_info(&info),
                Err(err) => log::warn!("device description unavailable: {err}"),
            }
        }

        // The resolution selector is the one option that must land before
        // anything else is derived from the geometry.
        let index = self.controls.get(ControlId::ResolutionIndex);
        self.set_device_option(DeviceOption::ResolutionIndex, index)?;

        let (width, height) = self.driver.geometry().map_err(SourceError::Device)?;
        self.width = width;
        self.height = height;

        self.apply_mode_options()?;
        self.apply_flips_and_exposure()?;

        self.input_byte_size = self.mode.input_byte_size(width, height);
        self.output_byte_size = self.mode.output_byte_size(width, height);
        self.scratch = match self.mode {
            // The 24-bit path pulls straight into the consumer's buffer.
            CaptureMode::Rgb24 => Vec::new(),
            CaptureMode::Raw12 | CaptureMode::Rgb48 => vec![0; self.input_byte_size],
        };

        self.driver
            .start_capture(self.event_sink())
            .map_err(SourceError::Device)?;
        Ok(())
    }

    fn apply_mode_options(&mut self) -> Result<()> {
        match self.mode {
            CaptureMode::Rgb24 => {
                self.set_device_option_lenient(DeviceOption::ByteOrder, byte_order::RGB);
                for id in [
                    ControlId::Hue,
                    ControlId::Saturation,
                    ControlId::Brightness,
                    ControlId::Contrast,
                    ControlId::Gamma,
                    ControlId::BlackBalanceRed,
                    ControlId::BlackBalanceGreen,
                    ControlId::BlackBalanceBlue,
                    ControlId::WhiteBalanceGainRed,
                    ControlId::WhiteBalanceGainGreen,
                    ControlId::WhiteBalanceGainBlue,
                ] {
                    let value = self.controls.get(id);
                    self.set_device_option_lenient(id.device_option(), value);
                }
            }
            CaptureMode::Raw12 => {
                self.set_device_option(DeviceOption::PixelFormat, pixel_format::RAW12)?;
            }
            CaptureMode::Rgb48 => {
                self.set_device_option(DeviceOption::PixelFormat, pixel_format::RGB48)?;
            }
        }
        Ok(())
    }

    fn apply_flips_and_exposure(&mut self) -> Result<()> {
        let hflip = self.controls.get(ControlId::HorizontalFlip);
        self.set_device_option_lenient(DeviceOption::HorizontalFlip, hflip);
        let vflip = self.controls.get(ControlId::VerticalFlip);
        self.set_device_option_lenient(DeviceOption::VerticalFlip, vflip);

        let auto = self.controls.get(ControlId::AutoExposure);
        self.set_device_option(DeviceOption::AutoExposure, auto)?;
        if auto == 0 {
            // A manual exposure write interferes with the auto-exposure loop,
            // so it is only sent when that loop is off.
            let time = self.controls.get(ControlId::ExposureTime);
            self.set_device_option_lenient(DeviceOption::ExposureTime, time);
            let gain = self.controls.get(ControlId::ExposureGain);
            self.set_device_option_lenient(DeviceOption::ExposureGain, gain);
        }
        Ok(())
    }

    fn set_device_option(&mut self, option: DeviceOption, value: i32) -> Result<()> {
        self.driver
            .set_option(option, value)
            .map_err(|source| SourceError::Config {
                option,
                value,
                source,
            })
    }

    fn set_device_option_lenient(&mut self, option: DeviceOption, value: i32) {
        if let Err(err) = self.driver.set_option(option, value) {
            log::warn!("device rejected {option:?} = {value}: {err}");
        }
    }

    fn event_sink(&self) -> EventSink {
        let signal = Arc::clone(&self.signal);
        let awb = Arc::clone(&self.awb);
        Arc::new(move |event| match event {
            DriverEvent::FrameReady => signal.frame_arrived(),
            DriverEvent::AwbDone(kind) => awb.finish(kind),
        })
    }

    /// Close the device and reset all counters. Never fails; safe from any
    /// state, including a partially started one.
    pub fn stop(&mut self) {
        if self.state == SessionState::Idle {
            return;
        }
        self.state = SessionState::Stopping;
        self.driver.close();
        self.reset();
        log::info!("capture stopped");
    }

    fn reset(&mut self) {
        self.signal.reset();
        self.awb.clear();
        self.frames_pulled = 0;
        self.frames_emitted = 0;
        self.total_timeouts = 0;
        self.width = 0;
        self.height = 0;
        self.input_byte_size = 0;
        self.output_byte_size = 0;
        self.scratch = Vec::new();
        self.state = SessionState::Idle;
    }

    /// The session's native output format and geometry.
    pub fn output_spec(&self) -> Result<FrameSpec> {
        if self.state != SessionState::Running {
            return Err(SourceError::NotRunning);
        }
        Ok(FrameSpec {
            format: self.mode.output_format(),
            width: self.width,
            height: self.height,
        })
    }

    /// Accept the proposal iff it matches the native spec exactly.
    pub fn negotiate_format(&self, proposed: &FrameSpec) -> Result<FrameSpec> {
        let native = self.output_spec()?;
        if *proposed == native {
            Ok(native)
        } else {
            Err(SourceError::FormatRejected)
        }
    }

    /// Sizing request for one output frame; no device interaction.
    pub fn allocate_output_buffer(&self) -> Result<Vec<u8>> {
        if self.state != SessionState::Running {
            return Err(SourceError::NotRunning);
        }
        Ok(vec![0; self.output_byte_size])
    }

    /// Block until the next frame, pull it and decode it into `output`.
    ///
    /// A timeout is fatal to this call only; the session stays running and
    /// the caller decides whether to retry or shut down.
    pub fn fill_frame(&mut self, output: &mut [u8]) -> Result<FillStatus> {
        if self.state != SessionState::Running {
            return Err(SourceError::NotRunning);
        }
        if let Some(limit) = self.frame_limit {
            if self.frames_emitted >= limit {
                return Ok(FillStatus::Eos);
            }
        }

        let last_pulled = self.frames_pulled;
        if let Err(timeout) = self.signal.wait_for_frame(last_pulled) {
            self.total_timeouts += 1;
            log::error!("{timeout} (total timeouts this session: {})", self.total_timeouts);
            return Err(SourceError::Timeout(timeout));
        }

        if output.len() < self.output_byte_size {
            return Err(SourceError::BufferTooSmall {
                needed: self.output_byte_size,
                got: output.len(),
            });
        }

        let bits = self.mode.pull_bits();
        let info = match self.mode {
            CaptureMode::Rgb24 => {
                let info = self
                    .driver
                    .pull_frame(&mut output[..self.output_byte_size], bits)
                    .map_err(SourceError::Pull)?;
                self.check_pulled_size(&info, self.output_byte_size)?;
                info
            }
            CaptureMode::Raw12 | CaptureMode::Rgb48 => {
                if self.scratch.len() != self.input_byte_size || self.input_byte_size == 0 {
                    return Err(SourceError::SizeMismatch {
                        expected: self.input_byte_size,
                        actual: self.scratch.len(),
                    });
                }
                let info = self
                    .driver
                    .pull_frame(&mut self.scratch, bits)
                    .map_err(SourceError::Pull)?;
                self.check_pulled_size(&info, self.input_byte_size)?;
                match self.mode {
                    CaptureMode::Raw12 => {
                        decode::decode_raw12(&self.scratch, output, self.width, self.height)?
                    }
                    _ => decode::decode_rgb48(&self.scratch, output, self.width, self.height)?,
                }
                info
            }
        };

        self.frames_pulled += 1;
        self.frames_emitted += 1;
        log::debug!(
            "frame {} delivered (device seq {}, available {})",
            self.frames_emitted,
            info.seq,
            self.signal.available()
        );

        Ok(FillStatus::Delivered(FrameMeta {
            offset: self.frames_emitted - 1,
            device_seq: info.seq,
            pts: None,
            dts: None,
            duration: None,
        }))
    }

    fn check_pulled_size(&self, info: &PulledFrame, expected: usize) -> Result<()> {
        let per_pixel = match self.mode {
            CaptureMode::Rgb24 => self.mode.bytes_per_output_pixel(),
            CaptureMode::Raw12 | CaptureMode::Rgb48 => self.mode.bytes_per_input_pixel(),
        };
        let actual = info.width as usize * info.height as usize * per_pixel;
        if actual != expected {
            return Err(SourceError::SizeMismatch { expected, actual });
        }
        Ok(())
    }

    /// Write a control, bounds-checked, honoring its application policy.
    ///
    /// Live controls reach the device immediately while running; the cache is
    /// only updated once the device accepted the value. Pre-open controls are
    /// always cached and picked up at the next start.
    pub fn set_control(&mut self, id: ControlId, value: i32) -> Result<()> {
        let range = id.range();
        if value < range.min || value > range.max {
            return Err(SourceError::OutOfRange {
                control: id,
                value,
                min: range.min,
                max: range.max,
            });
        }
        if self.state == SessionState::Running && !id.pre_open_only() {
            self.set_device_option(id.device_option(), value)?;
        }
        self.controls.set(id, value)
    }

    pub fn control(&self, id: ControlId) -> i32 {
        self.controls.get(id)
    }

    pub fn control_range(id: ControlId) -> ControlRange {
        id.range()
    }

    /// Kick off a one-shot auto-white-balance calibration.
    ///
    /// A trigger while either calibration kind is in flight is a no-op; the
    /// marker clears itself when the driver reports completion.
    pub fn trigger_white_balance(&mut self, kind: AwbKind) -> Result<()> {
        if self.state != SessionState::Running {
            return Err(SourceError::NotRunning);
        }
        if !self.awb.try_begin(kind) {
            log::debug!("white-balance calibration already in flight; {kind:?} trigger ignored");
            return Ok(());
        }
        if let Err(err) = self.driver.start_white_balance(kind) {
            self.awb.finish(kind);
            return Err(SourceError::Device(err));
        }
        Ok(())
    }

    pub fn white_balance_active(&self) -> Option<AwbKind> {
        self.awb.active()
    }

    /// Stop delivering after this many frames; `fill_frame` then reports Eos
    /// forever. `None` streams without limit.
    pub fn set_frame_limit(&mut self, limit: Option<u64>) {
        self.frame_limit = limit;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    pub fn device_present(&self) -> bool {
        self.driver.is_open()
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn geometry(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn output_byte_size(&self) -> usize {
        self.output_byte_size
    }

    pub fn frames_available(&self) -> u64 {
        self.signal.available()
    }

    pub fn frames_pulled(&self) -> u64 {
        self.frames_pulled
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    pub fn timeout_count(&self) -> u64 {
        self.total_timeouts
    }
}

fn log_device_info(info: &DeviceInfo) {
    log::info!("device: {} (serial {})", info.model, info.serial);
    log::info!(
        "  firmware {}, hardware {}, max bit depth {}, mono {}, max fps {}",
        info.firmware,
        info.hardware,
        info.max_bit_depth,
        info.mono,
        info.max_fps
    );
    for (index, (width, height)) in info.resolutions.iter().enumerate() {
        log::info!("  resolution {index}: {width} x {height}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverError;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;

    const TEST_STATUS: u32 = 0x8000_4005;

    /// Shared scripted-driver state the tests can inspect and poke after the
    /// driver itself has been moved into the session.
    #[derive(Default)]
    struct Shared {
        open: AtomicBool,
        capturing: AtomicBool,
        pulls: AtomicU32,
        sink: Mutex<Option<EventSink>>,
        writes: Mutex<Vec<(DeviceOption, i32)>>,
        awb_requests: Mutex<Vec<AwbKind>>,
    }

    impl Shared {
        fn signal_frame(&self) {
            let sink = self.sink.lock().unwrap();
            sink.as_ref().expect("capture started")(DriverEvent::FrameReady);
        }

        fn signal_awb_done(&self, kind: AwbKind) {
            let sink = self.sink.lock().unwrap();
            sink.as_ref().expect("capture started")(DriverEvent::AwbDone(kind));
        }

        fn wrote(&self, option: DeviceOption) -> bool {
            self.writes.lock().unwrap().iter().any(|(o, _)| *o == option)
        }
    }

    struct ScriptedDriver {
        shared: Arc<Shared>,
        fail_open: bool,
        fail_geometry: bool,
        reject: Vec<DeviceOption>,
        fail_pull: bool,
        /// Geometry the pull reports, when it should disagree with reality.
        misreport: Option<(u32, u32)>,
        geometry: (u32, u32),
    }

    impl ScriptedDriver {
        fn new(shared: Arc<Shared>) -> Self {
            Self {
                shared,
                fail_open: false,
                fail_geometry: false,
                reject: Vec::new(),
                fail_pull: false,
                misreport: None,
                geometry: (4, 2),
            }
        }
    }

    impl CameraDriver for ScriptedDriver {
        fn open(&mut self) -> std::result::Result<(), DriverError> {
            if self.fail_open {
                return Err(DriverError::NoDevice);
            }
            self.shared.open.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn close(&mut self) {
            self.shared.open.store(false, Ordering::SeqCst);
            self.shared.capturing.store(false, Ordering::SeqCst);
            *self.shared.sink.lock().unwrap() = None;
        }

        fn is_open(&self) -> bool {
            self.shared.open.load(Ordering::SeqCst)
        }

        fn describe(&self) -> std::result::Result<DeviceInfo, DriverError> {
            Err(DriverError::NotOpen)
        }

        fn geometry(&self) -> std::result::Result<(u32, u32), DriverError> {
            if self.fail_geometry {
                return Err(DriverError::Status(TEST_STATUS));
            }
            Ok(self.geometry)
        }

        fn set_option(&mut self, option: DeviceOption, value: i32) -> std::result::Result<(), DriverError> {
            if self.reject.contains(&option) {
                return Err(DriverError::Status(TEST_STATUS));
            }
            self.shared.writes.lock().unwrap().push((option, value));
            Ok(())
        }

        fn get_option(&self, _option: DeviceOption) -> std::result::Result<i32, DriverError> {
            Ok(0)
        }

        fn start_capture(&mut self, events: EventSink) -> std::result::Result<(), DriverError> {
            self.shared.capturing.store(true, Ordering::SeqCst);
            *self.shared.sink.lock().unwrap() = Some(events);
            Ok(())
        }

        fn pull_frame(
            &mut self,
            dest: &mut [u8],
            _bits_per_pixel: u32,
        ) -> std::result::Result<PulledFrame, DriverError> {
            if self.fail_pull {
                return Err(DriverError::Status(TEST_STATUS));
            }
            let seq = self.shared.pulls.fetch_add(1, Ordering::SeqCst) + 1;
            dest.fill(0x10);
            let (width, height) = self.misreport.unwrap_or(self.geometry);
            Ok(PulledFrame {
                width,
                height,
                seq,
                flag: 0,
                timestamp_us: 0,
            })
        }

        fn start_white_balance(&mut self, kind: AwbKind) -> std::result::Result<(), DriverError> {
            self.shared.awb_requests.lock().unwrap().push(kind);
            Ok(())
        }
    }

    fn session_with(
        configure: impl FnOnce(&mut ScriptedDriver),
    ) -> (CaptureSession, Arc<Shared>) {
        let shared = Arc::new(Shared::default());
        let mut driver = ScriptedDriver::new(Arc::clone(&shared));
        configure(&mut driver);
        (
            CaptureSession::new(Box::new(driver), CaptureMode::Raw12),
            shared,
        )
    }

    fn fill_one(session: &mut CaptureSession, shared: &Shared) -> Result<FillStatus> {
        shared.signal_frame();
        let mut buf = session.allocate_output_buffer()?;
        session.fill_frame(&mut buf)
    }

    #[test]
    fn start_configures_and_runs() {
        let (mut session, shared) = session_with(|_| {});
        session.start().expect("start");

        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(session.geometry(), (4, 2));
        assert_eq!(session.output_byte_size(), 4 * 2 * 8);
        assert!(shared.wrote(DeviceOption::ResolutionIndex));
        assert!(shared.wrote(DeviceOption::PixelFormat));
        assert!(shared.wrote(DeviceOption::AutoExposure));
        assert!(shared.capturing.load(Ordering::SeqCst));
    }

    #[test]
    fn missing_device_leaves_the_session_idle() {
        let (mut session, shared) = session_with(|d| d.fail_open = true);
        let err = session.start().unwrap_err();
        assert!(matches!(err, SourceError::DeviceNotFound(_)));
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!shared.open.load(Ordering::SeqCst));
    }

    #[test]
    fn rejected_resolution_rolls_back_to_idle() {
        let (mut session, shared) =
            session_with(|d| d.reject.push(DeviceOption::ResolutionIndex));
        let err = session.start().unwrap_err();
        assert!(matches!(
            err,
            SourceError::Config { option: DeviceOption::ResolutionIndex, .. }
        ));
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!shared.open.load(Ordering::SeqCst), "device closed on rollback");
    }

    #[test]
    fn rejected_auto_exposure_aborts_start() {
        let (mut session, _shared) =
            session_with(|d| d.reject.push(DeviceOption::AutoExposure));
        let err = session.start().unwrap_err();
        assert!(matches!(
            err,
            SourceError::Config { option: DeviceOption::AutoExposure, .. }
        ));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn rejected_flip_is_tolerated() {
        let (mut session, _shared) =
            session_with(|d| d.reject.push(DeviceOption::HorizontalFlip));
        session.start().expect("flips are best-effort");
        assert!(session.is_running());
    }

    #[test]
    fn geometry_failure_rolls_back() {
        let (mut session, shared) = session_with(|d| d.fail_geometry = true);
        let err = session.start().unwrap_err();
        assert!(matches!(err, SourceError::Device(_)));
        assert!(!shared.open.load(Ordering::SeqCst));
    }

    #[test]
    fn fill_delivers_and_advances_counters() {
        let (mut session, shared) = session_with(|_| {});
        session.start().expect("start");

        for expected in 1..=3u64 {
            let status = fill_one(&mut session, &shared).expect("fill");
            let FillStatus::Delivered(meta) = status else {
                panic!("expected a delivered frame");
            };
            assert_eq!(meta.offset, expected - 1);
            assert_eq!(meta.pts, None);
            assert_eq!(meta.dts, None);
            assert_eq!(meta.duration, None);
            assert_eq!(session.frames_emitted(), expected);
            assert_eq!(session.frames_pulled(), expected);
            assert!(session.frames_available() >= session.frames_pulled());
        }
    }

    #[test]
    fn frame_limit_makes_eos_idempotent() {
        let (mut session, shared) = session_with(|_| {});
        session.set_frame_limit(Some(1));
        session.start().expect("start");

        assert!(matches!(
            fill_one(&mut session, &shared).expect("first frame"),
            FillStatus::Delivered(_)
        ));

        // Every further call reports end-of-stream without a device pull.
        let pulls_before = shared.pulls.load(Ordering::SeqCst);
        for _ in 0..3 {
            let mut buf = session.allocate_output_buffer().expect("alloc");
            assert!(matches!(
                session.fill_frame(&mut buf).expect("eos"),
                FillStatus::Eos
            ));
        }
        assert_eq!(shared.pulls.load(Ordering::SeqCst), pulls_before);
    }

    #[test]
    fn pull_failure_surfaces_as_pull_error() {
        let (mut session, shared) = session_with(|d| d.fail_pull = true);
        session.start().expect("start");
        let err = fill_one(&mut session, &shared).unwrap_err();
        assert!(matches!(err, SourceError::Pull(_)));
        assert!(session.is_running(), "pull failure does not stop the session");
    }

    #[test]
    fn misreported_geometry_is_a_size_mismatch() {
        let (mut session, shared) = session_with(|d| d.misreport = Some((2, 2)));
        session.start().expect("start");
        let err = fill_one(&mut session, &shared).unwrap_err();
        assert!(matches!(
            err,
            SourceError::SizeMismatch { expected: 16, actual: 8 }
        ));
    }

    #[test]
    fn short_output_buffer_is_rejected() {
        let (mut session, shared) = session_with(|_| {});
        session.start().expect("start");
        shared.signal_frame();
        let mut buf = vec![0u8; session.output_byte_size() - 1];
        let err = session.fill_frame(&mut buf).unwrap_err();
        assert!(matches!(err, SourceError::BufferTooSmall { .. }));
    }

    #[test]
    fn negotiation_accepts_only_the_native_spec() {
        let (mut session, _shared) = session_with(|_| {});
        let spec = FrameSpec {
            format: OutputFormat::Argb64,
            width: 4,
            height: 2,
        };
        assert!(matches!(
            session.negotiate_format(&spec),
            Err(SourceError::NotRunning)
        ));

        session.start().expect("start");
        assert_eq!(session.negotiate_format(&spec).expect("native"), spec);

        let narrower = FrameSpec { width: 2, ..spec };
        assert!(matches!(
            session.negotiate_format(&narrower),
            Err(SourceError::FormatRejected)
        ));
        let wrong_format = FrameSpec {
            format: OutputFormat::Rgb24,
            ..spec
        };
        assert!(matches!(
            session.negotiate_format(&wrong_format),
            Err(SourceError::FormatRejected)
        ));
    }

    #[test]
    fn live_control_writes_through_to_the_device() {
        let (mut session, shared) = session_with(|_| {});
        session.start().expect("start");

        session.set_control(ControlId::Brightness, 12).expect("live set");
        assert!(shared
            .writes
            .lock()
            .unwrap()
            .contains(&(DeviceOption::Brightness, 12)));
        assert_eq!(session.control(ControlId::Brightness), 12);
    }

    #[test]
    fn rejected_live_control_keeps_the_cache() {
        let (mut session, _shared) = session_with(|d| d.reject.push(DeviceOption::Gamma));
        session.start().expect("start");

        let err = session.set_control(ControlId::Gamma, 150).unwrap_err();
        assert!(matches!(err, SourceError::Config { option: DeviceOption::Gamma, .. }));
        assert_eq!(session.control(ControlId::Gamma), 100);
    }

    #[test]
    fn pre_open_control_is_cached_while_running() {
        let (mut session, shared) = session_with(|_| {});
        session.start().expect("start");
        let writes_before = shared.writes.lock().unwrap().len();

        session
            .set_control(ControlId::ResolutionIndex, 1)
            .expect("accepted but deferred");
        assert_eq!(session.control(ControlId::ResolutionIndex), 1);
        assert_eq!(
            shared.writes.lock().unwrap().len(),
            writes_before,
            "no device write until the next start"
        );
    }

    #[test]
    fn idle_control_set_only_updates_the_cache() {
        let (mut session, shared) = session_with(|_| {});
        session.set_control(ControlId::Saturation, 200).expect("cached");
        assert_eq!(session.control(ControlId::Saturation), 200);
        assert!(shared.writes.lock().unwrap().is_empty());
        assert!(session.set_control(ControlId::Saturation, 300).is_err());
    }

    #[test]
    fn stop_resets_counters_and_restart_is_clean() {
        let (mut session, shared) = session_with(|_| {});
        session.start().expect("start");
        fill_one(&mut session, &shared).expect("fill");
        assert_eq!(session.frames_emitted(), 1);

        session.stop();
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.frames_emitted(), 0);
        assert_eq!(session.frames_pulled(), 0);
        assert_eq!(session.frames_available(), 0);
        assert!(!session.device_present());

        session.start().expect("restart");
        let status = fill_one(&mut session, &shared).expect("fill after restart");
        let FillStatus::Delivered(meta) = status else {
            panic!("expected a delivered frame");
        };
        assert_eq!(meta.offset, 0, "emission restarts from zero");
    }

    #[test]
    fn second_start_is_rejected_and_harmless() {
        let (mut session, _shared) = session_with(|_| {});
        session.start().expect("start");
        assert!(matches!(session.start(), Err(SourceError::AlreadyRunning)));
        assert!(session.is_running());
    }

    #[test]
    fn fill_requires_a_running_session() {
        let (mut session, _shared) = session_with(|_| {});
        let mut buf = vec![0u8; 64];
        assert!(matches!(
            session.fill_frame(&mut buf),
            Err(SourceError::NotRunning)
        ));
    }

    #[test]
    fn awb_trigger_is_exclusive_until_completion() {
        let (mut session, shared) = session_with(|_| {});
        session.start().expect("start");

        session.trigger_white_balance(AwbKind::Rgb).expect("first trigger");
        assert_eq!(session.white_balance_active(), Some(AwbKind::Rgb));
        assert_eq!(shared.awb_requests.lock().unwrap().as_slice(), &[AwbKind::Rgb]);

        // Second trigger of either kind is a no-op while one is in flight.
        session.trigger_white_balance(AwbKind::TempTint).expect("no-op");
        assert_eq!(shared.awb_requests.lock().unwrap().len(), 1);

        shared.signal_awb_done(AwbKind::Rgb);
        assert_eq!(session.white_balance_active(), None);

        session
            .trigger_white_balance(AwbKind::TempTint)
            .expect("free again");
        assert_eq!(shared.awb_requests.lock().unwrap().len(), 2);
    }
}
