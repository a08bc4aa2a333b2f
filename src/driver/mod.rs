//! Device-driver boundary.
//!
//! Everything the capture session needs from a camera is behind
//! [`CameraDriver`]: open/close, geometry and option passthroughs, the
//! asynchronous frame-ready notification, and the synchronous frame pull.
//! All calls are synchronous except the event sink, which the driver invokes
//! from its own thread whenever it has something to report.

pub mod sim;

use std::sync::Arc;

/// Symbolic pixel-format option values understood by the driver.
pub mod pixel_format {
    pub const RAW8: i32 = 0;
    pub const RAW12: i32 = 2;
    pub const RGB48: i32 = 7;
}

/// Symbolic byte-order option values for the 24-bit color path.
pub mod byte_order {
    pub const RGB: i32 = 0;
    pub const BGR: i32 = 1;
}

/// Option keys the session writes through to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceOption {
    /// Still-resolution selector; only meaningful before capture starts.
    ResolutionIndex,
    HorizontalFlip,
    VerticalFlip,
    AutoExposure,
    /// Exposure time in microseconds.
    ExposureTime,
    /// Analog gain as a percentage.
    ExposureGain,
    Hue,
    Saturation,
    Brightness,
    Contrast,
    Gamma,
    /// One of the [`pixel_format`] values.
    PixelFormat,
    /// One of the [`byte_order`] values.
    ByteOrder,
    BlackBalanceRed,
    BlackBalanceGreen,
    BlackBalanceBlue,
    WhiteBalanceGainRed,
    WhiteBalanceGainGreen,
    WhiteBalanceGainBlue,
}

/// Which one-shot auto-white-balance calibration to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwbKind {
    /// Calibrate the per-channel RGB gains.
    Rgb,
    /// Calibrate color temperature and tint.
    TempTint,
}

/// Notifications delivered on the driver's own thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverEvent {
    /// A new frame is ready to be pulled.
    FrameReady,
    /// A one-shot auto-white-balance calibration finished.
    AwbDone(AwbKind),
}

/// Typed callback the driver invokes for every event.
pub type EventSink = Arc<dyn Fn(DriverEvent) + Send + Sync>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum DriverError {
    #[error("no camera device present")]
    NoDevice,

    #[error("device is not open")]
    NotOpen,

    /// The device returned a failure status.
    #[error("device call failed (status {0:#010x})")]
    Status(u32),

    #[error("{0:?} is not supported by this device")]
    Unsupported(DeviceOption),
}

/// Static device description, for the probe tool and the start-time dump.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub model: String,
    pub serial: String,
    pub firmware: String,
    pub hardware: String,
    pub max_bit_depth: u8,
    pub mono: bool,
    pub max_fps: u32,
    /// Selectable still resolutions, indexed by the resolution option.
    pub resolutions: Vec<(u32, u32)>,
}

/// Per-frame metadata reported by a pull.
#[derive(Debug, Clone, Copy)]
pub struct PulledFrame {
    pub width: u32,
    pub height: u32,
    /// Device-side sequence number of the pulled frame.
    pub seq: u32,
    pub flag: u32,
    /// Device timestamp in microseconds; 0 when the device reports none.
    pub timestamp_us: u64,
}

/// A camera as the capture session consumes it.
///
/// The handle the vendor SDK hands out lives inside the implementation;
/// it exists only between a successful [`open`](Self::open) and
/// [`close`](Self::close), and nothing outside the driver ever sees it.
pub trait CameraDriver: Send {
    /// Open the first usable device.
    fn open(&mut self) -> Result<(), DriverError>;

    /// Best-effort close; never fails from the caller's point of view.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    fn describe(&self) -> Result<DeviceInfo, DriverError>;

    /// Current geometry, after any resolution selection.
    fn geometry(&self) -> Result<(u32, u32), DriverError>;

    fn set_option(&mut self, option: DeviceOption, value: i32) -> Result<(), DriverError>;

    fn get_option(&self, option: DeviceOption) -> Result<i32, DriverError>;

    /// Register the event sink and begin asynchronous capture.
    ///
    /// After this returns the driver may invoke `events` from its own thread
    /// at any time until [`close`](Self::close).
    fn start_capture(&mut self, events: EventSink) -> Result<(), DriverError>;

    /// Synchronously copy the most recent signaled frame into `dest`.
    ///
    /// `bits_per_pixel` tells the device which layout to hand over; `dest`
    /// must hold a full frame in that layout.
    fn pull_frame(&mut self, dest: &mut [u8], bits_per_pixel: u32)
        -> Result<PulledFrame, DriverError>;

    /// Kick off a one-shot auto-white-balance calibration; completion is
    /// reported through the event sink.
    fn start_white_balance(&mut self, kind: AwbKind) -> Result<(), DriverError>;
}
