//! Error taxonomy for the capture path.
//!
//! Every device-level failure carries the driver status so callers can log a
//! concrete code. Pull failures and sizing failures are separate variants so
//! diagnostics can tell device I/O apart from buffer arithmetic.

use crate::controls::ControlId;
use crate::driver::{DeviceOption, DriverError};
use crate::signal::WaitTimeout;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SourceError>;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// No camera could be opened. Fatal to `start()`; the session stays idle.
    #[error("no camera device found")]
    DeviceNotFound(#[source] DriverError),

    /// The device rejected an option write on the required configuration path.
    #[error("device rejected {option:?} = {value}")]
    Config {
        option: DeviceOption,
        value: i32,
        #[source]
        source: DriverError,
    },

    /// A device query or call outside the option path failed during `start()`.
    #[error("device call failed")]
    Device(#[source] DriverError),

    /// A control write was outside its documented bounds.
    #[error("{control:?} value {value} out of range [{min}, {max}]")]
    OutOfRange {
        control: ControlId,
        value: i32,
        min: i32,
        max: i32,
    },

    /// No frame arrived within the bounded wait. Fatal to the current
    /// `fill_frame` call only; the session stays running.
    #[error(transparent)]
    Timeout(#[from] WaitTimeout),

    /// The device failed to hand over a frame it signaled.
    #[error("frame pull failed")]
    Pull(#[source] DriverError),

    /// Pulled and expected byte counts disagree.
    #[error("frame size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// The caller-provided output buffer cannot hold one decoded frame.
    #[error("output buffer too small: need {needed} bytes, got {got}")]
    BufferTooSmall { needed: usize, got: usize },

    /// The proposed output format does not match the session's native one.
    #[error("proposed format rejected: only the session's native format is supported")]
    FormatRejected,

    /// The operation requires a running session.
    #[error("capture session is not running")]
    NotRunning,

    /// `start()` on a session that is already running.
    #[error("capture session is already running")]
    AlreadyRunning,
}
