//! scopecam
//!
//! A live frame source bridging a callback-driven camera SDK to a
//! synchronous, pull-based consumer. The driver notifies frame arrivals from
//! its own thread; the consumer blocks for exactly one fully decoded frame
//! per request, with a bounded wait and a deterministic timeout on stall.
//!
//! # Architecture
//!
//! - [`driver`]: the device boundary. A [`CameraDriver`] opens and closes the
//!   camera, passes options through, pulls raw frames, and invokes a typed
//!   [`EventSink`](driver::EventSink) from its notifier thread. The in-tree
//!   implementation is the simulated camera in [`driver::sim`].
//! - [`signal`]: the mutex/condvar coupling between the notifier thread and
//!   the streaming thread. Arrivals only ever increment; the consumer's
//!   pulled count decides what is "new". The wait budget is fixed, so a
//!   stalled camera surfaces as a clean timeout after ~5 seconds.
//! - [`decode`]: the three output modes and the raw-sensor-to-ARGB64 lane
//!   conversions.
//! - [`controls`]: the recognized acquisition options, their bounds and
//!   defaults, and the one-shot auto-white-balance trigger state.
//! - [`session`]: the [`CaptureSession`] state machine tying the above into
//!   the consumer-facing start / negotiate / allocate / fill / stop cycle.
//!
//! # Example
//!
//! ```
//! use scopecam::driver::sim::{SimCamera, SimConfig};
//! use scopecam::{CaptureMode, CaptureSession, FillStatus};
//!
//! # fn main() -> scopecam::Result<()> {
//! let driver = SimCamera::new(SimConfig {
//!     frame_interval: std::time::Duration::from_millis(5),
//!     ..SimConfig::default()
//! });
//! let mut session = CaptureSession::new(Box::new(driver), CaptureMode::Raw12);
//! session.start()?;
//!
//! let mut frame = session.allocate_output_buffer()?;
//! match session.fill_frame(&mut frame)? {
//!     FillStatus::Delivered(meta) => assert_eq!(meta.offset, 0),
//!     FillStatus::Eos => unreachable!("no frame limit configured"),
//! }
//!
//! session.stop();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod controls;
pub mod decode;
pub mod driver;
pub mod error;
pub mod session;
pub mod signal;

pub use controls::{AwbState, ControlId, ControlRange, Controls};
pub use decode::{decode_raw12, decode_rgb48, CaptureMode, OutputFormat};
pub use driver::{AwbKind, CameraDriver, DeviceInfo, DeviceOption, DriverError, DriverEvent};
pub use error::{Result, SourceError};
pub use session::{CaptureSession, FillStatus, FrameMeta, FrameSpec, SessionState};
pub use signal::{FrameSignal, WaitTimeout};
