//! Acquisition controls: the recognized options, their bounds and defaults,
//! and the cached current values.
//!
//! The resolution selector is pre-open only: a write while running is
//! recorded and takes effect at the next start. Every other control is live,
//! which the session implements by writing through to the device whenever one
//! is set on a running session. The one-shot auto-white-balance triggers are
//! not values at all but self-clearing calibration requests, tracked by
//! [`AwbState`].

use std::sync::{Mutex, PoisonError};

use crate::driver::{AwbKind, DeviceOption};
use crate::error::{Result, SourceError};

/// Identity of a single acquisition control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlId {
    ResolutionIndex,
    HorizontalFlip,
    VerticalFlip,
    AutoExposure,
    ExposureTime,
    ExposureGain,
    Hue,
    Saturation,
    Brightness,
    Contrast,
    Gamma,
    BlackBalanceRed,
    BlackBalanceGreen,
    BlackBalanceBlue,
    WhiteBalanceGainRed,
    WhiteBalanceGainGreen,
    WhiteBalanceGainBlue,
}

/// Documented bounds and default of a control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRange {
    pub min: i32,
    pub max: i32,
    pub default: i32,
}

impl ControlId {
    /// Every control, in table order.
    pub const ALL: [ControlId; 17] = [
        ControlId::ResolutionIndex,
        ControlId::HorizontalFlip,
        ControlId::VerticalFlip,
        ControlId::AutoExposure,
        ControlId::ExposureTime,
        ControlId::ExposureGain,
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
    ];

    pub fn range(self) -> ControlRange {
        let (min, max, default) = match self {
            Self::ResolutionIndex => (0, 2, 0),
            Self::HorizontalFlip | Self::VerticalFlip => (0, 1, 0),
            Self::AutoExposure => (0, 1, 1),
            Self::ExposureTime => (0, 5_000_000, 0),
            Self::ExposureGain => (100, 300, 100),
            Self::Hue => (-180, 180, 0),
            Self::Saturation => (0, 255, 128),
            Self::Brightness => (-64, 64, 0),
            Self::Contrast => (-100, 100, 0),
            Self::Gamma => (20, 180, 100),
            Self::BlackBalanceRed | Self::BlackBalanceGreen | Self::BlackBalanceBlue => {
                (0, 255, 0)
            }
            Self::WhiteBalanceGainRed
            | Self::WhiteBalanceGainGreen
            | Self::WhiteBalanceGainBlue => (-127, 127, 0),
        };
        ControlRange { min, max, default }
    }

    /// Controls that only take effect at the next start.
    pub fn pre_open_only(self) -> bool {
        matches!(self, Self::ResolutionIndex)
    }

    /// The device option this control writes through to.
    pub fn device_option(self) -> DeviceOption {
        match self {
            Self::ResolutionIndex => DeviceOption::ResolutionIndex,
            Self::HorizontalFlip => DeviceOption::HorizontalFlip,
            Self::VerticalFlip => DeviceOption::VerticalFlip,
            Self::AutoExposure => DeviceOption::AutoExposure,
            Self::ExposureTime => DeviceOption::ExposureTime,
            Self::ExposureGain => DeviceOption::ExposureGain,
            Self::Hue => DeviceOption::Hue,
            Self::Saturation => DeviceOption::Saturation,
            Self::Brightness => DeviceOption::Brightness,
            Self::Contrast => DeviceOption::Contrast,
            Self::Gamma => DeviceOption::Gamma,
            Self::BlackBalanceRed => DeviceOption::BlackBalanceRed,
            Self::BlackBalanceGreen => DeviceOption::BlackBalanceGreen,
            Self::BlackBalanceBlue => DeviceOption::BlackBalanceBlue,
            Self::WhiteBalanceGainRed => DeviceOption::WhiteBalanceGainRed,
            Self::WhiteBalanceGainGreen => DeviceOption::WhiteBalanceGainGreen,
            Self::WhiteBalanceGainBlue => DeviceOption::WhiteBalanceGainBlue,
        }
    }
}

/// Cached control values, one slot per [`ControlId`].
#[derive(Debug, Clone)]
pub struct Controls {
    resolution_index: i32,
    hflip: i32,
    vflip: i32,
    auto_exposure: i32,
    exposure_time: i32,
    exposure_gain: i32,
    hue: i32,
    saturation: i32,
    brightness: i32,
    contrast: i32,
    gamma: i32,
    black_balance: [i32; 3],
    white_balance_gain: [i32; 3],
}

impl Default for Controls {
    fn default() -> Self {
        let d = |id: ControlId| id.range().default;
        Self {
            resolution_index: d(ControlId::ResolutionIndex),
            hflip: d(ControlId::HorizontalFlip),
            vflip: d(ControlId::VerticalFlip),
            auto_exposure: d(ControlId::AutoExposure),
            exposure_time: d(ControlId::ExposureTime),
            exposure_gain: d(ControlId::ExposureGain),
            hue: d(ControlId::Hue),
            saturation: d(ControlId::Saturation),
            brightness: d(ControlId::Brightness),
            contrast: d(ControlId::Contrast),
            gamma: d(ControlId::Gamma),
            black_balance: [d(ControlId::BlackBalanceRed); 3],
            white_balance_gain: [d(ControlId::WhiteBalanceGainRed); 3],
        }
    }
}

impl Controls {
    pub fn get(&self, id: ControlId) -> i32 {
        match id {
            ControlId::ResolutionIndex => self.resolution_index,
            ControlId::HorizontalFlip => self.hflip,
            ControlId::VerticalFlip => self.vflip,
            ControlId::AutoExposure => self.auto_exposure,
            ControlId::ExposureTime => self.exposure_time,
            ControlId::ExposureGain => self.exposure_gain,
            ControlId::Hue => self.hue,
            ControlId::Saturation => self.saturation,
            ControlId::Brightness => self.brightness,
            ControlId::Contrast => self.contrast,
            ControlId::Gamma => self.gamma,
            ControlId::BlackBalanceRed => self.black_balance[0],
            ControlId::BlackBalanceGreen => self.black_balance[1],
            ControlId::BlackBalanceBlue => self.black_balance[2],
            ControlId::WhiteBalanceGainRed => self.white_balance_gain[0],
            ControlId::WhiteBalanceGainGreen => self.white_balance_gain[1],
            ControlId::WhiteBalanceGainBlue => self.white_balance_gain[2],
        }
    }

    /// Validate against the control's bounds and update the cache.
    pub fn set(&mut self, id: ControlId, value: i32) -> Result<()> {
        let range = id.range();
        if value < range.min || value > range.max {
            return Err(SourceError::OutOfRange {
                control: id,
                value,
                min: range.min,
                max: range.max,
            });
        }
        match id {
            ControlId::ResolutionIndex => self.resolution_index = value,
            ControlId::HorizontalFlip => self.hflip = value,
            ControlId::VerticalFlip => self.vflip = value,
            ControlId::AutoExposure => self.auto_exposure = value,
            ControlId::ExposureTime => self.exposure_time = value,
            ControlId::ExposureGain => self.exposure_gain = value,
            ControlId::Hue => self.hue = value,
            ControlId::Saturation => self.saturation = value,
            ControlId::Brightness => self.brightness = value,
            ControlId::Contrast => self.contrast = value,
            ControlId::Gamma => self.gamma = value,
            ControlId::BlackBalanceRed => self.black_balance[0] = value,
            ControlId::BlackBalanceGreen => self.black_balance[1] = value,
            ControlId::BlackBalanceBlue => self.black_balance[2] = value,
            ControlId::WhiteBalanceGainRed => self.white_balance_gain[0] = value,
            ControlId::WhiteBalanceGainGreen => self.white_balance_gain[1] = value,
            ControlId::WhiteBalanceGainBlue => self.white_balance_gain[2] = value,
        }
        Ok(())
    }

    pub fn auto_exposure(&self) -> bool {
        self.auto_exposure != 0
    }
}

/// In-progress marker for the one-shot auto-white-balance calibrations.
///
/// At most one calibration of either kind runs at a time; triggering while
/// one is in flight is a no-op. The driver's completion event clears it.
#[derive(Debug, Default)]
pub struct AwbState {
    active: Mutex<Option<AwbKind>>,
}

impl AwbState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a calibration as started. Returns false, changing nothing, if a
    /// calibration of either kind is already in flight.
    pub fn try_begin(&self, kind: AwbKind) -> bool {
        let mut active = self.lock();
        if active.is_some() {
            return false;
        }
        *active = Some(kind);
        true
    }

    /// Clear the marker when the matching completion event arrives.
    pub fn finish(&self, kind: AwbKind) {
        let mut active = self.lock();
        if *active == Some(kind) {
            *active = None;
        }
    }

    pub fn active(&self) -> Option<AwbKind> {
        *self.lock()
    }

    pub fn clear(&self) {
        *self.lock() = None;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<AwbKind>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
