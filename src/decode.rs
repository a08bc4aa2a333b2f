//! Capture modes and raw-sensor-to-output pixel conversion.
//!
//! All rasters are row-major with no padding between rows. The two 16-bit
//! modes expand into ARGB64: four little-endian u16 lanes per pixel in the
//! order alpha, red, green, blue. Sensor samples arrive as 2-byte pairs with
//! the 12 significant bits left-justified (`value = sample << 4`, low byte
//! first), so conversion is lane placement, never arithmetic.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SourceError};

/// Byte offsets of the ARGB64 lanes within one output pixel.
const LANE_ALPHA: usize = 0;
const LANE_RED: usize = 2;
const LANE_GREEN: usize = 4;
const LANE_BLUE: usize = 6;

/// Acquisition mode, fixed for the lifetime of a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// Device delivers interleaved 3-byte RGB directly; no conversion step.
    Rgb24,
    /// 12-bit raw sensor samples, one u16 per sample, expanded to ARGB64.
    Raw12,
    /// Three u16 color samples per pixel, expanded to ARGB64.
    Rgb48,
}

impl CaptureMode {
    pub fn bytes_per_input_pixel(self) -> usize {
        match self {
            Self::Rgb24 => 3,
            Self::Raw12 => 2,
            Self::Rgb48 => 6,
        }
    }

    pub fn bytes_per_output_pixel(self) -> usize {
        match self {
            Self::Rgb24 => 3,
            Self::Raw12 | Self::Rgb48 => 8,
        }
    }

    /// Bit-depth hint handed to the driver's pull call.
    pub fn pull_bits(self) -> u32 {
        (self.bytes_per_input_pixel() * 8) as u32
    }

    pub fn output_format(self) -> OutputFormat {
        match self {
            Self::Rgb24 => OutputFormat::Rgb24,
            Self::Raw12 | Self::Rgb48 => OutputFormat::Argb64,
        }
    }

    pub fn input_byte_size(self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_input_pixel()
    }

    pub fn output_byte_size(self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_output_pixel()
    }
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rgb24 => "rgb24",
            Self::Raw12 => "raw12",
            Self::Rgb48 => "rgb48",
        };
        f.write_str(name)
    }
}

impl FromStr for CaptureMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rgb24" => Ok(Self::Rgb24),
            "raw12" => Ok(Self::Raw12),
            "rgb48" => Ok(Self::Rgb48),
            other => Err(format!(
                "unknown capture mode '{other}' (expected rgb24, raw12 or rgb48)"
            )),
        }
    }
}

/// Output pixel layout a session produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Interleaved 8-bit R, G, B.
    Rgb24,
    /// Little-endian u16 lanes: alpha, red, green, blue.
    Argb64,
}

impl OutputFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb24 => 3,
            Self::Argb64 => 8,
        }
    }
}

/// Expand a 12-bit raw sensor raster into ARGB64.
///
/// The raw stream is periodic with period 4 along each row; `x % 4` selects
/// the output lane: 1 goes to blue, 3 to red, 0 and 2 to green. This mirrors
/// the sensor readout order exactly and is not a demosaic: the other lanes of
/// each pixel, alpha included, are left as the caller provided them.
pub fn decode_raw12(input: &[u8], output: &mut [u8], width: u32, height: u32) -> Result<()> {
    let pixels = width as usize * height as usize;
    check_sizes(input, output, pixels * 2, pixels * 8)?;

    let width = width as usize;
    for row in 0..height as usize {
        for x in 0..width {
            let px = row * width + x;
            let sample = px * 2;
            let lane = match x % 4 {
                1 => LANE_BLUE,
                3 => LANE_RED,
                _ => LANE_GREEN,
            };
            let out = px * 8 + lane;
            output[out] = input[sample];
            output[out + 1] = input[sample + 1];
        }
    }
    Ok(())
}

/// Copy a 48-bit RGB raster into the ARGB64 R, G and B lanes.
///
/// Each channel is already a full left-justified u16; the copy preserves the
/// byte split. Alpha is left untouched.
pub fn decode_rgb48(input: &[u8], output: &mut [u8], width: u32, height: u32) -> Result<()> {
    let pixels = width as usize * height as usize;
    check_sizes(input, output, pixels * 6, pixels * 8)?;

    for px in 0..pixels {
        let sample = px * 6;
        let out = px * 8;
        output[out + LANE_RED..out + LANE_RED + 2].copy_from_slice(&input[sample..sample + 2]);
        output[out + LANE_GREEN..out + LANE_GREEN + 2]
            .copy_from_slice(&input[sample + 2..sample + 4]);
        output[out + LANE_BLUE..out + LANE_BLUE + 2]
            .copy_from_slice(&input[sample + 4..sample + 6]);
    }
    Ok(())
}

fn check_sizes(input: &[u8], output: &[u8], need_in: usize, need_out: usize) -> Result<()> {
    if input.len() < need_in {
        return Err(SourceError::SizeMismatch {
            expected: need_in,
            actual: input.len(),
        });
    }
    if output.len() < need_out {
        return Err(SourceError::BufferTooSmall {
            needed: need_out,
            got: output.len(),
        });
    }
    Ok(())
}
