/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

//! Mutable sensor record owned by the driver.

use crate::autofocus::AfSession;
use crate::exposure::PreviewExposure;
use crate::format::{PixelFormat, Resolution};

/// What the host pipeline is currently doing with the sensor
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CaptureMode {
    Video,
    Image,
    Preview,
}

/// Time per frame as a fraction of a second
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FrameInterval {
    pub numerator: u32,
    pub denominator: u32,
}

impl FrameInterval {
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Whole frames per second, zero if undefined
    pub fn fps(&self) -> u32 {
        if self.numerator == 0 {
            0
        } else {
            self.denominator / self.numerator
        }
    }
}

/// Anti-flicker band filter setting
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerLineFrequency {
    Disabled = 0,
    Hz50 = 1,
    Hz60 = 2,
    Auto = 3,
}

/// White balance presets
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WhiteBalance {
    Manual = 0,
    Auto = 1,
    Incandescent = 2,
    Fluorescent = 3,
    FluorescentH = 4,
    Horizon = 5,
    Daylight = 6,
    Flash = 7,
    Cloudy = 8,
    Shade = 9,
}

/// Color effects, numbered as the host framework numbers them
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ColorEffect {
    None = 0,
    BlackWhite = 1,
    Sepia = 2,
    Negative = 3,
    Emboss = 4,
    Sketch = 5,
    SkyBlue = 6,
    GrassGreen = 7,
    SkinWhiten = 8,
    Vivid = 9,
    Aqua = 10,
    ArtFreeze = 11,
    Silhouette = 12,
    Solarization = 13,
    Antique = 14,
    SetCbCr = 15,
}

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashMode {
    None = 0,
    Flash = 1,
    Torch = 2,
    Auto = 3,
    RedEye = 4,
}

/// Auto-exposure mode. Only `Auto` and `Manual` are implemented by the sensor.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ExposureMode {
    Auto = 0,
    Manual = 1,
    ShutterPriority = 2,
    AperturePriority = 3,
}

/// Frame-rate presets selectable through the control surface
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameRatePreset {
    Auto = 0,
    Fps5 = 1,
    Fps7 = 2,
    Fps10 = 3,
    Fps15 = 4,
    Fps20 = 5,
    Fps25 = 6,
    Fps30 = 7,
}

macro_rules! impl_from_raw {
    ($ty:ident { $($variant:ident = $raw:literal),* $(,)? }) => {
        impl $ty {
            /// Decode a raw control value
            pub fn from_raw(raw: i32) -> Option<Self> {
                match raw {
                    $($raw => Some($ty::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

impl_from_raw!(PowerLineFrequency { Disabled = 0, Hz50 = 1, Hz60 = 2, Auto = 3 });
impl_from_raw!(WhiteBalance {
    Manual = 0, Auto = 1, Incandescent = 2, Fluorescent = 3, FluorescentH = 4,
    Horizon = 5, Daylight = 6, Flash = 7, Cloudy = 8, Shade = 9,
});
impl_from_raw!(ColorEffect {
    None = 0, BlackWhite = 1, Sepia = 2, Negative = 3, Emboss = 4, Sketch = 5,
    SkyBlue = 6, GrassGreen = 7, SkinWhiten = 8, Vivid = 9, Aqua = 10,
    ArtFreeze = 11, Silhouette = 12, Solarization = 13, Antique = 14, SetCbCr = 15,
});
impl_from_raw!(FlashMode { None = 0, Flash = 1, Torch = 2, Auto = 3, RedEye = 4 });
impl_from_raw!(ExposureMode {
    Auto = 0, Manual = 1, ShutterPriority = 2, AperturePriority = 3,
});
impl_from_raw!(FrameRatePreset {
    Auto = 0, Fps5 = 1, Fps7 = 2, Fps10 = 3, Fps15 = 4, Fps20 = 5, Fps25 = 6, Fps30 = 7,
});

/// Everything the driver remembers between operations.
///
/// The preview exposure fields only describe the scene once they have
/// been read back from the sensor; until then `preview_lines` is zero
/// and the capture transfer does nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorState {
    pub preview: PreviewExposure,
    /// Exposure line budget of the preview mode (VTS + extra lines)
    pub preview_lines: u32,
    /// Whole fps measured while previewing
    pub preview_fps: u32,
    pub preview_pclk: u64,
    /// Rate reported after the last mode change
    pub diagnostic_fps: u32,
    pub diagnostic_pclk: u64,
    /// Last scene luminance sample
    pub luminance: u8,

    pub width: u16,
    pub height: u16,
    pub resolution: Option<Resolution>,
    pub format: Option<PixelFormat>,
    pub interval: FrameInterval,
    pub capture_mode: CaptureMode,
    pub low_speed: bool,
    pub preview_first: bool,

    pub brightness: i32,
    pub contrast: i32,
    pub saturation: i32,
    pub exposure_bias: i32,
    pub sharpness: i32,
    pub hflip: bool,
    pub vflip: bool,
    pub autogain: bool,
    pub autoexp: ExposureMode,
    pub autowb: bool,
    pub white_balance: WhiteBalance,
    pub color_effect: ColorEffect,
    pub flash_mode: FlashMode,
    pub band_filter: PowerLineFrequency,
    pub frame_rate: FrameRatePreset,

    pub af: AfSession,
}

impl Default for SensorState {
    fn default() -> Self {
        Self {
            preview: PreviewExposure::default(),
            preview_lines: 0,
            preview_fps: 0,
            preview_pclk: 0,
            diagnostic_fps: 0,
            diagnostic_pclk: 0,
            luminance: 0xff,
            width: 0,
            height: 0,
            resolution: None,
            format: None,
            interval: FrameInterval::new(1, 30),
            capture_mode: CaptureMode::Preview,
            low_speed: false,
            preview_first: true,
            brightness: 0,
            contrast: 0,
            saturation: 0,
            exposure_bias: 0,
            sharpness: 0,
            hflip: false,
            vflip: false,
            autogain: true,
            autoexp: ExposureMode::Auto,
            autowb: true,
            white_balance: WhiteBalance::Auto,
            color_effect: ColorEffect::None,
            flash_mode: FlashMode::None,
            band_filter: PowerLineFrequency::Hz50,
            frame_rate: FrameRatePreset::Auto,
            af: AfSession::default(),
        }
    }
}
