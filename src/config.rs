/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

//! Platform and tuning configuration fixed at driver construction.

/// How the still-capture gain is chosen
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CaptureGainMode {
    /// Derive the gain from scene luminance and preview gain
    Auto,
    /// Always use this gain
    Manual(u8),
}

/// Denoise strength applied after a capture transfer
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DenoiseMode {
    /// `1 + gain^2 / 256`
    Auto,
    Fixed(u8),
}

/// Auto-exposure metering window
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Metering {
    CenterWeighted,
    Average,
}

/// Driver configuration
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Config {
    /// External clock fed to the sensor, Hz
    pub master_clock: u32,
    /// Platform divider on the master clock (2 on some legacy SoCs)
    pub clock_div: u32,
    /// Nominal still-capture frame rate, fps x10
    pub capture_fps_x10: u32,
    /// Exposure line budget of the still-capture mode
    pub capture_lines: u32,
    /// Night-mode exposure multiplier, 0 when off
    pub night_mode: u32,
    pub capture_gain: CaptureGainMode,
    pub denoise: DenoiseMode,
    pub metering: Metering,
    /// Manual sharpness applied for still capture
    pub capture_sharpness: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            master_clock: 24_000_000,
            clock_div: 1,
            capture_fps_x10: 75,
            capture_lines: 1968,
            night_mode: 0,
            capture_gain: CaptureGainMode::Auto,
            denoise: DenoiseMode::Auto,
            metering: Metering::CenterWeighted,
            capture_sharpness: 0x18,
        }
    }
}

impl Config {
    /// Still-capture frame rate (fps x10) after the platform divider
    pub fn capture_fps(&self) -> u32 {
        self.capture_fps_x10 / self.clock_div.max(1)
    }
}

/// Number of frames a still-capture exposure may span
#[cfg(feature = "multi-frame-capture")]
pub const MAX_CAPTURE_FRAMES: u32 = 4;
#[cfg(not(feature = "multi-frame-capture"))]
pub const MAX_CAPTURE_FRAMES: u32 = 1;

/// Typical value for `CaptureGainMode::Manual` (1x)
pub const DEFAULT_MANUAL_GAIN: u8 = 0x10;

/// Typical value for `DenoiseMode::Fixed`
pub const DEFAULT_DENOISE_LEVEL: u8 = 0x08;
