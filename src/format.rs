/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

//! Output formats, window sizes and the mode-change sequence.

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::i2c::{Write, WriteRead};

use crate::autofocus::{AfMode, AfStatus, CMD_CONTINUOUS, CMD_SINGLE};
use crate::clock::TimingSlot;
use crate::registers::SystemRegisters;
use crate::state::{CaptureMode, FrameInterval, WhiteBalance};
use crate::tables::{RegisterTables, TableId, OUTPUT_DISABLE, OUTPUT_ENABLE};
use crate::{Error, Ov5640, PowerControl};

/// Pixel layouts on the parallel port
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PixelFormat {
    Yuyv,
    Yvyu,
    Uyvy,
    Vyuy,
    Rgb888,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> u8 {
        match self {
            PixelFormat::Rgb888 => 3,
            _ => 2,
        }
    }
}

pub const PIXEL_FORMATS: [PixelFormat; 5] = [
    PixelFormat::Yuyv,
    PixelFormat::Yvyu,
    PixelFormat::Uyvy,
    PixelFormat::Vyuy,
    PixelFormat::Rgb888,
];

/// Supported window sizes, largest first
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Resolution {
    /// 2592x1936
    Qsxga,
    /// 2048x1536
    Qxga,
    /// 1920x1080
    Hd1080,
    /// 1600x1200
    Uxga,
    /// 1280x960
    Sxga,
    /// 1280x720
    Hd720,
    /// 1024x768
    Xga,
    /// 800x600
    Svga,
    /// 640x480
    Vga,
    /// 320x240
    Qvga,
    /// 176x144
    Qcif,
}

pub const RESOLUTIONS: [Resolution; 11] = [
    Resolution::Qsxga,
    Resolution::Qxga,
    Resolution::Hd1080,
    Resolution::Uxga,
    Resolution::Sxga,
    Resolution::Hd720,
    Resolution::Xga,
    Resolution::Svga,
    Resolution::Vga,
    Resolution::Qvga,
    Resolution::Qcif,
];

impl Resolution {
    pub fn width(&self) -> u16 {
        self.size().0
    }

    pub fn height(&self) -> u16 {
        self.size().1
    }

    fn size(&self) -> (u16, u16) {
        match self {
            Resolution::Qsxga => (2592, 1936),
            Resolution::Qxga => (2048, 1536),
            Resolution::Hd1080 => (1920, 1080),
            Resolution::Uxga => (1600, 1200),
            Resolution::Sxga => (1280, 960),
            Resolution::Hd720 => (1280, 720),
            Resolution::Xga => (1024, 768),
            Resolution::Svga => (800, 600),
            Resolution::Vga => (640, 480),
            Resolution::Qvga => (320, 240),
            Resolution::Qcif => (176, 144),
        }
    }

    /// Largest size that fits inside the request, or the smallest size
    pub fn fit(width: u16, height: u16) -> Self {
        RESOLUTIONS
            .iter()
            .copied()
            .find(|r| r.width() <= width && r.height() <= height)
            .unwrap_or(Resolution::Qcif)
    }
}

pub fn enum_format(index: usize) -> Option<PixelFormat> {
    PIXEL_FORMATS.get(index).copied()
}

pub fn enum_size(index: usize) -> Option<Resolution> {
    RESOLUTIONS.get(index).copied()
}

/// What `set_format` would select for a request
pub fn try_format(
    format: PixelFormat,
    width: u16,
    height: u16,
) -> (PixelFormat, Resolution) {
    (format, Resolution::fit(width, height))
}

/// Frame interval at the sensor's base rate
const BASE_FPS: u32 = 30;
/// Slowest rate divider
const MAX_FPS_DIVIDER: u32 = 15;
/// Windows wider than this get the full exposure transfer
const TRANSFER_MIN_WIDTH: u16 = 800;

impl<I2C, P, D, T, CommE> Ov5640<I2C, P, D, T>
where
    I2C: Write<Error = CommE> + WriteRead<Error = CommE>,
    P: PowerControl,
    D: DelayMs<u32>,
    T: RegisterTables,
{
    pub fn frame_interval(&self) -> FrameInterval {
        self.state.interval
    }

    /// Select the capture mode and, outside still capture, the frame
    /// rate as the base rate divided by 1..=15.
    /// A zero interval selects the base rate.
    pub fn set_frame_interval(
        &mut self,
        mode: CaptureMode,
        interval: FrameInterval,
    ) -> Result<FrameInterval, crate::Error<CommE>> {
        if self.state.interval.numerator == 0 {
            return Err(Error::OutOfRange);
        }
        self.state.capture_mode = mode;
        if mode == CaptureMode::Image {
            return Ok(self.state.interval);
        }

        let unset = interval.numerator == 0 || interval.denominator == 0;
        let requested = if unset {
            FrameInterval::new(1, BASE_FPS)
        } else {
            interval
        };
        let fps = requested.fps();
        if fps == 0 {
            return Err(Error::OutOfRange);
        }
        let divider = BASE_FPS / fps;
        if divider == 0 || divider > MAX_FPS_DIVIDER {
            return Err(Error::OutOfRange);
        }

        self.state.interval = FrameInterval::new(divider, BASE_FPS);
        self.state.low_speed = BASE_FPS / divider < BASE_FPS;
        log_debug!("frame interval {}/{}", divider, BASE_FPS);
        Ok(self.state.interval)
    }

    /// Switch the output to a pixel format and window size.
    ///
    /// In still-capture mode the preview AE/AG result is frozen and
    /// carried over to the capture timing; otherwise the preview
    /// exposure is restored and the automatic loops restarted.
    pub fn set_format(
        &mut self,
        format: PixelFormat,
        width: u16,
        height: u16,
    ) -> Result<Resolution, crate::Error<CommE>> {
        let resolution = Resolution::fit(width, height);
        let mode = self.state.capture_mode;
        let previous_width = self.state.width;
        log_info!(
            "set format {}x{} mode {}",
            resolution.width(),
            resolution.height(),
            mode as u8
        );

        self.write_regs(&OUTPUT_DISABLE)?;

        if mode == CaptureMode::Image {
            if self.write_autoexp(false).is_err() {
                log_error!("manual exposure failed");
            }
            if self.write_autogain(false).is_err() {
                log_error!("manual gain failed");
            }
            if resolution.width() > TRANSFER_MIN_WIDTH {
                self.snapshot_preview();
            }
            self.write_autowb(false)?;
        }

        self.apply_table(TableId::Format(format))?;
        self.apply_table(TableId::Window(resolution))?;

        let (hflip, vflip) = (self.state.hflip, self.state.vflip);
        self.write_hflip(hflip)?;
        self.write_vflip(vflip)?;

        match mode {
            CaptureMode::Preview | CaptureMode::Video => {
                self.resume_preview(mode, resolution, previous_width)?
            }
            CaptureMode::Image => self.finish_capture(resolution)?,
        }

        self.state.width = resolution.width();
        self.state.height = resolution.height();
        self.state.resolution = Some(resolution);
        self.state.format = Some(format);

        if self.read_timing(TimingSlot::Diagnostic).is_err() {
            log_debug!("timing unavailable after mode change");
        }
        self.write_regs(&OUTPUT_ENABLE)?;
        Ok(resolution)
    }

    /// Record the scene before the automatic loops are replaced by the
    /// capture settings. Each read may fail independently.
    fn snapshot_preview(&mut self) {
        if self.read_luminance().is_err() {
            log_error!("luminance read failed");
        }
        if self.read_preview_exposure().is_err() {
            log_error!("preview exposure read failed");
        }
        if self.read_timing(TimingSlot::Preview).is_err() {
            log_debug!("preview timing unavailable");
        }
    }

    fn resume_preview(
        &mut self,
        mode: CaptureMode,
        resolution: Resolution,
        previous_width: u16,
    ) -> Result<(), crate::Error<CommE>> {
        self.restore_preview_exposure()?;
        self.write_autoexp(true)?;
        self.write_autogain(true)?;
        if self.state.white_balance == WhiteBalance::Auto {
            self.write_autowb(true)?;
        }

        if mode == CaptureMode::Video {
            let levels = match (resolution.width(), resolution.height()) {
                (640, _) => Some((0x20, 0x04)),
                (_, 960) => Some((0x08, 0x08)),
                (_, 720) => Some((0x08, 0x04)),
                (1920, _) => Some((0x08, 0x14)),
                _ => None,
            };
            match levels {
                Some((sharpness, denoise)) => {
                    self.write_sharpness_value(sharpness)?;
                    self.write_denoise_value(denoise)?;
                }
                None => {
                    self.write_sharpness_auto()?;
                    self.write_denoise_auto()?;
                }
            }
        } else {
            self.write_sharpness_value(0x20)?;
            self.write_denoise_value(0x10)?;
        }

        if self.state.low_speed {
            let settle = if self.state.preview_first { 600 } else { 200 };
            self.delay_ms(settle);
            self.state.preview_first = false;
        }

        let af = self.state.af;
        if previous_width != Resolution::Qsxga.width()
            && !self.state.preview_first
            && af.status != AfStatus::Uninitialized
        {
            self.af_relaunch_zone()?;
            self.af_command(CMD_SINGLE)?;
            if af.mode == AfMode::Continuous {
                self.af_command(CMD_CONTINUOUS)?;
            } else {
                self.state.af.status = AfStatus::Busy;
            }
            self.delay_ms(100);
        } else {
            self.delay_ms(150);
        }
        self.state.preview_first = false;
        Ok(())
    }

    fn finish_capture(
        &mut self,
        resolution: Resolution,
    ) -> Result<(), crate::Error<CommE>> {
        if resolution.width() > TRANSFER_MIN_WIDTH {
            if self.set_capture_exposure().is_err() {
                log_error!("capture exposure transfer failed");
            }
        }
        let sharpness = self.config.capture_sharpness;
        self.write_sharpness_value(sharpness)?;

        if self.state.low_speed {
            // double the system clock divider
            self.modify_reg(SystemRegisters::ScPllCtrl1 as u16, |v| {
                (v & 0x0f) | ((((v & 0xf0) as u16) << 1) as u8)
            })?;
        }
        self.delay_ms(150);
        Ok(())
    }
}
