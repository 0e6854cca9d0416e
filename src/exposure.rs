/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

//! Preview to still-capture exposure transfer.
//!
//! While previewing, the sensor runs its own AE/AG loop. Before a still
//! capture that loop is frozen and its result is carried over to the
//! capture mode's slower frame timing, so that the capture sees the same
//! net brightness. All arithmetic truncates in a fixed order; regrouping
//! any of the products changes the rounded result.

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::i2c::{Write, WriteRead};

use crate::clock::{
    FrameGeometry, PllRegisters, TimingDescriptor, TimingError, TimingSlot,
};
use crate::config::{CaptureGainMode, Config, DenoiseMode, MAX_CAPTURE_FRAMES};
use crate::gain::{capture_gain, MIN_CAPTURE_GAIN};
use crate::registers::{ExposureRegisters, SystemRegisters};
use crate::state::PowerLineFrequency;
use crate::tables::RegisterTables;
use crate::{Error, Ov5640, PowerControl};

/// Ceiling for the capture gain register
pub const MAX_CAPTURE_GAIN: u8 = 0xf8;

/// Preview AE/AG result as split across the sensor registers
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PreviewExposure {
    pub gain: u8,
    /// Low nibble is fractional
    pub exposure_low: u8,
    pub exposure_mid: u8,
    pub exposure_high: u8,
}

impl Default for PreviewExposure {
    fn default() -> Self {
        Self {
            gain: 0x28,
            exposure_low: 0x00,
            exposure_mid: 0x3d,
            exposure_high: 0x00,
        }
    }
}

impl PreviewExposure {
    /// Exposure in whole lines
    pub fn lines(&self) -> u32 {
        (self.exposure_high as u32) << 12
            | (self.exposure_mid as u32) << 4
            | (self.exposure_low as u32) >> 4
    }
}

/// Split a line count into (low, mid, high) register values
pub fn split_exposure(lines: u32) -> (u8, u8, u8) {
    ((lines << 4) as u8, (lines >> 4) as u8, (lines >> 12) as u8)
}

/// Everything the transfer needs to know about the preview
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CaptureInputs {
    pub preview: PreviewExposure,
    /// Preview VTS plus extra lines
    pub preview_lines: u32,
    /// Whole frames per second
    pub preview_fps: u32,
    pub luminance: u8,
    pub low_speed: bool,
    pub band_filter: PowerLineFrequency,
}

/// Register values for one still capture
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CapturePlan {
    /// Exposure before the gain rescale
    pub base_exposure: u64,
    pub exposure: u32,
    pub gain: u8,
    pub exposure_gain_product: u64,
    pub banding_step: u64,
    /// Lines per 10 ms, x1000
    pub lines_10ms: u64,
    pub vts: u16,
    pub extra_lines: u16,
    pub denoise: u8,
}

/// Capture frame rate (fps x10) after the low-speed halving
fn capture_fps(config: &Config, low_speed: bool) -> u64 {
    let fps = config.capture_fps() as u64;
    if low_speed {
        fps / 2
    } else {
        fps
    }
}

/// Capture lines per 10 ms of light period, scaled by 1000
pub fn lines_per_10ms(
    config: &Config,
    low_speed: bool,
    band_filter: PowerLineFrequency,
) -> u64 {
    let scale = match band_filter {
        PowerLineFrequency::Hz60 => 12000,
        _ => 10000,
    };
    capture_fps(config, low_speed) * config.capture_lines as u64 * 1000 / scale
}

/// Exposure carried to the capture frame timing, before any gain change:
/// `N * E_p * F_c * L_c / (L_p * F_p)`
pub fn base_exposure(
    inputs: &CaptureInputs,
    config: &Config,
) -> Result<u64, TimingError> {
    let preview_fps = inputs.preview_fps as u64 * 10;
    let denom = inputs.preview_lines as u64 * preview_fps;
    if denom == 0 {
        return Err(TimingError::TimingUnavailable);
    }
    let night = if config.night_mode == 0 {
        1
    } else {
        config.night_mode as u64
    };
    Ok(night
        * inputs.preview.lines() as u64
        * capture_fps(config, inputs.low_speed)
        * config.capture_lines as u64
        / denom)
}

/// Compute the capture exposure, gain, frame length and denoise level.
/// Returns `None` when there is nothing to transfer yet.
pub fn plan_capture(
    inputs: &CaptureInputs,
    config: &Config,
    max_frames: u32,
) -> Result<Option<CapturePlan>, TimingError> {
    let lines_10ms =
        lines_per_10ms(config, inputs.low_speed, inputs.band_filter);
    if inputs.preview_lines == 0 || lines_10ms == 0 {
        return Ok(None);
    }

    let base = base_exposure(inputs, config)?;

    let mut gain = match config.capture_gain {
        CaptureGainMode::Auto => {
            capture_gain(inputs.luminance, inputs.preview.gain) as u64
        }
        CaptureGainMode::Manual(g) => g.max(1) as u64,
    };

    let mut exposure = base * inputs.preview.gain as u64 / gain;
    let product = exposure * gain;

    let max_lines = max_frames as u64 * config.capture_lines as u64;
    if max_lines > 0 && exposure > max_lines {
        gain = product / max_lines;
        exposure = max_lines;
    }
    gain = gain.min(MAX_CAPTURE_GAIN as u64);

    // The step is only used for the re-gain check below, the exposure
    // itself is left where it is.
    let mut banding_step = 1;
    if exposure * 1000 > lines_10ms {
        banding_step = exposure * 1000 / lines_10ms;
    }
    if exposure == 0 {
        exposure = 1;
    }
    let residue =
        exposure as i64 * 1000 - banding_step as i64 * lines_10ms as i64;
    if residue * 16 > lines_10ms as i64 {
        gain = product / exposure;
    }
    let gain = gain
        .max(MIN_CAPTURE_GAIN as u64)
        .min(MAX_CAPTURE_GAIN as u64) as u8;

    let capture_lines = config.capture_lines as u64;
    let (vts, extra_lines) = if exposure > capture_lines {
        (exposure, exposure - capture_lines)
    } else {
        (capture_lines, 0)
    };

    let denoise = match config.denoise {
        DenoiseMode::Auto => (1 + gain as u32 * gain as u32 / 256) as u8,
        DenoiseMode::Fixed(level) => level,
    };

    Ok(Some(CapturePlan {
        base_exposure: base,
        exposure: exposure as u32,
        gain,
        exposure_gain_product: product,
        banding_step,
        lines_10ms,
        vts: vts.min(u16::MAX as u64) as u16,
        extra_lines: extra_lines.min(u16::MAX as u64) as u16,
        denoise,
    }))
}

impl<I2C, P, D, T, CommE> Ov5640<I2C, P, D, T>
where
    I2C: Write<Error = CommE> + WriteRead<Error = CommE>,
    P: PowerControl,
    D: DelayMs<u32>,
    T: RegisterTables,
{
    /// Sample the average scene luminance
    pub fn read_luminance(&mut self) -> Result<u8, crate::Error<CommE>> {
        let lum = self.read_reg_u8(ExposureRegisters::AvgReadout as u16)?;
        self.state.luminance = lum;
        Ok(lum)
    }

    /// Snapshot the gain, exposure and line budget the preview AE loop
    /// has settled on
    pub fn read_preview_exposure(
        &mut self,
    ) -> Result<PreviewExposure, crate::Error<CommE>> {
        let gain = self.read_reg_u8(ExposureRegisters::GainLow as u16)?;
        let exposure_low =
            self.read_reg_u8(ExposureRegisters::ExposureLow as u16)?;
        let exposure_mid =
            self.read_reg_u8(ExposureRegisters::ExposureMid as u16)?;
        let exposure_high =
            self.read_reg_u8(ExposureRegisters::ExposureHigh as u16)?;
        let vts = self.read_reg_u16(ExposureRegisters::VtsHigh as u16)?;
        let extra =
            self.read_reg_u16(ExposureRegisters::VtsExtraHigh as u16)?;

        let preview = PreviewExposure {
            gain,
            exposure_low,
            exposure_mid,
            exposure_high,
        };
        self.state.preview = preview;
        self.state.preview_lines = vts as u32 + extra as u32;
        log_debug!(
            "preview gain {} exposure {} lines {}",
            gain,
            preview.lines(),
            self.state.preview_lines
        );
        Ok(preview)
    }

    /// Write the stored preview gain and exposure back
    pub fn restore_preview_exposure(
        &mut self,
    ) -> Result<(), crate::Error<CommE>> {
        let preview = self.state.preview;
        self.write_reg_u8(ExposureRegisters::GainLow as u16, preview.gain)?;
        self.write_reg_u8(
            ExposureRegisters::ExposureLow as u16,
            preview.exposure_low,
        )?;
        self.write_reg_u8(
            ExposureRegisters::ExposureMid as u16,
            preview.exposure_mid,
        )?;
        self.write_reg_u8(
            ExposureRegisters::ExposureHigh as u16,
            preview.exposure_high,
        )?;
        Ok(())
    }

    fn capture_inputs(&self) -> CaptureInputs {
        CaptureInputs {
            preview: self.state.preview,
            preview_lines: self.state.preview_lines,
            preview_fps: self.state.preview_fps,
            luminance: self.state.luminance,
            low_speed: self.state.low_speed,
            band_filter: self.state.band_filter,
        }
    }

    /// Transfer the stored preview exposure into the capture mode.
    /// Any failed write aborts the whole transfer.
    pub fn set_capture_exposure(
        &mut self,
    ) -> Result<Option<CapturePlan>, crate::Error<CommE>> {
        let inputs = self.capture_inputs();
        let plan =
            match plan_capture(&inputs, &self.config, MAX_CAPTURE_FRAMES)? {
                Some(plan) => plan,
                None => {
                    log_debug!("no preview exposure to transfer");
                    return Ok(None);
                }
            };

        log_info!(
            "capture exposure {} gain {} vts {} extra {}",
            plan.exposure,
            plan.gain,
            plan.vts,
            plan.extra_lines
        );

        self.write_denoise_value(plan.denoise)?;

        self.write_reg_u16(ExposureRegisters::VtsHigh as u16, plan.vts)?;
        self.write_reg_u16(
            ExposureRegisters::VtsExtraHigh as u16,
            plan.extra_lines,
        )?;
        self.write_reg_u8(ExposureRegisters::GainLow as u16, plan.gain)?;

        let (low, mid, high) = split_exposure(plan.exposure);
        self.write_reg_u8(ExposureRegisters::ExposureLow as u16, low)?;
        self.write_reg_u8(ExposureRegisters::ExposureMid as u16, mid)?;
        self.write_reg_u8(ExposureRegisters::ExposureHigh as u16, high)?;

        Ok(Some(plan))
    }

    fn read_pll(&mut self) -> Result<PllRegisters, crate::Error<CommE>> {
        let pre_ctrl = self.read_reg_u8(SystemRegisters::ScPllCtrl3 as u16)?;
        let multiplier =
            self.read_reg_u8(SystemRegisters::ScPllCtrl2 as u16)?;
        let sys_ctrl = self.read_reg_u8(SystemRegisters::ScPllCtrl1 as u16)?;
        let bit_mode = self.read_reg_u8(SystemRegisters::ScPllCtrl0 as u16)?;
        let root_ctrl =
            self.read_reg_u8(SystemRegisters::SysRootDivider as u16)?;
        Ok(PllRegisters {
            bit_mode,
            sys_ctrl,
            multiplier,
            pre_ctrl,
            root_ctrl,
        })
    }

    /// Derive the current frame rate and pixel clock and record them in
    /// the given slot. Nothing is recorded if either cannot be computed.
    pub fn read_timing(
        &mut self,
        slot: TimingSlot,
    ) -> Result<TimingDescriptor, crate::Error<CommE>> {
        let geometry = FrameGeometry {
            hts: self.read_reg_u16(ExposureRegisters::HtsHigh as u16)?,
            vts: self.read_reg_u16(ExposureRegisters::VtsHigh as u16)?,
            extra_lines: self
                .read_reg_u16(ExposureRegisters::VtsExtraHigh as u16)?,
        };
        let pll = self.read_pll()?;
        log_debug!(
            "pll pre {} mult {} sys {} bit {} root {}",
            pll.pre_ctrl,
            pll.multiplier,
            pll.sys_ctrl,
            pll.bit_mode,
            pll.root_ctrl
        );

        let timing = TimingDescriptor::derive(
            geometry,
            pll,
            self.config.master_clock,
            self.config.clock_div,
        )
        .map_err(Error::from)?;

        match slot {
            TimingSlot::Preview => {
                self.state.preview_fps = timing.frame_rate;
                self.state.preview_pclk = timing.pixel_clock;
            }
            TimingSlot::Diagnostic => {
                self.state.diagnostic_fps = timing.frame_rate;
                self.state.diagnostic_pclk = timing.pixel_clock;
            }
        }
        log_debug!("fps {} pclk {}", timing.frame_rate, timing.pixel_clock);
        Ok(timing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{driver, FakeBus};

    fn inputs(exposure: u32, gain: u8, luminance: u8) -> CaptureInputs {
        let (exposure_low, exposure_mid, exposure_high) =
            split_exposure(exposure);
        CaptureInputs {
            preview: PreviewExposure {
                gain,
                exposure_low,
                exposure_mid,
                exposure_high,
            },
            preview_lines: 984,
            preview_fps: 30,
            luminance,
            low_speed: false,
            band_filter: PowerLineFrequency::Hz50,
        }
    }

    #[test]
    fn exposure_lines_from_split_registers() {
        let preview = PreviewExposure {
            gain: 0x20,
            exposure_low: 0x80,
            exposure_mid: 0x3e,
            exposure_high: 0x01,
        };
        assert_eq!(preview.lines(), 0x1000 | 0x3e0 | 0x8);
        assert_eq!(split_exposure(1000), (0x80, 0x3e, 0x00));
    }

    #[test]
    fn base_exposure_truncates_in_order() {
        let config = Config::default();
        let base = base_exposure(&inputs(1000, 0x20, 0x50), &config).unwrap();
        assert_eq!(base, (1 * 1000 * 75 * 1968) / (984 * 300));
        assert_eq!(base, 500);
    }

    #[test]
    fn night_mode_scales_base_exposure() {
        let config = Config {
            night_mode: 2,
            ..Default::default()
        };
        let base = base_exposure(&inputs(1000, 0x20, 0x50), &config).unwrap();
        assert_eq!(base, 1000);
    }

    #[test]
    fn mid_luminance_plan() {
        let config = Config::default();
        let plan = plan_capture(&inputs(1000, 0x20, 0x50), &config, 4)
            .unwrap()
            .unwrap();
        assert_eq!(plan.base_exposure, 500);
        assert_eq!(plan.exposure, 500);
        assert_eq!(plan.gain, 0x20);
        assert_eq!(plan.exposure_gain_product, 16000);
        assert_eq!(plan.lines_10ms, 14760);
        assert_eq!(plan.vts, 1968);
        assert_eq!(plan.extra_lines, 0);
        assert_eq!(plan.denoise, 5);
    }

    #[test]
    fn banding_step_does_not_requantize_exposure() {
        let config = Config::default();
        let plan = plan_capture(&inputs(1000, 0x20, 0x50), &config, 4)
            .unwrap()
            .unwrap();
        // 500 lines span 33 whole bands of 14.76 lines; the exposure
        // stays at 500 rather than snapping to 33 bands.
        assert_eq!(plan.banding_step, 33);
        assert_eq!(plan.exposure, 500);
    }

    #[test]
    fn long_exposure_is_capped_at_max_frames() {
        let config = Config::default();
        let plan = plan_capture(&inputs(20000, 0x40, 0x50), &config, 4)
            .unwrap()
            .unwrap();
        assert_eq!(plan.base_exposure, 10000);
        assert_eq!(plan.exposure_gain_product, 640_000);
        assert_eq!(plan.exposure, 4 * 1968);
        assert_eq!(plan.gain as u64, 640_000 / (4 * 1968));
        assert_eq!(plan.vts, 7872);
        assert_eq!(plan.extra_lines, 7872 - 1968);
    }

    #[test]
    fn base_exposure_is_reported_untruncated() {
        let config = Config {
            night_mode: 10_000_000,
            ..Default::default()
        };
        let plan = plan_capture(&inputs(1000, 0x20, 0x50), &config, 4)
            .unwrap()
            .unwrap();
        assert_eq!(plan.base_exposure, 5_000_000_000);
        assert_eq!(plan.exposure, 4 * 1968);
        assert_eq!(plan.gain, MAX_CAPTURE_GAIN);
    }

    #[test]
    fn single_frame_cap() {
        let config = Config::default();
        let plan = plan_capture(&inputs(8000, 0x40, 0x50), &config, 1)
            .unwrap()
            .unwrap();
        // base 4000 lines, product 256000, capped to one frame
        assert_eq!(plan.exposure, 1968);
        assert_eq!(plan.gain, (256_000u64 / 1968) as u8);
    }

    #[test]
    fn manual_gain_and_fixed_denoise() {
        let config = Config {
            capture_gain: CaptureGainMode::Manual(0x40),
            denoise: DenoiseMode::Fixed(0x08),
            ..Default::default()
        };
        let plan = plan_capture(&inputs(1000, 0x20, 0x50), &config, 4)
            .unwrap()
            .unwrap();
        assert_eq!(plan.exposure, 250);
        assert_eq!(plan.denoise, 0x08);
    }

    #[test]
    fn sixty_hz_changes_band_length() {
        let config = Config::default();
        assert_eq!(
            lines_per_10ms(&config, false, PowerLineFrequency::Hz60),
            75 * 1968 * 1000 / 12000
        );
        assert_eq!(
            lines_per_10ms(&config, true, PowerLineFrequency::Hz50),
            37 * 1968 * 1000 / 10000
        );
    }

    #[test]
    fn nothing_to_transfer_without_preview_lines() {
        let config = Config::default();
        let mut inputs = inputs(1000, 0x20, 0x50);
        inputs.preview_lines = 0;
        assert_eq!(plan_capture(&inputs, &config, 4), Ok(None));
    }

    #[test]
    fn zero_preview_rate_is_unavailable() {
        let config = Config::default();
        let mut inputs = inputs(1000, 0x20, 0x50);
        inputs.preview_fps = 0;
        assert_eq!(
            plan_capture(&inputs, &config, 4),
            Err(TimingError::TimingUnavailable)
        );
    }

    fn previewing_sensor(bus: &FakeBus) -> crate::fake::FakeSensor {
        bus.set(ExposureRegisters::GainLow as u16, 0x20);
        bus.set(ExposureRegisters::ExposureLow as u16, 0x80);
        bus.set(ExposureRegisters::ExposureMid as u16, 0x3e);
        bus.set(ExposureRegisters::ExposureHigh as u16, 0x00);
        bus.set_u16(ExposureRegisters::VtsHigh as u16, 968);
        bus.set_u16(ExposureRegisters::VtsExtraHigh as u16, 16);
        bus.set(ExposureRegisters::AvgReadout as u16, 0x50);
        let mut sensor = driver(bus);
        sensor.read_luminance().unwrap();
        sensor.read_preview_exposure().unwrap();
        sensor.state.preview_fps = 30;
        sensor
    }

    #[test]
    fn preview_snapshot_reads_line_budget() {
        let bus = FakeBus::new();
        let sensor = previewing_sensor(&bus);
        assert_eq!(sensor.state().preview_lines, 984);
        assert_eq!(sensor.state().preview.lines(), 1000);
        assert_eq!(sensor.state().luminance, 0x50);
    }

    #[test]
    fn capture_writes_in_order() {
        let bus = FakeBus::new();
        let mut sensor = previewing_sensor(&bus);
        bus.clear_writes();
        sensor.set_capture_exposure().unwrap();
        let (low, mid, high) = split_exposure(500);
        assert_eq!(
            bus.writes(),
            vec![
                (0x5308, 0x10),
                (0x5306, 5),
                (0x380e, 0x07),
                (0x380f, 0xb0),
                (0x350c, 0x00),
                (0x350d, 0x00),
                (0x350b, 0x20),
                (0x3502, low),
                (0x3501, mid),
                (0x3500, high),
            ]
        );
    }

    #[test]
    fn capture_aborts_on_first_failed_write() {
        let bus = FakeBus::new();
        let mut sensor = previewing_sensor(&bus);
        bus.clear_writes();
        bus.fail_writes_after(3);
        assert!(sensor.set_capture_exposure().is_err());
        assert_eq!(bus.writes().len(), 3);
        assert!(bus.writes_to(0x350b).is_empty());
    }

    #[test]
    fn restore_writes_preview_registers() {
        let bus = FakeBus::new();
        let mut sensor = previewing_sensor(&bus);
        bus.clear_writes();
        sensor.restore_preview_exposure().unwrap();
        assert_eq!(
            bus.writes(),
            vec![(0x350b, 0x20), (0x3502, 0x80), (0x3501, 0x3e), (0x3500, 0)]
        );
    }

    #[test]
    fn timing_read_fills_requested_slot() {
        let bus = FakeBus::new();
        bus.set_u16(ExposureRegisters::HtsHigh as u16, 2200);
        bus.set_u16(ExposureRegisters::VtsHigh as u16, 1000);
        bus.set(SystemRegisters::ScPllCtrl3 as u16, 0x03);
        bus.set(SystemRegisters::ScPllCtrl2 as u16, 0x69);
        bus.set(SystemRegisters::ScPllCtrl1 as u16, 0x10);
        bus.set(SystemRegisters::ScPllCtrl0 as u16, 0x00);
        bus.set(SystemRegisters::SysRootDivider as u16, 0x01);
        let mut sensor = driver(&bus);

        let timing = sensor.read_timing(TimingSlot::Diagnostic).unwrap();
        // 24MHz / 3 * 105 / 1 / 1 / 2 = 420MHz
        assert_eq!(timing.pixel_clock, 420_000_000);
        assert_eq!(timing.frame_rate, 190);
        assert_eq!(sensor.state().diagnostic_fps, 190);
        assert_eq!(sensor.state().preview_fps, 0);
        assert!(bus.writes().is_empty());
    }

    #[test]
    fn failed_timing_read_leaves_state() {
        let bus = FakeBus::new();
        bus.set_u16(ExposureRegisters::HtsHigh as u16, 2200);
        bus.set_u16(ExposureRegisters::VtsHigh as u16, 1000);
        let mut sensor = driver(&bus);
        assert_eq!(
            sensor.read_timing(TimingSlot::Preview),
            Err(Error::ClockUnavailable)
        );
        assert_eq!(sensor.state().preview_fps, 0);
    }
}
