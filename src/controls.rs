/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

//! Host control surface.
//!
//! Each control maps to a handler record holding a getter and a setter.
//! Values are range checked before any register is touched, and controls
//! whose value is cached in [`crate::SensorState`] do nothing when set
//! to the value they already hold.

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::i2c::{Write, WriteRead};

use crate::autofocus::{AfMode, AfStatus};
use crate::registers::{CipRegisters, ExposureRegisters};
use crate::state::{
    CaptureMode, ColorEffect, ExposureMode, FlashMode, FrameRatePreset,
    PowerLineFrequency, WhiteBalance,
};
use crate::tables::{RegisterTables, SharpnessLevel, TableId};
use crate::{Error, Ov5640, PowerControl};

/// 3A lock bits
pub const LOCK_EXPOSURE: i32 = 1 << 0;
pub const LOCK_WHITE_BALANCE: i32 = 1 << 1;
pub const LOCK_FOCUS: i32 = 1 << 2;

/// Focus status values reported through [`Control::AfStatus`]
pub const AF_STATUS_IDLE: i32 = 0;
pub const AF_STATUS_BUSY: i32 = 1;
pub const AF_STATUS_REACHED: i32 = 2;
pub const AF_STATUS_FAILED: i32 = 4;

const SHARPNESS_MAX: i32 = 200;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Control {
    Brightness,
    Contrast,
    Saturation,
    Hue,
    HorizontalFlip,
    VerticalFlip,
    Gain,
    AutoGain,
    ExposureBias,
    ExposureMode,
    WhiteBalancePreset,
    AutoWhiteBalance,
    ColorEffect,
    FlashMode,
    PowerLineFrequency,
    Sharpness,
    FrameRate,
    Lock3A,
    FocusAuto,
    /// Buttons: any in-range value triggers the action
    AfInit,
    AfStart,
    AfStop,
    AfRelease,
    /// Read-only
    AfStatus,
}

pub const CONTROLS: [Control; 24] = [
    Control::Brightness,
    Control::Contrast,
    Control::Saturation,
    Control::Hue,
    Control::HorizontalFlip,
    Control::VerticalFlip,
    Control::Gain,
    Control::AutoGain,
    Control::ExposureBias,
    Control::ExposureMode,
    Control::WhiteBalancePreset,
    Control::AutoWhiteBalance,
    Control::ColorEffect,
    Control::FlashMode,
    Control::PowerLineFrequency,
    Control::Sharpness,
    Control::FrameRate,
    Control::Lock3A,
    Control::FocusAuto,
    Control::AfInit,
    Control::AfStart,
    Control::AfStop,
    Control::AfRelease,
    Control::AfStatus,
];

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlRange {
    pub min: i32,
    pub max: i32,
    pub step: i32,
    pub default: i32,
}

impl ControlRange {
    const fn new(min: i32, max: i32, default: i32) -> Self {
        Self {
            min,
            max,
            step: 1,
            default,
        }
    }

    pub fn contains(&self, value: i32) -> bool {
        value >= self.min && value <= self.max
    }
}

impl Control {
    pub fn range(&self) -> ControlRange {
        match self {
            Control::Brightness
            | Control::Contrast
            | Control::Saturation
            | Control::ExposureBias => ControlRange::new(-4, 4, 0),
            Control::Hue => ControlRange::new(-180, 180, 0),
            Control::HorizontalFlip | Control::VerticalFlip => {
                ControlRange::new(0, 1, 0)
            }
            Control::Gain => ControlRange::new(0, 255, 128),
            Control::AutoGain | Control::AutoWhiteBalance => {
                ControlRange::new(0, 1, 1)
            }
            Control::ExposureMode => ControlRange::new(0, 3, 0),
            Control::WhiteBalancePreset => ControlRange::new(0, 9, 1),
            Control::ColorEffect => ControlRange::new(0, 15, 0),
            Control::FlashMode => ControlRange::new(0, 4, 0),
            Control::PowerLineFrequency => ControlRange::new(0, 3, 1),
            Control::Sharpness => ControlRange::new(0, SHARPNESS_MAX, 0),
            Control::FrameRate => ControlRange::new(0, 7, 0),
            Control::Lock3A => ControlRange::new(0, 4, 0),
            Control::FocusAuto
            | Control::AfInit
            | Control::AfStart
            | Control::AfStop
            | Control::AfRelease => ControlRange::new(0, 1, 0),
            Control::AfStatus => ControlRange::new(0, 4, 0),
        }
    }
}

type Getter<S, E> = fn(&mut S) -> Result<i32, E>;
type Setter<S, E> = fn(&mut S, i32) -> Result<(), E>;

/// Dispatch record for one control
pub struct ControlHandler<S, E> {
    pub get: Getter<S, E>,
    pub set: Setter<S, E>,
}

/// Table level from a -4..=4 control value
fn level(value: i32) -> i8 {
    value.max(-4).min(4) as i8
}

fn af_status_code(status: AfStatus) -> i32 {
    match status {
        AfStatus::Busy => AF_STATUS_BUSY,
        AfStatus::Reached => AF_STATUS_REACHED,
        AfStatus::Failed => AF_STATUS_FAILED,
        AfStatus::Idle | AfStatus::Uninitialized => AF_STATUS_IDLE,
    }
}

impl<I2C, P, D, T, CommE> Ov5640<I2C, P, D, T>
where
    I2C: Write<Error = CommE> + WriteRead<Error = CommE>,
    P: PowerControl,
    D: DelayMs<u32>,
    T: RegisterTables,
{
    /// Getter and setter for a control
    pub fn handler(control: Control) -> ControlHandler<Self, Error<CommE>> {
        type Pair<S, E> = (Getter<S, E>, Setter<S, E>);
        let (get, set): Pair<Self, Error<CommE>> = match control {
            Control::Brightness => (Self::get_brightness, Self::set_brightness),
            Control::Contrast => (Self::get_contrast, Self::set_contrast),
            Control::Saturation => (Self::get_saturation, Self::set_saturation),
            Control::Hue => (Self::unsupported_get, Self::unsupported_set),
            Control::HorizontalFlip => (Self::get_hflip, Self::set_hflip),
            Control::VerticalFlip => (Self::get_vflip, Self::set_vflip),
            Control::Gain => (Self::get_gain, Self::unsupported_set),
            Control::AutoGain => (Self::get_autogain, Self::set_autogain),
            Control::ExposureBias => {
                (Self::get_exposure_bias, Self::set_exposure_bias)
            }
            Control::ExposureMode => {
                (Self::get_exposure_mode, Self::set_exposure_mode)
            }
            Control::WhiteBalancePreset => {
                (Self::get_white_balance, Self::set_white_balance)
            }
            Control::AutoWhiteBalance => (Self::get_autowb, Self::set_autowb),
            Control::ColorEffect => {
                (Self::get_color_effect, Self::set_color_effect)
            }
            Control::FlashMode => (Self::get_flash_mode, Self::set_flash_mode),
            Control::PowerLineFrequency => {
                (Self::get_band_filter, Self::set_band_filter)
            }
            Control::Sharpness => (Self::get_sharpness, Self::set_sharpness),
            Control::FrameRate => (Self::get_frame_rate, Self::set_frame_rate),
            Control::Lock3A => (Self::get_3a_lock, Self::set_3a_lock),
            Control::FocusAuto => (Self::get_focus_auto, Self::set_focus_auto),
            Control::AfInit => (Self::button_get, Self::press_af_init),
            Control::AfStart => (Self::button_get, Self::press_af_start),
            Control::AfStop => (Self::button_get, Self::press_af_stop),
            Control::AfRelease => (Self::button_get, Self::press_af_release),
            Control::AfStatus => (Self::get_af_status, Self::unsupported_set),
        };
        ControlHandler { get, set }
    }

    pub fn get_control(
        &mut self,
        control: Control,
    ) -> Result<i32, crate::Error<CommE>> {
        (Self::handler(control).get)(self)
    }

    /// Range check, then dispatch to the control's setter
    pub fn set_control(
        &mut self,
        control: Control,
        value: i32,
    ) -> Result<(), crate::Error<CommE>> {
        if !control.range().contains(value) {
            log_debug!("control value {} out of range", value);
            return Err(Error::OutOfRange);
        }
        (Self::handler(control).set)(self, value)
    }

    fn unsupported_get(&mut self) -> Result<i32, crate::Error<CommE>> {
        Err(Error::Unsupported)
    }

    fn unsupported_set(&mut self, _: i32) -> Result<(), crate::Error<CommE>> {
        Err(Error::Unsupported)
    }

    fn button_get(&mut self) -> Result<i32, crate::Error<CommE>> {
        Ok(0)
    }

    // --- tables indexed by level ---

    fn get_brightness(&mut self) -> Result<i32, crate::Error<CommE>> {
        Ok(self.state.brightness)
    }

    fn set_brightness(&mut self, v: i32) -> Result<(), crate::Error<CommE>> {
        if v == self.state.brightness {
            return Ok(());
        }
        self.apply_table(TableId::Brightness(level(v)))?;
        self.state.brightness = v;
        Ok(())
    }

    fn get_contrast(&mut self) -> Result<i32, crate::Error<CommE>> {
        Ok(self.state.contrast)
    }

    fn set_contrast(&mut self, v: i32) -> Result<(), crate::Error<CommE>> {
        if v == self.state.contrast {
            return Ok(());
        }
        self.apply_table(TableId::Contrast(level(v)))?;
        self.state.contrast = v;
        Ok(())
    }

    fn get_saturation(&mut self) -> Result<i32, crate::Error<CommE>> {
        Ok(self.state.saturation)
    }

    fn set_saturation(&mut self, v: i32) -> Result<(), crate::Error<CommE>> {
        if v == self.state.saturation {
            return Ok(());
        }
        self.apply_table(TableId::Saturation(level(v)))?;
        self.state.saturation = v;
        Ok(())
    }

    fn get_exposure_bias(&mut self) -> Result<i32, crate::Error<CommE>> {
        Ok(self.state.exposure_bias)
    }

    /// The preview exposure is snapshotted under manual AE/AG so a later
    /// capture starts from the pre-bias value.
    fn set_exposure_bias(&mut self, v: i32) -> Result<(), crate::Error<CommE>> {
        if v == self.state.exposure_bias {
            return Ok(());
        }
        let aec = ExposureRegisters::AecPkManual as u16;
        self.write_reg_u8(aec, 0x07)?;
        self.read_preview_exposure()?;
        self.write_reg_u8(aec, 0x00)?;
        self.state.autogain = true;
        self.state.autoexp = ExposureMode::Auto;
        self.apply_table(TableId::ExposureBias(level(v)))?;
        self.state.exposure_bias = v;
        Ok(())
    }

    // --- flips ---

    fn get_hflip(&mut self) -> Result<i32, crate::Error<CommE>> {
        Ok(self.state.hflip as i32)
    }

    fn set_hflip(&mut self, v: i32) -> Result<(), crate::Error<CommE>> {
        let on = v != 0;
        if on == self.state.hflip {
            return Ok(());
        }
        self.write_hflip(on)
    }

    fn get_vflip(&mut self) -> Result<i32, crate::Error<CommE>> {
        Ok(self.state.vflip as i32)
    }

    fn set_vflip(&mut self, v: i32) -> Result<(), crate::Error<CommE>> {
        let on = v != 0;
        if on == self.state.vflip {
            return Ok(());
        }
        self.write_vflip(on)
    }

    fn write_flip(
        &mut self,
        reg: ExposureRegisters,
        on: bool,
    ) -> Result<(), crate::Error<CommE>> {
        self.modify_reg(reg as u16, |v| if on { v | 0x06 } else { v & 0xf9 })?;
        self.delay_ms(10);
        Ok(())
    }

    pub(crate) fn write_hflip(
        &mut self,
        on: bool,
    ) -> Result<(), crate::Error<CommE>> {
        self.write_flip(ExposureRegisters::TimingTcReg21, on)?;
        self.state.hflip = on;
        Ok(())
    }

    pub(crate) fn write_vflip(
        &mut self,
        on: bool,
    ) -> Result<(), crate::Error<CommE>> {
        self.write_flip(ExposureRegisters::TimingTcReg20, on)?;
        self.state.vflip = on;
        Ok(())
    }

    // --- exposure, gain, white balance loops ---

    fn get_gain(&mut self) -> Result<i32, crate::Error<CommE>> {
        Ok(self.read_reg_u8(ExposureRegisters::GainLow as u16)? as i32)
    }

    fn get_autogain(&mut self) -> Result<i32, crate::Error<CommE>> {
        Ok(self.state.autogain as i32)
    }

    fn set_autogain(&mut self, v: i32) -> Result<(), crate::Error<CommE>> {
        let on = v != 0;
        if on == self.state.autogain {
            return Ok(());
        }
        self.write_autogain(on)
    }

    /// Bit 1 of the AEC/AGC register selects manual gain
    pub(crate) fn write_autogain(
        &mut self,
        on: bool,
    ) -> Result<(), crate::Error<CommE>> {
        self.modify_reg(ExposureRegisters::AecPkManual as u16, |v| {
            if on {
                v & 0xfd
            } else {
                v | 0x02
            }
        })?;
        self.state.autogain = on;
        Ok(())
    }

    fn get_exposure_mode(&mut self) -> Result<i32, crate::Error<CommE>> {
        Ok(self.state.autoexp as i32)
    }

    fn set_exposure_mode(&mut self, v: i32) -> Result<(), crate::Error<CommE>> {
        let mode = ExposureMode::from_raw(v).ok_or(Error::OutOfRange)?;
        if mode != ExposureMode::Auto && mode != ExposureMode::Manual {
            return Err(Error::OutOfRange);
        }
        if mode == self.state.autoexp {
            return Ok(());
        }
        self.write_autoexp(mode == ExposureMode::Auto)
    }

    /// Bit 0 of the AEC/AGC register selects manual exposure
    pub(crate) fn write_autoexp(
        &mut self,
        on: bool,
    ) -> Result<(), crate::Error<CommE>> {
        self.modify_reg(ExposureRegisters::AecPkManual as u16, |v| {
            if on {
                v & 0xfe
            } else {
                v | 0x01
            }
        })?;
        self.state.autoexp = if on {
            ExposureMode::Auto
        } else {
            ExposureMode::Manual
        };
        Ok(())
    }

    fn get_autowb(&mut self) -> Result<i32, crate::Error<CommE>> {
        Ok(self.state.autowb as i32)
    }

    fn set_autowb(&mut self, v: i32) -> Result<(), crate::Error<CommE>> {
        let on = v != 0;
        if on == self.state.autowb {
            return Ok(());
        }
        self.write_autowb(on)
    }

    pub(crate) fn write_autowb(
        &mut self,
        on: bool,
    ) -> Result<(), crate::Error<CommE>> {
        self.modify_reg(ExposureRegisters::AwbManual as u16, |v| {
            if on {
                v & 0xfe
            } else {
                v | 0x01
            }
        })?;
        self.state.autowb = on;
        Ok(())
    }

    fn get_white_balance(&mut self) -> Result<i32, crate::Error<CommE>> {
        Ok(self.state.white_balance as i32)
    }

    /// Ignored during still capture, where AWB is locked
    fn set_white_balance(&mut self, v: i32) -> Result<(), crate::Error<CommE>> {
        let preset = WhiteBalance::from_raw(v).ok_or(Error::OutOfRange)?;
        if self.state.capture_mode == CaptureMode::Image
            || preset == self.state.white_balance
        {
            return Ok(());
        }
        self.apply_table(TableId::WhiteBalance(preset))?;
        self.write_autowb(preset == WhiteBalance::Auto)?;
        self.state.white_balance = preset;
        Ok(())
    }

    // --- image pipeline ---

    fn get_color_effect(&mut self) -> Result<i32, crate::Error<CommE>> {
        Ok(self.state.color_effect as i32)
    }

    fn set_color_effect(&mut self, v: i32) -> Result<(), crate::Error<CommE>> {
        let effect = ColorEffect::from_raw(v).ok_or(Error::OutOfRange)?;
        if effect == self.state.color_effect {
            return Ok(());
        }
        self.apply_table(TableId::ColorEffect(effect))?;
        self.state.color_effect = effect;
        Ok(())
    }

    fn get_flash_mode(&mut self) -> Result<i32, crate::Error<CommE>> {
        Ok(self.state.flash_mode as i32)
    }

    /// The flash is driven by the host; only the mode is kept
    fn set_flash_mode(&mut self, v: i32) -> Result<(), crate::Error<CommE>> {
        self.state.flash_mode =
            FlashMode::from_raw(v).ok_or(Error::OutOfRange)?;
        Ok(())
    }

    fn get_band_filter(&mut self) -> Result<i32, crate::Error<CommE>> {
        Ok(self.state.band_filter as i32)
    }

    fn set_band_filter(&mut self, v: i32) -> Result<(), crate::Error<CommE>> {
        let freq = PowerLineFrequency::from_raw(v).ok_or(Error::OutOfRange)?;
        if freq == self.state.band_filter {
            return Ok(());
        }
        self.write_band_filter(freq)
    }

    /// Program the anti-flicker band filter.
    /// `Auto` leaves the detection to the sensor defaults.
    pub(crate) fn write_band_filter(
        &mut self,
        freq: PowerLineFrequency,
    ) -> Result<(), crate::Error<CommE>> {
        let aec = ExposureRegisters::AecCtrl00 as u16;
        match freq {
            PowerLineFrequency::Disabled => {
                self.modify_reg(aec, |v| v & 0xdf)?;
            }
            PowerLineFrequency::Hz50 | PowerLineFrequency::Hz60 => {
                let threshold = if freq == PowerLineFrequency::Hz50 {
                    0x04
                } else {
                    0x00
                };
                self.write_reg_u8(
                    ExposureRegisters::LightMeter1Threshold as u16,
                    threshold,
                )?;
                self.write_reg_u8(
                    ExposureRegisters::LightMeter2Threshold as u16,
                    0x80,
                )?;
                self.modify_reg(aec, |v| v | 0x20)?;
            }
            PowerLineFrequency::Auto => {}
        }
        self.state.band_filter = freq;
        Ok(())
    }

    fn get_sharpness(&mut self) -> Result<i32, crate::Error<CommE>> {
        Ok(self.state.sharpness)
    }

    fn set_sharpness(&mut self, v: i32) -> Result<(), crate::Error<CommE>> {
        if v == self.state.sharpness {
            return Ok(());
        }
        let level = match v {
            0 => SharpnessLevel::Off,
            SHARPNESS_MAX => SharpnessLevel::High,
            _ => SharpnessLevel::Normal,
        };
        self.apply_table(TableId::Sharpness(level))?;
        self.state.sharpness = v;
        Ok(())
    }

    /// Manual sharpening strength
    pub(crate) fn write_sharpness_value(
        &mut self,
        value: u8,
    ) -> Result<(), crate::Error<CommE>> {
        self.modify_reg(CipRegisters::Ctrl as u16, |v| v | 0x40)?;
        self.write_reg_u8(CipRegisters::SharpenManual as u16, value)
    }

    pub(crate) fn write_sharpness_auto(
        &mut self,
    ) -> Result<(), crate::Error<CommE>> {
        self.modify_reg(CipRegisters::Ctrl as u16, |v| v & 0xbf)?;
        self.apply_table(TableId::SharpnessAuto)
    }

    /// Manual denoise strength
    pub(crate) fn write_denoise_value(
        &mut self,
        value: u8,
    ) -> Result<(), crate::Error<CommE>> {
        self.modify_reg(CipRegisters::Ctrl as u16, |v| v | 0x10)?;
        self.write_reg_u8(CipRegisters::DenoiseManual as u16, value)
    }

    pub(crate) fn write_denoise_auto(
        &mut self,
    ) -> Result<(), crate::Error<CommE>> {
        self.modify_reg(CipRegisters::Ctrl as u16, |v| v & 0xef)?;
        self.apply_table(TableId::DenoiseAuto)
    }

    fn get_frame_rate(&mut self) -> Result<i32, crate::Error<CommE>> {
        Ok(self.state.frame_rate as i32)
    }

    fn set_frame_rate(&mut self, v: i32) -> Result<(), crate::Error<CommE>> {
        let preset = FrameRatePreset::from_raw(v).ok_or(Error::OutOfRange)?;
        if preset == self.state.frame_rate {
            return Ok(());
        }
        self.apply_table(TableId::FrameRate(preset))?;
        self.state.frame_rate = preset;
        Ok(())
    }

    // --- focus ---

    fn get_3a_lock(&mut self) -> Result<i32, crate::Error<CommE>> {
        let mut locks = 0;
        if self.state.af.mode != AfMode::Continuous {
            locks |= LOCK_FOCUS;
        }
        if !self.state.autowb {
            locks |= LOCK_WHITE_BALANCE;
        }
        Ok(locks)
    }

    fn set_3a_lock(&mut self, v: i32) -> Result<(), crate::Error<CommE>> {
        if v & LOCK_FOCUS != 0 {
            self.af_pause()
        } else {
            self.af_relaunch_zone()
        }
    }

    fn get_focus_auto(&mut self) -> Result<i32, crate::Error<CommE>> {
        Ok((self.state.af.mode == AfMode::Continuous) as i32)
    }

    fn set_focus_auto(&mut self, v: i32) -> Result<(), crate::Error<CommE>> {
        self.af_set_continuous(v != 0)
    }

    fn press_af_init(&mut self, _: i32) -> Result<(), crate::Error<CommE>> {
        self.af_init()
    }

    fn press_af_start(&mut self, _: i32) -> Result<(), crate::Error<CommE>> {
        self.af_start_single()
    }

    fn press_af_stop(&mut self, _: i32) -> Result<(), crate::Error<CommE>> {
        self.af_pause()
    }

    fn press_af_release(&mut self, _: i32) -> Result<(), crate::Error<CommE>> {
        self.af_release()
    }

    fn get_af_status(&mut self) -> Result<i32, crate::Error<CommE>> {
        Ok(af_status_code(self.af_status()?))
    }
}
