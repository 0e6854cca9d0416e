/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

//! Register tables. Calibration tables (per resolution, per effect, ...)
//! are sensor-module specific and supplied by the integrator through
//! [`RegisterTables`]; only the short protocol sequences the driver
//! itself depends on are defined here.

use crate::config::Metering;
use crate::format::{PixelFormat, Resolution};
use crate::registers::{FocusRegisters, SystemRegisters};
use crate::state::{ColorEffect, FrameRatePreset, WhiteBalance};

/// One table entry: register address and value.
/// An address of [`crate::registers::REG_DLY`] means "delay `value` ms".
pub type RegVal = (u16, u8);

/// Sharpness levels reachable from the sharpness control
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SharpnessLevel {
    Off,
    Normal,
    High,
}

/// Names of the externally supplied tables
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TableId {
    /// Power-on defaults
    Default,
    /// Windowing and timing for one output size
    Window(Resolution),
    Format(PixelFormat),
    WhiteBalance(WhiteBalance),
    ColorEffect(ColorEffect),
    /// Levels run from -4 to 4
    Brightness(i8),
    Contrast(i8),
    Saturation(i8),
    ExposureBias(i8),
    Sharpness(SharpnessLevel),
    FrameRate(FrameRatePreset),
    SharpnessAuto,
    DenoiseAuto,
    Metering(Metering),
}

/// Source of calibration data for one sensor module
pub trait RegisterTables {
    /// The table registered under `id`, if this module has one
    fn table(&self, id: TableId) -> Option<&'static [RegVal]>;

    /// Auto-focus coprocessor firmware, loaded at
    /// [`FocusRegisters::FirmwareBase`]
    fn af_firmware(&self) -> &'static [u8];
}

/// Drive the parallel data and sync outputs
pub(crate) const OUTPUT_ENABLE: [RegVal; 2] = [
    (SystemRegisters::PadOutputEnable01 as u16, 0x7f),
    (SystemRegisters::PadOutputEnable02 as u16, 0xf0),
];

/// Tri-state the parallel outputs
pub(crate) const OUTPUT_DISABLE: [RegVal; 2] = [
    (SystemRegisters::PadOutputEnable01 as u16, 0x00),
    (SystemRegisters::PadOutputEnable02 as u16, 0x00),
];

pub(crate) const SOFT_STANDBY_ON: [RegVal; 1] =
    [(SystemRegisters::SystemCtrl0 as u16, 0x42)];

pub(crate) const SOFT_STANDBY_OFF: [RegVal; 1] =
    [(SystemRegisters::SystemCtrl0 as u16, 0x02)];

/// Hold the focus MCU in reset while its firmware is written
pub(crate) const AF_MCU_RESET: [RegVal; 1] =
    [(SystemRegisters::SystemReset00 as u16, 0x20)];

/// Clear the mailbox and release the focus MCU
pub(crate) const AF_MCU_START: [RegVal; 9] = [
    (FocusRegisters::Main as u16, 0x00),
    (FocusRegisters::Ack as u16, 0x00),
    (FocusRegisters::Para0 as u16, 0x00),
    (FocusRegisters::Para1 as u16, 0x00),
    (FocusRegisters::Para2 as u16, 0x00),
    (FocusRegisters::Para3 as u16, 0x00),
    (FocusRegisters::Para4 as u16, 0x00),
    (FocusRegisters::Status as u16, 0x7f),
    (SystemRegisters::SystemReset00 as u16, 0x00),
];
