/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/
#![cfg_attr(not(test), no_std)]

//! Control driver for the OmniVision OV5640 image sensor
//! This imaging sensor has multiple interfaces:
//! - Two-wire SCCB (i2c compatible) for configuration registers
//! - parallel or MIPI pixel data out
//! - an embedded microcontroller running the auto-focus firmware
//!
//! This driver is concerned only with the register interface: it derives
//! frame timing from the PLL, transfers the preview auto-exposure result
//! into a still-capture exposure, and drives the auto-focus coprocessor.

#[macro_use]
mod macros;

pub mod autofocus;
pub mod clock;
pub mod config;
pub mod controls;
pub mod exposure;
pub mod format;
pub mod gain;
pub mod power;
pub mod registers;
pub mod state;
pub mod tables;

#[cfg(test)]
mod fake;

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::i2c::{Write, WriteRead};

pub use crate::autofocus::{AfMode, AfSession, AfStatus, AfZone};
pub use crate::clock::{TimingDescriptor, TimingError, TimingSlot};
pub use crate::config::Config;
pub use crate::controls::{Control, ControlRange};
pub use crate::exposure::{CapturePlan, PreviewExposure};
pub use crate::format::{PixelFormat, Resolution};
pub use crate::power::{GpioPower, PowerAction, PowerControl};
pub use crate::state::{CaptureMode, FrameInterval, SensorState};
pub use crate::tables::{RegVal, RegisterTables, TableId};

use crate::registers::{SystemRegisters, CHIP_ID, REG_DLY};
use crate::state::PowerLineFrequency;

/// Errors in this crate
#[derive(Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<CommE> {
    /// Sensor communication error
    Comm(CommE),

    /// A power, standby or reset line could not be driven
    Pin,

    /// A PLL divider reads back as zero
    ClockUnavailable,

    /// Frame timing registers read back as zero
    TimingUnavailable,

    /// Control value outside its declared range
    OutOfRange,

    /// The focus firmware never reported ready
    AfFirmwareTimeout,

    /// A single-shot focus is still running
    AfBusy,

    /// The focus firmware is not loaded
    AfUnavailable,

    /// The sensor has no such control
    Unsupported,

    /// The integrator supplied no table under this name
    MissingTable(TableId),

    /// Chip id does not match an OV5640
    NotDetected,
}

impl<CommE> From<TimingError> for Error<CommE> {
    fn from(err: TimingError) -> Self {
        match err {
            TimingError::ClockUnavailable => Error::ClockUnavailable,
            TimingError::TimingUnavailable => Error::TimingUnavailable,
        }
    }
}

/// 7-bit address; 0x78 on the wire
pub const DEFAULT_I2C_ADDRESS: u8 = 0x3C;

/// Main driver struct
pub struct Ov5640<I2C, P, D, T> {
    base_address: u8,
    i2c: I2C,
    power: P,
    delay: D,
    tables: T,
    config: Config,
    state: SensorState,
}

impl<I2C, P, D, T, CommE> Ov5640<I2C, P, D, T>
where
    I2C: Write<Error = CommE> + WriteRead<Error = CommE>,
    P: PowerControl,
    D: DelayMs<u32>,
    T: RegisterTables,
{
    /// Create a new instance with an i2c address:
    /// May use DEFAULT_I2C_ADDRESS if in doubt.
    pub fn new(
        i2c: I2C,
        address: u8,
        power: P,
        delay: D,
        tables: T,
        config: Config,
    ) -> Self {
        Self {
            base_address: address,
            i2c,
            power,
            delay,
            tables,
            config,
            state: SensorState::default(),
        }
    }

    pub fn default(i2c: I2C, power: P, delay: D, tables: T) -> Self {
        Self::new(
            i2c,
            DEFAULT_I2C_ADDRESS,
            power,
            delay,
            tables,
            Config::default(),
        )
    }

    /// Give back the bus and helpers
    pub fn release(self) -> (I2C, P, D, T) {
        (self.i2c, self.power, self.delay, self.tables)
    }

    pub fn state(&self) -> &SensorState {
        &self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Second-stage configuration, run after power-on:
    /// verify the chip, load defaults and select AE metering.
    pub fn init(&mut self) -> Result<(), crate::Error<CommE>> {
        log_info!("ov5640 init start");

        self.detect()?;
        self.state = SensorState::default();
        self.apply_table(TableId::Default)?;
        self.write_band_filter(PowerLineFrequency::Hz50)?;
        self.apply_table(TableId::Metering(self.config.metering))?;

        log_info!("ov5640 init done");
        Ok(())
    }

    /// Read the chip id and check it is an OV5640
    pub fn detect(&mut self) -> Result<u16, crate::Error<CommE>> {
        let id = self.read_reg_u16(SystemRegisters::ChipIdHigh as u16)?;
        if id != CHIP_ID {
            log_error!("unexpected chip id {:#x}", id);
            return Err(Error::NotDetected);
        }
        Ok(id)
    }

    /// Read a u8 from a 16-bit address
    pub fn read_reg_u8(&mut self, reg: u16) -> Result<u8, crate::Error<CommE>> {
        let cmd_buf = reg.to_be_bytes();
        let mut recv_buf = [0u8];
        self.i2c
            .write_read(self.base_address, &cmd_buf, &mut recv_buf)
            .map_err(Error::Comm)?;
        Ok(recv_buf[0])
    }

    /// Read a u16 spread big-endian over two consecutive registers
    pub fn read_reg_u16(
        &mut self,
        reg: u16,
    ) -> Result<u16, crate::Error<CommE>> {
        let upper = (self.read_reg_u8(reg)? as u16) << 8;
        let lower = self.read_reg_u8(reg.wrapping_add(1))? as u16;
        Ok(upper | lower)
    }

    /// Write a u8 to a 16-bit address
    pub fn write_reg_u8(
        &mut self,
        reg: u16,
        val: u8,
    ) -> Result<(), crate::Error<CommE>> {
        let [hi, lo] = reg.to_be_bytes();
        let write_buf = [hi, lo, val];
        self.i2c
            .write(self.base_address, &write_buf)
            .map_err(Error::Comm)?;
        Ok(())
    }

    /// Write a u16 big-endian to two consecutive registers
    pub fn write_reg_u16(
        &mut self,
        reg: u16,
        data: u16,
    ) -> Result<(), crate::Error<CommE>> {
        // write upper u8
        self.write_reg_u8(reg, (data >> 8) as u8)?;
        // write lower u8
        self.write_reg_u8(reg.wrapping_add(1), (data & 0xFF) as u8)?;
        Ok(())
    }

    /// Read-modify-write, returning the value written
    pub fn modify_reg<F>(
        &mut self,
        reg: u16,
        f: F,
    ) -> Result<u8, crate::Error<CommE>>
    where
        F: FnOnce(u8) -> u8,
    {
        let val = f(self.read_reg_u8(reg)?);
        self.write_reg_u8(reg, val)?;
        Ok(val)
    }

    /// Write a register list in order, honoring delay entries
    pub fn write_regs(
        &mut self,
        regs: &[RegVal],
    ) -> Result<(), crate::Error<CommE>> {
        for &(reg, val) in regs {
            if reg == REG_DLY {
                self.delay_ms(val as u32);
            } else {
                self.write_reg_u8(reg, val)?;
            }
        }
        Ok(())
    }

    /// Write one of the integrator supplied tables
    pub fn apply_table(
        &mut self,
        id: TableId,
    ) -> Result<(), crate::Error<CommE>> {
        let regs = self.tables.table(id).ok_or(Error::MissingTable(id))?;
        log_debug!("apply table ({} regs)", regs.len());
        self.write_regs(regs)
    }

    pub(crate) fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }
}
