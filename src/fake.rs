/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

//! In-memory register file standing in for the sensor in unit tests.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::i2c::{Write, WriteRead};

use crate::config::Config;
use crate::registers::REG_DLY;
use crate::tables::{RegVal, RegisterTables, TableId};
use crate::{Ov5640, PowerControl, DEFAULT_I2C_ADDRESS};

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BusError;

#[derive(Default)]
struct Inner {
    regs: HashMap<u16, u8>,
    scripted: HashMap<u16, VecDeque<u8>>,
    writes: Vec<(u16, u8)>,
    writes_left: Option<usize>,
}

/// Shared handle: the test keeps one clone, the driver owns another.
#[derive(Clone, Default)]
pub struct FakeBus(Rc<RefCell<Inner>>);

impl FakeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, reg: u16, val: u8) {
        self.0.borrow_mut().regs.insert(reg, val);
    }

    pub fn set_u16(&self, reg: u16, val: u16) {
        self.set(reg, (val >> 8) as u8);
        self.set(reg.wrapping_add(1), val as u8);
    }

    pub fn get(&self, reg: u16) -> u8 {
        self.0.borrow().regs.get(&reg).copied().unwrap_or(0)
    }

    /// Values returned by successive reads of `reg`, before
    /// falling back to the register file
    pub fn script(&self, reg: u16, vals: &[u8]) {
        self.0
            .borrow_mut()
            .scripted
            .entry(reg)
            .or_default()
            .extend(vals.iter().copied());
    }

    pub fn writes(&self) -> Vec<(u16, u8)> {
        self.0.borrow().writes.clone()
    }

    pub fn writes_to(&self, reg: u16) -> Vec<u8> {
        self.writes()
            .into_iter()
            .filter(|&(r, _)| r == reg)
            .map(|(_, v)| v)
            .collect()
    }

    pub fn clear_writes(&self) {
        self.0.borrow_mut().writes.clear();
    }

    /// Let `count` more writes through, then fail every write
    pub fn fail_writes_after(&self, count: usize) {
        self.0.borrow_mut().writes_left = Some(count);
    }
}

impl Write for FakeBus {
    type Error = BusError;

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), BusError> {
        assert_eq!(address, DEFAULT_I2C_ADDRESS);
        assert_eq!(bytes.len(), 3);
        let mut inner = self.0.borrow_mut();
        if let Some(left) = inner.writes_left.as_mut() {
            if *left == 0 {
                return Err(BusError);
            }
            *left -= 1;
        }
        let reg = u16::from_be_bytes([bytes[0], bytes[1]]);
        inner.regs.insert(reg, bytes[2]);
        inner.writes.push((reg, bytes[2]));
        Ok(())
    }
}

impl WriteRead for FakeBus {
    type Error = BusError;

    fn write_read(
        &mut self,
        address: u8,
        bytes: &[u8],
        buffer: &mut [u8],
    ) -> Result<(), BusError> {
        assert_eq!(address, DEFAULT_I2C_ADDRESS);
        let reg = u16::from_be_bytes([bytes[0], bytes[1]]);
        let mut inner = self.0.borrow_mut();
        let scripted = inner.scripted.get_mut(&reg).and_then(|q| q.pop_front());
        buffer[0] = scripted
            .or_else(|| inner.regs.get(&reg).copied())
            .unwrap_or(0);
        Ok(())
    }
}

/// Records every line change as (line, level)
#[derive(Clone, Default)]
pub struct FakePower(Rc<RefCell<Vec<(&'static str, bool)>>>);

impl FakePower {
    pub fn calls(&self) -> Vec<(&'static str, bool)> {
        self.0.borrow().clone()
    }
}

impl PowerControl for FakePower {
    type Error = ();

    fn set_standby(&mut self, on: bool) -> Result<(), ()> {
        self.0.borrow_mut().push(("standby", on));
        Ok(())
    }

    fn set_power(&mut self, on: bool) -> Result<(), ()> {
        self.0.borrow_mut().push(("power", on));
        Ok(())
    }

    fn set_reset(&mut self, asserted: bool) -> Result<(), ()> {
        self.0.borrow_mut().push(("reset", asserted));
        Ok(())
    }
}

/// Records each requested delay
#[derive(Clone, Default)]
pub struct FakeDelay(Rc<RefCell<Vec<u32>>>);

impl FakeDelay {
    pub fn total(&self) -> u32 {
        self.0.borrow().iter().sum()
    }

    pub fn calls(&self) -> Vec<u32> {
        self.0.borrow().clone()
    }
}

impl DelayMs<u32> for FakeDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.0.borrow_mut().push(ms);
    }
}

pub const DEFAULT_TABLE: [RegVal; 4] =
    [(0x3103, 0x11), (0x3008, 0x82), (REG_DLY, 5), (0x3008, 0x42)];
pub const METERING_TABLE: [RegVal; 1] = [(0x5688, 0x11)];
pub const WINDOW_TABLE: [RegVal; 1] = [(0x3808, 0x0a)];
pub const FORMAT_TABLE: [RegVal; 1] = [(0x4300, 0x30)];
pub const SHARPNESS_AUTO_TABLE: [RegVal; 1] = [(0x5300, 0x08)];
pub const DENOISE_AUTO_TABLE: [RegVal; 1] = [(0x5304, 0x08)];
pub const LEVEL_TABLE: [RegVal; 1] = [(0x5587, 0x20)];
pub const FIRMWARE: [u8; 4] = [0x02, 0x0f, 0xd6, 0x02];

/// Serves a small table for every id except `omit`
#[derive(Default)]
pub struct FakeTables {
    pub omit: Option<TableId>,
}

impl RegisterTables for FakeTables {
    fn table(&self, id: TableId) -> Option<&'static [RegVal]> {
        if self.omit == Some(id) {
            return None;
        }
        let table: &'static [RegVal] = match id {
            TableId::Default => &DEFAULT_TABLE,
            TableId::Metering(_) => &METERING_TABLE,
            TableId::Window(_) => &WINDOW_TABLE,
            TableId::Format(_) => &FORMAT_TABLE,
            TableId::SharpnessAuto => &SHARPNESS_AUTO_TABLE,
            TableId::DenoiseAuto => &DENOISE_AUTO_TABLE,
            _ => &LEVEL_TABLE,
        };
        Some(table)
    }

    fn af_firmware(&self) -> &'static [u8] {
        &FIRMWARE
    }
}

pub type FakeSensor = Ov5640<FakeBus, FakePower, FakeDelay, FakeTables>;

pub fn driver(bus: &FakeBus) -> FakeSensor {
    driver_with(
        bus,
        &FakePower::default(),
        &FakeDelay::default(),
        FakeTables::default(),
    )
}

pub fn driver_with(
    bus: &FakeBus,
    power: &FakePower,
    delay: &FakeDelay,
    tables: FakeTables,
) -> FakeSensor {
    Ov5640::new(
        bus.clone(),
        DEFAULT_I2C_ADDRESS,
        power.clone(),
        delay.clone(),
        tables,
        Config::default(),
    )
}
