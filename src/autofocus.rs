/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

//! Auto-focus coprocessor.
//!
//! The sensor embeds a small MCU that runs the focus algorithm. It has
//! no firmware of its own: the driver downloads it after every power-up,
//! then talks to it through a mailbox of command, acknowledge, parameter
//! and status registers.

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::i2c::{Write, WriteRead};

use crate::registers::FocusRegisters;
use crate::tables::{RegisterTables, AF_MCU_RESET, AF_MCU_START};
use crate::{Error, Ov5640, PowerControl};

/// Status register value once the firmware is running
const FW_READY: u8 = 0x70;
/// Status polls per boot attempt
const BOOT_POLLS: u32 = 3;
/// Power-cycle retries after the first boot attempt
const BOOT_RETRIES: u32 = 2;
/// Acknowledge polls after a single-shot trigger
const ACK_POLLS: u32 = 10;

/// Mailbox commands
pub(crate) const CMD_SINGLE: u8 = 0x03;
pub(crate) const CMD_CONTINUOUS: u8 = 0x04;
const CMD_PAUSE: u8 = 0x06;
const CMD_RELEASE: u8 = 0x08;
const CMD_RELAUNCH_ZONES: u8 = 0x80;
const CMD_TOUCH_ZONE: u8 = 0x81;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AfStatus {
    /// Firmware not loaded
    Uninitialized,
    Idle,
    Busy,
    Reached,
    Failed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AfMode {
    SingleShot,
    Continuous,
}

/// Focus coprocessor state as last observed
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AfSession {
    pub status: AfStatus,
    pub mode: AfMode,
    pub zone_x: u8,
    pub zone_y: u8,
    /// Boot gave up; cleared only by a power cycle
    pub boot_failed: bool,
}

impl Default for AfSession {
    fn default() -> Self {
        Self {
            status: AfStatus::Uninitialized,
            mode: AfMode::SingleShot,
            zone_x: 0,
            zone_y: 0,
            boot_failed: false,
        }
    }
}

/// Focus window in normalized coordinates, -1000..=1000 on both axes
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AfZone {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

/// What the status register says about the current attempt
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FocusReport {
    /// Attempt over; the result register tells reached from failed
    Finished,
    Idle,
    Busy,
}

/// Decode the status register. Unknown codes read as busy in
/// single-shot mode and as idle in continuous mode.
pub fn decode_status(mode: AfMode, raw: u8) -> FocusReport {
    match mode {
        AfMode::SingleShot => match raw {
            0x10 => FocusReport::Finished,
            FW_READY => FocusReport::Idle,
            _ => FocusReport::Busy,
        },
        AfMode::Continuous => match raw {
            0x10 | 0x20 => FocusReport::Finished,
            0x00 => FocusReport::Busy,
            _ => FocusReport::Idle,
        },
    }
}

/// Map a zone to sensor-local focus coordinates for a frame size.
/// The firmware grid is 80 wide and 60 high, or 45 high for 16:9 modes.
pub fn zone_center(
    zone: &AfZone,
    width: u16,
    height: u16,
) -> Option<(u8, u8)> {
    let in_range = |v: i32| (-1000..=1000).contains(&v);
    if !(in_range(zone.x1)
        && in_range(zone.y1)
        && in_range(zone.x2)
        && in_range(zone.y2))
        || zone.x1 > zone.x2
        || zone.y1 > zone.y2
        || width == 0
        || height == 0
    {
        return None;
    }

    let w = width as i32;
    let h = height as i32;
    let xc = w * ((2000 + zone.x1 + zone.x2) / 2) / 2000;
    let yc = h * ((2000 + zone.y1 + zone.y2) / 2) / 2000;
    if xc > w || yc > h {
        return None;
    }

    let grid_y = match (width, height) {
        (1280, 720) | (1920, 1080) => 45,
        _ => 60,
    };
    let x = (xc * 80 * 2 / w + 1) / 2;
    let y = (yc * grid_y * 2 / h + 1) / 2;
    Some((x as u8, y as u8))
}

impl<I2C, P, D, T, CommE> Ov5640<I2C, P, D, T>
where
    I2C: Write<Error = CommE> + WriteRead<Error = CommE>,
    P: PowerControl,
    D: DelayMs<u32>,
    T: RegisterTables,
{
    fn af_ready(&self) -> Result<(), crate::Error<CommE>> {
        if self.state.af.status == AfStatus::Uninitialized {
            Err(Error::AfUnavailable)
        } else {
            Ok(())
        }
    }

    pub(crate) fn af_command(
        &mut self,
        cmd: u8,
    ) -> Result<(), crate::Error<CommE>> {
        self.write_reg_u8(FocusRegisters::Main as u16, cmd)
    }

    /// Download and start the focus firmware.
    ///
    /// The status register is polled for the ready code; if the MCU does
    /// not come up the sensor is cycled through hardware standby and
    /// polled again, a bounded number of times.
    pub fn af_init(&mut self) -> Result<(), crate::Error<CommE>> {
        if self.state.af.boot_failed {
            return Err(Error::AfFirmwareTimeout);
        }

        self.write_regs(&AF_MCU_RESET)?;
        let firmware = self.tables.af_firmware();
        log_info!("af firmware download ({} bytes)", firmware.len());
        let mut addr = FocusRegisters::FirmwareBase as u16;
        for &byte in firmware {
            self.write_reg_u8(addr, byte)?;
            addr = addr.wrapping_add(1);
        }
        self.write_regs(&AF_MCU_START)?;
        self.delay_ms(10);

        for attempt in 0..=BOOT_RETRIES {
            if attempt > 0 {
                log_debug!("af boot retry {}", attempt);
                self.set_standby_line(true)?;
                self.delay_ms(10);
                self.set_standby_line(false)?;
                self.delay_ms(10);
            }
            for _ in 0..BOOT_POLLS {
                let status = self.read_reg_u8(FocusRegisters::Status as u16)?;
                if status == FW_READY {
                    log_info!("af firmware ready");
                    self.state.af = AfSession {
                        status: AfStatus::Idle,
                        ..Default::default()
                    };
                    return Ok(());
                }
                self.delay_ms(5);
            }
        }

        log_error!("af firmware not ready");
        self.state.af.boot_failed = true;
        Err(Error::AfFirmwareTimeout)
    }

    /// Trigger one focus sweep over the current zone
    pub fn af_start_single(&mut self) -> Result<(), crate::Error<CommE>> {
        self.af_ready()?;
        self.write_reg_u8(FocusRegisters::Ack as u16, 0x01)?;
        self.af_command(CMD_SINGLE)?;

        let mut acked = false;
        for _ in 0..ACK_POLLS {
            if self.read_reg_u8(FocusRegisters::Ack as u16)? == 0 {
                acked = true;
                break;
            }
            self.delay_ms(1);
        }
        if !acked {
            log_debug!("af single-shot not acknowledged");
        }

        self.state.af.status = AfStatus::Busy;
        self.state.af.mode = AfMode::SingleShot;
        Ok(())
    }

    /// Switch continuous focus on or off
    pub fn af_set_continuous(
        &mut self,
        enable: bool,
    ) -> Result<(), crate::Error<CommE>> {
        self.af_ready()?;
        let af = self.state.af;
        let single_busy =
            af.mode == AfMode::SingleShot && af.status == AfStatus::Busy;
        if enable && single_busy {
            return Err(Error::AfBusy);
        }
        let mode = if enable {
            AfMode::Continuous
        } else {
            AfMode::SingleShot
        };
        if mode == af.mode {
            return Ok(());
        }

        if enable {
            self.af_command(CMD_CONTINUOUS)?;
            self.af_command(CMD_RELAUNCH_ZONES)?;
        } else {
            self.af_command(CMD_PAUSE)?;
        }
        self.state.af.mode = mode;
        self.state.af.status = AfStatus::Idle;
        Ok(())
    }

    /// Hold the lens where it is
    pub fn af_pause(&mut self) -> Result<(), crate::Error<CommE>> {
        self.af_ready()?;
        self.af_command(CMD_PAUSE)
    }

    /// Return the lens to its rest position
    pub fn af_release(&mut self) -> Result<(), crate::Error<CommE>> {
        self.af_ready()?;
        self.af_command(CMD_RELEASE)?;
        self.state.af.status = AfStatus::Idle;
        self.state.af.mode = AfMode::SingleShot;
        Ok(())
    }

    /// Re-run the firmware's zone setup with the current zone
    pub fn af_relaunch_zone(&mut self) -> Result<(), crate::Error<CommE>> {
        self.af_ready()?;
        self.write_reg_u8(FocusRegisters::Ack as u16, 0x01)?;
        self.af_command(CMD_RELAUNCH_ZONES)?;
        self.delay_ms(5);
        Ok(())
    }

    /// Focus on a window of the current frame
    pub fn af_set_zone(
        &mut self,
        zone: AfZone,
    ) -> Result<(), crate::Error<CommE>> {
        let (x, y) = zone_center(&zone, self.state.width, self.state.height)
            .ok_or(Error::OutOfRange)?;
        self.af_ready()?;
        if self.state.af.status == AfStatus::Busy {
            return Err(Error::AfBusy);
        }

        log_debug!("af zone {} {}", x, y);
        self.write_reg_u8(FocusRegisters::Para0 as u16, x)?;
        self.write_reg_u8(FocusRegisters::Para1 as u16, y)?;
        self.write_reg_u8(FocusRegisters::Ack as u16, 0x01)?;
        self.af_command(CMD_TOUCH_ZONE)?;
        self.state.af.zone_x = x;
        self.state.af.zone_y = y;
        self.af_relaunch_zone()
    }

    /// Current focus status. The coprocessor is only polled while a
    /// single-shot attempt is running; its result is reported once and
    /// the session then reads idle.
    pub fn af_status(&mut self) -> Result<AfStatus, crate::Error<CommE>> {
        let af = self.state.af;
        if af.status == AfStatus::Uninitialized {
            return Ok(AfStatus::Uninitialized);
        }
        if af.mode == AfMode::SingleShot && af.status != AfStatus::Busy {
            return Ok(af.status);
        }

        let raw = self.read_reg_u8(FocusRegisters::Status as u16)?;
        let status = match decode_status(af.mode, raw) {
            FocusReport::Finished => {
                if self.read_reg_u8(FocusRegisters::Para4 as u16)? == 0 {
                    AfStatus::Failed
                } else {
                    AfStatus::Reached
                }
            }
            FocusReport::Idle => AfStatus::Idle,
            FocusReport::Busy => AfStatus::Busy,
        };
        self.state.af.status = match (af.mode, status) {
            (AfMode::SingleShot, AfStatus::Reached)
            | (AfMode::SingleShot, AfStatus::Failed) => AfStatus::Idle,
            _ => status,
        };
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{
        driver, driver_with, FakeBus, FakeDelay, FakePower, FakeTables,
        FIRMWARE,
    };
    use crate::DEFAULT_I2C_ADDRESS;
    use embedded_hal_mock::delay::MockNoop;
    use embedded_hal_mock::i2c::{Mock as I2cMock, Transaction};

    fn reg_write(reg: u16, val: u8) -> Transaction {
        let [hi, lo] = reg.to_be_bytes();
        Transaction::write(DEFAULT_I2C_ADDRESS, vec![hi, lo, val])
    }

    fn status_read(val: u8) -> Transaction {
        Transaction::write_read(DEFAULT_I2C_ADDRESS, vec![0x30, 0x29], vec![val])
    }

    fn download() -> Vec<Transaction> {
        let mut expected = vec![reg_write(0x3000, 0x20)];
        for (i, &byte) in FIRMWARE.iter().enumerate() {
            expected.push(reg_write(0x8000 + i as u16, byte));
        }
        for reg in 0x3022..=0x3028 {
            expected.push(reg_write(reg, 0x00));
        }
        expected.push(reg_write(0x3029, 0x7f));
        expected.push(reg_write(0x3000, 0x00));
        expected
    }

    #[test]
    fn boot_succeeds_after_one_power_cycle() {
        let mut expected = download();
        expected.extend((0..3).map(|_| status_read(0xff)));
        expected.push(status_read(0x70));

        let mut i2c = I2cMock::new(&expected);
        let power = FakePower::default();
        let mut sensor = Ov5640::default(
            i2c.clone(),
            power.clone(),
            MockNoop::new(),
            FakeTables::default(),
        );
        sensor.af_init().unwrap();
        assert_eq!(sensor.state().af.status, AfStatus::Idle);
        assert_eq!(power.calls(), vec![("standby", true), ("standby", false)]);
        i2c.done();
    }

    #[test]
    fn boot_times_out_after_all_retries() {
        let mut expected = download();
        expected.extend((0..9).map(|_| status_read(0xff)));

        let mut i2c = I2cMock::new(&expected);
        let power = FakePower::default();
        let mut sensor = Ov5640::default(
            i2c.clone(),
            power.clone(),
            MockNoop::new(),
            FakeTables::default(),
        );
        assert_eq!(sensor.af_init(), Err(Error::AfFirmwareTimeout));
        assert_eq!(power.calls().len(), 4);
        // stays failed without touching the bus again
        assert_eq!(sensor.af_init(), Err(Error::AfFirmwareTimeout));
        assert_eq!(sensor.af_start_single(), Err(Error::AfUnavailable));
        i2c.done();
    }

    #[test]
    fn inverted_zone_rejected_before_any_write() {
        let expected: [Transaction; 0] = [];
        let mut i2c = I2cMock::new(&expected);
        let mut sensor = Ov5640::default(
            i2c.clone(),
            FakePower::default(),
            MockNoop::new(),
            FakeTables::default(),
        );
        sensor.state.width = 640;
        sensor.state.height = 480;
        sensor.state.af.status = AfStatus::Idle;
        let zone = AfZone {
            x1: 200,
            y1: -100,
            x2: -200,
            y2: 100,
        };
        assert_eq!(sensor.af_set_zone(zone), Err(Error::OutOfRange));
        i2c.done();
    }

    #[test]
    fn zone_limits() {
        let out = AfZone {
            x1: -1001,
            y1: 0,
            x2: 0,
            y2: 0,
        };
        assert_eq!(zone_center(&out, 640, 480), None);
        let full = AfZone {
            x1: -1000,
            y1: -1000,
            x2: 1000,
            y2: 1000,
        };
        assert_eq!(zone_center(&full, 0, 480), None);
        assert_eq!(zone_center(&full, 640, 480), Some((40, 30)));
        let corner = AfZone {
            x1: 1000,
            y1: 1000,
            x2: 1000,
            y2: 1000,
        };
        assert_eq!(zone_center(&corner, 640, 480), Some((80, 60)));
    }

    #[test]
    fn centered_zone_maps_to_grid_midpoint() {
        let zone = AfZone {
            x1: -100,
            y1: -100,
            x2: 100,
            y2: 100,
        };
        assert_eq!(zone_center(&zone, 640, 480), Some((40, 30)));
        assert_eq!(zone_center(&zone, 1280, 720), Some((40, 23)));
        assert_eq!(zone_center(&zone, 1920, 1080), Some((40, 23)));
    }

    #[test]
    fn zone_write_sequence() {
        let bus = FakeBus::new();
        let mut sensor = driver(&bus);
        sensor.state.width = 640;
        sensor.state.height = 480;
        sensor.state.af.status = AfStatus::Idle;
        let zone = AfZone {
            x1: -100,
            y1: -100,
            x2: 100,
            y2: 100,
        };
        sensor.af_set_zone(zone).unwrap();
        assert_eq!(
            bus.writes(),
            vec![
                (0x3024, 40),
                (0x3025, 30),
                (0x3023, 0x01),
                (0x3022, 0x81),
                (0x3023, 0x01),
                (0x3022, 0x80),
            ]
        );
        assert_eq!((sensor.state().af.zone_x, sensor.state().af.zone_y), (40, 30));
    }

    #[test]
    fn zone_rejected_while_busy() {
        let bus = FakeBus::new();
        let mut sensor = driver(&bus);
        sensor.state.width = 640;
        sensor.state.height = 480;
        sensor.state.af.status = AfStatus::Busy;
        let zone = AfZone {
            x1: -100,
            y1: -100,
            x2: 100,
            y2: 100,
        };
        assert_eq!(sensor.af_set_zone(zone), Err(Error::AfBusy));
        assert!(bus.writes().is_empty());
    }

    #[test]
    fn single_shot_polls_acknowledge() {
        let bus = FakeBus::new();
        bus.script(0x3023, &[0x01, 0x01, 0x00]);
        let delay = FakeDelay::default();
        let mut sensor =
            driver_with(&bus, &FakePower::default(), &delay, FakeTables::default());
        sensor.state.af.status = AfStatus::Idle;

        sensor.af_start_single().unwrap();
        assert_eq!(bus.writes(), vec![(0x3023, 0x01), (0x3022, 0x03)]);
        assert_eq!(delay.calls(), vec![1, 1]);
        assert_eq!(sensor.state().af.status, AfStatus::Busy);
    }

    #[test]
    fn single_shot_gives_up_waiting_for_acknowledge() {
        let bus = FakeBus::new();
        let delay = FakeDelay::default();
        let mut sensor =
            driver_with(&bus, &FakePower::default(), &delay, FakeTables::default());
        sensor.state.af.status = AfStatus::Idle;
        // the acknowledge register keeps the 0x01 just written
        sensor.af_start_single().unwrap();
        assert_eq!(delay.calls().len(), 10);
        assert_eq!(sensor.state().af.status, AfStatus::Busy);
    }

    #[test]
    fn single_shot_result() {
        let bus = FakeBus::new();
        let mut sensor = driver(&bus);
        sensor.state.af.status = AfStatus::Busy;

        bus.script(0x3029, &[0x00]);
        assert_eq!(sensor.af_status(), Ok(AfStatus::Busy));

        bus.script(0x3029, &[0x10]);
        bus.set(0x3028, 0x02);
        assert_eq!(sensor.af_status(), Ok(AfStatus::Reached));

        // reported once, then idle until the next trigger
        bus.set(0x3029, 0x70);
        assert_eq!(sensor.af_status(), Ok(AfStatus::Idle));
        assert_eq!(sensor.af_status(), Ok(AfStatus::Idle));
        assert_eq!(sensor.state().af.status, AfStatus::Idle);

        sensor.state.af.status = AfStatus::Busy;
        bus.script(0x3029, &[0x10]);
        bus.set(0x3028, 0x00);
        assert_eq!(sensor.af_status(), Ok(AfStatus::Failed));
        assert_eq!(sensor.af_status(), Ok(AfStatus::Idle));
    }

    #[test]
    fn continuous_status_follows_registers() {
        let bus = FakeBus::new();
        let mut sensor = driver(&bus);
        sensor.state.af.status = AfStatus::Idle;
        sensor.state.af.mode = AfMode::Continuous;

        bus.set(0x3029, 0x20);
        bus.set(0x3028, 0x00);
        assert_eq!(sensor.af_status(), Ok(AfStatus::Failed));

        bus.set(0x3028, 0x01);
        assert_eq!(sensor.af_status(), Ok(AfStatus::Reached));
        assert_eq!(sensor.af_status(), Ok(AfStatus::Reached));

        bus.set(0x3029, 0x55);
        assert_eq!(sensor.af_status(), Ok(AfStatus::Idle));

        bus.set(0x3029, 0x00);
        assert_eq!(sensor.af_status(), Ok(AfStatus::Busy));
        assert!(bus.writes().is_empty());
    }

    #[test]
    fn unknown_codes_depend_on_mode() {
        assert_eq!(decode_status(AfMode::SingleShot, 0x55), FocusReport::Busy);
        assert_eq!(decode_status(AfMode::SingleShot, 0x70), FocusReport::Idle);
        assert_eq!(decode_status(AfMode::SingleShot, 0x20), FocusReport::Busy);
        assert_eq!(decode_status(AfMode::Continuous, 0x55), FocusReport::Idle);
        assert_eq!(decode_status(AfMode::Continuous, 0x20), FocusReport::Finished);
        assert_eq!(decode_status(AfMode::Continuous, 0x00), FocusReport::Busy);
    }

    #[test]
    fn continuous_rejected_during_single_shot() {
        let bus = FakeBus::new();
        let mut sensor = driver(&bus);
        sensor.state.af.status = AfStatus::Busy;
        assert_eq!(sensor.af_set_continuous(true), Err(Error::AfBusy));
        assert!(bus.writes().is_empty());
    }

    #[test]
    fn continuous_toggle() {
        let bus = FakeBus::new();
        let mut sensor = driver(&bus);
        sensor.state.af.status = AfStatus::Idle;

        sensor.af_set_continuous(true).unwrap();
        sensor.af_set_continuous(true).unwrap();
        assert_eq!(bus.writes(), vec![(0x3022, 0x04), (0x3022, 0x80)]);
        assert_eq!(sensor.state().af.mode, AfMode::Continuous);

        bus.clear_writes();
        sensor.af_set_continuous(false).unwrap();
        assert_eq!(bus.writes(), vec![(0x3022, 0x06)]);
    }

    #[test]
    fn commands_need_firmware() {
        let bus = FakeBus::new();
        let mut sensor = driver(&bus);
        assert_eq!(sensor.af_pause(), Err(Error::AfUnavailable));
        assert_eq!(sensor.af_release(), Err(Error::AfUnavailable));
        assert_eq!(sensor.af_status(), Ok(AfStatus::Uninitialized));
        assert!(bus.writes().is_empty());
    }
}
