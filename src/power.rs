/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

//! Power, standby and reset sequencing.

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::i2c::{Write, WriteRead};
use embedded_hal::digital::v2::OutputPin;

use crate::autofocus::AfSession;
use crate::tables::{
    RegisterTables, OUTPUT_DISABLE, OUTPUT_ENABLE, SOFT_STANDBY_OFF,
    SOFT_STANDBY_ON,
};
use crate::{Error, Ov5640};

/// The three control lines of the sensor module.
/// Each call is a single edge; settle times are the driver's job.
pub trait PowerControl {
    type Error;

    /// Drive PWDN: `true` puts the sensor in hardware standby
    fn set_standby(&mut self, on: bool) -> Result<(), Self::Error>;

    /// Switch the module supply
    fn set_power(&mut self, on: bool) -> Result<(), Self::Error>;

    /// `true` holds the sensor in reset
    fn set_reset(&mut self, asserted: bool) -> Result<(), Self::Error>;
}

/// [`PowerControl`] over plain GPIO lines.
/// PWDN is active high, RESET is active low, POWER_EN is active high.
pub struct GpioPower<PWDN, RST, PWR> {
    pwdn: PWDN,
    reset: RST,
    power_en: PWR,
}

impl<PWDN, RST, PWR> GpioPower<PWDN, RST, PWR> {
    pub fn new(pwdn: PWDN, reset: RST, power_en: PWR) -> Self {
        Self {
            pwdn,
            reset,
            power_en,
        }
    }

    pub fn release(self) -> (PWDN, RST, PWR) {
        (self.pwdn, self.reset, self.power_en)
    }
}

impl<PWDN, RST, PWR, PinE> PowerControl for GpioPower<PWDN, RST, PWR>
where
    PWDN: OutputPin<Error = PinE>,
    RST: OutputPin<Error = PinE>,
    PWR: OutputPin<Error = PinE>,
{
    type Error = PinE;

    fn set_standby(&mut self, on: bool) -> Result<(), PinE> {
        if on {
            self.pwdn.set_high()
        } else {
            self.pwdn.set_low()
        }
    }

    fn set_power(&mut self, on: bool) -> Result<(), PinE> {
        if on {
            self.power_en.set_high()
        } else {
            self.power_en.set_low()
        }
    }

    fn set_reset(&mut self, asserted: bool) -> Result<(), PinE> {
        if asserted {
            self.reset.set_low()
        } else {
            self.reset.set_high()
        }
    }
}

/// Power state transitions
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerAction {
    StandbyOn,
    StandbyOff,
    PowerOn,
    PowerOff,
}

impl<I2C, P, D, T, CommE> Ov5640<I2C, P, D, T>
where
    I2C: Write<Error = CommE> + WriteRead<Error = CommE>,
    P: PowerControl,
    D: DelayMs<u32>,
    T: RegisterTables,
{
    pub(crate) fn set_standby_line(
        &mut self,
        on: bool,
    ) -> Result<(), crate::Error<CommE>> {
        self.power.set_standby(on).map_err(|_| Error::Pin)
    }

    fn set_power_line(&mut self, on: bool) -> Result<(), crate::Error<CommE>> {
        self.power.set_power(on).map_err(|_| Error::Pin)
    }

    fn set_reset_line(
        &mut self,
        asserted: bool,
    ) -> Result<(), crate::Error<CommE>> {
        self.power.set_reset(asserted).map_err(|_| Error::Pin)
    }

    /// Run one power transition to completion
    pub fn power(
        &mut self,
        action: PowerAction,
    ) -> Result<(), crate::Error<CommE>> {
        match action {
            PowerAction::StandbyOn => {
                log_info!("standby on");
                if self.af_release().is_err() {
                    log_debug!("af release skipped");
                }
                self.write_regs(&SOFT_STANDBY_ON)?;
                self.delay_ms(10);
                self.write_regs(&OUTPUT_DISABLE)?;
                self.set_standby_line(true)?;
            }
            PowerAction::StandbyOff => {
                log_info!("standby off");
                self.delay_ms(10);
                self.set_standby_line(false)?;
                self.delay_ms(10);
                self.write_regs(&OUTPUT_ENABLE)?;
                self.write_regs(&SOFT_STANDBY_OFF)?;
                self.delay_ms(10);
            }
            PowerAction::PowerOn => {
                log_info!("power on");
                self.set_standby_line(true)?;
                self.set_reset_line(true)?;
                self.delay_ms(1);
                self.delay_ms(10);
                self.set_power_line(true)?;
                self.set_standby_line(false)?;
                self.delay_ms(10);
                self.set_reset_line(false)?;
                self.delay_ms(30);
            }
            PowerAction::PowerOff => {
                log_info!("power off");
                self.set_power_line(false)?;
                self.delay_ms(10);
                self.set_standby_line(true)?;
                self.set_reset_line(true)?;
                self.state.af = AfSession::default();
            }
        }
        Ok(())
    }

    /// Hold or release the reset line, then let it settle
    pub fn reset(&mut self, asserted: bool) -> Result<(), crate::Error<CommE>> {
        self.set_reset_line(asserted)?;
        self.delay_ms(10);
        Ok(())
    }
}
