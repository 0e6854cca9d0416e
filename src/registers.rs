/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

//! OV5640 register addresses used by the control logic.
//! Per-mode calibration registers live in the externally supplied tables.

/// System and clock tree registers
#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SystemRegisters {
    /// Bit[5]: MCU reset
    SystemReset00 = 0x3000,
    /// Bit[7]: software reset, Bit[6]: software power down
    SystemCtrl0 = 0x3008,
    ChipIdHigh = 0x300a,
    ChipIdLow = 0x300b,
    PadOutputEnable01 = 0x3017,
    PadOutputEnable02 = 0x3018,
    /// Bit[3:0]: MIPI bit mode (bit-width divider selector)
    ScPllCtrl0 = 0x3034,
    /// Bit[7:4]: system clock divider
    ScPllCtrl1 = 0x3035,
    /// Bit[7:0]: PLL multiplier
    ScPllCtrl2 = 0x3036,
    /// Bit[4]: PLL root divider, Bit[3:0]: PLL pre-divider
    ScPllCtrl3 = 0x3037,
    /// Bit[1:0]: SCLK root divider
    SysRootDivider = 0x3108,
}

/// Auto-focus coprocessor mailbox
#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FocusRegisters {
    /// Command register
    Main = 0x3022,
    /// Command acknowledge, cleared by the firmware
    Ack = 0x3023,
    Para0 = 0x3024,
    Para1 = 0x3025,
    Para2 = 0x3026,
    Para3 = 0x3027,
    /// Focus result, zero when no zone converged
    Para4 = 0x3028,
    /// Firmware status
    Status = 0x3029,
    /// Firmware is loaded starting here
    FirmwareBase = 0x8000,
}

/// Exposure, gain and frame timing
#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExposureRegisters {
    /// exposure[19:16]
    ExposureHigh = 0x3500,
    /// exposure[15:8]
    ExposureMid = 0x3501,
    /// exposure[7:0], low nibble is fractional
    ExposureLow = 0x3502,
    /// Bit[1]: AGC manual, Bit[0]: AEC manual
    AecPkManual = 0x3503,
    GainLow = 0x350b,
    VtsExtraHigh = 0x350c,
    VtsExtraLow = 0x350d,
    /// Bit[0]: AWB manual
    AwbManual = 0x3406,
    HtsHigh = 0x380c,
    HtsLow = 0x380d,
    VtsHigh = 0x380e,
    VtsLow = 0x380f,
    /// Bit[2:1]: vertical flip
    TimingTcReg20 = 0x3820,
    /// Bit[2:1]: horizontal mirror
    TimingTcReg21 = 0x3821,
    /// Bit[5]: band filter enable
    AecCtrl00 = 0x3a00,
    /// Bit[2]: 50Hz when set
    LightMeter1Threshold = 0x3c00,
    LightMeter2Threshold = 0x3c01,
    /// Average scene luminance
    AvgReadout = 0x56a1,
}

/// Color interpolation (sharpness / denoise)
#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CipRegisters {
    SharpenManual = 0x5302,
    DenoiseManual = 0x5306,
    /// Bit[6]: sharpness manual, Bit[4]: denoise manual
    Ctrl = 0x5308,
}

/// Expected chip id
pub const CHIP_ID: u16 = 0x5640;

/// Marker address in a register table meaning "delay this many milliseconds"
pub const REG_DLY: u16 = 0xFFFF;
