/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

//! Pixel clock and frame timing derived from the sensor's PLL and
//! HTS/VTS registers. Nothing here is cached: the registers are the
//! source of truth and are read again each time a value is needed.

/// A derived timing value could not be computed from the current registers
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimingError {
    /// One of the PLL dividers reads back as zero
    ClockUnavailable,
    /// HTS or the total line count reads back as zero
    TimingUnavailable,
}

/// Raw PLL fields as read from the clock tree registers
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PllRegisters {
    /// 0x3034
    pub bit_mode: u8,
    /// 0x3035
    pub sys_ctrl: u8,
    /// 0x3036
    pub multiplier: u8,
    /// 0x3037
    pub pre_ctrl: u8,
    /// 0x3108
    pub root_ctrl: u8,
}

/// Decoded PLL dividers
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PllDividers {
    pub pre_div: u32,
    pub multiplier: u32,
    pub sys_div: u32,
    pub pll_rdiv: u32,
    pub bit_div: u32,
    pub sclk_rdiv: u32,
}

impl PllRegisters {
    /// Extract the divider fields.
    /// A zero pre-divider register value means "divide by 1".
    /// Multipliers at or above 128 only take even values.
    pub fn dividers(&self) -> PllDividers {
        let mut pre_div = (self.pre_ctrl & 0x0f) as u32;
        if pre_div == 0 {
            pre_div = 1;
        }
        let mut multiplier = self.multiplier as u32;
        if multiplier >= 128 {
            multiplier = multiplier / 2 * 2;
        }
        let sclk_rdiv = (self.root_ctrl & 0x03) as u32;

        PllDividers {
            pre_div,
            multiplier,
            sys_div: ((self.sys_ctrl & 0xf0) >> 4) as u32,
            pll_rdiv: ((self.pre_ctrl & 0x10) >> 4) as u32 + 1,
            bit_div: (self.bit_mode & 0x0f) as u32,
            sclk_rdiv: sclk_rdiv << sclk_rdiv,
        }
    }

    /// Output pixel clock in Hz for the given master clock and
    /// platform clock divider.
    pub fn pixel_clock(
        &self,
        master_clock: u32,
        clock_div: u32,
    ) -> Result<u64, TimingError> {
        self.dividers().pixel_clock(master_clock, clock_div)
    }
}

impl PllDividers {
    /// The division order matters: each step truncates.
    pub fn pixel_clock(
        &self,
        master_clock: u32,
        clock_div: u32,
    ) -> Result<u64, TimingError> {
        if self.pre_div == 0
            || self.sys_div == 0
            || self.pll_rdiv == 0
            || self.sclk_rdiv == 0
            || clock_div == 0
        {
            return Err(TimingError::ClockUnavailable);
        }

        let vco = master_clock as u64 / clock_div as u64 / self.pre_div as u64
            * self.multiplier as u64
            / self.sys_div as u64
            / self.pll_rdiv as u64;

        let scaled = match self.bit_div {
            8 => vco / 2,
            10 => vco * 2 / 5,
            _ => vco,
        };

        Ok(scaled / self.sclk_rdiv as u64)
    }
}

/// Horizontal and vertical frame totals
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FrameGeometry {
    pub hts: u16,
    pub vts: u16,
    /// Extra vertical lines inserted for banding compensation
    pub extra_lines: u16,
}

impl FrameGeometry {
    /// Total lines per frame including the extra lines
    pub fn total_lines(&self) -> u32 {
        self.vts as u32 + self.extra_lines as u32
    }

    /// Whole frames per second at the given pixel clock
    pub fn frame_rate(&self, pixel_clock: u64) -> Result<u32, TimingError> {
        let lines = self.total_lines() as u64;
        if self.hts == 0 || lines == 0 {
            return Err(TimingError::TimingUnavailable);
        }
        Ok((pixel_clock / (lines * self.hts as u64)) as u32)
    }
}

/// Timing snapshot, valid only for the operation that produced it
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimingDescriptor {
    pub pixel_clock: u64,
    pub horizontal_total: u16,
    pub vertical_total: u16,
    pub extra_vertical_lines: u16,
    pub frame_rate: u32,
}

impl TimingDescriptor {
    /// Combine frame geometry and PLL state. The geometry is checked
    /// before the clock, matching the order the registers are consulted.
    pub fn derive(
        geometry: FrameGeometry,
        pll: PllRegisters,
        master_clock: u32,
        clock_div: u32,
    ) -> Result<Self, TimingError> {
        if geometry.hts == 0 || geometry.total_lines() == 0 {
            return Err(TimingError::TimingUnavailable);
        }
        let pixel_clock = pll.pixel_clock(master_clock, clock_div)?;
        let frame_rate = geometry.frame_rate(pixel_clock)?;
        Ok(Self {
            pixel_clock,
            horizontal_total: geometry.hts,
            vertical_total: geometry.vts,
            extra_vertical_lines: geometry.extra_lines,
            frame_rate,
        })
    }
}

/// Which record a timing read updates.
/// The preview slot feeds the capture transfer; the diagnostic slot only
/// reports the rate after a mode change.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimingSlot {
    Preview,
    Diagnostic,
}
