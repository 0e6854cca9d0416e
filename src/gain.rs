/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

//! Still-capture gain target chosen from the scene luminance and the
//! gain the preview auto-exposure loop settled on.

/// Lowest gain the sensor produces a usable image with (1x)
pub const MIN_CAPTURE_GAIN: u8 = 0x10;

/// Capture gain for a luminance sample and preview gain.
///
/// Bright scenes get a flat low gain, mid and dim scenes divide the
/// preview gain down, and dark scenes back off further the closer the
/// preview gain is to saturation.
pub fn capture_gain(luminance: u8, preview_gain: u8) -> u8 {
    let target = match luminance {
        0xa1..=0xff => match preview_gain {
            0x41..=0xff => 0x20,
            0x21..=0x40 => 0x18,
            _ => 0x10,
        },
        0x81..=0xa0 => match preview_gain {
            0x41..=0xff => 0x30,
            0x21..=0x40 => 0x28,
            _ => 0x20,
        },
        0x41..=0x80 => match preview_gain {
            0x61..=0xff => preview_gain / 3,
            0x41..=0x60 => preview_gain / 2,
            _ => preview_gain,
        },
        0x21..=0x40 => match preview_gain {
            0x61..=0xff => preview_gain / 6,
            0x21..=0x60 => preview_gain / 2,
            _ => preview_gain,
        },
        _ => {
            log_debug!("low light: {:#x}", luminance);
            match preview_gain {
                0xf1..=0xff => 0x10,
                0xe1..=0xf0 => 0x14,
                _ => 0x18,
            }
        }
    };

    target.max(MIN_CAPTURE_GAIN)
}
