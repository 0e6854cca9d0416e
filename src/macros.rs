/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/
//! Logging shims: route to whichever back-end feature is enabled,
//! compile to nothing otherwise.

macro_rules! log_debug {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(feature = "defmt")]
        ::defmt::debug!($s $(, $x)*);
        #[cfg(feature = "log")]
        ::log::debug!($s $(, $x)*);
        #[cfg(feature = "rttdebug")]
        ::panic_rtt_core::rprintln!($s $(, $x)*);
        #[cfg(not(any(feature = "defmt", feature = "log", feature = "rttdebug")))]
        let _ = ($( & $x ),*);
    }};
}

macro_rules! log_info {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(feature = "defmt")]
        ::defmt::info!($s $(, $x)*);
        #[cfg(feature = "log")]
        ::log::info!($s $(, $x)*);
        #[cfg(feature = "rttdebug")]
        ::panic_rtt_core::rprintln!($s $(, $x)*);
        #[cfg(not(any(feature = "defmt", feature = "log", feature = "rttdebug")))]
        let _ = ($( & $x ),*);
    }};
}

macro_rules! log_error {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(feature = "defmt")]
        ::defmt::error!($s $(, $x)*);
        #[cfg(feature = "log")]
        ::log::error!($s $(, $x)*);
        #[cfg(feature = "rttdebug")]
        ::panic_rtt_core::rprintln!($s $(, $x)*);
        #[cfg(not(any(feature = "defmt", feature = "log", feature = "rttdebug")))]
        let _ = ($( & $x ),*);
    }};
}
