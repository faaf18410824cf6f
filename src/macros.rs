//! Logging facade
//!
//! The firmware logs through `defmt` on the board and through `log` on the
//! host, so the same call sites show up over RTT and in test output. With
//! neither feature the arguments are still type-checked, then discarded.
//!
//! Only plain `{}` placeholders are portable between the two back ends.

/// Log at info level.
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {{
        #[cfg(feature = "embedded")]
        ::defmt::info!($($arg)*);
        #[cfg(feature = "std")]
        ::log::info!($($arg)*);
        #[cfg(not(any(feature = "embedded", feature = "std")))]
        let _ = ::core::format_args!($($arg)*);
    }};
}

/// Log at warn level.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {{
        #[cfg(feature = "embedded")]
        ::defmt::warn!($($arg)*);
        #[cfg(feature = "std")]
        ::log::warn!($($arg)*);
        #[cfg(not(any(feature = "embedded", feature = "std")))]
        let _ = ::core::format_args!($($arg)*);
    }};
}

/// Log at error level.
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {{
        #[cfg(feature = "embedded")]
        ::defmt::error!($($arg)*);
        #[cfg(feature = "std")]
        ::log::error!($($arg)*);
        #[cfg(not(any(feature = "embedded", feature = "std")))]
        let _ = ::core::format_args!($($arg)*);
    }};
}

/// Log at debug level.
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "embedded")]
        ::defmt::debug!($($arg)*);
        #[cfg(feature = "std")]
        ::log::debug!($($arg)*);
        #[cfg(not(any(feature = "embedded", feature = "std")))]
        let _ = ::core::format_args!($($arg)*);
    }};
}
