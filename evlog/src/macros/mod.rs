//! Front-end logging macros.
//!
//! Every macro takes a component tag plus `format!`-style arguments and
//! routes the rendered message to the shared [`LogServer`]. Lines below the
//! configured minimum level are dropped before any formatting work happens.
//!
//! ```rust,ignore
//! use evlog::{log_error, log_info};
//!
//! log_info!("Net", "accepted connection from {}", peer);
//! log_error!("Net", "read failed: {}", err);
//! ```
//!
//! [`LogServer`]: crate::log_server::LogServer

#[macro_export]
macro_rules! log_ver {
  ($tag:expr, $($arg:tt)+) => {
    $crate::log_server::emit(
      $crate::record::LogLevel::Version,
      $tag,
      ::core::format_args!($($arg)+),
    )
  };
}

#[macro_export]
macro_rules! log_debug {
  ($tag:expr, $($arg:tt)+) => {
    $crate::log_server::emit(
      $crate::record::LogLevel::Debug,
      $tag,
      ::core::format_args!($($arg)+),
    )
  };
}

#[macro_export]
macro_rules! log_info {
  ($tag:expr, $($arg:tt)+) => {
    $crate::log_server::emit(
      $crate::record::LogLevel::Info,
      $tag,
      ::core::format_args!($($arg)+),
    )
  };
}

#[macro_export]
macro_rules! log_warn {
  ($tag:expr, $($arg:tt)+) => {
    $crate::log_server::emit(
      $crate::record::LogLevel::Warning,
      $tag,
      ::core::format_args!($($arg)+),
    )
  };
}

/// Also wakes the flusher so the line reaches disk promptly.
#[macro_export]
macro_rules! log_error {
  ($tag:expr, $($arg:tt)+) => {
    $crate::log_server::emit(
      $crate::record::LogLevel::Error,
      $tag,
      ::core::format_args!($($arg)+),
    )
  };
}

/// Writes the line and a backtrace, drains the log to disk and terminates
/// the process.
#[macro_export]
macro_rules! log_fatal {
  ($tag:expr, $($arg:tt)+) => {
    $crate::log_server::emit(
      $crate::record::LogLevel::Fatal,
      $tag,
      ::core::format_args!($($arg)+),
    )
  };
}
