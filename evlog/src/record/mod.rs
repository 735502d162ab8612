mod __test__;

use std::fmt::Write as _;

use chrono::Local;

use crate::utils::current_tid;

/// Hard cap on one rendered log line, newline included. Longer messages are
/// truncated so that a line always fits a single buffer.
pub const LOG_MAX_LINE_SIZE: usize = 512;

/// Severity of a log line, ordered from most verbose to fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
  Version = 0,
  Debug,
  Info,
  Warning,
  Error,
  Fatal,
}

impl LogLevel {
  /// The exact five-character token written into the line framing.
  pub fn token(self) -> &'static str {
    match self {
      LogLevel::Version => "Ver  ",
      LogLevel::Debug => "Debug",
      LogLevel::Info => "Info ",
      LogLevel::Warning => "Warn ",
      LogLevel::Error => "Error",
      LogLevel::Fatal => "Fatal",
    }
  }

  pub fn from_u8(raw: u8) -> LogLevel {
    match raw {
      0 => LogLevel::Version,
      1 => LogLevel::Debug,
      2 => LogLevel::Info,
      3 => LogLevel::Warning,
      4 => LogLevel::Error,
      _ => LogLevel::Fatal,
    }
  }
}

/// One log line before it is serialised into a buffer.
///
/// Records are built on the producer thread inside `LogServer::write`,
/// rendered once and discarded. The rendered framing is byte-stable:
///
/// ```text
/// YYYY-MM-DD HH.MM.SS.uuuuuu PPPPP TTTTT [LVL  ][tag] message\n
/// ```
pub struct LogRecord<'a> {
  pub level: LogLevel,
  pub tag: &'a str,
  pub message: &'a str,
}

impl LogRecord<'_> {
  /// Render the record into its on-disk line.
  ///
  /// The wall-clock time is taken at render time, local timezone,
  /// microsecond resolution. Lines longer than [`LOG_MAX_LINE_SIZE`] are
  /// truncated at a character boundary; the trailing newline is always kept.
  pub fn render(&self) -> String {
    let now = Local::now();
    let mut line = String::with_capacity(LOG_MAX_LINE_SIZE);
    let _ = write!(
      line,
      "{} {:>5} {:>5} [{}][{}] {}",
      now.format("%Y-%m-%d %H.%M.%S%.6f"),
      std::process::id(),
      current_tid(),
      self.level.token(),
      self.tag,
      self.message
    );

    if line.len() >= LOG_MAX_LINE_SIZE {
      let mut end = LOG_MAX_LINE_SIZE - 1;
      while !line.is_char_boundary(end) {
        end -= 1;
      }
      line.truncate(end);
    }
    line.push('\n');
    line
  }
}
