#[cfg(test)]
mod tests {
  use crate::record::{LogLevel, LogRecord, LOG_MAX_LINE_SIZE};

  #[test]
  fn test_level_tokens_are_five_chars() {
    let levels = [
      LogLevel::Version,
      LogLevel::Debug,
      LogLevel::Info,
      LogLevel::Warning,
      LogLevel::Error,
      LogLevel::Fatal,
    ];
    for level in levels {
      assert_eq!(level.token().len(), 5, "token {:?} is not 5 chars", level);
    }
    assert_eq!(LogLevel::Version.token(), "Ver  ");
    assert_eq!(LogLevel::Warning.token(), "Warn ");
  }

  #[test]
  fn test_level_ordering() {
    assert!(LogLevel::Version < LogLevel::Debug);
    assert!(LogLevel::Debug < LogLevel::Info);
    assert!(LogLevel::Info < LogLevel::Warning);
    assert!(LogLevel::Warning < LogLevel::Error);
    assert!(LogLevel::Error < LogLevel::Fatal);
    assert_eq!(LogLevel::from_u8(LogLevel::Warning as u8), LogLevel::Warning);
  }

  #[test]
  fn test_render_framing() {
    let record = LogRecord {
      level: LogLevel::Info,
      tag: "Frame",
      message: "hello",
    };
    let line = record.render();

    assert!(line.ends_with("[Info ][Frame] hello\n"), "got: {}", line);
    // "YYYY-MM-DD HH.MM.SS.uuuuuu " prefix is fixed-width.
    let bytes = line.as_bytes();
    assert_eq!(bytes[4], b'-');
    assert_eq!(bytes[7], b'-');
    assert_eq!(bytes[10], b' ');
    assert_eq!(bytes[13], b'.');
    assert_eq!(bytes[16], b'.');
    assert_eq!(bytes[19], b'.');
    assert_eq!(bytes[26], b' ');
  }

  #[test]
  fn test_render_truncates_long_lines() {
    let message = "y".repeat(4 * LOG_MAX_LINE_SIZE);
    let record = LogRecord {
      level: LogLevel::Debug,
      tag: "Trunc",
      message: &message,
    };
    let line = record.render();

    assert_eq!(line.len(), LOG_MAX_LINE_SIZE);
    assert!(line.ends_with('\n'));
  }

  #[test]
  fn test_render_truncation_respects_char_boundaries() {
    let message = "ü".repeat(LOG_MAX_LINE_SIZE);
    let record = LogRecord {
      level: LogLevel::Debug,
      tag: "Utf8",
      message: &message,
    };
    let line = record.render();

    assert!(line.len() <= LOG_MAX_LINE_SIZE);
    assert!(std::str::from_utf8(line.as_bytes()).is_ok());
    assert!(line.ends_with('\n'));
  }
}
