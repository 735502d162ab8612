use std::panic;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::backtrace::capture_frames;
use crate::log_server::LogServer;
use crate::record::LogLevel;

/// Installs a panic hook that records panics in the log before anything else
/// tears the process down.
///
/// When a panic occurs the hook writes one `Error` line carrying the panic
/// payload and location (tag `Panic`), appends the captured backtrace frames
/// (tag `Backtrace`) and forces a flush. Because `Error` lines wake the
/// flusher immediately, the record is normally durable even when the panic
/// escalates into an abort.
///
/// # Example
///
/// ```rust,no_run
/// use evlog::log_server::LogServer;
/// use evlog::panic_hook::PanicHook;
///
/// PanicHook::install(LogServer::instance());
/// ```
///
/// The hook is intentionally lightweight: it never blocks on I/O and never
/// panics itself. The short sleep at the end gives the flusher thread time to
/// drain before unwinding continues.
pub struct PanicHook {}

impl PanicHook {
  pub fn install(server: Arc<LogServer>) {
    panic::set_hook(Box::new(move |info| {
      let payload = if let Some(message) = info.payload().downcast_ref::<&str>() {
        (*message).to_string()
      } else if let Some(message) = info.payload().downcast_ref::<String>() {
        message.clone()
      } else {
        "non-string panic payload".to_string()
      };
      let location = info
        .location()
        .map(|l| format!("{}:{}", l.file(), l.line()))
        .unwrap_or_else(|| "unknown location".to_string());

      server.write(
        LogLevel::Error,
        "Panic",
        &format!("panic at {}: {}", location, payload),
      );
      for frame in capture_frames() {
        server.write(LogLevel::Error, "Backtrace", &frame);
      }

      // Give the flusher time to drain before any abort that may follow.
      thread::sleep(Duration::from_millis(120));
    }));
  }
}
