use std::sync::Arc;
use std::thread;

use signal_hook::consts::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;

use crate::log_server::LogServer;
use crate::record::LogLevel;

/// Makes the log durable when the process is asked to terminate.
///
/// A dedicated thread waits on the usual termination signals; the first one
/// observed is recorded as a `Warning` line and followed by `force_destroy`,
/// which drains every buffered line to disk. Deciding whether the process
/// actually exits stays with the application.
pub struct SignalHook {}

impl SignalHook {
  pub fn install(server: Arc<LogServer>) {
    let mut signals = match Signals::new([SIGINT, SIGTERM, SIGQUIT, SIGHUP]) {
      Ok(signals) => signals,
      Err(e) => panic!("Failed to install signal handler: {}", e),
    };

    thread::spawn(move || {
      for signal in signals.forever() {
        server.write(
          LogLevel::Warning,
          "Signal",
          &format!("received signal {}, draining the log", signal),
        );
        server.force_destroy();
        break;
      }
    });
  }
}
