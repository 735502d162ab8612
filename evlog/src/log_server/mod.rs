//! The asynchronous log server.
//!
//! Producers on any thread render framed lines into a shared current buffer;
//! a dedicated flusher thread moves full buffers to a rotating on-disk file.
//! A producer never waits on file I/O: the slowest path through `write` is a
//! mutex acquisition, a memcpy, and (rarely) one buffer allocation.
//!
//! Buffers cycle through three pools owned by the server:
//!
//! ```text
//!  Available ──take──► Current ──full/forced──► Pending
//!     ▲                                            │
//!     └────────────── flushed ◄───────────────────┘
//! ```

mod __test__;

use std::cell::RefCell;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::backtrace::capture_frames;
use crate::error::Error;
use crate::log_buffer::LogBuffer;
use crate::log_file::{LogFile, LOG_MAX_FILE_SIZE};
use crate::record::{LogLevel, LogRecord};

/// How long the flusher sleeps before draining the current buffer anyway.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(2000);

/// Minimum level emitted when nothing else is configured.
pub const DEFAULT_LOG_LEVEL: LogLevel = LogLevel::Info;

static MIN_LEVEL: AtomicU8 = AtomicU8::new(DEFAULT_LOG_LEVEL as u8);

/// Set the minimum emitted level for the whole process.
pub fn set_min_level(level: LogLevel) {
  MIN_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// The current minimum emitted level.
pub fn min_level() -> LogLevel {
  LogLevel::from_u8(MIN_LEVEL.load(Ordering::Relaxed))
}

/// Startup knobs of a [`LogServer`].
///
/// The defaults are the production constants; tests shrink the file cap to
/// exercise rotation. `EVLOG_DIR` overrides the default log directory.
#[derive(Debug, Clone)]
pub struct LogConfig {
  pub dir: PathBuf,
  pub max_file_size: u64,
  pub flush_interval: Duration,
  pub min_level: LogLevel,
}

impl Default for LogConfig {
  fn default() -> LogConfig {
    let dir = std::env::var_os("EVLOG_DIR")
      .map(PathBuf::from)
      .unwrap_or_else(|| std::env::temp_dir().join("evlog"));
    LogConfig {
      dir,
      max_file_size: LOG_MAX_FILE_SIZE,
      flush_interval: DEFAULT_FLUSH_INTERVAL,
      min_level: DEFAULT_LOG_LEVEL,
    }
  }
}

/// Buffer pool counters, used to check conservation from tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
  pub current_used: usize,
  pub pending: usize,
  pub available: usize,
  pub total_allocated: usize,
}

struct ServerState {
  current: Box<LogBuffer>,
  pending: Vec<Box<LogBuffer>>,
  available: Vec<Box<LogBuffer>>,
  total_allocated: usize,
  flush_now: bool,
  stop: bool,
}

impl ServerState {
  fn take_fresh_buffer(&mut self) -> Box<LogBuffer> {
    self.available.pop().unwrap_or_else(|| {
      self.total_allocated += 1;
      Box::new(LogBuffer::new())
    })
  }

  fn rotate_current(&mut self) {
    let fresh = self.take_fresh_buffer();
    let full = std::mem::replace(&mut self.current, fresh);
    self.pending.push(full);
  }
}

struct Shared {
  state: Mutex<ServerState>,
  cond: Condvar,
  flush_interval: Duration,
  max_file_size: u64,
  dir: PathBuf,
}

impl Shared {
  // The logger has to keep working while other threads panic, so a poisoned
  // lock is recovered instead of propagated.
  fn lock_state(&self) -> MutexGuard<'_, ServerState> {
    match self.state.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    }
  }
}

/// Process-wide asynchronous log sink.
///
/// Thread safe. Obtain the shared instance through [`LogServer::instance`]
/// (the usual path, used by the `log_*!` macros) or build a private one with
/// [`LogServer::try_with_config`].
pub struct LogServer {
  shared: Arc<Shared>,
  flusher: Mutex<Option<JoinHandle<()>>>,
  destroyed: AtomicBool,
}

impl LogServer {
  /// The lazily-created process-wide server.
  ///
  /// Held through a weak handle: the server is created on first use and
  /// re-created if every strong handle was dropped. If the sink can't be
  /// opened the process terminates; a logger without a sink can't run.
  pub fn instance() -> Arc<LogServer> {
    static INSTANCE: Mutex<Weak<LogServer>> = Mutex::new(Weak::new());

    let mut slot = match INSTANCE.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(server) = slot.upgrade() {
      return server;
    }
    match LogServer::try_with_config(LogConfig::default()) {
      Ok(server) => {
        *slot = Arc::downgrade(&server);
        server
      }
      Err(err) => {
        eprintln!("[LogServer] can't start: {}", err);
        std::process::exit(1);
      }
    }
  }

  /// Build a server with explicit configuration.
  pub fn try_with_config(config: LogConfig) -> Result<Arc<LogServer>, Error> {
    let sink = LogFile::create(&config.dir)?;
    set_min_level(config.min_level);

    let shared = Arc::new(Shared {
      state: Mutex::new(ServerState {
        current: Box::new(LogBuffer::new()),
        pending: Vec::new(),
        available: Vec::new(),
        total_allocated: 1,
        flush_now: false,
        stop: false,
      }),
      cond: Condvar::new(),
      flush_interval: config.flush_interval,
      max_file_size: config.max_file_size,
      dir: config.dir,
    });

    let worker = Arc::clone(&shared);
    let flusher = thread::Builder::new()
      .name("evlog-flusher".into())
      .spawn(move || run_flusher(worker, sink))
      .map_err(Error::SpawnFlusher)?;

    Ok(Arc::new(LogServer {
      shared,
      flusher: Mutex::new(Some(flusher)),
      destroyed: AtomicBool::new(false),
    }))
  }

  /// Render one line and hand it to the buffering pipeline.
  ///
  /// `Error` lines additionally wake the flusher right away; `Fatal` lines
  /// append a backtrace, drain everything to disk and terminate the process.
  pub fn write(&self, level: LogLevel, tag: &str, message: &str) {
    if (level as u8) < MIN_LEVEL.load(Ordering::Relaxed) {
      return;
    }
    self.write_line(level, tag, message);
    match level {
      LogLevel::Error => self.force_flush(),
      LogLevel::Fatal => self.handle_fatal(),
      _ => {}
    }
  }

  fn write_line(&self, level: LogLevel, tag: &str, message: &str) {
    let mut state = self.shared.lock_state();
    if state.stop {
      return;
    }
    // Rendering under the lock linearises timestamps with file order.
    let line = LogRecord { level, tag, message }.render();
    if !state.current.writable(line.len()) {
      state.rotate_current();
      self.shared.cond.notify_one();
    }
    state.current.append(line.as_bytes());
  }

  /// Wake the flusher out of schedule. Never blocks on I/O.
  pub fn force_flush(&self) {
    {
      let mut state = self.shared.lock_state();
      if state.stop {
        return;
      }
      state.flush_now = true;
    }
    self.shared.cond.notify_one();
  }

  /// Stop the flusher and drain everything to disk.
  ///
  /// Idempotent and panic-free, so it is safe to call from signal handlers
  /// and termination paths. After it returns the log file is closed and
  /// further writes are dropped.
  pub fn force_destroy(&self) {
    if self.destroyed.swap(true, Ordering::SeqCst) {
      return;
    }
    {
      let mut state = self.shared.lock_state();
      state.stop = true;
    }
    self.shared.cond.notify_one();

    let handle = match self.flusher.lock() {
      Ok(mut guard) => guard.take(),
      Err(poisoned) => poisoned.into_inner().take(),
    };
    if let Some(handle) = handle {
      let _ = handle.join();
    }
  }

  fn handle_fatal(&self) -> ! {
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
      for frame in capture_frames() {
        self.write_line(LogLevel::Fatal, "Backtrace", &frame);
      }
      self.force_destroy();
    }));
    if outcome.is_err() {
      eprintln!("[LogServer] fatal path panicked, terminating anyway");
    }
    std::process::abort();
  }

  pub fn pool_stats(&self) -> PoolStats {
    let state = self.shared.lock_state();
    PoolStats {
      current_used: state.current.len(),
      pending: state.pending.len(),
      available: state.available.len(),
      total_allocated: state.total_allocated,
    }
  }

  pub fn log_dir(&self) -> &Path {
    &self.shared.dir
  }
}

impl Drop for LogServer {
  fn drop(&mut self) {
    self.force_destroy();
  }
}

/// The background flusher: unique consumer of the pending pool.
///
/// All file I/O happens here, with the server lock released. The worker exits
/// only on `stop`, after draining the current and pending buffers.
fn run_flusher(shared: Arc<Shared>, mut sink: LogFile) {
  let mut to_flush: Vec<Box<LogBuffer>> = Vec::new();
  loop {
    let stopping;
    {
      let guard = shared.lock_state();
      let (mut state, wait) = match shared.cond.wait_timeout_while(
        guard,
        shared.flush_interval,
        |state| !state.stop && state.pending.is_empty() && !state.flush_now,
      ) {
        Ok(pair) => pair,
        Err(poisoned) => poisoned.into_inner(),
      };

      stopping = state.stop;
      if stopping || wait.timed_out() || state.flush_now {
        if !state.current.is_empty() {
          state.rotate_current();
        }
        state.flush_now = false;
      }
      std::mem::swap(&mut to_flush, &mut state.pending);
    }

    for buffer in to_flush.iter_mut() {
      if sink.bytes_written() + buffer.len() as u64 >= shared.max_file_size {
        match LogFile::create(&shared.dir) {
          Ok(next) => sink = next,
          Err(err) => {
            eprintln!("[LogServer] can't rotate log file: {}", err);
            std::process::abort();
          }
        }
      }
      if let Err(err) = buffer.flush_to(&mut sink) {
        eprintln!("[LogServer] flush to {} failed: {}", sink.path().display(), err);
        std::process::abort();
      }
    }

    {
      let mut state = shared.lock_state();
      state.available.append(&mut to_flush);
    }

    if stopping {
      return;
    }
  }
}

thread_local! {
  static TLS_SERVER: RefCell<Option<Arc<LogServer>>> = const { RefCell::new(None) };
}

/// Macro back-end: resolve the shared server (cached per thread) and write.
pub fn emit(level: LogLevel, tag: &str, args: fmt::Arguments<'_>) {
  if (level as u8) < MIN_LEVEL.load(Ordering::Relaxed) {
    return;
  }
  let server = TLS_SERVER.with(|slot| {
    Arc::clone(slot.borrow_mut().get_or_insert_with(LogServer::instance))
  });
  match args.as_str() {
    Some(message) => server.write(level, tag, message),
    None => server.write(level, tag, &args.to_string()),
  }
}
