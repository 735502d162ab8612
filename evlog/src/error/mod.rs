use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("can't create log directory {}: {source}", path.display())]
  CreateLogDir { path: PathBuf, source: io::Error },

  #[error("can't create log file {}: {source}", path.display())]
  CreateLogFile { path: PathBuf, source: io::Error },

  #[error("can't spawn the log flusher thread: {0}")]
  SpawnFlusher(#[source] io::Error),

  #[error("can't create the poll set: {0}")]
  CreatePoller(#[source] io::Error),

  #[error("poll operation failed: {0}")]
  Poller(#[source] io::Error),

  #[error("can't create the wakeup descriptor: {0}")]
  CreateWakeup(#[source] io::Error),
}
