
use std::fs::{DirBuilder, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::error::Error;

/// Size cap per log file. A flush that would cross the cap starts a new file.
pub const LOG_MAX_FILE_SIZE: u64 = 1 << 20;

/// One on-disk log file plus its running byte count.
///
/// Files are named `YYYY-MM-DD_HH-MM-SS.log` under the configured directory
/// and truncated at open. Rotating more than once within the same second
/// appends a sequence suffix so earlier output is never truncated away.
pub struct LogFile {
  file: File,
  path: PathBuf,
  bytes_written: u64,
}

impl LogFile {
  /// Create a fresh, timestamp-named log file under `dir`.
  ///
  /// The directory is created (mode 0777) if absent; an existing directory is
  /// silently accepted. No check-then-make: mkdir is called directly to avoid
  /// the race.
  pub fn create(dir: &Path) -> Result<LogFile, Error> {
    if let Err(err) = DirBuilder::new().mode(0o777).create(dir) {
      if err.kind() != io::ErrorKind::AlreadyExists {
        return Err(Error::CreateLogDir {
          path: dir.to_path_buf(),
          source: err,
        });
      }
    }

    let stamp = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
    let mut path = dir.join(format!("{}.log", stamp));
    let mut seq = 1u32;
    while path.exists() {
      path = dir.join(format!("{}.{}.log", stamp, seq));
      seq += 1;
    }

    let file = OpenOptions::new()
      .create(true)
      .write(true)
      .truncate(true)
      .mode(0o666)
      .open(&path)
      .map_err(|err| Error::CreateLogFile {
        path: path.clone(),
        source: err,
      })?;

    Ok(LogFile {
      file,
      path,
      bytes_written: 0,
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn bytes_written(&self) -> u64 {
    self.bytes_written
  }
}

impl Write for LogFile {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    let written = self.file.write(buf)?;
    self.bytes_written += written as u64;
    Ok(written)
  }

  fn flush(&mut self) -> io::Result<()> {
    self.file.flush()
  }
}
