
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::io::RawFd;

use crate::error::Error;
use crate::log_error;

/// Ceiling on one blocking wait; keeps the loop responsive to `quit`.
pub const EPOLL_WAIT_TIMEOUT_MS: i32 = 5000;

/// Readiness events delivered per wakeup at most.
pub const MAX_EVENTS_PER_WAIT: usize = 256;

/// Thin safe wrapper around an epoll instance.
///
/// Interest masks are the raw epoll bitsets (`EPOLLIN | EPOLLOUT | ...`);
/// the loop stores the fd itself as the event token.
pub struct Poller {
  epfd: OwnedFd,
}

impl Poller {
  pub fn new() -> Result<Poller, Error> {
    let raw = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
    if raw < 0 {
      return Err(Error::CreatePoller(io::Error::last_os_error()));
    }
    Ok(Poller {
      epfd: unsafe { OwnedFd::from_raw_fd(raw) },
    })
  }

  fn ctl(&self, op: libc::c_int, fd: RawFd, events: u32) -> io::Result<()> {
    let mut event = libc::epoll_event {
      events,
      u64: fd as u64,
    };
    let res = unsafe { libc::epoll_ctl(self.epfd.as_raw_fd(), op, fd, &mut event) };
    if res < 0 {
      return Err(io::Error::last_os_error());
    }
    Ok(())
  }

  pub fn add(&self, fd: RawFd, events: u32) -> io::Result<()> {
    self.ctl(libc::EPOLL_CTL_ADD, fd, events)
  }

  pub fn modify(&self, fd: RawFd, events: u32) -> io::Result<()> {
    self.ctl(libc::EPOLL_CTL_MOD, fd, events)
  }

  pub fn delete(&self, fd: RawFd) -> io::Result<()> {
    self.ctl(libc::EPOLL_CTL_DEL, fd, 0)
  }

  /// Block until readiness, a timeout, or a signal.
  ///
  /// Fills `events` from the front and returns how many are valid. An
  /// interrupted wait is not an error; it reports zero events.
  pub fn wait(&self, events: &mut [libc::epoll_event], timeout_ms: i32) -> io::Result<usize> {
    let count = unsafe {
      libc::epoll_wait(
        self.epfd.as_raw_fd(),
        events.as_mut_ptr(),
        events.len() as libc::c_int,
        timeout_ms,
      )
    };
    if count < 0 {
      let err = io::Error::last_os_error();
      if err.kind() == io::ErrorKind::Interrupted {
        return Ok(0);
      }
      return Err(err);
    }
    Ok(count as usize)
  }
}

/// The wakeup source: an eventfd kept registered for readability so another
/// thread can interrupt a blocked wait.
pub struct Wakeup {
  fd: OwnedFd,
}

impl Wakeup {
  pub fn new() -> Result<Wakeup, Error> {
    let raw = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) };
    if raw < 0 {
      return Err(Error::CreateWakeup(io::Error::last_os_error()));
    }
    Ok(Wakeup {
      fd: unsafe { OwnedFd::from_raw_fd(raw) },
    })
  }

  /// Kick a blocked wait. Safe to call from any thread.
  pub fn ring(&self) {
    let one: u64 = 1;
    let written = unsafe {
      libc::write(
        self.fd.as_raw_fd(),
        &one as *const u64 as *const libc::c_void,
        std::mem::size_of::<u64>(),
      )
    };
    if written != std::mem::size_of::<u64>() as isize {
      log_error!("EventLoop", "wakeup ring wrote {} bytes", written);
    }
  }

  /// Consume the pending wakeup counter.
  pub fn drain(&self) {
    let mut counter: u64 = 0;
    let read = unsafe {
      libc::read(
        self.fd.as_raw_fd(),
        &mut counter as *mut u64 as *mut libc::c_void,
        std::mem::size_of::<u64>(),
      )
    };
    if read != std::mem::size_of::<u64>() as isize {
      log_error!("EventLoop", "wakeup drain read {} bytes", read);
    }
  }
}

impl AsRawFd for Wakeup {
  fn as_raw_fd(&self) -> RawFd {
    self.fd.as_raw_fd()
  }
}
