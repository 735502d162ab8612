mod __test__;

use std::cell::RefCell;
use std::os::unix::io::RawFd;
use std::rc::{Rc, Weak};

use crate::event_loop::{assert_true, EventLoop, LoopInner};

pub const EVENT_READ: u32 = libc::EPOLLIN as u32;
pub const EVENT_WRITE: u32 = libc::EPOLLOUT as u32;
pub const EVENT_ERROR: u32 = libc::EPOLLERR as u32;
pub const EVENT_CLOSE: u32 = libc::EPOLLHUP as u32;

const READ_LIKE: u32 = (libc::EPOLLIN | libc::EPOLLPRI | libc::EPOLLRDHUP) as u32;

pub type ChannelCallback = Box<dyn FnMut(RawFd)>;

/// Binding of one file descriptor to a set of readiness callbacks inside one
/// event loop.
///
/// A channel does not own its descriptor; the caller manages that lifetime.
/// The descriptor is switched to non-blocking at construction and the channel
/// registers itself with an empty interest mask. Installing a read, write or
/// error callback adds the matching flag to the mask and reprograms the loop;
/// the close callback is active as soon as it is installed because hang-up is
/// always delivered.
///
/// A channel's whole life is confined to the loop's thread (`Rc` keeps it
/// there); on drop it deregisters itself exactly once.
pub struct Channel {
  fd: RawFd,
  interest: u32,
  owner: Weak<LoopInner>,
  read_cb: Option<ChannelCallback>,
  write_cb: Option<ChannelCallback>,
  error_cb: Option<ChannelCallback>,
  close_cb: Option<ChannelCallback>,
}

impl Channel {
  /// Create a channel for `fd` on `event_loop`. Must run on the loop thread.
  pub fn new(fd: RawFd, event_loop: &EventLoop) -> Rc<RefCell<Channel>> {
    Channel::bind(fd, event_loop.inner())
  }

  pub(crate) fn bind(fd: RawFd, inner: &Rc<LoopInner>) -> Rc<RefCell<Channel>> {
    assert_true(fd >= 0, "file descriptor must be valid");
    let res = unsafe { libc::fcntl(fd, libc::F_SETFL, libc::O_NONBLOCK) };
    assert_true(res == 0, "file descriptor must accept non-blocking mode");

    let channel = Rc::new(RefCell::new(Channel {
      fd,
      interest: 0,
      owner: Weak::new(),
      read_cb: None,
      write_cb: None,
      error_cb: None,
      close_cb: None,
    }));
    inner.register_channel(fd, Rc::downgrade(&channel));
    // The back-reference is attached only after registration succeeded, so a
    // rejected channel cannot deregister somebody else's entry on drop.
    channel.borrow_mut().owner = Rc::downgrade(inner);
    channel
  }

  pub fn fd(&self) -> RawFd {
    self.fd
  }

  pub fn interest(&self) -> u32 {
    self.interest
  }

  pub fn set_read_callback(&mut self, cb: impl FnMut(RawFd) + 'static) {
    self.read_cb = Some(Box::new(cb));
    self.add_interest(EVENT_READ);
  }

  pub fn set_write_callback(&mut self, cb: impl FnMut(RawFd) + 'static) {
    self.write_cb = Some(Box::new(cb));
    self.add_interest(EVENT_WRITE);
  }

  pub fn set_error_callback(&mut self, cb: impl FnMut(RawFd) + 'static) {
    self.error_cb = Some(Box::new(cb));
    self.add_interest(EVENT_ERROR);
  }

  /// Hang-up is reported regardless of the interest mask, so installing the
  /// callback is enough.
  pub fn set_close_callback(&mut self, cb: impl FnMut(RawFd) + 'static) {
    self.close_cb = Some(Box::new(cb));
  }

  fn add_interest(&mut self, events: u32) {
    let updated = self.interest | events;
    if updated != self.interest {
      self.interest = updated;
      if let Some(owner) = self.owner.upgrade() {
        owner.update_channel(self);
      }
    }
  }

  /// Demultiplex one readiness event set onto the installed callbacks.
  ///
  /// Priority: a pure hang-up (`HUP` without `IN`) fires only the close
  /// callback; an error fires only the error callback; otherwise read-like
  /// events come before writability.
  pub fn handle_event(&mut self, revents: u32) {
    if revents & EVENT_CLOSE != 0 && revents & EVENT_READ == 0 {
      if let Some(cb) = self.close_cb.as_mut() {
        cb(self.fd);
      }
      return;
    }

    if revents & EVENT_ERROR != 0 {
      if let Some(cb) = self.error_cb.as_mut() {
        cb(self.fd);
      }
      return;
    }

    if revents & READ_LIKE != 0 {
      if let Some(cb) = self.read_cb.as_mut() {
        cb(self.fd);
      }
    }

    if revents & EVENT_WRITE != 0 {
      if let Some(cb) = self.write_cb.as_mut() {
        cb(self.fd);
      }
    }
  }
}

impl Drop for Channel {
  fn drop(&mut self) {
    if let Some(owner) = self.owner.upgrade() {
      owner.remove_channel(self.fd);
    }
  }
}
