//! The per-thread reactor.
//!
//! An [`EventLoop`] is bound to the thread that constructed it and multiplexes
//! readiness of many descriptors onto [`Channel`] callbacks. Other threads
//! talk to the loop only through a [`LoopHandle`]: tasks are queued under a
//! mutex and delivered by ringing an eventfd that the loop keeps registered
//! for readability.
//!
//! Programming errors (a second loop on one thread, operating on a channel
//! that is not registered) are reported with an error line plus backtrace and
//! then panic; they are not recoverable conditions.

mod __test__;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::io::RawFd;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::channel::Channel;
use crate::error::Error;
use crate::poller::{Poller, Wakeup, EPOLL_WAIT_TIMEOUT_MS, MAX_EVENTS_PER_WAIT};
use crate::utils::current_tid;
use crate::{log_debug, log_error};

thread_local! {
  static LOOP_BOUND: Cell<bool> = const { Cell::new(false) };
}

/// Fatal assertion: log, capture the stack, panic.
pub(crate) fn assert_true(cond: bool, msg: &str) {
  if !cond {
    log_error!("EventLoop", "[ASSERT] {}", msg);
    for frame in crate::backtrace::capture_frames() {
      log_debug!("Backtrace", "{}", frame);
    }
    panic!("{}", msg);
  }
}

type TaskFn = Box<dyn FnOnce() + Send>;

enum Task {
  Run(TaskFn),
  // Timer channels can only be created on the loop thread, so the request
  // travels through the task queue and is expanded during dispatch.
  Timer { millis: u64, task: TaskFn },
}

/// The cross-thread face of a loop: wakeup source, task queue, quit flag.
pub(crate) struct LoopShared {
  wakeup: Wakeup,
  pending: Mutex<Vec<Task>>,
  running: AtomicBool,
  loop_tid: libc::pid_t,
}

impl LoopShared {
  fn is_in_loop_thread(&self) -> bool {
    current_tid() == self.loop_tid
  }

  fn submit_task(&self, task: Task) {
    match self.pending.lock() {
      Ok(mut queue) => queue.push(task),
      Err(poisoned) => poisoned.into_inner().push(task),
    }
    if !self.is_in_loop_thread() {
      self.wakeup.ring();
    }
  }

  fn request_quit(&self) {
    self.running.store(false, Ordering::Release);
    if !self.is_in_loop_thread() {
      self.wakeup.ring();
    }
  }
}

// Drop order matters: the channel deregisters from the poll set before the
// descriptor is closed.
struct TimerEntry {
  channel: Rc<RefCell<Channel>>,
  fd: OwnedFd,
}

/// Loop internals shared with channels through weak back-references.
pub(crate) struct LoopInner {
  poller: Poller,
  shared: Arc<LoopShared>,
  channels: RefCell<HashMap<RawFd, Weak<RefCell<Channel>>>>,
  timers: RefCell<HashMap<RawFd, TimerEntry>>,
  // One-shot timers retire themselves from their own read callback; the
  // entries are parked here until the dispatch batch is over.
  retired: RefCell<Vec<TimerEntry>>,
}

impl LoopInner {
  fn assert_in_loop_thread(&self, msg: &str) {
    assert_true(self.shared.is_in_loop_thread(), msg);
  }

  pub(crate) fn register_channel(&self, fd: RawFd, channel: Weak<RefCell<Channel>>) {
    self.assert_in_loop_thread("channels must be registered from the loop thread");
    assert_true(
      !self.channels.borrow().contains_key(&fd),
      "this channel has already been registered",
    );
    if let Err(err) = self.poller.add(fd, 0) {
      log_error!("EventLoop", "can't add fd {} to the poll set: {}", fd, err);
      panic!("can't add fd {} to the poll set: {}", fd, err);
    }
    self.channels.borrow_mut().insert(fd, channel);
    log_debug!("EventLoop", "registered channel for fd {}", fd);
  }

  pub(crate) fn update_channel(&self, channel: &Channel) {
    self.assert_in_loop_thread("channels must be updated from the loop thread");
    assert_true(
      self.channels.borrow().contains_key(&channel.fd()),
      "this channel is not registered, can't update it",
    );
    if let Err(err) = self.poller.modify(channel.fd(), channel.interest()) {
      log_error!(
        "EventLoop",
        "can't reprogram fd {} in the poll set: {}",
        channel.fd(),
        err
      );
      panic!("can't reprogram fd {} in the poll set: {}", channel.fd(), err);
    }
  }

  pub(crate) fn remove_channel(&self, fd: RawFd) {
    self.assert_in_loop_thread("channels must be removed from the loop thread");
    let removed = self.channels.borrow_mut().remove(&fd);
    assert_true(removed.is_some(), "this channel is not registered, can't remove it");
    // The caller may have closed the descriptor already; epoll then forgot
    // it on its own and deletion is a no-op worth only a diagnostic.
    if let Err(err) = self.poller.delete(fd) {
      log_debug!("EventLoop", "poll set delete for fd {}: {}", fd, err);
    }
    log_debug!("EventLoop", "removed channel for fd {}", fd);
  }

  fn add_timer(self: &Rc<Self>, millis: u64, task: TaskFn) {
    let raw = unsafe { libc::timerfd_create(libc::CLOCK_MONOTONIC, libc::TFD_NONBLOCK | libc::TFD_CLOEXEC) };
    if raw < 0 {
      log_error!(
        "Timer",
        "can't create timerfd: {}",
        io::Error::last_os_error()
      );
      return;
    }
    let fd = unsafe { OwnedFd::from_raw_fd(raw) };

    // A zero it_value would disarm the timer instead of firing it.
    let (sec, nsec) = if millis == 0 {
      (0, 1)
    } else {
      ((millis / 1000) as libc::time_t, ((millis % 1000) * 1_000_000) as libc::c_long)
    };
    let spec = libc::itimerspec {
      it_interval: libc::timespec { tv_sec: 0, tv_nsec: 0 },
      it_value: libc::timespec { tv_sec: sec, tv_nsec: nsec },
    };
    let res = unsafe { libc::timerfd_settime(raw, 0, &spec, std::ptr::null_mut()) };
    if res != 0 {
      log_error!("Timer", "can't arm timerfd: {}", io::Error::last_os_error());
      return;
    }

    let channel = Channel::bind(raw, self);
    let weak_inner = Rc::downgrade(self);
    let mut task = Some(task);
    channel.borrow_mut().set_read_callback(move |timer_fd| {
      let mut expirations: u64 = 0;
      unsafe {
        libc::read(
          timer_fd,
          &mut expirations as *mut u64 as *mut libc::c_void,
          std::mem::size_of::<u64>(),
        );
      }
      if let Some(task) = task.take() {
        task();
      }
      if let Some(inner) = weak_inner.upgrade() {
        inner.retire_timer(timer_fd);
      }
    });

    self.timers.borrow_mut().insert(raw, TimerEntry { channel, fd });
    log_debug!("Timer", "armed one-shot timerfd {} for {} ms", raw, millis);
  }

  fn retire_timer(&self, fd: RawFd) {
    if let Some(entry) = self.timers.borrow_mut().remove(&fd) {
      self.retired.borrow_mut().push(entry);
    }
  }
}

/// A single-threaded reactor bound to the thread that constructed it.
pub struct EventLoop {
  inner: Rc<LoopInner>,
}

impl EventLoop {
  /// Create the loop for the current thread.
  ///
  /// At most one loop may exist per thread; a second construction is a fatal
  /// programming error.
  pub fn new() -> Result<EventLoop, Error> {
    assert_true(
      !LOOP_BOUND.with(|bound| bound.get()),
      "every thread can hold only one event loop",
    );

    let poller = Poller::new()?;
    let wakeup = Wakeup::new()?;
    poller
      .add(wakeup.as_raw_fd(), libc::EPOLLIN as u32)
      .map_err(Error::Poller)?;

    let shared = Arc::new(LoopShared {
      wakeup,
      pending: Mutex::new(Vec::new()),
      running: AtomicBool::new(false),
      loop_tid: current_tid(),
    });
    LOOP_BOUND.with(|bound| bound.set(true));
    log_debug!("EventLoop", "event loop created on tid {}", current_tid());

    Ok(EventLoop {
      inner: Rc::new(LoopInner {
        poller,
        shared,
        channels: RefCell::new(HashMap::new()),
        timers: RefCell::new(HashMap::new()),
        retired: RefCell::new(Vec::new()),
      }),
    })
  }

  pub(crate) fn inner(&self) -> &Rc<LoopInner> {
    &self.inner
  }

  /// A clonable, `Send` handle for submitting work from other threads.
  pub fn handle(&self) -> LoopHandle {
    LoopHandle {
      shared: Arc::clone(&self.inner.shared),
    }
  }

  /// Enter the dispatch loop; blocks the caller until [`quit`] is observed.
  ///
  /// [`quit`]: EventLoop::quit
  pub fn run(&mut self) {
    self.inner.shared.running.store(true, Ordering::Release);
    log_debug!("EventLoop", "dispatch loop started");

    let mut events = vec![libc::epoll_event { events: 0, u64: 0 }; MAX_EVENTS_PER_WAIT];
    while self.inner.shared.running.load(Ordering::Acquire) {
      let count = match self.inner.poller.wait(&mut events, EPOLL_WAIT_TIMEOUT_MS) {
        Ok(count) => count,
        Err(err) => {
          log_error!("EventLoop", "wait failed: {}", err);
          panic!("event loop wait failed: {}", err);
        }
      };

      for event in &events[..count] {
        let fd = event.u64 as RawFd;
        let revents = event.events;
        if fd == self.inner.shared.wakeup.as_raw_fd() {
          self.inner.shared.wakeup.drain();
          self.run_pending_tasks();
        } else {
          let channel = self
            .inner
            .channels
            .borrow()
            .get(&fd)
            .and_then(|weak| weak.upgrade());
          match channel {
            Some(channel) => channel.borrow_mut().handle_event(revents),
            None => log_error!(
              "EventLoop",
              "fd {} is not registered but got event {:#x}",
              fd,
              revents
            ),
          }
        }
      }

      // Expired one-shot timers deregister and close here, after the batch.
      self.inner.retired.borrow_mut().clear();
    }
    log_debug!("EventLoop", "dispatch loop finished");
  }

  fn run_pending_tasks(&self) {
    let tasks = {
      let mut queue = match self.inner.shared.pending.lock() {
        Ok(queue) => queue,
        Err(poisoned) => poisoned.into_inner(),
      };
      std::mem::take(&mut *queue)
    };
    for task in tasks {
      match task {
        Task::Run(task) => task(),
        Task::Timer { millis, task } => self.inner.add_timer(millis, task),
      }
    }
  }

  /// Queue `task` to run on the loop thread, in submission order.
  pub fn submit(&self, task: impl FnOnce() + Send + 'static) {
    self.inner.shared.submit_task(Task::Run(Box::new(task)));
  }

  /// Run `task` once, no earlier than `millis` milliseconds from now.
  pub fn run_after(&self, task: impl FnOnce() + Send + 'static, millis: u64) {
    self.inner.shared.submit_task(Task::Timer {
      millis,
      task: Box::new(task),
    });
  }

  /// Ask the loop to exit; observed on the next dispatch iteration.
  pub fn quit(&self) {
    self.inner.shared.request_quit();
  }
}

impl Drop for EventLoop {
  fn drop(&mut self) {
    LOOP_BOUND.with(|bound| bound.set(false));
    log_debug!("EventLoop", "event loop destroyed");
  }
}

/// Cross-thread access to an [`EventLoop`].
///
/// Tasks submitted through a handle run strictly after the wakeup that
/// delivers them is processed by the loop.
#[derive(Clone)]
pub struct LoopHandle {
  shared: Arc<LoopShared>,
}

impl LoopHandle {
  pub fn submit(&self, task: impl FnOnce() + Send + 'static) {
    self.shared.submit_task(Task::Run(Box::new(task)));
  }

  pub fn run_after(&self, task: impl FnOnce() + Send + 'static, millis: u64) {
    self.shared.submit_task(Task::Timer {
      millis,
      task: Box::new(task),
    });
  }

  pub fn quit(&self) {
    self.shared.request_quit();
  }
}
