use std::cell::Cell;

thread_local! {
  static CACHED_TID: Cell<libc::pid_t> = const { Cell::new(-1) };
}

/// Kernel thread id of the calling thread, cached per thread.
pub fn current_tid() -> libc::pid_t {
  CACHED_TID.with(|cached| {
    if cached.get() < 0 {
      cached.set(unsafe { libc::gettid() });
    }
    cached.get()
  })
}
