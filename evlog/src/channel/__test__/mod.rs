#[cfg(test)]
mod tests {
  use std::cell::Cell;
  use std::rc::Rc;

  use crate::channel::{Channel, EVENT_CLOSE, EVENT_ERROR, EVENT_READ, EVENT_WRITE};
  use crate::event_loop::EventLoop;

  struct Hits {
    read: Rc<Cell<u32>>,
    write: Rc<Cell<u32>>,
    error: Rc<Cell<u32>>,
    close: Rc<Cell<u32>>,
  }

  fn pipe() -> (i32, i32) {
    let mut fds = [0i32; 2];
    let res = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };
    assert_eq!(res, 0);
    (fds[0], fds[1])
  }

  fn instrumented_channel(
    event_loop: &EventLoop,
    fd: i32,
  ) -> (std::rc::Rc<std::cell::RefCell<Channel>>, Hits) {
    let hits = Hits {
      read: Rc::new(Cell::new(0)),
      write: Rc::new(Cell::new(0)),
      error: Rc::new(Cell::new(0)),
      close: Rc::new(Cell::new(0)),
    };
    let channel = Channel::new(fd, event_loop);
    {
      let mut ch = channel.borrow_mut();
      let read = Rc::clone(&hits.read);
      ch.set_read_callback(move |_| read.set(read.get() + 1));
      let write = Rc::clone(&hits.write);
      ch.set_write_callback(move |_| write.set(write.get() + 1));
      let error = Rc::clone(&hits.error);
      ch.set_error_callback(move |_| error.set(error.get() + 1));
      let close = Rc::clone(&hits.close);
      ch.set_close_callback(move |_| close.set(close.get() + 1));
    }
    (channel, hits)
  }

  #[test]
  fn test_interest_grows_with_callbacks() {
    let event_loop = EventLoop::new().unwrap();
    let (read_fd, write_fd) = pipe();

    let channel = Channel::new(read_fd, &event_loop);
    assert_eq!(channel.borrow().interest(), 0);

    channel.borrow_mut().set_read_callback(|_| {});
    assert_eq!(channel.borrow().interest(), EVENT_READ);

    channel.borrow_mut().set_write_callback(|_| {});
    assert_eq!(channel.borrow().interest(), EVENT_READ | EVENT_WRITE);

    // The close callback carries no explicit interest bit.
    channel.borrow_mut().set_close_callback(|_| {});
    assert_eq!(channel.borrow().interest(), EVENT_READ | EVENT_WRITE);

    drop(channel);
    unsafe {
      libc::close(read_fd);
      libc::close(write_fd);
    }
  }

  #[test]
  fn test_pure_hangup_fires_only_close() {
    let event_loop = EventLoop::new().unwrap();
    let (read_fd, write_fd) = pipe();
    let (channel, hits) = instrumented_channel(&event_loop, read_fd);

    channel.borrow_mut().handle_event(EVENT_CLOSE);

    assert_eq!(hits.close.get(), 1);
    assert_eq!(hits.read.get(), 0);
    assert_eq!(hits.error.get(), 0);
    assert_eq!(hits.write.get(), 0);

    drop(channel);
    unsafe {
      libc::close(read_fd);
      libc::close(write_fd);
    }
  }

  #[test]
  fn test_hangup_with_pending_data_still_reads() {
    let event_loop = EventLoop::new().unwrap();
    let (read_fd, write_fd) = pipe();
    let (channel, hits) = instrumented_channel(&event_loop, read_fd);

    channel.borrow_mut().handle_event(EVENT_CLOSE | EVENT_READ);

    assert_eq!(hits.read.get(), 1);
    assert_eq!(hits.close.get(), 0);

    drop(channel);
    unsafe {
      libc::close(read_fd);
      libc::close(write_fd);
    }
  }

  #[test]
  fn test_error_preempts_read_and_write() {
    let event_loop = EventLoop::new().unwrap();
    let (read_fd, write_fd) = pipe();
    let (channel, hits) = instrumented_channel(&event_loop, read_fd);

    channel
      .borrow_mut()
      .handle_event(EVENT_ERROR | EVENT_READ | EVENT_WRITE);

    assert_eq!(hits.error.get(), 1);
    assert_eq!(hits.read.get(), 0);
    assert_eq!(hits.write.get(), 0);

    drop(channel);
    unsafe {
      libc::close(read_fd);
      libc::close(write_fd);
    }
  }

  #[test]
  fn test_read_then_write_in_one_event_set() {
    let event_loop = EventLoop::new().unwrap();
    let (read_fd, write_fd) = pipe();
    let (channel, hits) = instrumented_channel(&event_loop, read_fd);

    channel.borrow_mut().handle_event(EVENT_READ | EVENT_WRITE);

    assert_eq!(hits.read.get(), 1);
    assert_eq!(hits.write.get(), 1);
    assert_eq!(hits.close.get(), 0);
    assert_eq!(hits.error.get(), 0);

    drop(channel);
    unsafe {
      libc::close(read_fd);
      libc::close(write_fd);
    }
  }

  #[test]
  fn test_double_registration_is_rejected() {
    let event_loop = EventLoop::new().unwrap();
    let (read_fd, write_fd) = pipe();

    let first = Channel::new(read_fd, &event_loop);
    let second = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
      Channel::new(read_fd, &event_loop)
    }));
    assert!(second.is_err());

    drop(first);
    unsafe {
      libc::close(read_fd);
      libc::close(write_fd);
    }
  }
}
