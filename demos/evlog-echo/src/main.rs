use std::thread;
use std::time::Duration;

use evlog::channel::Channel;
use evlog::event_loop::EventLoop;
use evlog::log_info;
use evlog::log_server::set_min_level;
use evlog::record::LogLevel;

// A pipe-fed echo: a writer thread produces lines, the reactor picks them up
// through a read callback and the hang-up of the write end stops the loop.
fn main() {
  set_min_level(LogLevel::Debug);

  let mut fds = [0i32; 2];
  let res = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };
  assert_eq!(res, 0);
  let (read_fd, write_fd) = (fds[0], fds[1]);

  let mut event_loop = EventLoop::new().expect("can't create event loop");
  let handle = event_loop.handle();

  let channel = Channel::new(read_fd, &event_loop);
  {
    let mut ch = channel.borrow_mut();
    ch.set_read_callback(|fd| {
      let mut buf = [0u8; 256];
      let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut _, buf.len()) };
      if n > 0 {
        let text = String::from_utf8_lossy(&buf[..n as usize]);
        println!("echo: {}", text.trim_end());
        log_info!("Echo", "received {} bytes", n);
      }
    });
    let quit = handle.clone();
    ch.set_close_callback(move |_| {
      log_info!("Echo", "writer hung up, quitting");
      quit.quit();
    });
  }

  handle.run_after(|| println!("half a second in, still looping"), 500);

  let writer = thread::spawn(move || {
    for i in 0..5 {
      let line = format!("message {}\n", i);
      unsafe { libc::write(write_fd, line.as_ptr() as *const _, line.len()) };
      thread::sleep(Duration::from_millis(200));
    }
    unsafe { libc::close(write_fd) };
  });

  event_loop.run();
  writer.join().unwrap();

  drop(channel);
  unsafe { libc::close(read_fd) };
  evlog::log_server::LogServer::instance().force_destroy();
}
