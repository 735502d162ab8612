use std::thread;

use evlog::log_server::{set_min_level, LogServer};
use evlog::panic_hook::PanicHook;
use evlog::record::LogLevel;
use evlog::{log_error, log_info};

fn main() {
  set_min_level(LogLevel::Debug);
  PanicHook::install(LogServer::instance());

  let mut workers = Vec::new();
  for worker in 0..4 {
    workers.push(thread::spawn(move || {
      for i in 0..100 {
        log_info!("Worker", "message {} from worker {}", i, worker);
      }
    }));
  }
  for worker in workers {
    worker.join().unwrap();
  }

  log_error!("Main", "all workers done, forcing a flush");
  let server = LogServer::instance();
  println!("log directory: {}", server.log_dir().display());
  server.force_destroy();
}
