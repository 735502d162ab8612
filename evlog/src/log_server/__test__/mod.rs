#[cfg(test)]
mod tests {
  use std::sync::Arc;
  use std::thread;
  use std::time::Duration;

  use crate::log_server::{LogConfig, LogServer, PoolStats};
  use crate::record::LogLevel;

  fn test_server(dir: &std::path::Path) -> Arc<LogServer> {
    LogServer::try_with_config(LogConfig {
      dir: dir.to_path_buf(),
      ..LogConfig::default()
    })
    .unwrap()
  }

  fn read_all_logs(dir: &std::path::Path) -> String {
    let mut content = String::new();
    for entry in std::fs::read_dir(dir).unwrap() {
      let path = entry.unwrap().path();
      if path.extension().and_then(|e| e.to_str()) == Some("log") {
        content.push_str(&std::fs::read_to_string(path).unwrap());
      }
    }
    content
  }

  fn conserved(stats: PoolStats) -> bool {
    // Exactly one current buffer plus the two lists accounts for everything.
    1 + stats.pending + stats.available == stats.total_allocated
  }

  #[test]
  fn test_buffer_conservation_under_load() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(dir.path());

    assert!(conserved(server.pool_stats()));
    for i in 0..2000 {
      server.write(LogLevel::Info, "Pool", &format!("line number {}", i));
      if i % 333 == 0 {
        assert!(conserved(server.pool_stats()));
      }
    }
    assert!(conserved(server.pool_stats()));
    server.force_destroy();
    assert!(conserved(server.pool_stats()));
  }

  #[test]
  fn test_no_loss_on_normal_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(dir.path());

    for i in 0..500 {
      server.write(LogLevel::Info, "Loss", &format!("payload {}", i));
    }
    server.force_destroy();

    let content = read_all_logs(dir.path());
    assert_eq!(content.lines().count(), 500);
    for (i, line) in content.lines().enumerate() {
      assert!(line.ends_with(&format!("payload {}", i)), "line {}: {}", i, line);
    }
  }

  #[test]
  fn test_per_thread_fifo_order() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(dir.path());

    let mut workers = Vec::new();
    for worker in 0..4 {
      let server = Arc::clone(&server);
      workers.push(thread::spawn(move || {
        for seq in 0..200 {
          server.write(
            LogLevel::Info,
            &format!("W{}", worker),
            &format!("seq {}", seq),
          );
        }
      }));
    }
    for worker in workers {
      worker.join().unwrap();
    }
    server.force_destroy();

    let content = read_all_logs(dir.path());
    assert_eq!(content.lines().count(), 4 * 200);
    for worker in 0..4 {
      let tag = format!("[W{}]", worker);
      let mut expected = 0;
      for line in content.lines().filter(|l| l.contains(&tag)) {
        assert!(line.ends_with(&format!("seq {}", expected)), "{}", line);
        expected += 1;
      }
      assert_eq!(expected, 200);
    }
  }

  #[test]
  fn test_below_threshold_levels_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(dir.path());

    server.write(LogLevel::Version, "Drop", "too verbose");
    server.write(LogLevel::Debug, "Drop", "still too verbose");
    assert_eq!(server.pool_stats().current_used, 0);

    server.write(LogLevel::Info, "Keep", "visible");
    assert!(server.pool_stats().current_used > 0);
    server.force_destroy();
  }

  #[test]
  fn test_force_destroy_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(dir.path());

    server.write(LogLevel::Info, "Destroy", "once");
    server.force_destroy();
    server.force_destroy();
    server.write(LogLevel::Info, "Destroy", "after the end");
    thread::sleep(Duration::from_millis(20));

    let content = read_all_logs(dir.path());
    assert_eq!(content.lines().count(), 1);
    assert!(content.contains("once"));
  }

  #[test]
  fn test_error_level_flushes_without_destroy() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(dir.path());

    server.write(LogLevel::Error, "Urgent", "boom");
    thread::sleep(Duration::from_millis(100));

    let content = read_all_logs(dir.path());
    assert!(content.contains("boom\n"), "got: {:?}", content);
    server.force_destroy();
  }
}
