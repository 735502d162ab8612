
use smallvec::SmallVec;

/// Upper bound on captured stack frames.
pub const MAX_BACKTRACE_DEPTH: usize = 16;

/// Capture the current call stack as human-readable frame lines.
///
/// Frames belonging to the capture machinery itself are skipped. Symbols that
/// can't be resolved fall back to the raw instruction pointer, so the result
/// is never silently shorter than the walked stack.
pub fn capture_frames() -> SmallVec<[String; MAX_BACKTRACE_DEPTH]> {
  let mut frames: SmallVec<[String; MAX_BACKTRACE_DEPTH]> = SmallVec::new();
  let mut depth = 0usize;

  backtrace::trace(|frame| {
    depth += 1;
    // Frame 1 is this closure, frame 2 is capture_frames itself.
    if depth <= 2 {
      return true;
    }
    if frames.len() >= MAX_BACKTRACE_DEPTH {
      return false;
    }

    let ip = frame.ip();
    let mut rendered: Option<String> = None;
    backtrace::resolve(ip, |symbol| {
      if rendered.is_none() {
        if let Some(name) = symbol.name() {
          rendered = Some(match (symbol.filename(), symbol.lineno()) {
            (Some(file), Some(line)) => format!("{} ({}:{})", name, file.display(), line),
            _ => name.to_string(),
          });
        }
      }
    });

    frames.push(rendered.unwrap_or_else(|| format!("{:p}", ip)));
    true
  });

  frames
}
