//! Bridge from the `tracing` ecosystem into the log server.
//!
//! Installing [`LogLayer`] lets code written against `tracing::info!` and
//! friends land in the same rotating files as the native `log_*!` macros.
//! The event target becomes the component tag.


use std::fmt;
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use crate::log_server::LogServer;
use crate::record::LogLevel;

/// A `tracing_subscriber` layer that forwards events to a [`LogServer`].
pub struct LogLayer {
  server: Arc<LogServer>,
}

impl LogLayer {
  pub fn new(server: Arc<LogServer>) -> LogLayer {
    LogLayer { server }
  }
}

/// Extracts the `message` field of a tracing event.
#[derive(Default)]
struct MessageVisitor {
  message: Option<String>,
}

impl Visit for MessageVisitor {
  fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
    if field.name() == "message" {
      self.message = Some(format!("{:?}", value));
    }
  }

  fn record_str(&mut self, field: &Field, value: &str) {
    if field.name() == "message" {
      self.message = Some(value.to_string());
    }
  }
}

fn map_level(level: &tracing::Level) -> LogLevel {
  // tracing has no fatal level; everything maps one-to-one otherwise.
  if *level == tracing::Level::TRACE {
    LogLevel::Version
  } else if *level == tracing::Level::DEBUG {
    LogLevel::Debug
  } else if *level == tracing::Level::INFO {
    LogLevel::Info
  } else if *level == tracing::Level::WARN {
    LogLevel::Warning
  } else {
    LogLevel::Error
  }
}

impl<S> Layer<S> for LogLayer
where
  S: Subscriber + for<'a> LookupSpan<'a>,
{
  fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
    let mut visitor = MessageVisitor::default();
    event.record(&mut visitor);
    let message = visitor.message.as_deref().unwrap_or("");
    self
      .server
      .write(map_level(event.metadata().level()), event.metadata().target(), message);
  }
}

/// Install a [`LogLayer`] over the shared server as the global default
/// subscriber. A previously installed default is left in place.
pub fn init() {
  init_with(LogServer::instance());
}

/// Same as [`init`] but against an explicit server handle.
pub fn init_with(server: Arc<LogServer>) {
  let subscriber = tracing_subscriber::Registry::default().with(LogLayer::new(server));
  let _ = tracing::subscriber::set_global_default(subscriber);
}
