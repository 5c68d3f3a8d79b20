//! Pipe `tracing` log messages from native Rust to the host UI runtime.
//!
//! The host app shell registers a string channel at startup; formatted log
//! lines are sent across it for display in the host's own log console.

use std::{
    fmt::{self, Write},
    str::FromStr,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use arc_swap::ArcSwapOption;
use tokio::sync::mpsc;
use tracing::{field, Event, Level, Subscriber};
use tracing_subscriber::{
    filter::Targets,
    layer::{Context, Layer, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
};

/// A channel to the host UI runtime. Formatted rust log messages are sent
/// across this channel for printing on the host side.
static UI_LOG_TX: ArcSwapOption<mpsc::UnboundedSender<String>> =
    ArcSwapOption::const_empty();

struct UiLogLayer;

/// Install the UI log channel and the global `tracing` subscriber.
///
/// `rust_log` uses the usual `tracing_subscriber` targets syntax; it falls
/// back to INFO if unparseable.
pub fn init(ui_log_tx: mpsc::UnboundedSender<String>, rust_log: &str) {
    UI_LOG_TX.store(Some(Arc::new(ui_log_tx)));

    let rust_log_filter = Targets::from_str(rust_log)
        .ok()
        .unwrap_or_else(|| Targets::new().with_default(Level::INFO));

    // _DONT_ panic if there is already a subscriber set. Instead we just
    // update `UI_LOG_TX`. This supports host app hot reload.
    let subscriber = tracing_subscriber::registry()
        .with(UiLogLayer.with_filter(rust_log_filter));
    let _ = subscriber.try_init();
}

impl<S: Subscriber + for<'a> LookupSpan<'a>> Layer<S> for UiLogLayer {
    // A new log event. Format it and send it over to the host.
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut message = String::new();
        fmt_event(&mut message, event, ctx).expect("Failed to format");

        if let Some(tx) = UI_LOG_TX.load().as_ref() {
            let _ = tx.send(message);
        }
    }
}

fn fmt_event<S: Subscriber + for<'a> LookupSpan<'a>>(
    buf: &mut String,
    event: &Event<'_>,
    ctx: Context<'_, S>,
) -> fmt::Result {
    let meta = event.metadata();
    let level = meta.level().as_str();

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs_f64();

    // pad INFO and WARN so log messages align
    let level_pad = if level.len() == 4 { " " } else { "" };
    let target = meta.target();

    // metadata
    // ex: "1682371943.448209 R  INFO"
    write!(buf, "{timestamp:.06} R {level_pad}{level}")?;

    // span names
    // ex: " (app):(chat_sync):"
    let parent_span = event
        .parent()
        .and_then(|id| ctx.span(id))
        .or_else(|| ctx.lookup_current());
    let scope = parent_span
        .into_iter()
        .flat_map(|span| span.scope().from_root());
    let mut first = true;
    for span in scope {
        if first {
            buf.write_char(' ')?;
            first = false;
        }
        write!(buf, "{}:", span.metadata().name())?;
    }

    write!(buf, " {target}:")?;

    // event fields
    // ex: " done (success) status=200 req_ms=13"
    event.record(&mut FieldVisitor::new(buf));

    Ok(())
}

struct FieldVisitor<'a> {
    buf: &'a mut String,
}

impl<'a> FieldVisitor<'a> {
    fn new(buf: &'a mut String) -> Self {
        Self { buf }
    }
}

impl field::Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &field::Field, value: &str) {
        if field.name() == "message" {
            self.record_debug(field, &format_args!("{}", value))
        } else {
            self.record_debug(field, &value)
        }
    }

    fn record_debug(&mut self, field: &field::Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => write!(self.buf, " {value:?}"),
            // skip `log` crate metadata
            name if name.starts_with("log.") => Ok(()),
            name => write!(self.buf, " {name}={value:?}"),
        }
        .expect("Failed to write??");
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn events_reach_the_channel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        init(tx, "info");

        tracing::info!(attempt = 1, "syncing messages");

        // Skip the assertion if another test already owns the global
        // subscriber (the layer never installed).
        if let Ok(line) = rx.try_recv() {
            assert!(line.contains("INFO"), "{line}");
            assert!(line.contains("syncing messages"), "{line}");
            assert!(line.contains("attempt=1"), "{line}");
        }
    }
}
