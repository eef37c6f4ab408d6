use log::{log, Level};
use std::collections::HashMap;
use std::sync::Once;
use tracing::field::{Field, Visit};
use tracing::span::Attributes;
use tracing::{Event, Id, Subscriber};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::{LookupSpan, Scope};
use tracing_subscriber::{layer::Context, Layer};

const OPERATIONS: [&str; 5] = ["refresh", "create", "update", "delete", "login"];

static INIT: Once = Once::new();

/// Forward list operations to the `log` facade
///
/// Installs a global tracing subscriber, so it should only be used by hosts
/// that do not set up `tracing` themselves.
pub fn init() {
    INIT.call_once(|| tracing_subscriber::registry().with(ToLogLayer).init());
}

#[derive(Default)]
pub struct ToLogLayer;

fn describe(name: &str, fields: &HashMap<String, String>) -> String {
    match fields.get("key") {
        Some(key) => format!("{name} {key}"),
        None => name.to_string(),
    }
}

impl<S> Layer<S> for ToLogLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            let mut map = HashMap::new();
            let mut visitor = FieldMapVisitor::from_map(&mut map);
            attrs.record(&mut visitor);

            let meta = span.metadata();
            if OPERATIONS.contains(&meta.name()) {
                log!(target: meta.target(), Level::Debug, "{}: started", describe(meta.name(), &map));
            }

            // Store the initial fields in span extensions
            span.extensions_mut().insert(map);
        }
    }

    fn on_close(&self, id: Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(&id) {
            let meta = span.metadata();
            let name = meta.name();
            if !OPERATIONS.contains(&name) {
                return;
            }

            let ext = span.extensions();
            let Some(map) = ext.get::<HashMap<String, String>>() else {
                return;
            };
            let op = describe(name, map);
            match (map.get("return").map(String::as_str), map.get("error")) {
                (Some("success"), _) => {
                    log!(target: meta.target(), Level::Info, "{op}: success")
                }
                (Some("declined"), _) => {
                    log!(target: meta.target(), Level::Info, "{op}: declined by user")
                }
                (Some("cancelled"), _) => {
                    log!(target: meta.target(), Level::Debug, "{op}: abandoned, list unmounted")
                }
                (_, Some(err)) => {
                    log!(target: meta.target(), Level::Warn, "{op}: failed - {err}")
                }
                _ => {}
            }
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        // Report events under the closest list operation
        if let Some(span) = ctx
            .event_scope(event)
            .into_iter()
            .flat_map(Scope::from_leaf)
            .find(|s| OPERATIONS.contains(&s.name()))
        {
            let meta = event.metadata();
            let level = map_level(meta.level());
            if !log::log_enabled!(target: meta.target(), level) {
                return;
            }

            let mut fields = HashMap::new();
            let mut visitor = FieldMapVisitor::from_map(&mut fields);
            event.record(&mut visitor);

            if let Some(message) = fields.get("message") {
                let ext = span.extensions();
                let op = match ext.get::<HashMap<String, String>>() {
                    Some(map) => describe(span.name(), map),
                    None => span.name().to_string(),
                };
                log!(target: meta.target(), level, "{op}: {message}");
            }
        }
    }

    fn on_record(&self, id: &Id, values: &tracing::span::Record<'_>, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            let mut exts = span.extensions_mut();

            // Get the existing field map (from on_new_span)
            if let Some(fields) = exts.get_mut::<HashMap<String, String>>() {
                let mut visitor = FieldMapVisitor::from_map(fields);
                values.record(&mut visitor);
            }
        }
    }
}

#[derive(Default)]
pub struct FieldMapVisitor<'a> {
    fields: Option<&'a mut HashMap<String, String>>,
}

impl<'a> FieldMapVisitor<'a> {
    pub fn from_map(map: &'a mut HashMap<String, String>) -> Self {
        Self { fields: Some(map) }
    }
}

impl Visit for FieldMapVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if let Some(ref mut map) = self.fields {
            map.insert(field.name().into(), format!("{:?}", value));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if let Some(ref mut map) = self.fields {
            map.insert(field.name().into(), value.to_string());
        }
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        if let Some(ref mut map) = self.fields {
            map.insert(field.name().into(), value.to_string());
        }
    }
}

fn map_level(level: &tracing::Level) -> Level {
    match *level {
        tracing::Level::TRACE => Level::Trace,
        tracing::Level::DEBUG => Level::Debug,
        tracing::Level::INFO => Level::Info,
        tracing::Level::WARN => Level::Warn,
        tracing::Level::ERROR => Level::Error,
    }
}
