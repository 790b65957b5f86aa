//! Console log formatting shared with the other WorkWise services.
//!
//! Emits `[timestamp] [service] [level] message` lines with fixed-width
//! columns so logs from several services interleave cleanly.

use std::fmt;

use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::{format::Writer, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

const COLOR_RESET: &str = "\x1b[0m";
const COLOR_CYAN: &str = "\x1b[36m";

const SERVICE_NAME_WIDTH: usize = 20;
const LEVEL_WIDTH: usize = 9;

/// Fixed-column event formatter used by the WorkWise service family.
pub struct WorkwiseLogFormatter {
    service_name: String,
    color_enabled: bool,
}

impl WorkwiseLogFormatter {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            color_enabled: color_enabled(),
        }
    }

    fn service_column(&self, component: Option<&str>) -> String {
        let name = match component {
            Some(comp) => format!("realtime-{}", comp),
            None => self.service_name.clone(),
        };
        if name.len() > SERVICE_NAME_WIDTH {
            format!("{}…", &name[..SERVICE_NAME_WIDTH - 1])
        } else {
            format!("{:<width$}", name, width = SERVICE_NAME_WIDTH)
        }
    }
}

/// Level label with its icon and ANSI color.
fn level_style(level: &Level) -> (&'static str, &'static str) {
    match *level {
        Level::ERROR => ("✗ ERROR", "\x1b[91m"),
        Level::WARN => ("⚠ WARN", "\x1b[93m"),
        Level::INFO => ("ℹ INFO", "\x1b[32m"),
        Level::DEBUG => ("◦ DEBUG", "\x1b[90m"),
        Level::TRACE => ("◦ TRACE", "\x1b[90m"),
    }
}

impl<S, N> FormatEvent<S, N> for WorkwiseLogFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");

        let mut fields = FieldCollector::default();
        event.record(&mut fields);

        let (label, level_color) = level_style(event.metadata().level());
        let level_column = format!("{:<width$}", label, width = LEVEL_WIDTH);

        let (cyan, color, reset) = if self.color_enabled {
            (COLOR_CYAN, level_color, COLOR_RESET)
        } else {
            ("", "", "")
        };

        write!(
            writer,
            "{}[{}] [{}] [{}{}{}] ",
            cyan,
            timestamp,
            self.service_column(fields.component.as_deref()),
            color,
            level_column,
            reset
        )?;
        writeln!(writer, "{}{}", fields.message, reset)
    }
}

/// Collects the `message` and optional `component` fields of an event.
#[derive(Default)]
struct FieldCollector {
    message: String,
    component: Option<String>,
}

impl FieldCollector {
    fn set(&mut self, name: &str, value: String) {
        match name {
            "message" => self.message = value,
            "component" => self.component = Some(value),
            _ => {}
        }
    }
}

impl tracing::field::Visit for FieldCollector {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.set(field.name(), value.to_string());
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        let mut text = format!("{:?}", value);
        if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
            text = text[1..text.len() - 1].to_string();
        }
        self.set(field.name(), text);
    }
}

fn color_enabled() -> bool {
    match std::env::var("TERM") {
        Ok(term) => term != "dumb",
        Err(_) => false,
    }
}

/// Install the global subscriber with the WorkWise formatter.
///
/// `log_level` applies to the realtime crates; everything else stays at
/// `info` unless `RUST_LOG` overrides it.
pub fn init(log_level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive(format!("workwise_realtime={}", log_level).parse()?)
        .add_directive(format!("realtime_client={}", log_level).parse()?)
        .add_directive(format!("realtime_server={}", log_level).parse()?)
        .add_directive(format!("realtime_wire={}", log_level).parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(true)
        .event_format(WorkwiseLogFormatter::new("realtime"))
        .init();
    Ok(())
}
