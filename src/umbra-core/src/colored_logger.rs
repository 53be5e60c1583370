//! Log formatting for the `umbra` commands
//!
//! Every line reads `time [COMMAND] LEVEL message`. Output goes to stderr so
//! window listings and JSON on stdout stay machine-readable.

use owo_colors::{OwoColorize, Style};
use std::fmt;
use std::io;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;

/// Command a log line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Main,
    Capture,
    Ocr,
}

impl Component {
    fn tag(self) -> (&'static str, Style) {
        match self {
            Component::Main => ("UMBRA", Style::new().cyan().bold()),
            Component::Capture => ("CAPTURE", Style::new().green().bold()),
            Component::Ocr => ("OCR", Style::new().yellow().bold()),
        }
    }
}

fn level_style(level: Level) -> Style {
    match level {
        Level::ERROR => Style::new().red().bold(),
        Level::WARN => Style::new().yellow().bold(),
        Level::INFO => Style::new().green(),
        Level::DEBUG => Style::new().blue(),
        Level::TRACE => Style::new().dimmed(),
    }
}

struct CommandFormat {
    component: Component,
}

impl<S, N> FormatEvent<S, N> for CommandFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let (name, style) = self.component.tag();
        let level = *event.metadata().level();

        write!(
            writer,
            "{} {} {} ",
            chrono::Local::now().format("%H:%M:%S").dimmed(),
            format!("[{:7}]", name).style(style),
            format!("{:5}", level.as_str()).style(level_style(level)),
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Install the stderr logger for `component`; `RUST_LOG` directives apply on
/// top of `level`. Call once per process.
pub fn init_component_logger(component: Component, level: Level) -> anyhow::Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let fmt_layer = tracing_subscriber::fmt::layer()
        .event_format(CommandFormat { component })
        .with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
