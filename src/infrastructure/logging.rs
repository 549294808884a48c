use crate::domain::settings::LogSettings;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Target prefix shared by every module in this crate
const CRATE_TARGET: &str = env!("CARGO_CRATE_NAME");

pub struct LoggingGuard {
    // Flushes buffered file output when dropped
    _guards: Vec<WorkerGuard>,
}

fn parse_rotation(rotation: &str) -> Rotation {
    match rotation.to_lowercase().as_str() {
        "hourly" => Rotation::HOURLY,
        "minutely" => Rotation::MINUTELY,
        "never" => Rotation::NEVER,
        _ => Rotation::DAILY,
    }
}

/// `warn,heart_rate_link=info,<extra directives>`
fn filter_directives(settings: &LogSettings) -> String {
    let mut directives = vec![
        settings.dependency_level.clone(),
        format!("{}={}", CRATE_TARGET, settings.level),
    ];
    directives.extend(
        settings
            .directives
            .iter()
            .map(|d| d.trim())
            .filter(|d| !d.is_empty())
            .map(str::to_string),
    );
    directives.join(",")
}

fn build_filter(settings: &LogSettings) -> EnvFilter {
    // RUST_LOG wins over the configured levels
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let directives = filter_directives(settings);
    EnvFilter::try_new(&directives).unwrap_or_else(|e| {
        eprintln!("Ignoring invalid log filter {:?}: {}", directives, e);
        EnvFilter::new(format!("warn,{}=info", CRATE_TARGET))
    })
}

pub fn init_logger(settings: &LogSettings) -> anyhow::Result<LoggingGuard> {
    let mut guards = Vec::new();

    let console_layer = settings.console_logging_enabled.then(|| {
        fmt::layer()
            .with_writer(std::io::stdout)
            .with_file(settings.show_file_line)
            .with_line_number(settings.show_file_line)
            .with_thread_ids(settings.show_thread_ids)
            .with_target(settings.show_target)
            .with_ansi(settings.ansi_colors)
    });

    let file_layer = if settings.file_logging_enabled {
        let appender = RollingFileAppender::new(
            parse_rotation(&settings.rotation),
            &settings.log_dir,
            &settings.file_name_prefix,
        );
        let (writer, guard) = tracing_appender::non_blocking(appender);
        guards.push(guard);
        Some(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_file(settings.show_file_line)
                .with_line_number(settings.show_file_line)
                .with_thread_ids(settings.show_thread_ids)
                .with_target(settings.show_target),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(build_filter(settings))
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!(
        "Logging to {}",
        match (settings.console_logging_enabled, settings.file_logging_enabled) {
            (true, true) => "console and file",
            (true, false) => "console",
            (false, true) => "file",
            (false, false) => "nowhere",
        }
    );

    Ok(LoggingGuard { _guards: guards })
}
