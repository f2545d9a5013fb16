use time::{format_description::well_known::Iso8601, UtcOffset};
use tracing_subscriber::{
    fmt::{self, time::OffsetTime},
    layer::SubscriberExt,
    EnvFilter,
};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

struct Guard {}

impl Drop for Guard {
    fn drop(&mut self) {}
}

/// The filter from `rust_log` if it is set, otherwise `default_directives`,
/// and a description of where it came from.
fn env_filter(
    rust_log: Option<&str>,
    default_directives: &str,
) -> Result<(EnvFilter, String), BoxError> {
    match rust_log {
        Some(var) => Ok((EnvFilter::try_new(var)?, format!("RUST_LOG=\"{var}\""))),
        None => Ok((
            EnvFilter::try_new(default_directives)?,
            format!("default filter \"{default_directives}\""),
        )),
    }
}

/// Start logging to file and console, both optional.
///
/// Timestamps are ISO 8601 in the local UTC offset at startup.
pub fn initiate_logging<P: AsRef<std::path::Path>>(
    path: Option<P>,
    disable_console: bool,
    default_directives: &str,
) -> Result<impl Drop, BoxError> {
    let timer = OffsetTime::new(
        UtcOffset::from_whole_seconds(chrono::Local::now().offset().local_minus_utc())?,
        Iso8601::DEFAULT,
    );

    let file_layer = match &path {
        Some(path) => {
            let file = std::fs::File::create(path)?;
            Some(
                fmt::layer()
                    .with_timer(timer.clone())
                    .with_writer(std::sync::Mutex::new(file))
                    .with_ansi(false)
                    .with_file(true)
                    .with_line_number(true),
            )
        }
        None => None,
    };

    let console_layer = (!disable_console).then(|| {
        fmt::layer()
            .with_timer(timer)
            .with_ansi(!cfg!(windows))
            .with_target(false)
    });

    let rust_log = std::env::var("RUST_LOG").ok();
    let (filter, filter_desc) = env_filter(rust_log.as_deref(), default_directives)?;
    let collector = tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .with(filter);
    tracing::subscriber::set_global_default(collector)?;

    if let Some(path) = &path {
        tracing::debug!(
            "Logging initiated to file \"{}\" with {filter_desc}.",
            path.as_ref().display(),
        );
    }
    if !disable_console {
        tracing::debug!("Logging initiated to console with {filter_desc}.");
    }

    Ok(Guard {})
}
