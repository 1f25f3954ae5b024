use std::sync::Mutex;

const COMMANDS: [&str; 5] = ["/open", "/msg", "/search", "/system", "/help"];

pub fn init_logging(log_file_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let file = std::fs::File::create(log_file_path)?;
    let file_writer = std::io::BufWriter::new(file);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(Mutex::new(file_writer))
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .with_file(true);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .init();

    tracing::info!("Logging initialized to: {}", log_file_path);

    Ok(())
}

/// Complete a command prefix. Returns the completion, or a hint listing the
/// candidates when the prefix is ambiguous.
pub fn try_autocomplete(text: &str) -> (Option<String>, Option<String>) {
    if !text.starts_with('/') || text.contains(char::is_whitespace) {
        return (None, None);
    }

    let matches: Vec<&str> = COMMANDS
        .iter()
        .copied()
        .filter(|cmd| cmd.starts_with(text))
        .collect();

    match matches.as_slice() {
        [] => (None, None),
        [only] => (Some(format!("{} ", only)), None),
        many => (None, Some(many.join("  "))),
    }
}

#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        ::tracing::debug!($($arg)*)
    };
}

#[macro_export]
macro_rules! info_log {
    ($($arg:tt)*) => {
        ::tracing::info!($($arg)*)
    };
}

#[macro_export]
macro_rules! warn_log {
    ($($arg:tt)*) => {
        ::tracing::warn!($($arg)*)
    };
}

#[macro_export]
macro_rules! error_log {
    ($($arg:tt)*) => {
        ::tracing::error!($($arg)*)
    };
}
