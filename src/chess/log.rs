use std::env;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "CHECKMATE_LOG";
const DEFAULT_DIRECTIVE: &str = "warn";
const VERBOSE_DIRECTIVE: &str = "debug";

/// Maps the short level spellings users tend to type onto tracing's names.
/// Anything else is passed through to `EnvFilter` untouched.
fn normalize_directive(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.to_lowercase().as_str() {
        "" => DEFAULT_DIRECTIVE.to_string(),
        "err" => "error".to_string(),
        "warning" => "warn".to_string(),
        _ => trimmed.to_string(),
    }
}

fn filter_from(raw: Option<&str>, verbose: bool) -> EnvFilter {
    if verbose {
        return EnvFilter::new(VERBOSE_DIRECTIVE);
    }
    let directive = raw.map_or_else(|| DEFAULT_DIRECTIVE.to_string(), normalize_directive);
    EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Installs the stderr subscriber. Calling it again is a no-op.
pub fn init(verbose: bool) {
    let raw = env::var(LOG_ENV).ok();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_from(raw.as_deref(), verbose))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
