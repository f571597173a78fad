//! Logging setup, powered by tracing-subscriber.
//!
//! Events go to stderr so stdout stays free for `--list` output.

use tracing_subscriber::EnvFilter;

use crate::error::ConfigError;

/// Build the `EnvFilter` from the base level plus noisy-crate overrides.
///
/// `RUST_LOG`, when set, replaces the whole filter.
pub fn build_env_filter(level: &str) -> Result<EnvFilter, ConfigError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut directives = vec![level.to_string()];
    let noisy: &[(&str, &str)] = &[("hyper", "warn"), ("axum", "warn"), ("tower", "warn")];
    for (target, lvl) in noisy {
        directives.push(format!("{}={}", target, lvl));
    }

    let filter_str = directives.join(",");
    EnvFilter::try_new(&filter_str).map_err(|e| {
        ConfigError::Invalid(format!("invalid log filter '{}': {}", filter_str, e))
    })
}

/// Install the global subscriber. Calling it twice is harmless.
pub fn init(level: &str) -> Result<(), ConfigError> {
    let filter = build_env_filter(level)?;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noisy_crates_are_quieted() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let filter = build_env_filter("debug").unwrap();
        let rendered = filter.to_string();
        assert!(rendered.contains("hyper=warn"));
        assert!(rendered.contains("debug"));
    }

    #[test]
    fn garbage_level_is_rejected() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        assert!(build_env_filter("kvsoak=verbose").is_err());
    }
}
