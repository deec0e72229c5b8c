//! Tracing subscriber bootstrap.
//!
//! The layer itself only emits `tracing` events; binaries call [`init`] once at startup
//! to print them. The filter is read from `DUOSHELF_LOG` (for example
//! `DUOSHELF_LOG=duoshelf_core=debug,info`) and defaults to `info`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{DocumentStoreError, DocumentStoreResult};

pub const LOG_ENV: &str = "DUOSHELF_LOG";
pub const DEFAULT_FILTER: &str = "info";

/// Installs the global subscriber, filtered by `DUOSHELF_LOG`.
///
/// `pretty` switches from one line per event to multi-line output for local runs.
///
/// # Errors
///
/// [`DocumentStoreError::Initialization`] if a global subscriber is already installed.
pub fn init(pretty: bool) -> DocumentStoreResult<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    install(filter, pretty)
}

/// Like [`init`], with explicit filter directives instead of the environment.
pub fn init_with_filter(directives: &str, pretty: bool) -> DocumentStoreResult<()> {
    let filter = EnvFilter::try_new(directives)
        .map_err(|e| DocumentStoreError::Config(format!("invalid log filter {directives:?}: {e}")))?;
    install(filter, pretty)
}

fn install(filter: EnvFilter, pretty: bool) -> DocumentStoreResult<()> {
    let registry = tracing_subscriber::registry().with(filter);

    let result = if pretty {
        registry.with(fmt::layer().pretty()).try_init()
    } else {
        registry.with(fmt::layer().compact().with_target(false)).try_init()
    };

    result.map_err(|e| DocumentStoreError::Initialization(format!("logging: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_directives() {
        assert!(matches!(
            init_with_filter("duoshelf=notalevel", false),
            Err(DocumentStoreError::Config(_))
        ));
    }

    #[test]
    fn second_install_fails() {
        let _ = init_with_filter("warn", false);

        assert!(matches!(init(false), Err(DocumentStoreError::Initialization(_))));
    }
}
