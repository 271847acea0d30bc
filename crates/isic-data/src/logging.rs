use tracing_subscriber::EnvFilter;

/// Environment variable consulted before `RUST_LOG`.
pub const LOG_ENV: &str = "ISIC_LOG";

/// Installs a `tracing_subscriber` fmt subscriber using `ISIC_LOG` first, then
/// `RUST_LOG`, then `info`.
///
/// Returns `false` if a global subscriber was already set.
pub fn init_tracing() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .try_init()
        .is_ok()
}

pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let _ = init_tracing();
        assert!(!init_tracing());
    }

    #[test]
    fn filter_always_resolves() {
        let filter = env_filter();
        assert!(!filter.to_string().is_empty());
    }
}
