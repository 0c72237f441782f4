//! Log output for applications built on the client.

use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, or by `default`
/// when `RUST_LOG` is unset or invalid.
///
/// The client logs messages in both directions at `trace`, connection
/// changes at `info`, unparseable messages and protocol inconsistencies
/// at `warn`, and handler faults at `error`.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init(default: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_refused() {
        init("warn");
        assert!(!init("warn"));
    }
}
