pub mod config;
pub mod core_state; // Host-facing operations over masters and documents
pub mod models;
pub mod pipeline;
pub mod store;

pub use core_state::{CoreError, CoreState};

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber, filtered by `RUST_LOG` or
/// `config::default_log_filter()`.
///
/// Returns `false` when a subscriber was already installed (hosts and tests
/// may set their own).
pub fn init_tracing() -> bool {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
    }
    installed
}

#[cfg(test)]
mod tests {
    #[test]
    fn second_init_is_refused() {
        super::init_tracing();
        assert!(!super::init_tracing());
    }
}
