//! Tracing setup

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static TRACING_INIT: Once = Once::new();

/// Install a stderr subscriber once per process.
///
/// `RUST_LOG` directives are honoured; `flake_core` defaults to `debug`
/// and the HTTP stack is silenced.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let mut filter = EnvFilter::from_default_env();
        for directive in [
            "flake_core=debug",
            "hyper_util=off",
            "hyper=off",
            "reqwest=off",
            "tungstenite=info",
        ] {
            if let Ok(directive) = directive.parse() {
                filter = filter.add_directive(directive);
            }
        }

        // another subscriber may already be installed by the host program
        let _ = tracing_subscriber::fmt()
            .with_target(false)
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
}
