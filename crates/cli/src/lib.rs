pub mod commands;

use env_logger::Env;

/// Route `log` diagnostics to stderr; `RUST_LOG` overrides the `warn` default.
pub fn init_logging() {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .init();
}
