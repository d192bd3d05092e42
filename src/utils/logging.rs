//! Logger setup for embedders that do not install their own.

use env_logger::Env;

/// Initialise `env_logger`, honouring `RUST_LOG` when set.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).try_init();
}

/// Logger for tests: captured output, never panics on re-init.
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
