//! Thin `env_logger` bootstrap, used by examples/tests/binaries — library
//! code never calls this itself.

/// Initializes a global `env_logger` subscriber from `RUST_LOG`, if one
/// hasn't been installed yet. Safe to call more than once.
#[cfg(feature = "init_env_logger")]
pub fn init_logger() {
    let _ = env_logger::Builder::from_default_env().try_init();
}
