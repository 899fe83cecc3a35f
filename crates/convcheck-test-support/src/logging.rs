//! Log capture for tests.

/// Route `log` records through the test harness's captured output.
///
/// Safe to call from every test; only the first call installs the logger.
/// `RUST_LOG` still overrides the default `debug` level.
pub fn init_test_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .parse_default_env()
        .is_test(true)
        .try_init();
}
