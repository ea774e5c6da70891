//! Built-in defaults used when no file, environment, or flag overrides them.

use url::Url;

/// Base URL of the local runtime's HTTP API.
///
/// The runtime always publishes its API on this port of the loopback
/// interface, so the default never needs discovery.
pub const DEFAULT_BASE_URL: &str = "http://localhost:9090/";

/// Name of the installer binary resolved from `PATH` when no explicit path is
/// configured.
pub const DEFAULT_INSTALLER_BIN: &str = "kilnctl";

/// Default filter directive for diagnostic logging.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Seconds a status query may take before the installer is presumed wedged.
pub const DEFAULT_STATUS_TIMEOUT_SECS: u64 = 60;

/// Seconds a lifecycle operation (install, start, stop, uninstall) may take.
///
/// Installs pull container images, so this is deliberately generous.
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 1800;

/// Parses [`DEFAULT_BASE_URL`] into a [`Url`].
pub fn default_base_url() -> Url {
    // The constant is a compile-time literal; this can only fail if the
    // literal itself is edited to something malformed.
    #[expect(clippy::expect_used, reason = "constant literal is a valid URL")]
    Url::parse(DEFAULT_BASE_URL).expect("default base URL must parse")
}
