//! TLS settings for MySQL connections.

use mysql_async::SslOpts;

use crate::error::{MigrateError, Result};

/// SSL modes accepted in `ssl_mode`.
///
/// Names follow the MySQL client's `--ssl-mode` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    /// Plain TCP.
    Disable,
    /// Try TLS without verification, fall back to plain TCP.
    #[default]
    Prefer,
    /// TLS without certificate verification.
    /// **Security Warning**: Vulnerable to man-in-the-middle attacks.
    Require,
    /// Verify the server certificate against the CA but not the hostname.
    VerifyCa,
    /// Full certificate and hostname verification.
    VerifyFull,
}

impl SslMode {
    /// Parse an SSL mode from a string.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "disable" | "disabled" | "false" => Ok(SslMode::Disable),
            "prefer" | "preferred" | "" => Ok(SslMode::Prefer),
            "require" | "required" | "true" => Ok(SslMode::Require),
            "verify-ca" => Ok(SslMode::VerifyCa),
            "verify-full" | "verify-identity" => Ok(SslMode::VerifyFull),
            other => Err(MigrateError::Config(format!(
                "Invalid ssl_mode '{}'. Valid values: disable, prefer, require, verify-ca, verify-full",
                other
            ))),
        }
    }

    /// TLS options for the first connection attempt; `None` means plain TCP.
    pub fn ssl_opts(&self) -> Option<SslOpts> {
        match self {
            SslMode::Disable => None,
            SslMode::Prefer | SslMode::Require => Some(
                SslOpts::default()
                    .with_danger_accept_invalid_certs(true)
                    .with_danger_skip_domain_validation(true),
            ),
            SslMode::VerifyCa => Some(SslOpts::default().with_danger_skip_domain_validation(true)),
            SslMode::VerifyFull => Some(SslOpts::default()),
        }
    }

    /// Whether a failed TLS attempt may be retried in plain TCP.
    pub fn allows_plain_fallback(&self) -> bool {
        matches!(self, SslMode::Prefer)
    }
}
