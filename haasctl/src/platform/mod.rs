//! Platform backend abstraction.
//!
//! The platform is the application-hosting backend that actually runs app instances. The
//! service holds exactly one long-lived connection to it, created once by
//! [`crate::setup_routes`] through a [`PlatformConnector`] and shared by every request as a
//! [`PlatformHandle`].
//!
//! - [`Platform`]: the operations a connection offers. Implementations must be safe for
//!   concurrent use; any state that is not must be guarded inside the implementation.
//! - [`PlatformConnector`]: establishes the connection at setup time.
//! - [`dokku`]: the production implementation, speaking the Dokku daemon's line protocol.
//!
//! Every operation takes the originating request's deadline and fails with
//! [`PlatformError::Timeout`] once it passes.

use std::{fmt, path::PathBuf, str::FromStr, sync::Arc};

use async_trait::async_trait;
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;
use tokio::time::Instant;

pub mod dokku;

/// Shared handle to the platform connection
pub type PlatformHandle = Arc<dyn Platform>;

/// Result type for platform operations
pub type Result<T> = std::result::Result<T, PlatformError>;

/// Errors raised while talking to the platform backend
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The backend could not be reached at setup time
    #[error("Failed to connect to platform at {address}: {reason}")]
    Connect { address: String, reason: String },

    /// The backend accepted the socket but rejected the session
    #[error("Platform rejected the session: {0}")]
    Handshake(String),

    /// The connection broke; every later call fails with this too
    #[error("Platform connection lost")]
    ConnectionLost,

    /// The request deadline passed before the backend answered
    #[error("Platform call timed out")]
    Timeout,

    /// The backend ran the command and reported failure
    #[error("Platform command `{command}` failed: {output}")]
    CommandFailed { command: String, output: String },

    /// The backend answered with something that is not a valid reply
    #[error("Unexpected reply from platform: {0}")]
    Protocol(String),

    /// An argument that cannot be sent as a single command word
    #[error("Invalid platform argument: {0:?}")]
    InvalidArgument(String),
}

impl PlatformError {
    /// Whether the command is known not to have taken effect.
    ///
    /// For the other errors the command may have run before the reply was lost.
    pub fn is_refusal(&self) -> bool {
        matches!(self, PlatformError::CommandFailed { .. } | PlatformError::InvalidArgument(_))
    }
}

/// Operations offered by a live platform connection
#[async_trait]
pub trait Platform: Send + Sync {
    /// Version string reported by the backend
    async fn version(&self, deadline: Instant) -> Result<String>;

    /// Create an app instance with the given name
    async fn create_app(&self, name: &str, deadline: Instant) -> Result<()>;

    /// Destroy an app instance and everything attached to it
    async fn destroy_app(&self, name: &str, deadline: Instant) -> Result<()>;

    /// Whether an app instance with the given name exists
    async fn app_exists(&self, name: &str, deadline: Instant) -> Result<bool>;

    /// Names of all app instances on the backend
    async fn list_apps(&self, deadline: Instant) -> Result<Vec<String>>;

    /// `false` once the connection has been detected as broken
    fn is_connected(&self) -> bool;
}

/// Establishes the platform connection
#[async_trait]
pub trait PlatformConnector: Send + Sync {
    async fn connect(&self) -> Result<PlatformHandle>;
}

/// Where the platform backend listens.
///
/// Written as `unix:/path/to/socket` or `tcp://host:port`.
#[derive(Debug, Clone, PartialEq, Eq, DeserializeFromStr, SerializeDisplay)]
pub enum PlatformAddress {
    Unix(PathBuf),
    Tcp(String),
}

impl Default for PlatformAddress {
    fn default() -> Self {
        PlatformAddress::Unix(PathBuf::from("/var/run/dokku-daemon/dokku-daemon.sock"))
    }
}

impl FromStr for PlatformAddress {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if let Some(path) = s.strip_prefix("unix://").or_else(|| s.strip_prefix("unix:")) {
            if path.is_empty() {
                return Err("unix platform address needs a socket path".to_string());
            }
            Ok(PlatformAddress::Unix(PathBuf::from(path)))
        } else if let Some(addr) = s.strip_prefix("tcp://") {
            match addr.rsplit_once(':') {
                Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => Ok(PlatformAddress::Tcp(addr.to_string())),
                _ => Err(format!("tcp platform address must be host:port, got {addr:?}")),
            }
        } else {
            Err(format!("platform address must start with unix: or tcp://, got {s:?}"))
        }
    }
}

impl fmt::Display for PlatformAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformAddress::Unix(path) => write!(f, "unix:{}", path.display()),
            PlatformAddress::Tcp(addr) => write!(f, "tcp://{addr}"),
        }
    }
}
