//! Firmware registry HTTP service.
//!
//! Stores firmware binaries per device type and version, serves them to
//! devices, and notifies webhook subscribers when firmware is uploaded or
//! deleted. Access is decided by [`fwreg_auth::AccessGate`].

pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod router;
pub mod semver;
pub mod startup;
pub mod state;
pub mod storage;

pub use config::{Config, ConfigError};
pub use error::{ApiError, ApiResult};
pub use logging::{LogGuard, LoggingError};
pub use router::build_router;
pub use startup::{build_state, StartupError};
pub use state::AppState;
pub use storage::FirmwareStore;
