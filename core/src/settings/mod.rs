//! OS screen-off timeout access
//!
//! The single system-call surface the controller depends on. Every call is a
//! direct round-trip, since the OS value can change outside this process;
//! nothing here caches.

pub mod memory;
pub mod system;

pub use memory::MemorySettings;
pub use system::SystemSettings;

use thiserror::Error;

/// Errors from the settings surface
#[derive(Debug, Error, Clone)]
pub enum SettingsError {
    #[error("write settings permission not granted")]
    PermissionDenied,

    #[error("invalid timeout value: {0} ms")]
    InvalidValue(i32),

    #[error("settings backend error: {0}")]
    Backend(String),
}

/// Read/write access to the OS screen-off timeout.
///
/// Reads never fail with [`SettingsError::PermissionDenied`]; writes do when
/// the process lacks the write-settings capability. Writes of non-positive
/// values fail with [`SettingsError::InvalidValue`].
#[cfg_attr(test, mockall::automock)]
pub trait SettingsBridge: Send + Sync {
    fn read_timeout(&self) -> Result<i32, SettingsError>;
    fn write_timeout(&self, ms: i32) -> Result<(), SettingsError>;
}
