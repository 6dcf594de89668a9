//! Persisted preference store
//!
//! Holds the three policy fields behind a [`StorageBackend`]: the kept-on
//! duration and the two restore toggles. One key per field, flushed before
//! every setter returns, so a process restart always sees the last write.

pub mod backend;

pub use backend::{MemoryStorage, SledStorage, StorageBackend};

use crate::policy::{KeptOnDuration, TimeoutPolicy};
use std::sync::Arc;
use thiserror::Error;

const KEPT_ON_MS_KEY: &[u8] = b"policy_kept_on_ms";
const RESTORE_ON_BATTERY_LOW_KEY: &[u8] = b"policy_restore_on_battery_low";
const RESTORE_ON_SCREEN_OFF_KEY: &[u8] = b"policy_restore_on_screen_off";

/// Errors that can occur reading or writing preferences
#[derive(Debug, Error, Clone)]
pub enum PrefsError {
    #[error("unsupported kept-on duration: {0} ms")]
    InvalidDuration(i32),

    #[error("preference storage error: {0}")]
    Storage(String),
}

/// Typed view over the persisted policy fields
pub struct PreferenceStore {
    backend: Arc<dyn StorageBackend>,
}

impl PreferenceStore {
    /// Store over an arbitrary backend
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Volatile store for tests and dry runs
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// Sled-backed store at the given path
    pub fn persistent(path: &str) -> Result<Self, PrefsError> {
        let backend = SledStorage::new(path).map_err(PrefsError::Storage)?;
        Ok(Self::new(Arc::new(backend)))
    }

    /// Read the full policy; missing keys fall back to defaults
    pub fn policy(&self) -> Result<TimeoutPolicy, PrefsError> {
        let defaults = TimeoutPolicy::default();
        Ok(TimeoutPolicy {
            kept_on: self
                .read_i32(KEPT_ON_MS_KEY)?
                .and_then(KeptOnDuration::from_millis)
                .unwrap_or(defaults.kept_on),
            restore_on_battery_low: self
                .read_bool(RESTORE_ON_BATTERY_LOW_KEY)?
                .unwrap_or(defaults.restore_on_battery_low),
            restore_on_screen_off: self
                .read_bool(RESTORE_ON_SCREEN_OFF_KEY)?
                .unwrap_or(defaults.restore_on_screen_off),
        })
    }

    /// Persist a new kept-on duration
    pub fn set_kept_on(&self, duration: KeptOnDuration) -> Result<(), PrefsError> {
        self.write(KEPT_ON_MS_KEY, &duration.as_millis().to_le_bytes())
    }

    /// Persist a kept-on duration given as raw milliseconds.
    ///
    /// Rejects anything outside the enumerated option set.
    pub fn set_kept_on_millis(&self, ms: i32) -> Result<KeptOnDuration, PrefsError> {
        let duration = KeptOnDuration::from_millis(ms).ok_or(PrefsError::InvalidDuration(ms))?;
        self.set_kept_on(duration)?;
        Ok(duration)
    }

    /// Persist the restore-on-battery-low toggle
    pub fn set_restore_on_battery_low(&self, enabled: bool) -> Result<(), PrefsError> {
        self.write(RESTORE_ON_BATTERY_LOW_KEY, &[enabled as u8])
    }

    /// Persist the restore-on-screen-off toggle
    pub fn set_restore_on_screen_off(&self, enabled: bool) -> Result<(), PrefsError> {
        self.write(RESTORE_ON_SCREEN_OFF_KEY, &[enabled as u8])
    }

    fn write(&self, key: &[u8], value: &[u8]) -> Result<(), PrefsError> {
        self.backend.put(key, value).map_err(PrefsError::Storage)?;
        self.backend.flush().map_err(PrefsError::Storage)?;
        Ok(())
    }

    fn read_i32(&self, key: &[u8]) -> Result<Option<i32>, PrefsError> {
        let bytes = self.backend.get(key).map_err(PrefsError::Storage)?;
        Ok(bytes
            .and_then(|b| <[u8; 4]>::try_from(b.as_slice()).ok())
            .map(i32::from_le_bytes))
    }

    fn read_bool(&self, key: &[u8]) -> Result<Option<bool>, PrefsError> {
        let bytes = self.backend.get(key).map_err(PrefsError::Storage)?;
        Ok(bytes.map(|b| b.first().copied() == Some(1)))
    }
}

// ============================================================================
// TESTS
// ============================================================================
