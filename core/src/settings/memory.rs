// In-memory settings bridge for tests and dry runs

use super::{SettingsBridge, SettingsError};
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug)]
struct Inner {
    timeout_ms: i32,
    write_allowed: bool,
    writes: Vec<i32>,
}

/// Settings bridge holding the timeout in memory.
///
/// Behaves like the OS surface: reads always succeed, writes are gated on a
/// toggleable permission and validated. Every accepted write is recorded so
/// tests can assert exactly which values were applied, in order.
#[derive(Clone)]
pub struct MemorySettings {
    inner: Arc<RwLock<Inner>>,
}

impl MemorySettings {
    pub fn new(initial_timeout_ms: i32) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                timeout_ms: initial_timeout_ms,
                write_allowed: true,
                writes: Vec::new(),
            })),
        }
    }

    /// Simulate revoking the write-settings permission
    pub fn deny_writes(&self) {
        self.inner.write().write_allowed = false;
    }

    /// Simulate granting the write-settings permission
    pub fn allow_writes(&self) {
        self.inner.write().write_allowed = true;
    }

    /// Simulate the timeout changing outside this process
    pub fn set_external(&self, ms: i32) {
        self.inner.write().timeout_ms = ms;
    }

    /// Current stored value
    pub fn timeout(&self) -> i32 {
        self.inner.read().timeout_ms
    }

    /// Every value accepted by `write_timeout`, oldest first
    pub fn writes(&self) -> Vec<i32> {
        self.inner.read().writes.clone()
    }
}

impl SettingsBridge for MemorySettings {
    fn read_timeout(&self) -> Result<i32, SettingsError> {
        Ok(self.inner.read().timeout_ms)
    }

    fn write_timeout(&self, ms: i32) -> Result<(), SettingsError> {
        if ms <= 0 {
            return Err(SettingsError::InvalidValue(ms));
        }

        let mut inner = self.inner.write();
        if !inner.write_allowed {
            return Err(SettingsError::PermissionDenied);
        }

        inner.timeout_ms = ms;
        inner.writes.push(ms);
        Ok(())
    }
}
