// Real settings bridge over the Android `settings` shell binary

use super::{SettingsBridge, SettingsError};
use std::process::{Command, Output};
use std::time::Duration;
use tracing::debug;

const SCREEN_OFF_TIMEOUT_KEY: &str = "screen_off_timeout";
const DEFAULT_CMD_TIMEOUT_MS: u64 = 1500;

/// Settings bridge backed by `settings get|put system screen_off_timeout`.
///
/// The `settings` binary lives in the platform image; invocations are bounded
/// by a timeout so a wedged system service cannot stall a transition.
pub struct SystemSettings {
    settings_bin: String,
    cmd_timeout: Duration,
}

impl SystemSettings {
    pub fn new() -> Self {
        Self {
            settings_bin: "/system/bin/settings".to_string(),
            cmd_timeout: Duration::from_millis(DEFAULT_CMD_TIMEOUT_MS),
        }
    }

    /// Override the binary path (test images mount it elsewhere)
    pub fn with_binary(path: impl Into<String>) -> Self {
        Self {
            settings_bin: path.into(),
            cmd_timeout: Duration::from_millis(DEFAULT_CMD_TIMEOUT_MS),
        }
    }

    fn run(&self, args: &[&str]) -> Result<Output, SettingsError> {
        run_cmd_timeout(&self.settings_bin, args, self.cmd_timeout)
            .map_err(SettingsError::Backend)
    }
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsBridge for SystemSettings {
    fn read_timeout(&self) -> Result<i32, SettingsError> {
        let out = self.run(&["get", "system", SCREEN_OFF_TIMEOUT_KEY])?;
        let stdout = String::from_utf8_lossy(&out.stdout);
        let value = stdout.trim();

        value.parse::<i32>().map_err(|_| {
            SettingsError::Backend(format!(
                "unparseable {} value: {:?}",
                SCREEN_OFF_TIMEOUT_KEY, value
            ))
        })
    }

    fn write_timeout(&self, ms: i32) -> Result<(), SettingsError> {
        if ms <= 0 {
            return Err(SettingsError::InvalidValue(ms));
        }

        debug!(target: "screenhold::settings", "writing {}={}", SCREEN_OFF_TIMEOUT_KEY, ms);

        let value = ms.to_string();
        let out = self.run(&["put", "system", SCREEN_OFF_TIMEOUT_KEY, &value])?;

        if out.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&out.stderr);
        if stderr.contains("SecurityException") || stderr.contains("WRITE_SETTINGS") {
            Err(SettingsError::PermissionDenied)
        } else {
            Err(SettingsError::Backend(format!(
                "settings put failed: {}",
                stderr.trim()
            )))
        }
    }
}

/// Run a command with a hard wall-clock bound.
///
/// The child runs on a detached thread; if it outlives the timeout the caller
/// gets an error and the thread is left to reap the child on its own.
fn run_cmd_timeout(program: &str, args: &[&str], timeout: Duration) -> Result<Output, String> {
    use std::sync::mpsc;
    use std::thread;

    let program = program.to_string();
    let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
    let (tx, rx) = mpsc::channel();

    let program_for_thread = program.clone();
    thread::spawn(move || {
        let result = Command::new(&program_for_thread)
            .args(&args)
            .output()
            .map_err(|e| format!("failed to execute {}: {}", program_for_thread, e));
        let _ = tx.send(result);
    });

    rx.recv_timeout(timeout)
        .map_err(|_| format!("{} timed out after {:?}", program, timeout))?
}
