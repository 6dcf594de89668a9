// Screen power observer over `dumpsys power`

use super::{run_cmd_timeout, SignalError, SignalObserver};
use parking_lot::Mutex;
use std::path::Path;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

const DEFAULT_DUMPSYS_BIN: &str = "/system/bin/dumpsys";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const CMD_TIMEOUT: Duration = Duration::from_millis(1500);

/// Publishes `true` while the screen is on, `false` once it turns off.
///
/// Polls the power service on an interval and pushes only transitions; the
/// watch channel starts at `true` so the first delivered change is a real
/// screen-off edge, never an assumed one.
pub struct ScreenPowerObserver {
    dumpsys_bin: String,
    poll_interval: Duration,
    tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ScreenPowerObserver {
    pub fn new() -> Self {
        Self::with_binary(DEFAULT_DUMPSYS_BIN)
    }

    pub fn with_binary(path: impl Into<String>) -> Self {
        let (tx, _rx) = watch::channel(true);
        Self {
            dumpsys_bin: path.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            tx,
            task: Mutex::new(None),
        }
    }

    async fn probe(dumpsys_bin: &str) -> Result<bool, String> {
        let out = run_cmd_timeout(dumpsys_bin, &["power"], CMD_TIMEOUT).await?;
        let s = String::from_utf8_lossy(&out.stdout);

        Ok(s.contains("mWakefulness=Awake")
            || s.contains("mAwake=true")
            || s.contains("mInteractive=true")
            || s.contains("mScreenOn=true"))
    }

    /// One-shot probe of the OS-held state, independent of the poll task
    pub async fn current(&self) -> Result<bool, SignalError> {
        Self::probe(&self.dumpsys_bin)
            .await
            .map_err(SignalError::Unavailable)
    }
}

impl Default for ScreenPowerObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalObserver for ScreenPowerObserver {
    fn subscribe(&self) -> Result<watch::Receiver<bool>, SignalError> {
        let mut task = self.task.lock();

        if task.is_none() {
            if !Path::new(&self.dumpsys_bin).exists() {
                return Err(SignalError::Unavailable(format!(
                    "{} not present",
                    self.dumpsys_bin
                )));
            }

            let dumpsys_bin = self.dumpsys_bin.clone();
            let interval = self.poll_interval;
            let tx = self.tx.clone();

            *task = Some(tokio::spawn(async move {
                loop {
                    match Self::probe(&dumpsys_bin).await {
                        Ok(on) => {
                            tx.send_if_modified(|current| {
                                if *current != on {
                                    *current = on;
                                    true
                                } else {
                                    false
                                }
                            });
                        }
                        Err(e) => {
                            debug!(target: "screenhold::observe", "screen probe failed: {}", e)
                        }
                    }
                    tokio::time::sleep(interval).await;
                }
            }));
        }

        Ok(self.tx.subscribe())
    }

    fn unsubscribe(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    fn last(&self) -> bool {
        *self.tx.borrow()
    }
}
