// Battery-optimization exemption observer over `dumpsys deviceidle`

use super::{run_cmd_timeout, SignalError, SignalObserver};
use parking_lot::Mutex;
use std::path::Path;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

const DEFAULT_DUMPSYS_BIN: &str = "/system/bin/dumpsys";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const CMD_TIMEOUT: Duration = Duration::from_millis(1500);

/// Publishes whether this package holds a battery-optimization exemption.
///
/// The device-idle whitelist is the OS-held truth; the observer polls it and
/// pushes a value only when membership flips. Starts at `false`; the
/// exemption is never assumed granted.
pub struct BatteryExemptionObserver {
    dumpsys_bin: String,
    package: String,
    poll_interval: Duration,
    tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BatteryExemptionObserver {
    pub fn new(package: impl Into<String>) -> Self {
        Self::with_binary(DEFAULT_DUMPSYS_BIN, package)
    }

    pub fn with_binary(path: impl Into<String>, package: impl Into<String>) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            dumpsys_bin: path.into(),
            package: package.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            tx,
            task: Mutex::new(None),
        }
    }

    async fn probe(dumpsys_bin: &str, package: &str) -> Result<bool, String> {
        let out = run_cmd_timeout(dumpsys_bin, &["deviceidle", "whitelist"], CMD_TIMEOUT).await?;
        let s = String::from_utf8_lossy(&out.stdout);

        // Whitelist lines are `<source>,<package>,<uid>`
        Ok(s.lines().any(|line| {
            line.split(',')
                .nth(1)
                .map(|pkg| pkg.trim() == package)
                .unwrap_or(false)
        }))
    }

    /// One-shot probe of the OS-held state, independent of the poll task
    pub async fn current(&self) -> Result<bool, SignalError> {
        Self::probe(&self.dumpsys_bin, &self.package)
            .await
            .map_err(SignalError::Unavailable)
    }
}

impl SignalObserver for BatteryExemptionObserver {
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
            let package = self.package.clone();
            let interval = self.poll_interval;
            let tx = self.tx.clone();

            *task = Some(tokio::spawn(async move {
                loop {
                    match Self::probe(&dumpsys_bin, &package).await {
                        Ok(exempt) => {
                            tx.send_if_modified(|current| {
                                if *current != exempt {
                                    *current = exempt;
                                    true
                                } else {
                                    false
                                }
                            });
                        }
                        Err(e) => {
                            debug!(target: "screenhold::observe", "exemption probe failed: {}", e)
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
