//! Timeout-restoration state machine
//!
//! Owns the kept-on lifecycle: capture the OS timeout on activation, hold the
//! configured kept-on value, and put the saved value back when the user or a
//! qualifying signal says so. All transitions serialize through one lock, and
//! each transition is atomic with its paired settings call.

use crate::policy::{KeptOnDuration, TimeoutPolicy};
use crate::prefs::{PreferenceStore, PrefsError};
use crate::settings::{SettingsBridge, SettingsError};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Errors surfaced by controller commands
#[derive(Debug, Error, Clone)]
pub enum ControllerError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Prefs(#[from] PrefsError),
}

// ============================================================================
// ENUMS & TYPES
// ============================================================================

/// Why a restore happened (or was attempted)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestoreReason {
    /// Explicit `deactivate()` command
    Explicit,
    /// Screen turned off with the screen-off toggle enabled
    ScreenOff,
    /// OS low-battery broadcast with the battery toggle enabled
    BatteryLow,
}

impl std::fmt::Display for RestoreReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Explicit => write!(f, "explicit"),
            Self::ScreenOff => write!(f, "screen off"),
            Self::BatteryLow => write!(f, "battery low"),
        }
    }
}

/// A delivered state change from the observers or the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    /// Battery-optimization exemption granted or revoked
    ExemptionChanged(bool),
    /// Screen turned on or off
    ScreenChanged(bool),
    /// OS low-battery broadcast fired
    BatteryLow,
}

/// Last-delivered observer values, read-only to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalState {
    pub exemption_granted: bool,
    pub screen_on: bool,
}

impl Default for SignalState {
    fn default() -> Self {
        // Conservative until a signal arrives: no exemption, screen on. A
        // restore requires an observed on-to-off edge, never an assumed one.
        Self {
            exemption_granted: false,
            screen_on: true,
        }
    }
}

/// Snapshot for status rows
#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    pub active: bool,
    pub policy: TimeoutPolicy,
    pub signals: SignalState,
    /// Live OS value; `None` when the read failed
    pub current_timeout_ms: Option<i32>,
}

/// Activation state. The saved timeout exists exactly while active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activation {
    Idle,
    Active { saved_timeout_ms: i32 },
}

// ============================================================================
// DELEGATE
// ============================================================================

/// Callback interface for surfacing controller outcomes to the UI
pub trait ControllerDelegate: Send + Sync {
    /// Activation took effect with the given kept-on duration
    fn on_activated(&self, kept_on: KeptOnDuration);
    /// The saved timeout was written back
    fn on_restored(&self, reason: RestoreReason, restored_ms: i32);
    /// A restore was suppressed because the battery-optimization exemption is
    /// missing; the UI should prompt the user to grant it. Nothing is retried
    /// until the next qualifying signal.
    fn on_exemption_required(&self, trigger: RestoreReason);
}

// ============================================================================
// TIMEOUT CONTROLLER
// ============================================================================

/// The `Idle`/`Active` state machine over the settings bridge.
///
/// Commands and delivered signals all funnel through the activation lock, so
/// transitions never interleave. Signal delivery is expected to come from a
/// single consumer task ([`TimeoutController::run_event_loop`]).
pub struct TimeoutController {
    settings: Arc<dyn SettingsBridge>,
    prefs: Arc<PreferenceStore>,
    activation: Mutex<Activation>,
    signals: RwLock<SignalState>,
    delegate: RwLock<Option<Arc<dyn ControllerDelegate>>>,
}

impl TimeoutController {
    pub fn new(settings: Arc<dyn SettingsBridge>, prefs: Arc<PreferenceStore>) -> Self {
        Self {
            settings,
            prefs,
            activation: Mutex::new(Activation::Idle),
            signals: RwLock::new(SignalState::default()),
            delegate: RwLock::new(None),
        }
    }

    pub fn set_delegate(&self, delegate: Option<Arc<dyn ControllerDelegate>>) {
        *self.delegate.write() = delegate;
    }

    // ------------------------------------------------------------------------
    // COMMANDS
    // ------------------------------------------------------------------------

    /// Capture the current OS timeout and apply the kept-on value.
    ///
    /// Idempotent: a second call while active changes nothing, including the
    /// saved value.
    pub fn activate(&self) -> Result<(), ControllerError> {
        let kept_on;
        {
            let mut activation = self.activation.lock();
            if matches!(*activation, Activation::Active { .. }) {
                debug!(target: "screenhold::controller", "activate: already active");
                return Ok(());
            }

            let saved_timeout_ms = self.settings.read_timeout()?;
            kept_on = self.prefs.policy()?.kept_on;
            self.settings.write_timeout(kept_on.as_millis())?;
            *activation = Activation::Active { saved_timeout_ms };

            info!(
                target: "screenhold::controller",
                "activated: kept-on {} applied, saved {} ms", kept_on, saved_timeout_ms
            );
        }
        self.notify(|d| d.on_activated(kept_on));
        Ok(())
    }

    /// Write the saved timeout back and return to idle. No-op when idle.
    pub fn deactivate(&self) -> Result<(), ControllerError> {
        self.restore(RestoreReason::Explicit)
    }

    /// Persist a restore toggle. Affects future transitions only.
    pub fn set_restore_on_battery_low(&self, enabled: bool) -> Result<(), ControllerError> {
        self.prefs.set_restore_on_battery_low(enabled)?;
        Ok(())
    }

    /// Persist a restore toggle. Affects future transitions only.
    pub fn set_restore_on_screen_off(&self, enabled: bool) -> Result<(), ControllerError> {
        self.prefs.set_restore_on_screen_off(enabled)?;
        Ok(())
    }

    /// Persist a new kept-on duration; while active, re-apply it immediately
    /// without touching the saved timeout.
    pub fn set_kept_on_duration(&self, duration: KeptOnDuration) -> Result<(), ControllerError> {
        self.prefs.set_kept_on(duration)?;

        let activation = self.activation.lock();
        if matches!(*activation, Activation::Active { .. }) {
            self.settings.write_timeout(duration.as_millis())?;
            info!(target: "screenhold::controller", "kept-on re-applied: {}", duration);
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // STATUS
    // ------------------------------------------------------------------------

    pub fn is_active(&self) -> bool {
        matches!(*self.activation.lock(), Activation::Active { .. })
    }

    pub fn policy(&self) -> Result<TimeoutPolicy, ControllerError> {
        Ok(self.prefs.policy()?)
    }

    pub fn signal_state(&self) -> SignalState {
        *self.signals.read()
    }

    pub fn status(&self) -> Result<ControllerStatus, ControllerError> {
        Ok(ControllerStatus {
            active: self.is_active(),
            policy: self.prefs.policy()?,
            signals: self.signal_state(),
            current_timeout_ms: self.settings.read_timeout().ok(),
        })
    }

    // ------------------------------------------------------------------------
    // SIGNALS
    // ------------------------------------------------------------------------

    /// Entry point for the OS low-battery broadcast (delivered by the
    /// embedding process; the core never subscribes to it directly).
    pub fn notify_battery_low(&self) -> Result<(), ControllerError> {
        self.handle_event(SignalEvent::BatteryLow)
    }

    /// Apply one delivered signal. Callers must not invoke this concurrently
    /// with itself; the event loop is the single consumer.
    pub fn handle_event(&self, event: SignalEvent) -> Result<(), ControllerError> {
        match event {
            SignalEvent::ExemptionChanged(granted) => {
                // Only enables or disables the restore paths; acting on it
                // waits for a qualifying trigger.
                self.signals.write().exemption_granted = granted;
                debug!(target: "screenhold::controller", "exemption granted: {}", granted);
                Ok(())
            }
            SignalEvent::ScreenChanged(on) => {
                let was_on = {
                    let mut signals = self.signals.write();
                    let was_on = signals.screen_on;
                    signals.screen_on = on;
                    was_on
                };
                if was_on && !on {
                    self.on_trigger(RestoreReason::ScreenOff)
                } else {
                    Ok(())
                }
            }
            SignalEvent::BatteryLow => self.on_trigger(RestoreReason::BatteryLow),
        }
    }

    /// A restore trigger fired; consult policy and the exemption gate.
    fn on_trigger(&self, reason: RestoreReason) -> Result<(), ControllerError> {
        if !self.is_active() {
            return Ok(());
        }

        let policy = self.prefs.policy()?;
        let enabled = match reason {
            RestoreReason::ScreenOff => policy.restore_on_screen_off,
            RestoreReason::BatteryLow => policy.restore_on_battery_low,
            RestoreReason::Explicit => true,
        };
        if !enabled {
            return Ok(());
        }

        // Writing the timeout from a process the OS may suspend is not
        // reliable without the exemption; surface the missing precondition
        // instead of promising a restore that might not land.
        if !self.signal_state().exemption_granted {
            warn!(
                target: "screenhold::controller",
                "restore on {} suppressed: battery-optimization exemption missing", reason
            );
            self.notify(|d| d.on_exemption_required(reason));
            return Ok(());
        }

        self.restore(reason)
    }

    fn restore(&self, reason: RestoreReason) -> Result<(), ControllerError> {
        let restored_ms;
        {
            let mut activation = self.activation.lock();
            let Activation::Active { saved_timeout_ms } = *activation else {
                debug!(target: "screenhold::controller", "restore ({}): already idle", reason);
                return Ok(());
            };

            // A failed write propagates here and leaves the state active, so
            // a later deactivate or qualifying signal can try again.
            self.settings.write_timeout(saved_timeout_ms)?;
            *activation = Activation::Idle;
            restored_ms = saved_timeout_ms;

            info!(
                target: "screenhold::controller",
                "restored {} ms ({})", restored_ms, reason
            );
        }
        self.notify(|d| d.on_restored(reason, restored_ms));
        Ok(())
    }

    fn notify(&self, f: impl FnOnce(&dyn ControllerDelegate)) {
        if let Some(delegate) = self.delegate.read().as_ref() {
            f(delegate.as_ref());
        }
    }

    // ------------------------------------------------------------------------
    // EVENT LOOP
    // ------------------------------------------------------------------------

    /// Single serialized consumer of all observer channels.
    ///
    /// Seeds `SignalState` from the receivers' current values, then applies
    /// every change in arrival order. Runs until any source closes (process
    /// shutdown); handler errors are logged and the loop keeps going so the
    /// next qualifying signal can retry.
    pub async fn run_event_loop(
        self: Arc<Self>,
        mut screen: watch::Receiver<bool>,
        mut exemption: watch::Receiver<bool>,
        mut battery_low: mpsc::Receiver<()>,
    ) {
        let seed_exemption = *exemption.borrow_and_update();
        let seed_screen = *screen.borrow_and_update();
        let _ = self.handle_event(SignalEvent::ExemptionChanged(seed_exemption));
        let _ = self.handle_event(SignalEvent::ScreenChanged(seed_screen));

        loop {
            let event = tokio::select! {
                changed = screen.changed() => match changed {
                    Ok(()) => SignalEvent::ScreenChanged(*screen.borrow_and_update()),
                    Err(_) => break,
                },
                changed = exemption.changed() => match changed {
                    Ok(()) => SignalEvent::ExemptionChanged(*exemption.borrow_and_update()),
                    Err(_) => break,
                },
                received = battery_low.recv() => match received {
                    Some(()) => SignalEvent::BatteryLow,
                    None => break,
                },
            };

            if let Err(e) = self.handle_event(event) {
                warn!(target: "screenhold::controller", "signal handling failed: {}", e);
            }
        }

        debug!(target: "screenhold::controller", "event loop stopped");
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{MemorySettings, MockSettingsBridge};

    #[derive(Default)]
    struct RecordingDelegate {
        activated: Mutex<Vec<KeptOnDuration>>,
        restored: Mutex<Vec<(RestoreReason, i32)>>,
        prompts: Mutex<Vec<RestoreReason>>,
    }

    impl ControllerDelegate for RecordingDelegate {
        fn on_activated(&self, kept_on: KeptOnDuration) {
            self.activated.lock().push(kept_on);
        }
        fn on_restored(&self, reason: RestoreReason, restored_ms: i32) {
            self.restored.lock().push((reason, restored_ms));
        }
        fn on_exemption_required(&self, trigger: RestoreReason) {
            self.prompts.lock().push(trigger);
        }
    }

    fn controller_with(initial_timeout: i32) -> (Arc<TimeoutController>, MemorySettings) {
        let bridge = MemorySettings::new(initial_timeout);
        let prefs = Arc::new(PreferenceStore::in_memory());
        let controller = Arc::new(TimeoutController::new(Arc::new(bridge.clone()), prefs));
        (controller, bridge)
    }

    #[test]
    fn test_activate_then_deactivate_round_trip() {
        let (controller, bridge) = controller_with(30_000);

        controller.activate().unwrap();
        assert!(controller.is_active());
        assert_eq!(bridge.timeout(), 1_800_000); // default kept-on

        controller.deactivate().unwrap();
        assert!(!controller.is_active());
        assert_eq!(bridge.timeout(), 30_000);
        assert_eq!(bridge.writes(), vec![1_800_000, 30_000]);
    }

    #[test]
    fn test_activate_is_idempotent() {
        let (controller, bridge) = controller_with(30_000);

        controller.activate().unwrap();
        controller.activate().unwrap();

        // One write, and the original saved value still restores
        assert_eq!(bridge.writes(), vec![1_800_000]);
        controller.deactivate().unwrap();
        assert_eq!(bridge.timeout(), 30_000);
    }

    #[test]
    fn test_deactivate_when_idle_writes_nothing() {
        // A mock with no expectations panics on any call
        let mock = MockSettingsBridge::new();
        let prefs = Arc::new(PreferenceStore::in_memory());
        let controller = TimeoutController::new(Arc::new(mock), prefs);

        controller.deactivate().unwrap();
        assert!(!controller.is_active());
    }

    #[test]
    fn test_set_kept_on_duration_while_active() {
        let (controller, bridge) = controller_with(30_000);
        controller.activate().unwrap();

        controller
            .set_kept_on_duration(KeptOnDuration::TenMinutes)
            .unwrap();
        assert_eq!(bridge.timeout(), 600_000);
        assert!(controller.is_active());

        // Saved value untouched by the re-apply
        controller.deactivate().unwrap();
        assert_eq!(bridge.timeout(), 30_000);
    }

    #[test]
    fn test_set_kept_on_duration_while_idle_writes_nothing() {
        let (controller, bridge) = controller_with(30_000);
        controller
            .set_kept_on_duration(KeptOnDuration::OneMinute)
            .unwrap();
        assert!(bridge.writes().is_empty());
        assert_eq!(
            controller.policy().unwrap().kept_on,
            KeptOnDuration::OneMinute
        );
    }

    #[test]
    fn test_screen_off_restores_when_enabled_and_exempt() {
        let (controller, bridge) = controller_with(30_000);
        controller.set_restore_on_screen_off(true).unwrap();
        controller
            .handle_event(SignalEvent::ExemptionChanged(true))
            .unwrap();
        controller.activate().unwrap();

        controller
            .handle_event(SignalEvent::ScreenChanged(false))
            .unwrap();

        assert!(!controller.is_active());
        assert_eq!(bridge.timeout(), 30_000);
        assert_eq!(bridge.writes(), vec![1_800_000, 30_000]);
    }

    #[test]
    fn test_screen_off_without_exemption_prompts_instead() {
        let (controller, bridge) = controller_with(30_000);
        let delegate = Arc::new(RecordingDelegate::default());
        controller.set_delegate(Some(delegate.clone()));
        controller.set_restore_on_screen_off(true).unwrap();
        controller.activate().unwrap();

        controller
            .handle_event(SignalEvent::ScreenChanged(false))
            .unwrap();

        // State unchanged, no restore write, prompt surfaced once
        assert!(controller.is_active());
        assert_eq!(bridge.writes(), vec![1_800_000]);
        assert_eq!(delegate.prompts.lock().as_slice(), &[RestoreReason::ScreenOff]);
        assert!(delegate.restored.lock().is_empty());
    }

    #[test]
    fn test_screen_off_with_flag_disabled_does_nothing() {
        let (controller, bridge) = controller_with(30_000);
        controller
            .handle_event(SignalEvent::ExemptionChanged(true))
            .unwrap();
        controller.activate().unwrap();

        controller
            .handle_event(SignalEvent::ScreenChanged(false))
            .unwrap();

        assert!(controller.is_active());
        assert_eq!(bridge.writes(), vec![1_800_000]);
    }

    #[test]
    fn test_battery_low_scenario() {
        // Policy {30 min, restore on battery low, no screen-off restore},
        // timeout initially 30000
        let (controller, bridge) = controller_with(30_000);
        let delegate = Arc::new(RecordingDelegate::default());
        controller.set_delegate(Some(delegate.clone()));
        controller.set_restore_on_battery_low(true).unwrap();

        controller.activate().unwrap();
        assert_eq!(bridge.timeout(), 1_800_000);

        controller
            .handle_event(SignalEvent::ExemptionChanged(true))
            .unwrap();
        controller.notify_battery_low().unwrap();

        assert!(!controller.is_active());
        assert_eq!(bridge.timeout(), 30_000);
        assert_eq!(
            delegate.restored.lock().as_slice(),
            &[(RestoreReason::BatteryLow, 30_000)]
        );
    }

    #[test]
    fn test_battery_low_while_idle_is_noop() {
        let (controller, bridge) = controller_with(30_000);
        controller.set_restore_on_battery_low(true).unwrap();
        controller
            .handle_event(SignalEvent::ExemptionChanged(true))
            .unwrap();

        controller.notify_battery_low().unwrap();
        assert!(bridge.writes().is_empty());
    }

    #[test]
    fn test_exemption_change_alone_has_no_direct_action() {
        let (controller, bridge) = controller_with(30_000);
        controller.set_restore_on_battery_low(true).unwrap();
        controller.activate().unwrap();

        controller
            .handle_event(SignalEvent::ExemptionChanged(true))
            .unwrap();

        assert!(controller.is_active());
        assert_eq!(bridge.writes(), vec![1_800_000]);
        assert!(controller.signal_state().exemption_granted);
    }

    #[test]
    fn test_failed_restore_leaves_active_for_retry() {
        let (controller, bridge) = controller_with(30_000);
        controller.activate().unwrap();

        bridge.deny_writes();
        let result = controller.deactivate();
        assert!(matches!(
            result,
            Err(ControllerError::Settings(SettingsError::PermissionDenied))
        ));
        assert!(controller.is_active());

        // Explicit retry succeeds once the permission is back
        bridge.allow_writes();
        controller.deactivate().unwrap();
        assert!(!controller.is_active());
        assert_eq!(bridge.timeout(), 30_000);
    }

    #[test]
    fn test_screen_on_edge_never_restores() {
        let (controller, bridge) = controller_with(30_000);
        controller.set_restore_on_screen_off(true).unwrap();
        controller
            .handle_event(SignalEvent::ExemptionChanged(true))
            .unwrap();
        controller.activate().unwrap();

        // off-to-on and repeated on deliveries are not triggers
        controller
            .handle_event(SignalEvent::ScreenChanged(true))
            .unwrap();
        controller
            .handle_event(SignalEvent::ScreenChanged(true))
            .unwrap();

        assert!(controller.is_active());
        assert_eq!(bridge.writes(), vec![1_800_000]);
    }

    #[test]
    fn test_status_snapshot() {
        let (controller, _bridge) = controller_with(30_000);
        controller.set_restore_on_screen_off(true).unwrap();

        let status = controller.status().unwrap();
        assert!(!status.active);
        assert!(status.policy.restore_on_screen_off);
        assert_eq!(status.current_timeout_ms, Some(30_000));
        assert!(!status.signals.exemption_granted);

        controller.activate().unwrap();
        let status = controller.status().unwrap();
        assert!(status.active);
        assert_eq!(status.current_timeout_ms, Some(1_800_000));
    }
}
