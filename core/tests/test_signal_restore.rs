// Event-loop integration: observer channels in, serialized restores out.

use screenhold_core::{
    ControllerDelegate, KeptOnDuration, MemorySettings, PreferenceStore, RestoreReason,
    TimeoutController,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

#[derive(Default)]
struct CountingDelegate {
    restored: std::sync::Mutex<Vec<(RestoreReason, i32)>>,
    prompts: std::sync::Mutex<Vec<RestoreReason>>,
}

impl ControllerDelegate for CountingDelegate {
    fn on_activated(&self, _kept_on: KeptOnDuration) {}
    fn on_restored(&self, reason: RestoreReason, restored_ms: i32) {
        self.restored.lock().unwrap().push((reason, restored_ms));
    }
    fn on_exemption_required(&self, trigger: RestoreReason) {
        self.prompts.lock().unwrap().push(trigger);
    }
}

struct Harness {
    controller: Arc<TimeoutController>,
    bridge: MemorySettings,
    delegate: Arc<CountingDelegate>,
    screen_tx: watch::Sender<bool>,
    exemption_tx: watch::Sender<bool>,
    battery_low_tx: mpsc::Sender<()>,
}

fn spawn_harness(initial_timeout: i32) -> Harness {
    let bridge = MemorySettings::new(initial_timeout);
    let prefs = Arc::new(PreferenceStore::in_memory());
    let controller = Arc::new(TimeoutController::new(Arc::new(bridge.clone()), prefs));
    let delegate = Arc::new(CountingDelegate::default());
    controller.set_delegate(Some(delegate.clone()));

    let (screen_tx, screen_rx) = watch::channel(true);
    let (exemption_tx, exemption_rx) = watch::channel(false);
    let (battery_low_tx, battery_low_rx) = mpsc::channel(8);

    tokio::spawn(Arc::clone(&controller).run_event_loop(
        screen_rx,
        exemption_rx,
        battery_low_rx,
    ));

    Harness {
        controller,
        bridge,
        delegate,
        screen_tx,
        exemption_tx,
        battery_low_tx,
    }
}

/// Poll until the condition holds or a deadline passes
async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_screen_off_triggers_exactly_one_restore() {
    let h = spawn_harness(30_000);
    h.controller.set_restore_on_screen_off(true).unwrap();
    h.exemption_tx.send(true).unwrap();
    wait_until(|| h.controller.signal_state().exemption_granted).await;
    h.controller.activate().unwrap();

    h.screen_tx.send(false).unwrap();

    wait_until(|| !h.controller.is_active()).await;
    assert_eq!(h.bridge.timeout(), 30_000);
    assert_eq!(
        h.delegate.restored.lock().unwrap().as_slice(),
        &[(RestoreReason::ScreenOff, 30_000)]
    );
    // One activation write, one restore write
    assert_eq!(h.bridge.writes(), vec![1_800_000, 30_000]);
}

#[tokio::test]
async fn test_screen_off_then_battery_low_first_fires_wins() {
    let h = spawn_harness(30_000);
    h.controller.set_restore_on_screen_off(true).unwrap();
    h.controller.set_restore_on_battery_low(true).unwrap();
    h.exemption_tx.send(true).unwrap();
    wait_until(|| h.controller.signal_state().exemption_granted).await;
    h.controller.activate().unwrap();

    // Both triggers land close together; the first restores, the second
    // observes an idle controller and does nothing.
    h.screen_tx.send(false).unwrap();
    h.battery_low_tx.send(()).await.unwrap();

    wait_until(|| !h.controller.is_active()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(h.delegate.restored.lock().unwrap().len(), 1);
    assert_eq!(h.bridge.writes(), vec![1_800_000, 30_000]);
}

#[tokio::test]
async fn test_missing_exemption_surfaces_prompt_without_write() {
    let h = spawn_harness(30_000);
    h.controller.set_restore_on_screen_off(true).unwrap();
    h.controller.activate().unwrap();

    h.screen_tx.send(false).unwrap();

    wait_until(|| !h.delegate.prompts.lock().unwrap().is_empty()).await;
    assert!(h.controller.is_active());
    assert_eq!(h.bridge.timeout(), 1_800_000);
    assert_eq!(
        h.delegate.prompts.lock().unwrap().as_slice(),
        &[RestoreReason::ScreenOff]
    );

    // No automatic retry: resolving the exemption alone restores nothing,
    // the next off-edge re-evaluates.
    h.exemption_tx.send(true).unwrap();
    wait_until(|| h.controller.signal_state().exemption_granted).await;
    assert!(h.controller.is_active());

    h.screen_tx.send(true).unwrap();
    wait_until(|| h.controller.signal_state().screen_on).await;
    h.screen_tx.send(false).unwrap();
    wait_until(|| !h.controller.is_active()).await;
    assert_eq!(h.bridge.timeout(), 30_000);
}

#[tokio::test]
async fn test_repeated_screen_state_is_not_a_trigger() {
    let h = spawn_harness(30_000);
    h.controller.set_restore_on_screen_off(true).unwrap();
    h.exemption_tx.send(true).unwrap();
    wait_until(|| h.controller.signal_state().exemption_granted).await;
    h.controller.activate().unwrap();

    // Redundant "on" deliveries carry no off-edge
    h.screen_tx.send(true).unwrap();
    h.screen_tx.send(true).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(h.controller.is_active());
    assert_eq!(h.bridge.writes(), vec![1_800_000]);
}

#[tokio::test]
async fn test_event_loop_stops_when_sources_close() {
    let h = spawn_harness(30_000);
    h.controller.set_restore_on_screen_off(true).unwrap();

    drop(h.screen_tx);
    drop(h.exemption_tx);
    drop(h.battery_low_tx);
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Loop is gone; direct commands still work
    h.controller.activate().unwrap();
    h.controller.deactivate().unwrap();
    assert_eq!(h.bridge.timeout(), 30_000);
}
