// screenhold core: timeout-restoration spine
//
// "Hold the screen on while the user wants it held,
//  and give their timeout back exactly as it was."
//
// Anything that renders, prompts, or registers tiles lives outside this crate.

pub mod controller;
pub mod observe;
pub mod policy;
pub mod prefs;
pub mod settings;

pub use controller::{
    ControllerDelegate, ControllerError, ControllerStatus, RestoreReason, SignalEvent,
    SignalState, TimeoutController,
};
pub use observe::{BatteryExemptionObserver, ScreenPowerObserver, SignalError, SignalObserver};
pub use policy::{format_timeout, KeptOnDuration, TimeoutPolicy, ALWAYS_ON_MS};
pub use prefs::{PreferenceStore, PrefsError};
pub use settings::{MemorySettings, SettingsBridge, SettingsError, SystemSettings};
