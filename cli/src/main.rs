// screenhold-cli: command-line collaborator for the timeout core
//
// Thin presentation layer: issues commands to the controller, renders status
// rows, and runs the resident observer daemon. No policy lives here.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use screenhold_core::{
    format_timeout, BatteryExemptionObserver, ControllerDelegate, KeptOnDuration,
    PreferenceStore, RestoreReason, ScreenPowerObserver, SignalObserver, SystemSettings,
    TimeoutController,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

#[derive(Parser)]
#[command(name = "screenhold")]
#[command(about = "keep the display on, then give the timeout back", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

const DEFAULT_PACKAGE: &str = "com.screenhold.daemon";

#[derive(Subcommand)]
enum Commands {
    /// Show policy, signal state, and the live OS timeout
    Status {
        /// Emit machine-readable JSON instead of rows
        #[arg(long)]
        json: bool,
        /// Package whose battery-optimization exemption is reported
        #[arg(long, default_value = DEFAULT_PACKAGE)]
        package: String,
    },
    /// Configure the restore policy
    Set {
        #[command(subcommand)]
        action: SetAction,
    },
    /// Hold the screen on until interrupted, then restore the saved timeout
    Run {
        /// Package whose battery-optimization exemption is observed
        #[arg(long, default_value = DEFAULT_PACKAGE)]
        package: String,
    },
    /// List the selectable kept-on durations
    Options,
}

#[derive(Subcommand)]
enum SetAction {
    /// Kept-on duration in milliseconds (must be one of the listed options)
    Timeout { ms: i32 },
    /// Restore the timeout when the battery runs low
    BatteryLow { enabled: bool },
    /// Restore the timeout when the screen turns off
    ScreenOff { enabled: bool },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Status { json, package } => cmd_status(json, package).await,
        Commands::Set { action } => cmd_set(action),
        Commands::Run { package } => cmd_run(package).await,
        Commands::Options => cmd_options(),
    }
}

/// Data directory for the preference store (cross-platform)
fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_local_dir()
        .context("Failed to determine data directory")?
        .join("screenhold");

    std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

    Ok(data_dir)
}

fn open_controller() -> Result<Arc<TimeoutController>> {
    let prefs_path = data_dir()?.join("prefs");
    let prefs = PreferenceStore::persistent(prefs_path.to_string_lossy().as_ref())
        .context("Failed to open preference store")?;

    Ok(Arc::new(TimeoutController::new(
        Arc::new(SystemSettings::new()),
        Arc::new(prefs),
    )))
}

async fn cmd_status(json: bool, package: String) -> Result<()> {
    let controller = open_controller()?;
    let mut status = controller.status().context("Failed to read status")?;

    // A one-shot invocation has not observed any signals yet; probe the
    // OS-held values directly so the rows reflect reality.
    if let Ok(on) = ScreenPowerObserver::new().current().await {
        status.signals.screen_on = on;
    }
    if let Ok(granted) = BatteryExemptionObserver::new(&package).current().await {
        status.signals.exemption_granted = granted;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let yes = |b: bool| {
        if b {
            "yes".green()
        } else {
            "no".red()
        }
    };

    println!("{}", "screenhold".bold());
    println!("  active:            {}", yes(status.active));
    println!("  kept-on duration:  {}", status.policy.kept_on);
    println!(
        "  restore on battery low: {}",
        yes(status.policy.restore_on_battery_low)
    );
    println!(
        "  restore on screen off:  {}",
        yes(status.policy.restore_on_screen_off)
    );
    println!(
        "  exemption granted: {}",
        yes(status.signals.exemption_granted)
    );
    println!("  screen on:         {}", yes(status.signals.screen_on));
    match status.current_timeout_ms {
        Some(ms) => println!("  current timeout:   {}", format_timeout(ms)),
        None => println!("  current timeout:   {}", "unreadable".yellow()),
    }

    Ok(())
}

fn cmd_set(action: SetAction) -> Result<()> {
    let controller = open_controller()?;

    match action {
        SetAction::Timeout { ms } => {
            let duration = KeptOnDuration::from_millis(ms).with_context(|| {
                format!(
                    "{} ms is not a selectable duration; see `screenhold options`",
                    ms
                )
            })?;
            controller
                .set_kept_on_duration(duration)
                .context("Failed to set kept-on duration")?;
            println!("kept-on duration set to {}", duration.to_string().bold());
        }
        SetAction::BatteryLow { enabled } => {
            controller
                .set_restore_on_battery_low(enabled)
                .context("Failed to update policy")?;
            println!("restore on battery low: {}", enabled);
        }
        SetAction::ScreenOff { enabled } => {
            controller
                .set_restore_on_screen_off(enabled)
                .context("Failed to update policy")?;
            println!("restore on screen off: {}", enabled);
        }
    }

    Ok(())
}

fn cmd_options() -> Result<()> {
    for duration in KeptOnDuration::ALL {
        println!("{:>10} ms  {}", duration.as_millis(), duration);
    }
    Ok(())
}

struct PrintingDelegate;

impl ControllerDelegate for PrintingDelegate {
    fn on_activated(&self, kept_on: KeptOnDuration) {
        println!("{} kept-on timeout applied: {}", "•".green(), kept_on);
    }

    fn on_restored(&self, reason: RestoreReason, restored_ms: i32) {
        println!(
            "{} timeout restored to {} ({})",
            "•".green(),
            format_timeout(restored_ms),
            reason
        );
    }

    fn on_exemption_required(&self, trigger: RestoreReason) {
        println!(
            "{} restore on {} needs the battery-optimization exemption; grant it in system settings",
            "!".yellow(),
            trigger
        );
    }
}

async fn cmd_run(package: String) -> Result<()> {
    let controller = open_controller()?;
    controller.set_delegate(Some(Arc::new(PrintingDelegate)));

    // Observers degrade individually: a missing source disables its restore
    // path but never blocks the hold itself.
    let screen = ScreenPowerObserver::new();
    let screen_rx = match screen.subscribe() {
        Ok(rx) => rx,
        Err(e) => {
            tracing::warn!("screen observer disabled: {}", e);
            let (tx, rx) = watch::channel(true);
            std::mem::forget(tx); // keep the channel open for the loop's lifetime
            rx
        }
    };

    let exemption = BatteryExemptionObserver::new(&package);
    let exemption_rx = match exemption.subscribe() {
        Ok(rx) => rx,
        Err(e) => {
            tracing::warn!("exemption observer disabled: {}", e);
            let (tx, rx) = watch::channel(false);
            std::mem::forget(tx);
            rx
        }
    };

    // The OS low-battery broadcast is delivered by the embedding platform;
    // the standalone daemon keeps the channel open but nothing feeds it.
    let (_battery_low_tx, battery_low_rx) = mpsc::channel(8);

    let event_loop = tokio::spawn(Arc::clone(&controller).run_event_loop(
        screen_rx,
        exemption_rx,
        battery_low_rx,
    ));

    controller.activate().context("Failed to activate")?;
    println!("holding the screen on; press Ctrl-C to restore and exit");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for Ctrl-C")?;

    controller.deactivate().context("Failed to restore timeout")?;

    screen.unsubscribe();
    exemption.unsubscribe();
    event_loop.abort();

    Ok(())
}
