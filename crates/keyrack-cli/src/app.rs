//! Service wiring: hardware, coordinator, event channel, shutdown.

use std::sync::Arc;

use anyhow::{Context, Result};
use keyrack_coordinator::{EventEmitter, KeyReleaseCoordinator};
use keyrack_core::{CabinetConfig, DriverMode, InboundCommand};
use keyrack_hardware::{Detection, HardwareContext, detect};
use keyrack_network::EventChannel;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Inbound commands waiting for the coordinator.
const COMMAND_QUEUE_CAPACITY: usize = 16;

/// Build the hardware context for the detected mode.
///
/// A real context that fails to open falls back to the mock cabinet.
fn build_context(config: &CabinetConfig, detection: &Detection) -> HardwareContext {
    if detection.mode() == DriverMode::Real {
        match HardwareContext::real(config) {
            Ok(context) => return context,
            Err(e) => warn!(error = %e, "real hardware unavailable, using mock cabinet"),
        }
    }
    let (context, _cabinet) = HardwareContext::mock(config);
    context
}

/// Report what `--check` found.
pub fn check(config: &CabinetConfig) {
    let detection = detect(&config.hardware);
    info!(
        mode = %detection.mode(),
        slots = config.slots.len(),
        server = %config.channel.server_addr,
        "configuration valid"
    );
}

/// Run the service until Ctrl-C or SIGTERM.
pub async fn run(config: CabinetConfig) -> Result<()> {
    let detection = detect(&config.hardware);
    let context = build_context(&config, &detection);
    context
        .initialize()
        .context("driving cabinet lines to their safe levels")?;

    let (emitter, events) = EventEmitter::channel(config.channel.outbound_capacity);
    let (commands_tx, mut commands) = mpsc::channel(COMMAND_QUEUE_CAPACITY);

    let coordinator = Arc::new(
        KeyReleaseCoordinator::new(context, config.timing.clone(), emitter)
            .context("starting the coordinator")?,
    );
    coordinator.spawn_background();

    let channel = EventChannel::new(config.channel.clone(), events, commands_tx);
    let stats = channel.stats();
    let channel_cancel = CancellationToken::new();
    let channel_task = tokio::spawn(channel.run(channel_cancel.clone()));

    info!(mode = %coordinator.context().mode(), "keyrack running");

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            () = &mut shutdown => break,
            command = commands.recv() => match command {
                Some(command) => dispatch(&coordinator, command).await,
                None => {
                    warn!("event channel stopped");
                    break;
                }
            },
        }
    }

    coordinator.shutdown().await;
    channel_cancel.cancel();
    channel_task.await.context("event channel task failed")?;

    info!(
        sent = stats.events_sent(),
        dropped = stats.events_dropped() + coordinator.dropped_events(),
        commands = stats.commands_received(),
        "keyrack stopped"
    );
    Ok(())
}

/// Hand one command to the coordinator; the relay write blocks on the GPIO
/// tool, so it runs on the blocking pool.
async fn dispatch(coordinator: &Arc<KeyReleaseCoordinator>, command: InboundCommand) {
    let coordinator = Arc::clone(coordinator);
    match tokio::task::spawn_blocking(move || coordinator.handle_command(command)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => debug!(error = %e, "command not executed"),
        Err(e) => error!(error = %e, "command task failed"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Ctrl-C received"),
        () = terminate => info!("SIGTERM received"),
    }
}
