//! Matsya - AUV runtime core
//!
//! Starts one thread per configured worker role around a shared state hub,
//! then runs the configured mission (if any) from the main thread.
//!
//! Usage: `matsya [config.toml]` (falls back to `matsya.toml`, then defaults)

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use matsya::channel::Channel;
use matsya::config::{MatsyaConfig, MissionConfig};
use matsya::error::Result;
use matsya::hub::StateHub;
use matsya::mission::{HubVehicle, Mission, RemoteVehicle, Vehicle};
use matsya::roles::{spawn_roles, RoleHandle};
use matsya::shutdown::Shutdown;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("matsya=info".parse().expect("static directive")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    let config = if let Some(path) = args.get(1) {
        let config_path = Path::new(path);
        info!("Loading configuration from {:?}", config_path);
        MatsyaConfig::load(config_path)?
    } else if Path::new("matsya.toml").exists() {
        info!("Loading configuration from matsya.toml");
        MatsyaConfig::load(Path::new("matsya.toml"))?
    } else {
        info!("Using default configuration");
        MatsyaConfig::default()
    };

    info!("Matsya v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "{} roles, mission: {}",
        config.roles.len(),
        config
            .mission
            .as_ref()
            .map_or("none".to_string(), |m| format!("{} goals", m.goals.len()))
    );

    let shutdown = Shutdown::new();
    shutdown.on_interrupt()?;

    let hub = Arc::new(StateHub::new(config.hub_layout(), shutdown));
    hub.install_system(config.system());

    let handles = spawn_roles(&config, &hub)?;
    for handle in &handles {
        info!("Spawned role thread '{}'", handle.name);
    }

    match &config.mission {
        Some(mission_config) => {
            run_mission(&config, mission_config, &hub)?;
            if hub.should_shutdown() {
                info!("Mission interrupted");
            } else if mission_config.shutdown_on_complete {
                info!("Mission complete, shutting down");
                hub.signal_shutdown();
            } else {
                monitor(&hub, &handles);
            }
        }
        None => monitor(&hub, &handles),
    }

    hub.signal_shutdown();
    join_roles(handles, Duration::from_secs(5));

    info!(
        "Matsya finished (evidence high water: {})",
        hub.evidence_high_water()
    );
    Ok(())
}

fn run_mission(config: &MatsyaConfig, mission_config: &MissionConfig, hub: &Arc<StateHub>) -> Result<()> {
    let poll_interval = Duration::from_millis(mission_config.poll_interval_ms);
    let mut mission = Mission::from_config(mission_config);

    let mut vehicle: Box<dyn Vehicle> = match &mission_config.link {
        Some(endpoint) => {
            info!("Mission drives a remote front end at {}", endpoint);
            let channel = Channel::open(
                "mission",
                endpoint.clone(),
                config.retry_policy(),
                hub.shutdown_handle(),
            )?;
            Box::new(RemoteVehicle::new(
                channel,
                hub.shutdown_handle(),
                poll_interval,
                config.hub.vision_processes,
            ))
        }
        None => Box::new(HubVehicle::new(Arc::clone(hub), poll_interval)),
    };

    let report = mission.run(vehicle.as_mut());
    for outcome in &report.outcomes {
        info!(
            "Goal '{}': {:?} (fails: {})",
            outcome.name, outcome.state, outcome.fails
        );
    }
    Ok(())
}

/// Wait until shutdown or until every role thread has exited.
fn monitor(hub: &StateHub, handles: &[RoleHandle]) {
    let check_interval = Duration::from_millis(500);

    while !hub.should_shutdown() {
        std::thread::sleep(check_interval);

        if !handles.is_empty() && handles.iter().all(|h| h.handle.is_finished()) {
            warn!("All role threads have exited");
            break;
        }
    }
}

/// Join role threads that exit within `timeout`. Threads still blocked on a
/// peer read are left to die with the process.
fn join_roles(handles: Vec<RoleHandle>, timeout: Duration) {
    info!("Waiting for role threads to finish...");
    let start = Instant::now();

    while start.elapsed() < timeout && handles.iter().any(|h| !h.handle.is_finished()) {
        std::thread::sleep(Duration::from_millis(50));
    }

    for RoleHandle { name, handle } in handles {
        if !handle.is_finished() {
            warn!("Role '{}' still blocked on its peer, abandoning", name);
            continue;
        }
        if let Err(e) = handle.join() {
            error!("Role '{}' panicked: {:?}", name, e);
        }
    }
}
