//! Mission engine against the in-process hub
//!
//! A simulated actuator relay stands in for the control role: it consumes
//! pending commands and moves the vehicle to every commanded pose after a
//! short delay.
//!
//! Run with: `cargo test --test mission`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use approx::assert_relative_eq;
use matsya::config::MatsyaConfig;
use matsya::mission::{GoalState, HubVehicle, Mission, FAILED_CERTAINTY};
use matsya::{Pose, Shutdown, StateHub};

struct SimulatedRelay {
    drops: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

fn spawn_relay(hub: &Arc<StateHub>) -> SimulatedRelay {
    let drops = Arc::new(AtomicUsize::new(0));
    let handle = {
        let hub = Arc::clone(hub);
        let drops = Arc::clone(&drops);
        thread::spawn(move || {
            while !hub.should_shutdown() {
                let commands = hub.take_commands();
                if commands.drop {
                    drops.fetch_add(1, Ordering::SeqCst);
                }
                thread::sleep(Duration::from_millis(2));
                let pose = commands.pose.unwrap_or_else(|| hub.snapshot_pose());
                hub.store_pose(pose);
            }
        })
    };
    SimulatedRelay { drops, handle }
}

const SCRIPT: &str = r#"
[mission]
poll_interval_ms = 5

[[mission.goals]]
name = "dive"
value = 10.0
time = 30.0
certainty = 0.9
actions = [
    { action = "set_max_thrust", thrust = 1.0 },
    { action = "move_absolute", target = { x = 2.0, depth = 1.0 }, tolerance = 0.05 },
    { action = "move_relative", delta = { x = 1.0 }, tolerance = 0.05 },
]

[[mission.goals]]
name = "bin"
value = 50.0
actions = [
    { action = "move_model", x = 0, y = 1, offset = { depth = 2.0 }, tolerance = 0.05 },
    { action = "drop" },
    { action = "wait", seconds = 0.02 },
]

[[mission.goals]]
name = "missing"
value = 5.0
actions = [
    { action = "turn_to", x = 0, y = 9 },
    { action = "drop" },
]
"#;

#[test]
fn test_mission_runs_goals_through_hub() {
    let config = MatsyaConfig::parse(SCRIPT).unwrap();
    let mission_config = config.mission.unwrap();

    let hub = Arc::new(StateHub::new(Default::default(), Shutdown::new()));
    hub.replace_model(vec![-1.0, 4.0]);
    let relay = spawn_relay(&hub);

    let mut vehicle = HubVehicle::new(
        Arc::clone(&hub),
        Duration::from_millis(mission_config.poll_interval_ms),
    );
    let mut mission = Mission::from_config(&mission_config);
    let report = mission.run(&mut vehicle);

    let states: Vec<GoalState> = report.outcomes.iter().map(|o| o.state).collect();
    assert_eq!(
        states,
        vec![GoalState::Succeeded, GoalState::Succeeded, GoalState::Failed]
    );

    // The failed goal never reached its drop.
    hub.signal_shutdown();
    relay.handle.join().unwrap();
    assert_eq!(relay.drops.load(Ordering::SeqCst), 1);

    let pose = hub.snapshot_pose();
    assert_relative_eq!(pose.x, -1.0, epsilon = 1e-4);
    assert_relative_eq!(pose.y, 4.0, epsilon = 1e-4);
    assert_relative_eq!(pose.depth, 2.0, epsilon = 1e-4);

    let goals = mission.goals();
    assert_relative_eq!(goals[0].certainty(), 0.9);
    assert_relative_eq!(goals[2].certainty(), FAILED_CERTAINTY);
    assert_eq!(goals[2].fails(), 1);
}

#[test]
fn test_shutdown_interrupts_move() {
    let hub = Arc::new(StateHub::new(Default::default(), Shutdown::new()));
    let config = MatsyaConfig::parse(
        r#"
        [[mission.goals]]
        name = "unreachable"
        actions = [{ action = "move_absolute", target = { x = 100.0 } }]
        "#,
    )
    .unwrap();
    let mut mission = Mission::from_config(config.mission.as_ref().unwrap());

    // No relay: the pose never changes, so only shutdown ends the move.
    let stopper = {
        let hub = Arc::clone(&hub);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            hub.signal_shutdown();
        })
    };

    let mut vehicle = HubVehicle::new(Arc::clone(&hub), Duration::from_millis(5));
    let report = mission.run(&mut vehicle);
    stopper.join().unwrap();

    assert_eq!(report.outcomes[0].state, GoalState::Failed);
    assert_eq!(hub.snapshot_pose(), Pose::ZERO);
}
