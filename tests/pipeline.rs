//! Evidence → estimator → model pipeline tests
//!
//! Drives the estimator link against scripted and TCP peers and checks that
//! mission targets follow the model it installs.
//!
//! Run with: `cargo test --test pipeline`

use std::io::{BufRead, BufReader, Cursor, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use approx::assert_relative_eq;
use matsya::channel::{Channel, Endpoint, SharedBuffer};
use matsya::config::{CadenceConfig, EstimatorConfig, MatsyaConfig, RoleConfig};
use matsya::mission::{Goal, Location};
use matsya::roles::{spawn_roles, EstimatorRole, Role};
use matsya::{Evidence, Feature, Observation, Shutdown, StateHub, System};

fn hub() -> Arc<StateHub> {
    Arc::new(StateHub::new(Default::default(), Shutdown::new()))
}

#[test]
fn test_model_update_moves_goal_target() {
    let hub = hub();
    hub.push_evidence(Evidence::new(vec![Observation::new(Feature(0), 3.0, 0.5)]));

    let out = SharedBuffer::new();
    let channel = Channel::in_memory("estimator", Cursor::new(b"1 3.0\n".to_vec()), out.clone());
    let mut role = EstimatorRole::new(System::default(), 1000, Arc::clone(&hub), channel);

    let before = hub.snapshot_model().version();
    role.cycle().unwrap();

    // The evidence went to the estimator exactly once.
    assert_eq!(out.contents(), "m\ne\n1\n0 3 0.5\n");
    assert_eq!(hub.evidence_pending(), 0);

    let model = hub.snapshot_model();
    assert!(model.version() > before);

    let goal = Goal::new("pinger", Vec::new()).with_location(Location::identity());
    assert_relative_eq!(goal.location(&model).x, 3.0);
}

/// Everything a fake estimator peer received.
#[derive(Default)]
struct EstimatorLog {
    bootstrapped: bool,
    observations: Vec<String>,
    model_requests: usize,
}

fn fake_estimator(listener: TcpListener, log: Arc<Mutex<EstimatorLog>>) {
    let Ok((stream, _)) = listener.accept() else {
        return;
    };
    let mut writer = stream.try_clone().unwrap();
    let mut lines = BufReader::new(stream).lines();

    while let Some(Ok(line)) = lines.next() {
        match line.trim() {
            "s" => {
                // dimension, initial vector, variance vector
                for _ in 0..3 {
                    lines.next();
                }
                log.lock().unwrap().bootstrapped = true;
            }
            "m" => {
                log.lock().unwrap().model_requests += 1;
                if writer.write_all(b"2 3 4\n").is_err() {
                    return;
                }
            }
            "e" => {
                let count: usize = match lines.next() {
                    Some(Ok(n)) => n.trim().parse().unwrap(),
                    _ => return,
                };
                for _ in 0..count {
                    if let Some(Ok(obs)) = lines.next() {
                        log.lock().unwrap().observations.push(obs);
                    }
                }
            }
            _ => {}
        }
    }
}

fn fake_hydrophone(listener: TcpListener, records: usize, done: mpsc::Receiver<()>) {
    let Ok((mut stream, _)) = listener.accept() else {
        return;
    };
    for _ in 0..records {
        stream.write_all(b"h 0 -0.785398\n").unwrap();
    }
    stream.flush().unwrap();
    // Hold the link open until the test is finished with it.
    let _ = done.recv_timeout(Duration::from_secs(10));
}

fn tcp(listener: &TcpListener) -> Endpoint {
    Endpoint::Tcp {
        tcp: listener.local_addr().unwrap().to_string(),
    }
}

#[test]
fn test_roles_fuse_hydrophone_evidence_over_tcp() {
    let estimator_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let hydrophone_listener = TcpListener::bind("127.0.0.1:0").unwrap();

    let config = MatsyaConfig {
        cadence: CadenceConfig {
            fast_ms: 2,
            idle_ms: 10,
        },
        estimator: EstimatorConfig {
            dimension: 2,
            initial: vec![0.0, 0.0],
            variance: vec![1.0, 1.0],
            ..Default::default()
        },
        roles: vec![
            RoleConfig::Estimator {
                endpoint: tcp(&estimator_listener),
            },
            RoleConfig::Hydrophone {
                endpoint: tcp(&hydrophone_listener),
            },
        ],
        ..Default::default()
    };

    let log = Arc::new(Mutex::new(EstimatorLog::default()));
    let estimator = {
        let log = Arc::clone(&log);
        thread::spawn(move || fake_estimator(estimator_listener, log))
    };
    let (done_tx, done_rx) = mpsc::channel();
    let hydrophone = thread::spawn(move || fake_hydrophone(hydrophone_listener, 3, done_rx));

    let hub = hub();
    let handles = spawn_roles(&config, &hub).unwrap();

    // Three records, two observations each.
    let deadline = Instant::now() + Duration::from_secs(10);
    while log.lock().unwrap().observations.len() < 6 {
        assert!(Instant::now() < deadline, "estimator never saw all evidence");
        thread::sleep(Duration::from_millis(10));
    }

    {
        let log = log.lock().unwrap();
        assert!(log.bootstrapped);
        assert!(log.model_requests >= 1);
        // Pool floor 15 m below a vehicle at the surface, 45 degrees down.
        let x: Vec<f32> = log.observations[0]
            .split_whitespace()
            .map(|t| t.parse().unwrap())
            .collect();
        assert_eq!(x[0], 0.0);
        assert_relative_eq!(x[1], 15.0, epsilon = 1e-3);
    }

    let model = hub.snapshot_model();
    assert_eq!(model.values(), &[3.0, 4.0]);
    assert!(model.version() >= 1);
    assert_eq!(hub.evidence_pending(), 0);

    hub.signal_shutdown();
    done_tx.send(()).unwrap();
    for role in handles {
        role.handle.join().unwrap();
    }
    hydrophone.join().unwrap();
    estimator.join().unwrap();
}

#[test]
fn test_role_waits_for_late_peer() {
    // Reserve a port, then free it so the first connect attempts fail.
    let addr = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();

    let config = MatsyaConfig {
        roles: vec![RoleConfig::Control {
            endpoint: Endpoint::Tcp {
                tcp: addr.to_string(),
            },
        }],
        ..Default::default()
    };
    let hub = hub();
    let handles = spawn_roles(&config, &hub).unwrap();

    thread::sleep(Duration::from_millis(50));
    let listener = TcpListener::bind(addr).unwrap();
    let (stream, _) = listener.accept().unwrap();
    let mut writer: TcpStream = stream.try_clone().unwrap();
    let mut reader = BufReader::new(stream);

    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    assert_eq!(line, "c\n");
    writer.write_all(b"1 2 3 0 0 0\n").unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while hub.pose_version() == 0 {
        assert!(Instant::now() < deadline, "pose never stored");
        thread::sleep(Duration::from_millis(5));
    }
    assert_relative_eq!(hub.snapshot_pose().depth, 3.0);

    hub.signal_shutdown();
    drop(writer);
    drop(reader);
    for role in handles {
        role.handle.join().unwrap();
    }
}
