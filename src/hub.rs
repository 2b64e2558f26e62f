//! Shared state hub.
//!
//! Single source of truth shared by every worker role and the mission
//! engine. All fields live behind one mutex so any multi-field read or write
//! done inside one call observes a consistent instant. Nothing here blocks on
//! another worker and no guard ever escapes a method, so the lock is never
//! held across peer I/O.
//!
//! Consistency is per call only: reading the pose, releasing, then reading
//! the model may observe two different instants. Callers that need both use
//! [`StateHub::snapshot`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{MatsyaError, Result};
use crate::shutdown::Shutdown;
use crate::types::{Evidence, Feature, Frame, Model, Pose, Side, System};

/// Discrete one-shot actuator commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActuatorFlag {
    Drop,
    Grab,
    Release,
}

/// Every command waiting to be forwarded to the actuator peer.
///
/// Produced by [`StateHub::take_commands`]; taking resets all of them to idle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PendingCommands {
    pub pose: Option<Pose>,
    pub shoot: Option<Side>,
    pub drop: bool,
    pub grab: bool,
    pub release: bool,
    pub speed: Option<f32>,
    pub max_thrust: Option<f32>,
}

impl PendingCommands {
    pub fn is_empty(&self) -> bool {
        *self == PendingCommands::default()
    }

    fn flag_mut(&mut self, flag: ActuatorFlag) -> &mut bool {
        match flag {
            ActuatorFlag::Drop => &mut self.drop,
            ActuatorFlag::Grab => &mut self.grab,
            ActuatorFlag::Release => &mut self.release,
        }
    }
}

/// Everything the model-update role needs from one cycle.
#[derive(Debug, Default)]
pub struct ModelExchange {
    /// Version assigned to the model just stored
    pub version: u64,
    /// Evidence queued since the previous cycle, in push order
    pub evidence: Vec<Evidence>,
    /// Variance overrides to forward to the estimator
    pub variance: Vec<(Feature, f32)>,
}

/// Sizes of the indexed hub slots.
#[derive(Clone, Copy, Debug)]
pub struct HubLayout {
    pub image_slots: usize,
    pub vision_processes: usize,
}

impl Default for HubLayout {
    fn default() -> Self {
        Self {
            image_slots: 2,
            vision_processes: 4,
        }
    }
}

#[derive(Debug, Default)]
struct ImageSlot {
    frame: Option<Arc<Frame>>,
    id: u64,
}

#[derive(Debug)]
struct HubState {
    pose: Pose,
    pose_version: u64,
    model: Model,
    evidence: Vec<Evidence>,
    evidence_high_water: usize,
    images: Vec<ImageSlot>,
    commands: PendingCommands,
    vision: Vec<bool>,
    variance_requests: Vec<(Feature, f32)>,
    system: System,
}

/// Lock-guarded vehicle state shared by all roles.
#[derive(Debug)]
pub struct StateHub {
    state: Mutex<HubState>,
    shutdown: Shutdown,
}

impl StateHub {
    /// Create a hub with empty slots and an empty model.
    pub fn new(layout: HubLayout, shutdown: Shutdown) -> Self {
        let images = (0..layout.image_slots).map(|_| ImageSlot::default()).collect();
        Self {
            state: Mutex::new(HubState {
                pose: Pose::ZERO,
                pose_version: 0,
                model: Model::default(),
                evidence: Vec::new(),
                evidence_high_water: 0,
                images,
                commands: PendingCommands::default(),
                vision: vec![false; layout.vision_processes],
                variance_requests: Vec::new(),
                system: System::default(),
            }),
            shutdown,
        }
    }

    // The state holds plain values only, so a panic in another holder cannot
    // leave it half-updated in a way later readers would misinterpret.
    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // --- Pose ---

    pub fn snapshot_pose(&self) -> Pose {
        self.lock().pose
    }

    /// Number of pose updates stored so far.
    pub fn pose_version(&self) -> u64 {
        self.lock().pose_version
    }

    /// Store a fresh pose estimate (actuator relay).
    pub fn store_pose(&self, pose: Pose) {
        let mut state = self.lock();
        state.pose = pose;
        state.pose_version += 1;
    }

    /// Store a fresh pose and take every pending command in one step.
    pub fn exchange_pose(&self, pose: Pose) -> PendingCommands {
        let mut state = self.lock();
        state.pose = pose;
        state.pose_version += 1;
        std::mem::take(&mut state.commands)
    }

    // --- Model ---

    pub fn snapshot_model(&self) -> Model {
        self.lock().model.clone()
    }

    /// Pose and model from the same instant.
    pub fn snapshot(&self) -> (Pose, Model) {
        let state = self.lock();
        (state.pose, state.model.clone())
    }

    /// Replace the model wholesale. Returns the new version.
    ///
    /// The version advances even when `values` equals the current vector.
    pub fn replace_model(&self, values: Vec<f32>) -> u64 {
        let mut state = self.lock();
        let version = state.model.version() + 1;
        state.model = Model::new(values, version);
        version
    }

    /// Store a new model and drain everything bound for the estimator.
    pub fn exchange_model(&self, values: Vec<f32>) -> ModelExchange {
        let mut state = self.lock();
        let version = state.model.version() + 1;
        state.model = Model::new(values, version);
        ModelExchange {
            version,
            evidence: std::mem::take(&mut state.evidence),
            variance: std::mem::take(&mut state.variance_requests),
        }
    }

    pub fn install_system(&self, system: System) {
        let mut state = self.lock();
        if state.model.is_empty() && !system.initial.is_empty() {
            state.model = Model::new(system.initial.clone(), 0);
        }
        state.system = system;
    }

    pub fn system(&self) -> System {
        self.lock().system.clone()
    }

    /// Queue a variance override for the estimator.
    pub fn request_variance(&self, feature: Feature, variance: f32) {
        self.lock().variance_requests.push((feature, variance));
    }

    pub fn take_variance_requests(&self) -> Vec<(Feature, f32)> {
        std::mem::take(&mut self.lock().variance_requests)
    }

    // --- Evidence ---

    pub fn push_evidence(&self, evidence: Evidence) {
        let mut state = self.lock();
        state.evidence.push(evidence);
        state.evidence_high_water = state.evidence_high_water.max(state.evidence.len());
    }

    /// Swap out the whole pending queue, leaving it empty.
    pub fn drain_evidence(&self) -> Vec<Evidence> {
        std::mem::take(&mut self.lock().evidence)
    }

    /// Put undelivered evidence back at the head of the queue, ahead of
    /// anything pushed since it was drained.
    pub fn requeue_evidence(&self, mut unsent: Vec<Evidence>) {
        if unsent.is_empty() {
            return;
        }
        let mut state = self.lock();
        unsent.append(&mut state.evidence);
        state.evidence = unsent;
        state.evidence_high_water = state.evidence_high_water.max(state.evidence.len());
    }

    /// Put variance requests that never reached the estimator back ahead of
    /// newer ones.
    pub fn requeue_variance(&self, mut unsent: Vec<(Feature, f32)>) {
        if unsent.is_empty() {
            return;
        }
        let mut state = self.lock();
        unsent.append(&mut state.variance_requests);
        state.variance_requests = unsent;
    }

    pub fn evidence_pending(&self) -> usize {
        self.lock().evidence.len()
    }

    /// Largest queue length ever observed.
    pub fn evidence_high_water(&self) -> usize {
        self.lock().evidence_high_water
    }

    // --- Images ---

    /// Latest frame in a slot and its id.
    pub fn get_image(&self, index: usize) -> Option<(Arc<Frame>, u64)> {
        let state = self.lock();
        let slot = state.images.get(index)?;
        slot.frame.as_ref().map(|f| (Arc::clone(f), slot.id))
    }

    /// Frame if the slot has advanced past `seen`.
    pub fn image_newer_than(&self, index: usize, seen: u64) -> Option<(Arc<Frame>, u64)> {
        let state = self.lock();
        let slot = state.images.get(index)?;
        if slot.id <= seen {
            return None;
        }
        slot.frame.as_ref().map(|f| (Arc::clone(f), slot.id))
    }

    /// Store a frame and return its new id.
    pub fn put_image(&self, index: usize, frame: Frame) -> Result<u64> {
        let mut state = self.lock();
        let slot_count = state.images.len();
        let slot = state.images.get_mut(index).ok_or_else(|| {
            MatsyaError::Config(format!("image slot {} outside 0..{}", index, slot_count))
        })?;
        slot.frame = Some(Arc::new(frame));
        slot.id += 1;
        Ok(slot.id)
    }

    pub fn image_slots(&self) -> usize {
        self.lock().images.len()
    }

    // --- Commands ---

    pub fn set_pose_command(&self, pose: Pose) {
        self.lock().commands.pose = Some(pose);
    }

    pub fn set_flag(&self, flag: ActuatorFlag) {
        *self.lock().commands.flag_mut(flag) = true;
    }

    pub fn flag_pending(&self, flag: ActuatorFlag) -> bool {
        *self.lock().commands.flag_mut(flag)
    }

    /// Consume a flag: returns whether it was pending and resets it to idle.
    pub fn take_flag(&self, flag: ActuatorFlag) -> bool {
        std::mem::replace(self.lock().commands.flag_mut(flag), false)
    }

    pub fn set_shoot(&self, side: Side) {
        self.lock().commands.shoot = Some(side);
    }

    pub fn set_speed(&self, speed: f32) {
        self.lock().commands.speed = Some(speed);
    }

    pub fn set_max_thrust(&self, thrust: f32) {
        self.lock().commands.max_thrust = Some(thrust);
    }

    /// Take every pending command, resetting all to idle.
    pub fn take_commands(&self) -> PendingCommands {
        std::mem::take(&mut self.lock().commands)
    }

    // --- Vision enable flags ---

    pub fn set_vision(&self, process: usize, enabled: bool) -> Result<()> {
        let mut state = self.lock();
        let count = state.vision.len();
        let flag = state.vision.get_mut(process).ok_or_else(|| {
            MatsyaError::Config(format!("vision process {} outside 0..{}", process, count))
        })?;
        *flag = enabled;
        Ok(())
    }

    pub fn vision_enabled(&self, process: usize) -> bool {
        self.lock().vision.get(process).copied().unwrap_or(false)
    }

    // --- Shutdown ---

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn signal_shutdown(&self) {
        self.shutdown.signal();
    }

    pub fn should_shutdown(&self) -> bool {
        self.shutdown.is_signaled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Observation;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn hub() -> Arc<StateHub> {
        Arc::new(StateHub::new(HubLayout::default(), Shutdown::new()))
    }

    fn tagged(tag: usize) -> Evidence {
        Evidence::new(vec![Observation::new(Feature(0), tag as f32, 1.0)])
    }

    #[test]
    fn test_drain_swaps_queue() {
        let hub = hub();
        hub.push_evidence(tagged(1));
        hub.push_evidence(tagged(2));
        let drained = hub.drain_evidence();
        assert_eq!(drained, vec![tagged(1), tagged(2)]);
        assert!(hub.drain_evidence().is_empty());
        assert_eq!(hub.evidence_high_water(), 2);
    }

    #[test]
    fn test_concurrent_push_drain_loses_nothing() {
        let hub = hub();
        let producers = 4;
        let per_producer = 500;

        let handles: Vec<_> = (0..producers)
            .map(|p| {
                let hub = Arc::clone(&hub);
                thread::spawn(move || {
                    for i in 0..per_producer {
                        hub.push_evidence(tagged(p * per_producer + i));
                    }
                })
            })
            .collect();

        let mut seen = Vec::new();
        while handles.iter().any(|h| !h.is_finished()) {
            seen.extend(hub.drain_evidence());
        }
        for h in handles {
            h.join().unwrap();
        }
        seen.extend(hub.drain_evidence());

        let tags: Vec<usize> = seen
            .iter()
            .map(|e| e.observations()[0].value as usize)
            .collect();
        let unique: HashSet<usize> = tags.iter().copied().collect();
        assert_eq!(tags.len(), producers * per_producer);
        assert_eq!(unique.len(), producers * per_producer);
    }

    #[test]
    fn test_requeue_keeps_order() {
        let hub = hub();
        hub.push_evidence(tagged(1));
        let drained = hub.drain_evidence();
        hub.push_evidence(tagged(2));
        hub.requeue_evidence(drained);
        assert_eq!(hub.drain_evidence(), vec![tagged(1), tagged(2)]);
    }

    #[test]
    fn test_requeue_variance_keeps_order() {
        let hub = hub();
        hub.request_variance(Feature(0), 1.0);
        let taken = hub.take_variance_requests();
        hub.request_variance(Feature(1), 2.0);
        hub.requeue_variance(taken);
        assert_eq!(
            hub.take_variance_requests(),
            vec![(Feature(0), 1.0), (Feature(1), 2.0)]
        );
    }

    #[test]
    fn test_model_version_advances_on_identical_vector() {
        let hub = hub();
        let v1 = hub.replace_model(vec![1.0]);
        let v2 = hub.replace_model(vec![1.0]);
        assert_eq!(v2, v1 + 1);
        assert_eq!(hub.snapshot_model().version(), v2);
    }

    #[test]
    fn test_take_flag_observed_once() {
        let hub = hub();
        for _ in 0..50 {
            hub.set_flag(ActuatorFlag::Drop);
            let taken = Arc::new(AtomicUsize::new(0));
            let readers: Vec<_> = (0..8)
                .map(|_| {
                    let hub = Arc::clone(&hub);
                    let taken = Arc::clone(&taken);
                    thread::spawn(move || {
                        if hub.take_flag(ActuatorFlag::Drop) {
                            taken.fetch_add(1, Ordering::SeqCst);
                        }
                    })
                })
                .collect();
            for r in readers {
                r.join().unwrap();
            }
            assert_eq!(taken.load(Ordering::SeqCst), 1);
            assert!(!hub.flag_pending(ActuatorFlag::Drop));
        }
    }

    #[test]
    fn test_exchange_pose_takes_commands() {
        let hub = hub();
        hub.set_pose_command(Pose::at(1.0, 2.0, 3.0));
        hub.set_flag(ActuatorFlag::Grab);
        hub.set_shoot(Side::Left);

        let commands = hub.exchange_pose(Pose::at(0.5, 0.0, 0.0));
        assert_eq!(commands.pose, Some(Pose::at(1.0, 2.0, 3.0)));
        assert!(commands.grab);
        assert_eq!(commands.shoot, Some(Side::Left));
        assert_eq!(hub.snapshot_pose(), Pose::at(0.5, 0.0, 0.0));
        assert!(hub.take_commands().is_empty());
    }

    #[test]
    fn test_image_ids_advance() {
        let hub = hub();
        assert!(hub.get_image(0).is_none());
        let id1 = hub.put_image(0, Frame::new(1, 1, vec![1])).unwrap();
        let id2 = hub.put_image(0, Frame::new(1, 1, vec![2])).unwrap();
        assert!(id2 > id1);
        assert!(hub.image_newer_than(0, id2).is_none());
        let (frame, id) = hub.image_newer_than(0, id1).unwrap();
        assert_eq!((frame.data[0], id), (2, id2));
        assert!(hub.put_image(9, Frame::default()).is_err());
    }

    #[test]
    fn test_vision_flags() {
        let hub = hub();
        assert!(!hub.vision_enabled(1));
        hub.set_vision(1, true).unwrap();
        assert!(hub.vision_enabled(1));
        assert!(hub.set_vision(99, true).is_err());
        assert!(!hub.vision_enabled(99));
    }

    #[test]
    fn test_system_seeds_empty_model() {
        let hub = hub();
        hub.install_system(System {
            dimension: 2,
            initial: vec![0.5, 0.25],
            variance: vec![1.0, 1.0],
        });
        let model = hub.snapshot_model();
        assert_eq!(model.values(), &[0.5, 0.25]);
        assert_eq!(model.version(), 0);
    }
}
