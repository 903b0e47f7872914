//! The simulation state store - client-side reconciliation layer
//!
//! Holds the simulation list, the currently-viewed simulation, and a
//! per-simulation agent side table, and merges incremental live updates
//! into them without invalidating unrelated state.
//!
//! Two rules drive the design:
//! 1. Copy-on-write at the modified slot: list updates build a new list
//!    that reuses every untouched entry by `Arc` identity, so reactive
//!    consumers holding references to other entries never see them move.
//! 2. Agent positions live in a side table keyed by simulation id,
//!    decoupled from the full record; a position update touches the full
//!    record only when that simulation is the one currently displayed.

use nalgebra::Vector2;
use std::collections::HashMap;
use std::sync::Arc;

use crate::gateway::ApiError;
use crate::model::{Agent, AgentSnapshot, Simulation};

// ============================================================================
// PATCHES
// ============================================================================

/// Partial update of a simulation's lifecycle flags.
///
/// Unset fields are left untouched in both the list entry and the
/// active record.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatusPatch {
    pub running: Option<bool>,
    pub captured: Option<bool>,
    pub escaped: Option<bool>,
}

impl StatusPatch {
    /// Patch that only sets the running flag.
    pub fn running(value: bool) -> Self {
        Self {
            running: Some(value),
            ..Self::default()
        }
    }

    fn apply(&self, sim: &mut Simulation) {
        if let Some(running) = self.running {
            sim.is_running = running;
        }
        if let Some(captured) = self.captured {
            sim.is_captured = captured;
        }
        if let Some(escaped) = self.escaped {
            sim.escaped = escaped;
        }
    }
}

/// A single-field merge into a simulation record.
#[derive(Debug, Clone, PartialEq)]
pub enum SimulationField {
    Running(bool),
    Captured(bool),
    Escaped(bool),
    StepCount(u64),
    CaptureTime(Option<f64>),
}

impl SimulationField {
    fn apply(&self, sim: &mut Simulation) {
        match self {
            Self::Running(value) => sim.is_running = *value,
            Self::Captured(value) => sim.is_captured = *value,
            Self::Escaped(value) => sim.escaped = *value,
            Self::StepCount(value) => sim.step_count = *value,
            Self::CaptureTime(value) => sim.capture_time = *value,
        }
    }
}

// ============================================================================
// STORE
// ============================================================================

/// Session-lifetime state container for the viewer.
///
/// Owned by a single writer and injected into consumers; all mutations
/// are synchronous and atomic from a consumer's point of view. List
/// entries and the active record are shared as `Arc<Simulation>` so an
/// update to one slot leaves every other entry's identity intact.
#[derive(Debug, Default)]
pub struct SimulationStore {
    simulations: Vec<Arc<Simulation>>,
    current: Option<Arc<Simulation>>,
    agents: HashMap<u64, AgentSnapshot>,
    loading: bool,
    last_error: Option<ApiError>,
}

impl SimulationStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // === Accessors ===

    /// All known simulations, in list order.
    pub fn simulations(&self) -> &[Arc<Simulation>] {
        &self.simulations
    }

    /// The currently-viewed simulation, if any.
    pub fn current(&self) -> Option<&Arc<Simulation>> {
        self.current.as_ref()
    }

    /// Looks up a simulation in the list by id.
    pub fn simulation_by_id(&self, id: u64) -> Option<&Arc<Simulation>> {
        self.simulations.iter().find(|s| s.id == id)
    }

    /// The agent side-table entry for a simulation.
    pub fn snapshot(&self, id: u64) -> Option<&AgentSnapshot> {
        self.agents.get(&id)
    }

    /// Capture time of the current simulation, once captured.
    pub fn capture_time(&self) -> Option<f64> {
        self.current.as_ref().and_then(|sim| sim.capture_time)
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn last_error(&self) -> Option<&ApiError> {
        self.last_error.as_ref()
    }

    // === Flags ===

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub fn set_error(&mut self, error: Option<ApiError>) {
        self.last_error = error;
    }

    // === List and record mutations ===

    /// Replaces the full simulation list. No merge is attempted.
    pub fn set_simulations(&mut self, simulations: Vec<Simulation>) {
        self.simulations = simulations.into_iter().map(Arc::new).collect();
    }

    /// Replaces the active record and (re)seeds its agent snapshot from
    /// the record's embedded lists.
    pub fn set_current(&mut self, simulation: Simulation) {
        self.agents.insert(
            simulation.id,
            AgentSnapshot::new(&simulation.hunters, &simulation.targets),
        );
        self.current = Some(Arc::new(simulation));
    }

    /// Replaces the matching list entry by id.
    ///
    /// The list is rebuilt with only the matched slot renewed; every
    /// other entry keeps its `Arc` identity. A missing id leaves the
    /// list untouched. The active record is replaced too when ids match.
    pub fn update_in_list(&mut self, simulation: Simulation) {
        let updated = Arc::new(simulation);

        if let Some(index) = self.simulations.iter().position(|s| s.id == updated.id) {
            let mut next = Vec::with_capacity(self.simulations.len());
            next.extend(self.simulations[..index].iter().cloned());
            next.push(Arc::clone(&updated));
            next.extend(self.simulations[index + 1..].iter().cloned());
            self.simulations = next;
        }

        if self.current.as_ref().map(|c| c.id) == Some(updated.id) {
            self.current = Some(updated);
        }
    }

    /// Merges lifecycle flags into the list entry and the active record.
    pub fn update_status(&mut self, id: u64, patch: StatusPatch) {
        self.rewrite(id, |sim| patch.apply(sim));
    }

    /// Merges a single field into the list entry and the active record.
    pub fn update_field(&mut self, id: u64, field: SimulationField) {
        self.rewrite(id, |sim| field.apply(sim));
    }

    /// Replaces the agent snapshot for a known simulation id.
    ///
    /// The stored sequences are deep copies, never shared with the
    /// caller's slices. When the id matches the active record, the same
    /// hunters/targets are mirrored into it without touching any other
    /// field. Unknown ids are ignored: snapshots are created by
    /// [`set_current`](Self::set_current) and
    /// [`add_simulation`](Self::add_simulation).
    pub fn update_agents(&mut self, id: u64, hunters: &[Agent], targets: &[Agent]) {
        let Some(entry) = self.agents.get_mut(&id) else {
            return;
        };
        *entry = AgentSnapshot::new(hunters, targets);

        if let Some(current) = self.current.as_ref().filter(|c| c.id == id) {
            let mut sim = Simulation::clone(current);
            sim.hunters = hunters.to_vec();
            sim.targets = targets.to_vec();
            self.current = Some(Arc::new(sim));
        }
    }

    /// Appends a simulation and seeds its agent snapshot.
    pub fn add_simulation(&mut self, simulation: Simulation) {
        self.agents.insert(
            simulation.id,
            AgentSnapshot::new(&simulation.hunters, &simulation.targets),
        );
        self.simulations.push(Arc::new(simulation));
    }

    /// Removes a simulation, purging its agent snapshot and clearing a
    /// matching active record.
    pub fn remove_simulation(&mut self, id: u64) {
        self.simulations.retain(|s| s.id != id);
        if self.current.as_ref().map(|c| c.id) == Some(id) {
            self.current = None;
        }
        self.agents.remove(&id);
    }

    // === Derived queries ===

    /// Euclidean distance from every hunter to the first target, rounded
    /// to 2 decimal places, keyed by hunter id.
    ///
    /// Single-target assumption: additional targets are ignored. Returns
    /// an empty map when the snapshot is absent or either list is empty.
    pub fn agent_distances(&self, id: u64) -> HashMap<u64, f64> {
        let Some(snapshot) = self.agents.get(&id) else {
            return HashMap::new();
        };
        let Some(target) = snapshot.targets.first() else {
            return HashMap::new();
        };
        if snapshot.hunters.is_empty() {
            return HashMap::new();
        }

        let target_pos = Vector2::from(target.position);
        snapshot
            .hunters
            .iter()
            .map(|hunter| {
                let distance = (Vector2::from(hunter.position) - target_pos).norm();
                (hunter.id, (distance * 100.0).round() / 100.0)
            })
            .collect()
    }

    // === Internals ===

    /// Copy-on-write edit of the simulation with the given id, applied
    /// to the list slot and the active record wherever ids match.
    fn rewrite(&mut self, id: u64, edit: impl Fn(&mut Simulation)) {
        if let Some(index) = self.simulations.iter().position(|s| s.id == id) {
            let mut sim = Simulation::clone(&self.simulations[index]);
            edit(&mut sim);

            let mut next = Vec::with_capacity(self.simulations.len());
            next.extend(self.simulations[..index].iter().cloned());
            next.push(Arc::new(sim));
            next.extend(self.simulations[index + 1..].iter().cloned());
            self.simulations = next;
        }

        if let Some(current) = self.current.as_ref().filter(|c| c.id == id) {
            let mut sim = Simulation::clone(current);
            edit(&mut sim);
            self.current = Some(Arc::new(sim));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sim(id: u64) -> Simulation {
        Simulation {
            id,
            name: format!("sim-{id}"),
            description: None,
            environment_size: 500,
            num_hunters: 2,
            num_targets: 1,
            algorithm_type: "APF".to_string(),
            max_steps: 1000,
            step_count: 0,
            is_running: false,
            is_captured: false,
            escaped: false,
            capture_time: None,
            created_at: Some("2024-05-01T00:00:00".to_string()),
            updated_at: None,
            hunters: vec![Agent::new(1, 0.0, 0.0), Agent::new(2, 10.0, 0.0)],
            targets: vec![Agent::new(1, 3.0, 4.0)],
        }
    }

    #[test]
    fn test_set_current_seeds_snapshot() {
        let mut store = SimulationStore::new();
        store.set_current(sim(1));

        let snapshot = store.snapshot(1).unwrap();
        assert_eq!(snapshot.hunters.len(), 2);
        assert_eq!(snapshot.targets.len(), 1);
        assert_eq!(store.current().unwrap().id, 1);
    }

    #[test]
    fn test_set_current_seeds_empty_lists_when_absent() {
        let mut store = SimulationStore::new();
        let mut bare = sim(1);
        bare.hunters.clear();
        bare.targets.clear();
        store.set_current(bare);

        let snapshot = store.snapshot(1).unwrap();
        assert!(snapshot.hunters.is_empty());
        assert!(snapshot.targets.is_empty());
    }

    #[test]
    fn test_update_in_list_preserves_unrelated_identity() {
        let mut store = SimulationStore::new();
        store.set_simulations(vec![sim(1), sim(2), sim(3)]);

        let before: Vec<Arc<Simulation>> = store.simulations().to_vec();

        let mut changed = sim(2);
        changed.name = "renamed".to_string();
        store.update_in_list(changed);

        let after = store.simulations();
        assert!(Arc::ptr_eq(&before[0], &after[0]));
        assert!(Arc::ptr_eq(&before[2], &after[2]));
        assert!(!Arc::ptr_eq(&before[1], &after[1]));
        assert_eq!(after[1].name, "renamed");
    }

    #[test]
    fn test_update_in_list_unknown_id_is_noop_on_list() {
        let mut store = SimulationStore::new();
        store.set_simulations(vec![sim(1)]);
        store.update_in_list(sim(9));

        assert_eq!(store.simulations().len(), 1);
        assert_eq!(store.simulations()[0].id, 1);
    }

    #[test]
    fn test_update_in_list_replaces_matching_current() {
        let mut store = SimulationStore::new();
        store.set_simulations(vec![sim(1)]);
        store.set_current(sim(1));

        let mut changed = sim(1);
        changed.step_count = 42;
        store.update_in_list(changed);

        assert_eq!(store.current().unwrap().step_count, 42);
        assert_eq!(store.simulations()[0].step_count, 42);
    }

    #[test]
    fn test_update_status_partial_merge() {
        let mut store = SimulationStore::new();
        let mut running = sim(1);
        running.is_running = true;
        store.set_simulations(vec![running.clone()]);
        store.set_current(running);

        store.update_status(
            1,
            StatusPatch {
                captured: Some(true),
                ..StatusPatch::default()
            },
        );

        // The unmentioned running flag is untouched in both places.
        assert!(store.current().unwrap().is_running);
        assert!(store.current().unwrap().is_captured);
        assert!(store.simulations()[0].is_running);
        assert!(store.simulations()[0].is_captured);
    }

    #[test]
    fn test_update_agents_touches_only_snapshot_and_current_lists() {
        let mut store = SimulationStore::new();
        let mut running = sim(1);
        running.is_running = true;
        store.set_simulations(vec![running.clone()]);
        store.set_current(running);

        let list_entry_before = Arc::clone(&store.simulations()[0]);

        let hunters = vec![Agent::new(1, 5.0, 5.0)];
        let targets = vec![Agent::new(1, 8.0, 9.0)];
        store.update_agents(1, &hunters, &targets);

        // Snapshot replaced with deep copies.
        let snapshot = store.snapshot(1).unwrap();
        assert_eq!(snapshot.hunters, hunters);
        assert_eq!(snapshot.targets, targets);

        // Mirrored into the active record without touching other fields.
        let current = store.current().unwrap();
        assert_eq!(current.hunters, hunters);
        assert!(current.is_running);
        assert_eq!(current.step_count, 0);

        // The list entry is not part of the mirror.
        assert!(Arc::ptr_eq(&list_entry_before, &store.simulations()[0]));
    }

    #[test]
    fn test_update_agents_unknown_id_is_noop() {
        let mut store = SimulationStore::new();
        store.update_agents(7, &[Agent::new(1, 0.0, 0.0)], &[]);
        assert!(store.snapshot(7).is_none());
    }

    #[test]
    fn test_update_agents_deep_copies_caller_slices() {
        let mut store = SimulationStore::new();
        store.set_current(sim(1));

        let mut hunters = vec![Agent::new(1, 5.0, 5.0)];
        store.update_agents(1, &hunters, &[Agent::new(1, 0.0, 0.0)]);

        hunters[0].position = [99.0, 99.0];
        assert_eq!(store.snapshot(1).unwrap().hunters[0].position, [5.0, 5.0]);
    }

    #[test]
    fn test_update_field_scopes_like_status() {
        let mut store = SimulationStore::new();
        store.set_simulations(vec![sim(1), sim(2)]);
        store.set_current(sim(1));

        store.update_field(1, SimulationField::StepCount(120));
        store.update_field(1, SimulationField::CaptureTime(Some(12.5)));

        assert_eq!(store.simulations()[0].step_count, 120);
        assert_eq!(store.current().unwrap().capture_time, Some(12.5));
        assert_eq!(store.simulations()[1].step_count, 0);
    }

    #[test]
    fn test_add_and_remove_simulation() {
        let mut store = SimulationStore::new();
        store.add_simulation(sim(1));
        store.add_simulation(sim(2));
        store.set_current(sim(2));

        assert!(store.snapshot(1).is_some());
        assert!(store.snapshot(2).is_some());

        store.remove_simulation(2);

        assert_eq!(store.simulations().len(), 1);
        assert!(store.current().is_none());
        assert!(store.snapshot(2).is_none());
        assert!(store.snapshot(1).is_some());
    }

    #[test]
    fn test_agent_distances_three_four_five() {
        let mut store = SimulationStore::new();
        let mut single = sim(1);
        single.hunters = vec![Agent::new(1, 0.0, 0.0)];
        single.targets = vec![Agent::new(1, 3.0, 4.0)];
        store.set_current(single);

        let distances = store.agent_distances(1);
        assert_eq!(distances.len(), 1);
        assert_relative_eq!(distances[&1], 5.0);
    }

    #[test]
    fn test_agent_distances_rounded_to_two_decimals() {
        let mut store = SimulationStore::new();
        let mut single = sim(1);
        single.hunters = vec![Agent::new(1, 0.0, 0.0)];
        single.targets = vec![Agent::new(1, 1.0, 1.0)];
        store.set_current(single);

        let distances = store.agent_distances(1);
        assert_relative_eq!(distances[&1], 1.41); // sqrt(2) = 1.4142...
    }

    #[test]
    fn test_agent_distances_pairs_against_first_target_only() {
        let mut store = SimulationStore::new();
        let mut multi = sim(1);
        multi.hunters = vec![Agent::new(1, 0.0, 0.0), Agent::new(2, 6.0, 8.0)];
        multi.targets = vec![Agent::new(1, 3.0, 4.0), Agent::new(2, 100.0, 100.0)];
        store.set_current(multi);

        let distances = store.agent_distances(1);
        assert_relative_eq!(distances[&1], 5.0);
        assert_relative_eq!(distances[&2], 5.0);
    }

    #[test]
    fn test_agent_distances_empty_cases() {
        let mut store = SimulationStore::new();
        assert!(store.agent_distances(1).is_empty());

        let mut no_targets = sim(1);
        no_targets.targets.clear();
        store.set_current(no_targets);
        assert!(store.agent_distances(1).is_empty());

        let mut no_hunters = sim(2);
        no_hunters.hunters.clear();
        store.set_current(no_hunters);
        assert!(store.agent_distances(2).is_empty());
    }

    #[test]
    fn test_loading_and_error_flags() {
        let mut store = SimulationStore::new();
        assert!(!store.loading());
        assert!(store.last_error().is_none());

        store.set_loading(true);
        assert!(store.loading());

        store.set_error(Some(ApiError::network("connection refused", "req-1")));
        assert_eq!(store.last_error().unwrap().status, 500);

        store.set_error(None);
        assert!(store.last_error().is_none());
    }
}
