//! Data model for the pursuit viewer client.
//!
//! These are the wire shapes exchanged with the backend: the full
//! simulation record returned by the REST gateway, the agents embedded in
//! it, and the incremental state updates pushed over the live channel.

use serde::{Deserialize, Serialize};

// ============================================================================
// AGENTS
// ============================================================================

/// One agent in a simulation, typed by the list it belongs to.
///
/// Agents have no independent lifecycle — they exist only inside a
/// simulation record or an incremental update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    /// Agent identifier, unique within its simulation
    pub id: u64,

    /// 2-D position in environment coordinates
    pub position: [f64; 2],
}

impl Agent {
    /// Creates an agent at the given position.
    pub fn new(id: u64, x: f64, y: f64) -> Self {
        Self {
            id,
            position: [x, y],
        }
    }
}

/// The hunters/targets pair for one simulation, stored separately from
/// the full record so frequent position updates do not force a full
/// record replacement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    /// Ordered hunter agents
    pub hunters: Vec<Agent>,

    /// Ordered target agents
    pub targets: Vec<Agent>,
}

impl AgentSnapshot {
    /// Creates a snapshot by copying the given agent lists.
    pub fn new(hunters: &[Agent], targets: &[Agent]) -> Self {
        Self {
            hunters: hunters.to_vec(),
            targets: targets.to_vec(),
        }
    }
}

// ============================================================================
// SIMULATION RECORD
// ============================================================================

/// A simulation record as returned by the REST gateway.
///
/// The list endpoint returns a reduced record, so every non-id field
/// tolerates absence on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Simulation {
    /// Unique identifier, immutable once created
    pub id: u64,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Side length of the square environment
    #[serde(default)]
    pub environment_size: u32,

    #[serde(default)]
    pub num_hunters: u32,

    #[serde(default)]
    pub num_targets: u32,

    /// Pursuit algorithm driving the hunters ("APF", "CONSENSUS", ...)
    #[serde(default)]
    pub algorithm_type: String,

    #[serde(default)]
    pub max_steps: u64,

    #[serde(default)]
    pub step_count: u64,

    #[serde(default)]
    pub is_running: bool,

    #[serde(default)]
    pub is_captured: bool,

    /// True once the target left the environment without being captured
    #[serde(default)]
    pub escaped: bool,

    /// Seconds from start to capture, set once captured
    #[serde(default)]
    pub capture_time: Option<f64>,

    /// ISO-8601 creation timestamp as received
    #[serde(default)]
    pub created_at: Option<String>,

    #[serde(default)]
    pub updated_at: Option<String>,

    #[serde(default)]
    pub hunters: Vec<Agent>,

    #[serde(default)]
    pub targets: Vec<Agent>,
}

/// Request body for creating a simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSimulation {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub environment_size: u32,
    pub num_hunters: u32,
    pub num_targets: u32,
    pub algorithm_type: String,
    pub max_steps: u64,
}

impl Default for NewSimulation {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: None,
            environment_size: 500,
            num_hunters: 5,
            num_targets: 1,
            algorithm_type: "APF".to_string(),
            max_steps: 1000,
        }
    }
}

/// Request body for updating a simulation's configuration.
///
/// Only the mentioned fields are sent; the backend leaves the rest
/// untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment_size: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_hunters: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_targets: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<u64>,
}

// ============================================================================
// LIVE UPDATES
// ============================================================================

/// An incremental state update pushed over the live channel.
///
/// Every field is optional: the backend sends whatever changed this step.
/// A frame carrying none of `hunters`/`targets`/`is_running` is treated
/// as incomplete and dropped by the interpreter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    pub id: Option<u64>,
    pub hunters: Option<Vec<Agent>>,
    pub targets: Option<Vec<Agent>>,
    pub is_running: Option<bool>,
    pub is_captured: Option<bool>,
    pub escaped: Option<bool>,
    pub step_count: Option<u64>,
    pub capture_time: Option<f64>,
}

// ============================================================================
// PERSISTED SNAPSHOTS (REST)
// ============================================================================

/// One persisted snapshot row from the snapshots endpoint.
///
/// The agent lists arrive JSON-encoded inside the row; use the decode
/// helpers to recover them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub step: u64,

    #[serde(default)]
    pub hunters_state: String,

    #[serde(default)]
    pub targets_state: String,
}

impl SnapshotRecord {
    /// Decodes the hunter list embedded in this row.
    pub fn hunters(&self) -> Result<Vec<Agent>, serde_json::Error> {
        serde_json::from_str(&self.hunters_state)
    }

    /// Decodes the target list embedded in this row.
    pub fn targets(&self) -> Result<Vec<Agent>, serde_json::Error> {
        serde_json::from_str(&self.targets_state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulation_tolerates_reduced_record() {
        // The list endpoint omits agents and runtime flags.
        let json = r#"{"id": 7, "name": "chase", "num_hunters": 5, "num_targets": 1,
                       "algorithm_type": "APF", "is_captured": false, "step_count": 0}"#;
        let sim: Simulation = serde_json::from_str(json).unwrap();
        assert_eq!(sim.id, 7);
        assert_eq!(sim.name, "chase");
        assert!(!sim.is_running);
        assert!(sim.hunters.is_empty());
        assert!(sim.capture_time.is_none());
    }

    #[test]
    fn test_new_simulation_defaults() {
        let new = NewSimulation::default();
        assert_eq!(new.environment_size, 500);
        assert_eq!(new.num_hunters, 5);
        assert_eq!(new.num_targets, 1);
        assert_eq!(new.algorithm_type, "APF");
        assert_eq!(new.max_steps, 1000);
    }

    #[test]
    fn test_state_update_partial_frame() {
        let json = r#"{"id": 3, "is_running": false, "error_count": 2}"#;
        let update: StateUpdate = serde_json::from_str(json).unwrap();
        assert_eq!(update.id, Some(3));
        assert_eq!(update.is_running, Some(false));
        assert!(update.hunters.is_none());
    }

    #[test]
    fn test_snapshot_record_decodes_embedded_lists() {
        let record = SnapshotRecord {
            step: 40,
            hunters_state: r#"[{"id": 1, "position": [0.5, 2.0]}]"#.to_string(),
            targets_state: "[]".to_string(),
        };
        let hunters = record.hunters().unwrap();
        assert_eq!(hunters.len(), 1);
        assert_eq!(hunters[0].position, [0.5, 2.0]);
        assert!(record.targets().unwrap().is_empty());
    }
}
