//! Pursuit Core - Client-Side Live-Update Pipeline for Simulation Viewers
//!
//! This library keeps a viewer synchronized with a server-driven
//! predator/prey simulation loop despite network instability:
//! 1. **Connection manager**: one reconnecting duplex channel per
//!    simulation, with heartbeat liveness detection and bounded
//!    exponential backoff
//! 2. **Frame interpreter**: classifies every inbound payload before it
//!    can reach application code
//! 3. **State store**: structurally-shared reconciliation of incremental
//!    agent updates, with derived queries such as hunter-target distance
//!
//! The REST gateway rounds out the surface with CRUD and lifecycle
//! actions over the same backend.

pub mod endpoint;
pub mod gateway;
pub mod live;
pub mod model;
pub mod protocol;
pub mod store;
pub mod ws;

// Re-export key types for convenience
pub use endpoint::ServerEndpoint;
pub use gateway::{ApiError, ApiErrorKind, GatewayConfig, SimulationGateway};
pub use live::{LiveConfig, LiveConnections, LiveError, LiveHandle, LiveHandlers};
pub use model::{Agent, AgentSnapshot, NewSimulation, Simulation, StateUpdate};
pub use protocol::Inbound;
pub use store::{SimulationField, SimulationStore, StatusPatch};
pub use ws::WsTransport;
