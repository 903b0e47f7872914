//! Pursuit Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" abstraction allowing the pursuit
//! viewer's live-update pipeline to run against both **Production**
//! (tokio + a real WebSocket) and **Test** (paused clock + channel-based
//! transport doubles) environments.
//!
//! Everything the connection manager waits on — heartbeat cadence, ack
//! deadlines, reconnect backoff — goes through [`ViewerContext`], and
//! everything it sends or receives goes through [`LiveTransport`], so a
//! session can be driven deterministically without a server.
//!
//! # Example
//!
//! ```ignore
//! use pursuit_env::{ViewerContext, LiveTransport, ChannelEvent};
//!
//! async fn session_loop<C: ViewerContext>(ctx: &C, transport: &dyn LiveTransport) {
//!     let mut channel = transport.connect("ws://localhost:8000/...").await.unwrap();
//!     loop {
//!         tokio::select! {
//!             ev = channel.recv() => handle_event(ev),
//!             _ = ctx.sleep(HEARTBEAT_INTERVAL) => beat(),
//!         }
//!     }
//! }
//! ```

mod context;
mod transport;
mod types;
mod error;
mod tokio_impl;

pub use context::ViewerContext;
pub use transport::{LiveChannel, LiveTransport};
pub use types::{ChannelEvent, CloseInfo, is_normal_close, NORMAL_CLOSE_CODES};
pub use error::EnvError;
pub use tokio_impl::TokioContext;
