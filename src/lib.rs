//! # Robolink IPC
//!
//! **Pure-Rust client for the robot-station remote API wire protocol.**
//! A synchronous core (codec, session, request engine, event channel) plus an
//! async client that owns the socket on a worker thread.
//!
//! ## Quickstart (async)
//!
//! ```no_run
//! use robolink_ipc::Client;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), robolink_ipc::RobolinkError> {
//!     let client = Client::builder().port(20500).connect().await?;
//!     let robot = client.item("UR10", robolink_ipc::commands::ANY_KIND).await?;
//!     let joints = client.joints(robot).await?;
//!     println!("{robot}: {:?}", joints.as_slice());
//!     client.wait_move(robot).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Quickstart (sync)
//!
//! ```no_run
//! # fn run() -> Result<(), robolink_ipc::RobolinkError> {
//! use robolink_ipc::commands::{ANY_KIND, IS_BUSY, ITEM};
//! use robolink_ipc::{Request, Session, DEFAULT_TIMEOUT};
//!
//! let mut session = Session::connect("127.0.0.1", 20500, DEFAULT_TIMEOUT)?;
//! let robot = session
//!     .call(&Request::for_command(&ITEM).arg("UR10").arg(ANY_KIND))?
//!     .take_handle()?;
//! let busy = session
//!     .call(&Request::for_command(&IS_BUSY).arg(robot))?
//!     .take_int()?;
//! println!("busy: {busy}");
//! # Ok(())
//! # }
//! ```
//!
//! Architecture layers:
//! - codec (wire values)
//! - transport + session (socket, handshake, timeout)
//! - request engine + blocking adapter
//! - event channel
//! - async client

#![cfg_attr(not(feature = "tracing"), allow(unused_variables))]

#[macro_use]
mod logging;

/// Extended-timeout execution for commands with unbounded completion time.
pub mod blocking;
/// Encoders and decoders for the six wire value types.
pub mod codec;
/// Argument and return shapes of commonly used remote commands.
pub mod commands;
/// Connection settings resolved from builder values, environment and defaults.
pub mod config;
/// Error types returned by this crate.
pub mod error;
/// Inbound-only event subscription.
pub mod event;
/// Autostart of the remote process.
pub mod launcher;
/// Poses, joint vectors, matrices and item handles.
pub mod model;
/// One request/response cycle over a session.
pub mod request;
/// Handshaken connection with its current read timeout.
pub mod session;
/// Status code classification.
pub mod status;
/// Byte-stream transport.
///
/// Most applications should not need to use this module directly.
pub mod transport;

#[cfg(feature = "async")]
/// Async client backed by a session worker thread.
pub mod client;

pub use crate::blocking::{call_blocking, wait_until_idle, TimeoutGuard};
#[cfg(feature = "async")]
pub use crate::client::{Client, ClientBuilder};
pub use crate::codec::{WireKind, WireValue};
pub use crate::config::ClientConfig;
pub use crate::error::RobolinkError;
pub use crate::event::{Event, EventChannel, EventKind, EventPayload};
pub use crate::launcher::LaunchConfig;
pub use crate::model::{Handle, JointVector, Matrix2D, Pose};
pub use crate::request::{Request, RequestEngine, Response};
pub use crate::session::{Session, DEFAULT_TIMEOUT};
pub use crate::status::StatusCode;
