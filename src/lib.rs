//! Rust implementation of the TCP input state machine
//!
//! This crate takes parsed TCP segments and drives connection state:
//! passive and active opens, the listen/accept queues, payload delivery,
//! resets and the receive side of connection teardown. Header parsing,
//! retransmission and congestion control live elsewhere; replies and
//! timers leave through the [`TcpEnv`] trait.
//!
//! Sockets are owned by a [`SockTable`] and referred to by [`SockId`].
//! [`TcpStack`] wraps the table behind a mutex and offers blocking
//! `accept`/`read`/`connect` calls backed by per-socket wait conditions.

pub mod components;
pub mod config;
pub mod control_path;
pub mod state;
pub mod tcp_api;
pub mod tcp_env;
pub mod tcp_hash;
pub mod tcp_in;
pub mod tcp_out;
pub mod tcp_proto;
pub mod tcp_queue;
pub mod tcp_sock;
pub mod tcp_types;
pub mod tcp_wait;

pub use config::TcpConfig;
pub use control_path::{ControlPath, Verdict};
pub use state::{TcpSock, TcpState};
pub use tcp_api::{TcpError, TcpStack};
pub use tcp_env::{RecvBuffer, TcpEnv};
pub use tcp_in::{InputStats, TcpRx};
pub use tcp_proto::TcpFlags;
pub use tcp_sock::SockTable;
pub use tcp_types::{ControlSegment, DropReason, FourTuple, InputAction, SockId, TcpSegment};
pub use tcp_wait::{SockEvents, WaitEvent, WaitResult};
