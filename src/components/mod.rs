//! TCP State Components
//!
//! This module contains the disjoint pieces of per-socket state:
//! 1. Connection Management - state, 4-tuple, parent link and queues
//! 2. Reliable Ordered Delivery - sequence numbers
//! 3. Flow Control - receive and send windows

mod connection_mgmt;
pub mod flow_control;
pub mod rod;

pub use connection_mgmt::{ConnectionManagementState, QueueKind};
pub use flow_control::{
    is_segment_in_window, update_send_window, update_send_window_if_ack_valid, FlowControlState,
};
pub use rod::{seq_geq, seq_gt, seq_leq, seq_lt, ReliableOrderedDeliveryState};
