//! Engine Configuration

use std::time::Duration;

/// Default receive window advertised by new sockets
pub const TCP_DEFAULT_WINDOW: u16 = 65535;
/// Default listen backlog
pub const TCP_DEFAULT_BACKLOG: usize = 8;

#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Receive window of every socket the engine allocates
    pub rcv_wnd: u16,
    /// Backlog used by `listen` when the caller passes zero
    pub backlog: usize,
    /// First initial sequence number handed out
    pub iss_seed: u32,
    /// Distance between consecutive initial sequence numbers
    pub iss_stride: u32,
    /// Initial capacity of a socket's receive buffer
    pub rcv_buf_capacity: usize,
    /// Upper bound for blocking application calls; `None` waits forever
    pub wait_timeout: Option<Duration>,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            rcv_wnd: TCP_DEFAULT_WINDOW,
            backlog: TCP_DEFAULT_BACKLOG,
            iss_seed: 6510,
            iss_stride: 64_000,
            rcv_buf_capacity: TCP_DEFAULT_WINDOW as usize,
            wait_timeout: None,
        }
    }
}
