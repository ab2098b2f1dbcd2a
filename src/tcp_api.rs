//! TCP API Functions
//!
//! Blocking application surface over the input engine. One mutex guards the
//! socket table, the environment and the counters, so segments and
//! application calls are serialized per stack. Blocking calls sleep on the
//! socket's wait conditions with the lock released.

use std::fmt;
use std::net::SocketAddrV4;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use anyhow::Result;

use crate::config::TcpConfig;
use crate::state::TcpState;
use crate::tcp_env::TcpEnv;
use crate::tcp_in::{InputStats, TcpRx};
use crate::tcp_out::TcpTx;
use crate::tcp_proto::TcpFlags;
use crate::tcp_sock::SockTable;
use crate::tcp_types::{FourTuple, InputAction, SockId, TcpSegment, UNSPECIFIED};
use crate::tcp_wait::{SockEvents, WaitEvent, WaitResult};

/// Errors surfaced to the application, after lwIP's `err_t` codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpError {
    /// Connection reset by the peer (`ERR_RST`)
    Reset,
    /// Connection closed (`ERR_CLSD`)
    Closed,
    /// Blocking call exceeded `TcpConfig::wait_timeout` (`ERR_TIMEOUT`)
    Timeout,
    /// Operation not allowed in the socket's state (`ERR_CONN`)
    InvalidState,
    /// Address already in use (`ERR_USE`)
    AddrInUse,
    /// No such socket (`ERR_ARG`)
    NotFound,
}

impl fmt::Display for TcpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            TcpError::Reset => "connection reset",
            TcpError::Closed => "connection closed",
            TcpError::Timeout => "timed out",
            TcpError::InvalidState => "operation not valid in this state",
            TcpError::AddrInUse => "address in use",
            TcpError::NotFound => "no such socket",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for TcpError {}

/// Why a socket disappeared under a waiter
fn gone(events: &SockEvents) -> TcpError {
    if events.is_reset() {
        TcpError::Reset
    } else {
        TcpError::Closed
    }
}

struct StackInner<E> {
    table: SockTable,
    env: E,
    stats: InputStats,
}

/// A TCP engine instance shared between the packet path and applications
pub struct TcpStack<E: TcpEnv> {
    inner: Mutex<StackInner<E>>,
}

impl<E: TcpEnv> TcpStack<E> {
    pub fn new(config: TcpConfig, env: E) -> Self {
        Self {
            inner: Mutex::new(StackInner {
                table: SockTable::new(config),
                env,
                stats: InputStats::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StackInner<E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Feed one parsed segment into the engine
    pub fn input(&self, seg: &TcpSegment) -> InputAction {
        let mut guard = self.lock();
        let inner = &mut *guard;
        TcpRx::new(&mut inner.table, &mut inner.env, &mut inner.stats).input(seg)
    }

    /// Open a listening socket on `local` (`0.0.0.0` for any address)
    ///
    /// A `backlog` of zero selects the configured default.
    pub fn listen(&self, local: SocketAddrV4, backlog: usize) -> Result<SockId> {
        let mut inner = self.lock();
        if inner.table.hash_table().lookup_listen(&local).is_some() {
            anyhow::bail!(TcpError::AddrInUse);
        }
        let backlog = if backlog == 0 {
            inner.table.config().backlog
        } else {
            backlog
        };

        let id = inner.table.allocate(local, UNSPECIFIED);
        if let Some(sock) = inner.table.get_mut(id) {
            sock.conn_mgmt.backlog = backlog;
        }
        inner.table.transition(id, TcpState::Listen);
        if inner.table.register_established(id).is_err() {
            inner.table.destroy(id);
            anyhow::bail!(TcpError::AddrInUse);
        }
        log::debug!("[{}] listening on {}, backlog {}", id, local, backlog);
        Ok(id)
    }

    /// Send a SYN to `remote` and return without waiting for the answer
    pub fn connect_start(&self, local: SocketAddrV4, remote: SocketAddrV4) -> Result<SockId> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let tuple = FourTuple::new(local, remote);
        if inner.table.hash_table().lookup_established(&tuple).is_some() {
            anyhow::bail!(TcpError::AddrInUse);
        }

        let id = inner.table.allocate(local, remote);
        inner.table.transition(id, TcpState::SynSent);
        if inner.table.register_established(id).is_err() {
            inner.table.destroy(id);
            anyhow::bail!(TcpError::AddrInUse);
        }
        if let Some(sock) = inner.table.get_mut(id) {
            TcpTx::send_control(&mut inner.env, sock, TcpFlags::SYN);
        }
        Ok(id)
    }

    /// Block until `id` leaves SYN_SENT
    pub fn wait_connected(&self, id: SockId) -> Result<()> {
        self.block_on(id, WaitEvent::Connect, |table| match table.state(id) {
            Some(TcpState::SynSent) => Ok(None),
            Some(_) => Ok(Some(())),
            None => anyhow::bail!(TcpError::NotFound),
        })
    }

    /// Active open: send a SYN and wait for the handshake to finish
    pub fn connect(&self, local: SocketAddrV4, remote: SocketAddrV4) -> Result<SockId> {
        let id = self.connect_start(local, remote)?;
        self.wait_connected(id)?;
        Ok(id)
    }

    /// Take the oldest established connection from `listener`'s accept queue
    pub fn accept(&self, listener: SockId) -> Result<SockId> {
        self.block_on(listener, WaitEvent::Accept, |table| {
            if table.state(listener) != Some(TcpState::Listen) {
                anyhow::bail!(TcpError::InvalidState);
            }
            Ok(table.pop_ready(listener))
        })
    }

    /// Read received bytes into `buf`
    ///
    /// Blocks while the buffer is empty. Returns 0 once the peer has closed
    /// and everything it sent has been read.
    pub fn read(&self, id: SockId, buf: &mut [u8]) -> Result<usize> {
        self.block_on(id, WaitEvent::Recv, |table| {
            let Some(sock) = table.get_mut(id) else {
                anyhow::bail!(TcpError::NotFound);
            };
            if !sock.rcv_buf.is_empty() {
                return Ok(Some(sock.rcv_buf.read(&mut *buf)));
            }
            match sock.state() {
                TcpState::Closed | TcpState::Listen => anyhow::bail!(TcpError::InvalidState),
                s if s.peer_closed() => Ok(Some(0)),
                _ => Ok(None),
            }
        })
    }

    /// Block until the peer's window is open
    ///
    /// Re-checks the latched window state, so a window that opened before
    /// this call is seen immediately.
    pub fn wait_writable(&self, id: SockId) -> Result<()> {
        let (events, timeout) = {
            let inner = self.lock();
            let Some(sock) = inner.table.get(id) else {
                anyhow::bail!(TcpError::NotFound);
            };
            if !sock.state().can_send() {
                anyhow::bail!(TcpError::InvalidState);
            }
            (sock.events.clone(), inner.table.config().wait_timeout)
        };
        match events.wait_send_open(timeout) {
            WaitResult::Notified => Ok(()),
            WaitResult::Closed => anyhow::bail!(gone(&events)),
            WaitResult::TimedOut => anyhow::bail!(TcpError::Timeout),
        }
    }

    /// Release the application's end of `id`
    ///
    /// ESTABLISHED and CLOSE_WAIT send a FIN; sockets that never finished a
    /// handshake are destroyed outright. Closing sockets are left alone.
    pub fn close(&self, id: SockId) -> Result<()> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let Some(state) = inner.table.state(id) else {
            anyhow::bail!(TcpError::NotFound);
        };
        let next = match state {
            TcpState::Established => TcpState::FinWait1,
            TcpState::CloseWait => TcpState::LastAck,
            TcpState::Closed | TcpState::Listen | TcpState::SynSent | TcpState::SynRecv => {
                if inner.table.destroy(id) {
                    inner.stats.destroyed += 1;
                }
                return Ok(());
            }
            _ => return Ok(()),
        };
        if let Some(sock) = inner.table.get_mut(id) {
            TcpTx::send_control(&mut inner.env, sock, TcpFlags::FIN | TcpFlags::ACK);
        }
        inner.table.transition(id, next);
        Ok(())
    }

    /// The TIME_WAIT timer armed for `id` fired
    pub fn time_wait_expired(&self, id: SockId) -> bool {
        let mut inner = self.lock();
        if inner.table.state(id) != Some(TcpState::TimeWait) {
            log::warn!("[{}] time-wait expiry for socket not in TIME_WAIT", id);
            return false;
        }
        inner.table.transition(id, TcpState::Closed);
        let destroyed = inner.table.destroy(id);
        if destroyed {
            inner.stats.destroyed += 1;
        }
        destroyed
    }

    pub fn state(&self, id: SockId) -> Option<TcpState> {
        self.lock().table.state(id)
    }

    pub fn stats(&self) -> InputStats {
        self.lock().stats
    }

    /// Run `f` against the environment, e.g. to inspect captured replies
    pub fn with_env<R>(&self, f: impl FnOnce(&mut E) -> R) -> R {
        f(&mut self.lock().env)
    }

    pub fn with_table<R>(&self, f: impl FnOnce(&SockTable) -> R) -> R {
        f(&self.lock().table)
    }

    /// Sample, check, sleep
    ///
    /// The generation of `event` is sampled under the stack lock before
    /// `poll` runs, so a notification fired after the check wakes the wait.
    /// The timeout covers the whole call, not each wakeup.
    fn block_on<T>(
        &self,
        id: SockId,
        event: WaitEvent,
        mut poll: impl FnMut(&mut SockTable) -> Result<Option<T>>,
    ) -> Result<T> {
        let started = Instant::now();
        let mut watched: Option<Arc<SockEvents>> = None;
        loop {
            let (events, seen, timeout) = {
                let mut inner = self.lock();
                let Some(sock) = inner.table.get(id) else {
                    match watched {
                        Some(events) => anyhow::bail!(gone(&events)),
                        None => anyhow::bail!(TcpError::NotFound),
                    }
                };
                let events = sock.events.clone();
                let seen = events.generation(event);
                if let Some(value) = poll(&mut inner.table)? {
                    return Ok(value);
                }
                (events, seen, inner.table.config().wait_timeout)
            };

            let remaining = match timeout {
                Some(limit) => match limit.checked_sub(started.elapsed()) {
                    Some(left) => Some(left),
                    None => anyhow::bail!(TcpError::Timeout),
                },
                None => None,
            };
            match events.wait(event, seen, remaining) {
                WaitResult::Notified => {}
                WaitResult::Closed => anyhow::bail!(gone(&events)),
                WaitResult::TimedOut => anyhow::bail!(TcpError::Timeout),
            }
            watched = Some(events);
        }
    }
}
