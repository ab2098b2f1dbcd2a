//! Socket Lifecycle Management
//!
//! `SockTable` is the registry that owns every socket. Everything else,
//! parent links, queue entries, the lookup table, refers to sockets by
//! [`SockId`].

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddrV4;

use crate::config::TcpConfig;
use crate::state::{TcpSock, TcpState};
use crate::tcp_hash::TcpHashTable;
use crate::tcp_types::{SockId, TcpSegment};

pub struct SockTable {
    pub(crate) socks: HashMap<SockId, TcpSock>,
    hash: TcpHashTable,
    config: TcpConfig,
    next_id: u32,
    next_iss: u32,
}

impl SockTable {
    pub fn new(config: TcpConfig) -> Self {
        Self {
            socks: HashMap::new(),
            hash: TcpHashTable::new(),
            next_iss: config.iss_seed,
            config,
            next_id: 1,
        }
    }

    pub fn config(&self) -> &TcpConfig {
        &self.config
    }

    fn generate_iss(&mut self) -> u32 {
        let iss = self.next_iss;
        self.next_iss = self.next_iss.wrapping_add(self.config.iss_stride);
        iss
    }

    /// Allocate a CLOSED socket, unlinked from any lookup table
    pub fn allocate(&mut self, local: SocketAddrV4, remote: SocketAddrV4) -> SockId {
        let mut id = SockId(self.next_id);
        while self.socks.contains_key(&id) {
            self.next_id = self.next_id.wrapping_add(1);
            id = SockId(self.next_id);
        }
        self.next_id = self.next_id.wrapping_add(1);
        let iss = self.generate_iss();
        let sock = TcpSock::new(
            id,
            local,
            remote,
            iss,
            self.config.rcv_wnd,
            self.config.backlog,
            Box::new(VecDeque::<u8>::with_capacity(self.config.rcv_buf_capacity)),
        );
        self.socks.insert(id, sock);
        log::trace!("[{}] allocated {} <-> {}, iss={}", id, local, remote, iss);
        id
    }

    /// Allocate a child for a connection request arriving at `parent`
    ///
    /// The child's local end is the segment's destination and its remote end
    /// the segment's source. The child is returned unlinked; the caller hashes
    /// and enqueues it.
    pub fn spawn_child(&mut self, parent: SockId, seg: &TcpSegment) -> Option<SockId> {
        if !self.socks.contains_key(&parent) {
            log::error!("[{}] spawn_child on unknown listening socket", parent);
            return None;
        }
        let child = self.allocate(seg.dst, seg.src);
        if let Some(sock) = self.socks.get_mut(&child) {
            sock.conn_mgmt.parent = Some(parent);
        }
        log::debug!("[{}] spawned {} for {}", parent, child, seg.src);
        Some(child)
    }

    /// Overwrite the state of `id`, returning the previous state
    ///
    /// No side effects: packets, timers and wakeups are the caller's job.
    pub fn transition(&mut self, id: SockId, new_state: TcpState) -> Option<TcpState> {
        let sock = self.socks.get_mut(&id)?;
        let old = sock.conn_mgmt.set_state(new_state);
        if old != new_state {
            log::debug!("[{}] {} -> {}", id, old, new_state);
        }
        Some(old)
    }

    /// Insert `id` into the 4-tuple table so later segments route to it
    ///
    /// Listening sockets land in the listener table instead.
    pub fn register_established(&mut self, id: SockId) -> Result<(), SockId> {
        let sock = self.socks.get(&id).ok_or(id)?;
        self.hash.hash(sock)
    }

    /// Release a socket: out of the lookup table, out of its parent's
    /// queues, out of the registry. Waiters are woken and see it gone.
    ///
    /// A listening socket takes its not yet accepted children with it.
    /// Destroying the same socket twice is a bug in the caller.
    pub fn destroy(&mut self, id: SockId) -> bool {
        let Some(sock) = self.socks.get(&id) else {
            log::error!("[{}] destroy of unknown socket", id);
            debug_assert!(false, "double destroy of {}", id);
            return false;
        };
        self.hash.unhash(sock);
        self.dequeue(id);

        let Some(mut sock) = self.socks.remove(&id) else {
            return false;
        };
        let orphans: Vec<SockId> = sock
            .conn_mgmt
            .listen_queue
            .drain(..)
            .chain(sock.conn_mgmt.accept_queue.drain(..))
            .collect();
        sock.conn_mgmt.set_state(TcpState::Closed);
        sock.events.shutdown();
        log::debug!("[{}] destroyed", id);

        for child in orphans {
            if let Some(c) = self.socks.get_mut(&child) {
                c.conn_mgmt.queued = None;
            }
            log::debug!("[{}] dropping unaccepted child {}", id, child);
            self.destroy(child);
        }
        true
    }

    pub fn lookup(&self, seg: &TcpSegment) -> Option<SockId> {
        self.hash.lookup(seg)
    }

    pub fn hash_table(&self) -> &TcpHashTable {
        &self.hash
    }

    pub fn get(&self, id: SockId) -> Option<&TcpSock> {
        self.socks.get(&id)
    }

    pub fn get_mut(&mut self, id: SockId) -> Option<&mut TcpSock> {
        self.socks.get_mut(&id)
    }

    pub fn contains(&self, id: SockId) -> bool {
        self.socks.contains_key(&id)
    }

    pub fn state(&self, id: SockId) -> Option<TcpState> {
        self.socks.get(&id).map(TcpSock::state)
    }

    pub fn len(&self) -> usize {
        self.socks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.socks.is_empty()
    }
}
