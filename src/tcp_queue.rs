//! Listen and Accept Queues
//!
//! A listening socket tracks its children in two disjoint sets: the listen
//! queue (handshake in progress) and the accept queue (handshake done,
//! waiting for `accept`). A child records which one it is in, so membership
//! is never ambiguous.

use crate::state::QueueKind;
use crate::tcp_sock::SockTable;
use crate::tcp_types::SockId;

impl SockTable {
    /// True when another connection request must be refused
    pub fn backlog_full(&self, parent: SockId) -> bool {
        match self.socks.get(&parent) {
            Some(sock) => sock.conn_mgmt.queue_depth() >= sock.conn_mgmt.backlog,
            None => true,
        }
    }

    /// Add `child` to the listen queue of `parent`
    pub fn enqueue_pending(&mut self, parent: SockId, child: SockId) -> bool {
        self.enqueue(parent, child, QueueKind::Pending)
    }

    /// Add `child` to the accept queue of `parent`
    ///
    /// The child must already be out of the listen queue.
    pub fn enqueue_ready(&mut self, parent: SockId, child: SockId) -> bool {
        self.enqueue(parent, child, QueueKind::Ready)
    }

    /// Take `child` out of its parent's listen queue
    pub fn remove_pending(&mut self, child: SockId) -> bool {
        match self.socks.get(&child).and_then(|s| s.conn_mgmt.queued) {
            Some(QueueKind::Pending) => self.dequeue(child),
            _ => false,
        }
    }

    /// Pop the oldest established child waiting for `accept`
    pub fn pop_ready(&mut self, parent: SockId) -> Option<SockId> {
        let child = self.socks.get_mut(&parent)?.conn_mgmt.accept_queue.pop_front()?;
        if let Some(sock) = self.socks.get_mut(&child) {
            sock.conn_mgmt.queued = None;
        }
        Some(child)
    }

    pub fn is_pending(&self, parent: SockId, child: SockId) -> bool {
        self.socks
            .get(&parent)
            .is_some_and(|p| p.conn_mgmt.listen_queue.contains(&child))
    }

    pub fn is_ready(&self, parent: SockId, child: SockId) -> bool {
        self.socks
            .get(&parent)
            .is_some_and(|p| p.conn_mgmt.accept_queue.contains(&child))
    }

    pub fn queue_depth(&self, parent: SockId) -> usize {
        self.socks
            .get(&parent)
            .map_or(0, |p| p.conn_mgmt.queue_depth())
    }

    fn enqueue(&mut self, parent: SockId, child: SockId, kind: QueueKind) -> bool {
        match self.socks.get(&child).map(|s| s.conn_mgmt.queued) {
            None => {
                log::error!("[{}] cannot enqueue unknown child {}", parent, child);
                return false;
            }
            Some(Some(current)) => {
                log::error!("[{}] {} already queued as {:?}", parent, child, current);
                debug_assert!(false, "{} queued twice", child);
                return false;
            }
            Some(None) => {}
        }
        let Some(p) = self.socks.get_mut(&parent) else {
            log::error!("[{}] cannot enqueue {} on unknown parent", parent, child);
            return false;
        };
        match kind {
            QueueKind::Pending => p.conn_mgmt.listen_queue.push_back(child),
            QueueKind::Ready => p.conn_mgmt.accept_queue.push_back(child),
        }
        if let Some(c) = self.socks.get_mut(&child) {
            c.conn_mgmt.queued = Some(kind);
        }
        true
    }

    /// Remove `child` from whichever queue of its parent holds it
    pub(crate) fn dequeue(&mut self, child: SockId) -> bool {
        let Some(sock) = self.socks.get_mut(&child) else {
            return false;
        };
        let (Some(kind), Some(parent)) = (sock.conn_mgmt.queued.take(), sock.conn_mgmt.parent)
        else {
            return false;
        };
        let Some(p) = self.socks.get_mut(&parent) else {
            return false;
        };
        let queue = match kind {
            QueueKind::Pending => &mut p.conn_mgmt.listen_queue,
            QueueKind::Ready => &mut p.conn_mgmt.accept_queue,
        };
        let before = queue.len();
        queue.retain(|&id| id != child);
        queue.len() != before
    }
}
