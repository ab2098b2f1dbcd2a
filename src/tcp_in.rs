//! TCP Packet Reception (RX Path)
//!
//! Handles incoming TCP segments and dispatches to appropriate handlers.
//! Each segment is first classified by the control path into a
//! [`Verdict`], which is then applied here: state writes, queue moves,
//! replies, timers and wakeups all happen in one place per verdict.

use crate::components::{seq_gt, update_send_window, update_send_window_if_ack_valid};
use crate::control_path::{ControlPath, Verdict};
use crate::state::{TcpSock, TcpState};
use crate::tcp_env::TcpEnv;
use crate::tcp_out::TcpTx;
use crate::tcp_proto::TcpFlags;
use crate::tcp_sock::SockTable;
use crate::tcp_types::{DropReason, InputAction, SockId, TcpSegment};
use crate::tcp_wait::WaitEvent;

/// Counters kept by the input path
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InputStats {
    pub segments: u64,
    pub out_of_window: u64,
    pub resets_sent: u64,
    pub spawned: u64,
    pub destroyed: u64,
    pub backlog_drops: u64,
    /// Drops caused by inconsistent local state rather than the peer
    pub invariant_drops: u64,
    pub no_socket: u64,
}

/// TCP RX Path
///
/// Borrows the socket table, the environment and the counters for the
/// duration of one segment.
pub struct TcpRx<'a, E: TcpEnv> {
    table: &'a mut SockTable,
    env: &'a mut E,
    stats: &'a mut InputStats,
}

impl<'a, E: TcpEnv> TcpRx<'a, E> {
    pub fn new(table: &'a mut SockTable, env: &'a mut E, stats: &'a mut InputStats) -> Self {
        Self { table, env, stats }
    }

    /// Route `seg` through the lookup table and process it
    ///
    /// A segment nobody owns is answered with a reset, unless it is a reset.
    pub fn input(&mut self, seg: &TcpSegment) -> InputAction {
        match self.table.lookup(seg) {
            Some(id) => self.process(id, seg),
            None => {
                self.stats.segments += 1;
                self.stats.no_socket += 1;
                if seg.flags.contains(TcpFlags::RST) {
                    log::trace!("no socket for {}, reset ignored", seg);
                    InputAction::Drop(DropReason::NoSocket)
                } else {
                    log::debug!("no socket for {}", seg);
                    self.reset(seg)
                }
            }
        }
    }

    /// Process one segment addressed to socket `id`
    pub fn process(&mut self, id: SockId, seg: &TcpSegment) -> InputAction {
        self.stats.segments += 1;
        let Some(sock) = self.table.get(id) else {
            self.stats.no_socket += 1;
            log::trace!("[{}] gone, dropping {}", id, seg);
            return InputAction::Drop(DropReason::NoSocket);
        };
        log::trace!("[{}] {} rx {}", id, sock.state(), seg);

        let verdict = self.decide(sock, seg);
        self.apply(id, seg, verdict)
    }

    fn decide(&self, sock: &TcpSock, seg: &TcpSegment) -> Verdict {
        match sock.state() {
            TcpState::Closed => ControlPath::closed(seg.flags),
            TcpState::Listen => ControlPath::listen(seg.flags, self.table.backlog_full(sock.id)),
            TcpState::SynSent => ControlPath::syn_sent(seg.flags),
            TcpState::SynRecv => {
                let has_parent = sock.parent().is_some_and(|p| self.table.contains(p));
                ControlPath::syn_recv(seg.flags, has_parent)
            }
            _ => ControlPath::decide_synchronized(sock, seg),
        }
    }

    fn apply(&mut self, id: SockId, seg: &TcpSegment, verdict: Verdict) -> InputAction {
        match verdict {
            Verdict::Drop(reason) => self.drop_segment(id, seg, reason),
            Verdict::Reset => self.reset(seg),

            Verdict::Spawn => self.state_listen(id, seg),
            Verdict::Connected => self.state_syn_sent(id, seg),
            Verdict::HandshakeDone => self.state_syn_recv(id, seg),

            Verdict::Close => {
                self.table.transition(id, TcpState::Closed);
                self.destroy(id)
            }
            Verdict::Abort => {
                log::debug!("[{}] connection reset by {}", id, seg.src);
                if let Some(sock) = self.table.get(id) {
                    sock.events.mark_reset();
                }
                self.destroy(id)
            }
            Verdict::Data => {
                let n = self.absorb(id, seg);
                if !seg.payload.is_empty() {
                    self.reply(id, TcpFlags::ACK);
                }
                InputAction::Delivered(n)
            }
            Verdict::PassiveClose => {
                self.absorb(id, seg);
                self.consume_fin(id, seg, TcpState::CloseWait)
            }
            Verdict::FinAcked => {
                self.absorb(id, seg);
                self.change_state(id, TcpState::FinWait2)
            }
            Verdict::SimultaneousClose => {
                self.absorb(id, seg);
                self.consume_fin(id, seg, TcpState::Closing)
            }
            Verdict::FinAckedWithFin | Verdict::TimeWait => {
                self.absorb(id, seg);
                let action = self.consume_fin(id, seg, TcpState::TimeWait);
                if matches!(action, InputAction::Transition { .. }) {
                    self.env.arm_time_wait(id);
                }
                action
            }
            Verdict::ClosingAcked => {
                if let Some(sock) = self.table.get_mut(id) {
                    sock.rod.on_ack(seg.ackno);
                }
                let action = self.change_state(id, TcpState::TimeWait);
                self.env.arm_time_wait(id);
                action
            }
            Verdict::Stay => {
                // The peer's half is still open
                let n = self.absorb(id, seg);
                self.table.transition(id, TcpState::FinWait2);
                if seg.payload.is_empty() {
                    InputAction::Accepted
                } else {
                    self.reply(id, TcpFlags::ACK);
                    InputAction::Delivered(n)
                }
            }
        }
    }

    /// LISTEN: spawn a child for a connection request and answer SYN+ACK
    fn state_listen(&mut self, parent: SockId, seg: &TcpSegment) -> InputAction {
        let Some(child) = self.table.spawn_child(parent, seg) else {
            return self.drop_segment(parent, seg, DropReason::NoParent);
        };
        if let Some(sock) = self.table.get_mut(child) {
            sock.rod.on_syn(seg.seqno);
            update_send_window(sock, seg);
        }
        self.table.transition(child, TcpState::SynRecv);

        if let Err(owner) = self.table.register_established(child) {
            log::warn!(
                "[{}] {} already owned by {}, dropping SYN",
                parent,
                seg.four_tuple(),
                owner
            );
            self.destroy(child);
            return InputAction::Drop(DropReason::Unmatched);
        }
        self.table.enqueue_pending(parent, child);
        self.reply(child, TcpFlags::SYN | TcpFlags::ACK);

        self.stats.spawned += 1;
        InputAction::Spawned(child)
    }

    /// SYN_SENT: the peer accepted our SYN
    fn state_syn_sent(&mut self, id: SockId, seg: &TcpSegment) -> InputAction {
        if let Some(sock) = self.table.get_mut(id) {
            sock.rod.on_syn(seg.seqno);
            sock.rod.on_ack(seg.ackno);
            update_send_window_if_ack_valid(sock, seg);
        }
        let action = self.change_state(id, TcpState::Established);
        self.reply(id, TcpFlags::ACK);
        self.notify(id, WaitEvent::Connect);
        action
    }

    /// SYN_RECV: the handshake completed, hand the child to `accept`
    fn state_syn_recv(&mut self, id: SockId, seg: &TcpSegment) -> InputAction {
        let Some(parent) = self.table.get(id).and_then(TcpSock::parent) else {
            return self.drop_segment(id, seg, DropReason::NoParent);
        };
        self.table.remove_pending(id);
        self.table.enqueue_ready(parent, id);

        let action = self.change_state(id, TcpState::Established);
        if let Some(sock) = self.table.get_mut(id) {
            sock.rod.on_ack(seg.ackno);
            update_send_window_if_ack_valid(sock, seg);
        }
        self.notify(parent, WaitEvent::Accept);
        action
    }

    /// Take the acknowledgment and payload of a synchronized-state segment
    fn absorb(&mut self, id: SockId, seg: &TcpSegment) -> usize {
        if seg.flags.contains(TcpFlags::ACK) {
            if let Some(sock) = self.table.get_mut(id) {
                update_send_window_if_ack_valid(sock, seg);
                sock.rod.on_ack(seg.ackno);
            }
        }
        if seg.payload.is_empty() && !seg.flags.is_plain_ack() {
            return 0;
        }
        self.deliver(id, seg)
    }

    /// Append the unseen part of the payload to the receive buffer
    ///
    /// Bytes before `rcv_nxt` are trimmed; a segment starting beyond
    /// `rcv_nxt` is not buffered. Readers are woken either way.
    pub fn deliver(&mut self, id: SockId, seg: &TcpSegment) -> usize {
        let Some(sock) = self.table.get_mut(id) else {
            return 0;
        };
        let mut delivered = 0;
        if !seg.payload.is_empty() {
            if seq_gt(seg.seqno, sock.rod.rcv_nxt) {
                log::debug!(
                    "[{}] out of order segment seq={} rcv_nxt={}, not buffered",
                    id,
                    seg.seqno,
                    sock.rod.rcv_nxt
                );
            } else {
                let offset = sock.rod.rcv_nxt.wrapping_sub(seg.seqno) as usize;
                if offset < seg.payload.len() {
                    let fresh = &seg.payload[offset..];
                    sock.rcv_buf.append(fresh);
                    sock.rod.rcv_nxt = sock.rod.rcv_nxt.wrapping_add(fresh.len() as u32);
                    delivered = fresh.len();
                }
            }
        }
        sock.events.notify(WaitEvent::Recv);
        delivered
    }

    /// Consume the peer's FIN and move to `next`
    ///
    /// The FIN is only taken when it sits right at `rcv_nxt`; otherwise the
    /// peer is told where we are and the segment goes no further.
    fn consume_fin(&mut self, id: SockId, seg: &TcpSegment, next: TcpState) -> InputAction {
        let in_order = match self.table.get_mut(id) {
            Some(sock) if sock.rod.rcv_nxt == seg.seq_end() => {
                sock.rod.rcv_nxt = sock.rod.rcv_nxt.wrapping_add(1);
                true
            }
            Some(_) => false,
            None => return InputAction::Drop(DropReason::NoSocket),
        };
        if !in_order {
            self.reply(id, TcpFlags::ACK);
            return self.drop_segment(id, seg, DropReason::OutOfOrder);
        }
        let action = self.change_state(id, next);
        self.reply(id, TcpFlags::ACK);
        // Readers blocked on an empty buffer learn about end of stream
        self.notify(id, WaitEvent::Recv);
        action
    }

    fn change_state(&mut self, id: SockId, to: TcpState) -> InputAction {
        match self.table.transition(id, to) {
            Some(from) => InputAction::Transition { from, to },
            None => InputAction::Drop(DropReason::NoSocket),
        }
    }

    fn destroy(&mut self, id: SockId) -> InputAction {
        if self.table.destroy(id) {
            self.stats.destroyed += 1;
        }
        InputAction::Destroyed
    }

    fn reply(&mut self, id: SockId, flags: TcpFlags) -> bool {
        match self.table.get_mut(id) {
            Some(sock) => TcpTx::send_control(&mut *self.env, sock, flags),
            None => false,
        }
    }

    fn reset(&mut self, seg: &TcpSegment) -> InputAction {
        if TcpTx::send_reset(&mut *self.env, seg) {
            self.stats.resets_sent += 1;
        }
        InputAction::Reset
    }

    fn notify(&self, id: SockId, event: WaitEvent) {
        if let Some(sock) = self.table.get(id) {
            sock.events.notify(event);
        }
    }

    fn drop_segment(&mut self, id: SockId, seg: &TcpSegment, reason: DropReason) -> InputAction {
        match reason {
            // Logged by the window check itself
            DropReason::OutOfWindow => self.stats.out_of_window += 1,
            DropReason::BacklogFull => {
                self.stats.backlog_drops += 1;
                log::warn!("[{}] backlog full, dropping SYN from {}", id, seg.src);
            }
            DropReason::NoParent => {
                self.stats.invariant_drops += 1;
                log::error!("[{}] SYN_RECV socket has no listening parent", id);
            }
            DropReason::Unmatched => {
                log::warn!("[{}] unexpected [{}], dropping", id, seg.flags);
            }
            DropReason::ResetIgnored | DropReason::OutOfOrder | DropReason::NoSocket => {
                log::trace!("[{}] dropping {}: {:?}", id, seg, reason);
            }
        }
        InputAction::Drop(reason)
    }
}
