//! TCP Control Path
//!
//! Decision tables of the input state machine. Every function here is pure:
//! it looks at the socket's state, the segment's flags and a few facts the
//! caller gathered, and names the step to take as a [`Verdict`]. Applying a
//! verdict (state writes, replies, wakeups) is the RX path's job.

use crate::components::flow_control;
use crate::state::{TcpSock, TcpState};
use crate::tcp_proto::TcpFlags;
use crate::tcp_types::{DropReason, TcpSegment};

/// Step chosen for one incoming segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Drop without reply
    Drop(DropReason),
    /// Reply RST, leave the socket alone
    Reset,

    // Handshake
    /// LISTEN: spawn a child in SYN_RECV and answer SYN+ACK
    Spawn,
    /// SYN_SENT -> ESTABLISHED, ACK the peer's SYN
    Connected,
    /// SYN_RECV -> ESTABLISHED, move to the parent's accept queue
    HandshakeDone,

    // Synchronized states
    /// RST received: destroy
    Abort,
    /// LAST_ACK -> CLOSED on ACK: destroy
    Close,
    /// ESTABLISHED ACK, optionally with pushed payload
    Data,
    /// ESTABLISHED -> CLOSE_WAIT on FIN
    PassiveClose,
    /// FIN_WAIT_1 -> FIN_WAIT_2, our FIN acknowledged
    FinAcked,
    /// FIN_WAIT_1 -> CLOSING, FINs crossed
    SimultaneousClose,
    /// FIN_WAIT_1 -> TIME_WAIT, peer's FIN acknowledges ours
    FinAckedWithFin,
    /// CLOSING -> TIME_WAIT, our FIN acknowledged
    ClosingAcked,
    /// FIN_WAIT_2 -> TIME_WAIT on FIN
    TimeWait,
    /// FIN_WAIT_2 ACK: state re-affirmed
    Stay,
}

/// Control Path: Handles handshake and teardown decisions
pub struct ControlPath;

impl ControlPath {
    /// CLOSED: every segment is answered with a reset
    pub fn closed(_flags: TcpFlags) -> Verdict {
        Verdict::Reset
    }

    /// LISTEN
    ///
    /// Only a bare SYN opens a connection. Any other segment is reset,
    /// unless it is itself a reset.
    pub fn listen(flags: TcpFlags, backlog_full: bool) -> Verdict {
        if flags.is_pure_syn() {
            if backlog_full {
                Verdict::Drop(DropReason::BacklogFull)
            } else {
                Verdict::Spawn
            }
        } else if flags.contains(TcpFlags::RST) {
            Verdict::Drop(DropReason::ResetIgnored)
        } else {
            Verdict::Reset
        }
    }

    /// SYN_SENT
    ///
    /// A reset is never answered; a SYN+ACK completes the active open.
    pub fn syn_sent(flags: TcpFlags) -> Verdict {
        if flags.contains(TcpFlags::RST) {
            Verdict::Drop(DropReason::ResetIgnored)
        } else if flags.contains(TcpFlags::SYN | TcpFlags::ACK) {
            Verdict::Connected
        } else {
            Verdict::Reset
        }
    }

    /// SYN_RECV
    pub fn syn_recv(flags: TcpFlags, has_parent: bool) -> Verdict {
        if !has_parent {
            Verdict::Drop(DropReason::NoParent)
        } else if flags.contains(TcpFlags::RST) {
            Verdict::Drop(DropReason::ResetIgnored)
        } else if flags.contains(TcpFlags::ACK) {
            Verdict::HandshakeDone
        } else {
            Verdict::Reset
        }
    }

    /// Established and closing states
    ///
    /// Checks run in a fixed order: window, LAST_ACK completion, RST, SYN,
    /// then per-state ACK/FIN handling. Anything left over is dropped.
    pub fn synchronized(
        state: TcpState,
        flags: TcpFlags,
        in_window: bool,
        acks_fin: bool,
    ) -> Verdict {
        if !in_window {
            return Verdict::Drop(DropReason::OutOfWindow);
        }
        if state == TcpState::LastAck && flags.contains(TcpFlags::ACK) {
            return Verdict::Close;
        }
        if flags.contains(TcpFlags::RST) {
            return Verdict::Abort;
        }
        if flags.contains(TcpFlags::SYN) {
            return Verdict::Reset;
        }

        let ack = flags.contains(TcpFlags::ACK);
        let fin = flags.contains(TcpFlags::FIN);
        match state {
            TcpState::Established if flags.is_plain_ack() => Verdict::Data,
            TcpState::Established if fin => Verdict::PassiveClose,
            TcpState::FinWait1 if fin && acks_fin => Verdict::FinAckedWithFin,
            TcpState::FinWait1 if fin => Verdict::SimultaneousClose,
            TcpState::FinWait1 if acks_fin => Verdict::FinAcked,
            TcpState::FinWait2 if fin => Verdict::TimeWait,
            TcpState::FinWait2 if ack => Verdict::Stay,
            TcpState::Closing if acks_fin => Verdict::ClosingAcked,
            _ => Verdict::Drop(DropReason::Unmatched),
        }
    }

    /// Gather the facts the synchronized table needs from `sock` and decide
    pub fn decide_synchronized(sock: &TcpSock, seg: &TcpSegment) -> Verdict {
        let in_window = flow_control::is_segment_in_window(sock, seg);
        let acks_fin = seg.flags.contains(TcpFlags::ACK) && sock.rod.acks_all(seg.ackno);
        Self::synchronized(sock.state(), seg.flags, in_window, acks_fin)
    }
}
