//! Flow Control Component
//!
//! Manages receive and send windows: the receive-window acceptance test and
//! the send-window updates that release blocked writers.

use crate::components::rod::{seq_leq, seq_lt};
use crate::state::TcpSock;
use crate::tcp_types::TcpSegment;
use crate::tcp_wait::WaitEvent;

/// Flow Control State
#[derive(Debug, Clone, Default)]
pub struct FlowControlState {
    pub snd_wnd: u16,          // Window the remote peer advertised
    pub rcv_wnd: u16,          // Our available receive buffer space
}

impl FlowControlState {
    pub fn new(rcv_wnd: u16) -> Self {
        Self { snd_wnd: 0, rcv_wnd }
    }

    /// Acceptance test against `[rcv_nxt, rcv_nxt + max(rcv_wnd, 1))`
    ///
    /// The one-byte floor keeps a zero window from collapsing into an empty
    /// range, so a bare ACK at `rcv_nxt` is still accepted.
    pub fn accepts(&self, rcv_nxt: u32, seg: &TcpSegment) -> bool {
        let rcv_end = rcv_nxt.wrapping_add(u32::from(self.rcv_wnd.max(1)));
        seq_lt(seg.seqno, rcv_end) && seq_leq(rcv_nxt, seg.seq_end())
    }
}

/// Check whether the sequence number of the incoming segment is in the
/// receiving window.
pub fn is_segment_in_window(sock: &TcpSock, seg: &TcpSegment) -> bool {
    let valid = sock.flow_ctrl.accepts(sock.rod.rcv_nxt, seg);
    if !valid {
        log::warn!(
            "[{}] received segment with invalid seq, drop it. SEG.SEQ={} SEG.END={} RCV.NXT={} RCV.WND={}",
            sock.id,
            seg.seqno,
            seg.seq_end(),
            sock.rod.rcv_nxt,
            sock.flow_ctrl.rcv_wnd
        );
    }
    valid
}

/// Overwrite SND.WND with the segment's advertised window.
///
/// A zero to non-zero change releases writers blocked on send-window-available;
/// a zero window clears the latched open state so later writers block.
pub fn update_send_window(sock: &mut TcpSock, seg: &TcpSegment) {
    let old_snd_wnd = sock.flow_ctrl.snd_wnd;
    sock.flow_ctrl.snd_wnd = seg.wnd;

    if seg.wnd == 0 {
        sock.events.close_send_window();
    } else if old_snd_wnd == 0 {
        log::trace!("[{}] send window opened: {}", sock.id, seg.wnd);
        sock.events.notify(WaitEvent::Send);
    }
}

/// Update SND.WND only when `snd_una <= SEG.ACK <= snd_nxt`
///
/// Returns true if the window was taken from this segment.
pub fn update_send_window_if_ack_valid(sock: &mut TcpSock, seg: &TcpSegment) -> bool {
    if sock.rod.ack_in_range(seg.ackno) {
        update_send_window(sock, seg);
        true
    } else {
        log::trace!(
            "[{}] window update ignored, SEG.ACK={} outside [{}, {}]",
            sock.id,
            seg.ackno,
            sock.rod.snd_una,
            sock.rod.snd_nxt
        );
        false
    }
}
