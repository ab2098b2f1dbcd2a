//! TCP Packet Transmission (TX Path)
//!
//! Builds the control replies the input path sends: SYN+ACK, ACK, FIN and
//! resets. Byte layout and routing are left to the [`TcpEnv`].

use crate::state::TcpSock;
use crate::tcp_env::TcpEnv;
use crate::tcp_proto::TcpFlags;
use crate::tcp_types::{ControlSegment, TcpSegment};

/// TCP TX Path
pub struct TcpTx;

impl TcpTx {
    /// Control segment carrying the socket's current sequence state
    pub fn control_segment(sock: &TcpSock, flags: TcpFlags) -> ControlSegment {
        ControlSegment {
            src: sock.conn_mgmt.local,
            dst: sock.conn_mgmt.remote,
            seqno: sock.rod.snd_nxt,
            ackno: if flags.contains(TcpFlags::ACK) {
                sock.rod.rcv_nxt
            } else {
                0
            },
            flags,
            wnd: sock.flow_ctrl.rcv_wnd,
        }
    }

    /// Reset answering `seg`, derived from the segment alone (RFC 793)
    ///
    /// If the offending segment carries an ACK the reset takes its sequence
    /// number from that ACK; otherwise it is RST|ACK acknowledging everything
    /// the segment occupied.
    pub fn reset_segment(seg: &TcpSegment) -> ControlSegment {
        if seg.flags.contains(TcpFlags::ACK) {
            ControlSegment {
                src: seg.dst,
                dst: seg.src,
                seqno: seg.ackno,
                ackno: 0,
                flags: TcpFlags::RST,
                wnd: 0,
            }
        } else {
            ControlSegment {
                src: seg.dst,
                dst: seg.src,
                seqno: 0,
                ackno: seg.seq_end().wrapping_add(seg.flags.seq_len()),
                flags: TcpFlags::RST | TcpFlags::ACK,
                wnd: 0,
            }
        }
    }

    /// Send a control segment from `sock`
    ///
    /// SYN and FIN occupy one sequence number each, so SND.NXT moves past them.
    pub fn send_control<E: TcpEnv>(env: &mut E, sock: &mut TcpSock, flags: TcpFlags) -> bool {
        let seg = Self::control_segment(sock, flags);
        sock.rod.snd_nxt = sock.rod.snd_nxt.wrapping_add(flags.seq_len());

        log::trace!(
            "[{}] send {} seq={} ack={} wnd={}",
            sock.id,
            seg.flags,
            seg.seqno,
            seg.ackno,
            seg.wnd
        );
        Self::emit(env, &seg)
    }

    /// Reply to `seg` with a reset
    pub fn send_reset<E: TcpEnv>(env: &mut E, seg: &TcpSegment) -> bool {
        let rst = Self::reset_segment(seg);
        log::debug!("reset {} -> {} in reply to [{}]", rst.src, rst.dst, seg.flags);
        Self::emit(env, &rst)
    }

    fn emit<E: TcpEnv>(env: &mut E, seg: &ControlSegment) -> bool {
        match env.transmit(seg) {
            Ok(()) => true,
            Err(e) => {
                log::warn!(
                    "Failed to send [{}] {} -> {}. Err: {:?}",
                    seg.flags,
                    seg.src,
                    seg.dst,
                    e
                );
                false
            }
        }
    }
}
