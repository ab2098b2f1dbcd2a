//! TCP Control Path Tests
//!
//! Post-handshake processing: sequence validation, resets, payload
//! delivery, window updates and the receive side of connection teardown.


use tcp_in_rust::components::{is_segment_in_window, update_send_window_if_ack_valid};
use tcp_in_rust::state::TcpState;
use tcp_in_rust::{DropReason, InputAction, TcpConfig, TcpFlags, WaitEvent};
use test_helpers::*;

fn read_all(h: &mut Harness, id: tcp_in_rust::SockId) -> Vec<u8> {
    let sock = h.sock_mut(id);
    let mut out = vec![0u8; sock.rcv_buf.len()];
    sock.rcv_buf.read(&mut out);
    out
}

// ============================================================================
// Test 1: Sequence window
// ============================================================================

#[test]
fn test_window_boundaries() {
    let config = TcpConfig {
        rcv_wnd: 1000,
        ..TcpConfig::default()
    };
    let mut h = Harness::with_config(config);
    let (_, child) = h.established();
    let sock = h.sock(child);

    assert!(is_segment_in_window(sock, &rx_segment(sock, TcpFlags::ACK, 0, 0)));
    assert!(is_segment_in_window(sock, &rx_segment(sock, TcpFlags::ACK, 999, 0)));
    assert!(!is_segment_in_window(sock, &rx_segment(sock, TcpFlags::ACK, 1000, 0)));
    assert!(!is_segment_in_window(sock, &rx_segment(sock, TcpFlags::ACK, -1, 0)));
}

#[test]
fn test_out_of_window_segment_is_dropped_and_counted() {
    let config = TcpConfig {
        rcv_wnd: 1000,
        ..TcpConfig::default()
    };
    let mut h = Harness::with_config(config);
    let (_, child) = h.established();
    let seg = rx_segment(h.sock(child), TcpFlags::RST, 1000, 0);

    assert_eq!(
        h.process(child, &seg),
        InputAction::Drop(DropReason::OutOfWindow)
    );
    // Even a reset is ignored when it is outside the window
    assert_eq!(h.state(child), Some(TcpState::Established));
    assert_eq!(h.stats.out_of_window, 1);
    assert!(h.env.tx_segments.is_empty());
}

#[test]
fn test_zero_window_still_accepts_bare_ack() {
    let config = TcpConfig {
        rcv_wnd: 0,
        ..TcpConfig::default()
    };
    let mut h = Harness::with_config(config);
    let (_, child) = h.established();
    let sock = h.sock(child);

    assert!(is_segment_in_window(sock, &rx_segment(sock, TcpFlags::ACK, 0, 0)));
    assert!(!is_segment_in_window(sock, &rx_segment(sock, TcpFlags::ACK, 1, 0)));
}

// ============================================================================
// Test 2: Send window
// ============================================================================

#[test]
fn test_window_update_guard() {
    let mut h = Harness::new();
    let (_, child) = h.established();
    let sock = h.sock_mut(child);
    sock.rod.snd_una = 100;
    sock.rod.snd_nxt = 200;
    sock.flow_ctrl.snd_wnd = 10;

    let mut seg = rx_segment(sock, TcpFlags::ACK, 0, 0);
    seg.ackno = 250;
    seg.wnd = 4000;
    assert!(!update_send_window_if_ack_valid(sock, &seg));
    assert_eq!(sock.flow_ctrl.snd_wnd, 10);

    seg.ackno = 150;
    assert!(update_send_window_if_ack_valid(sock, &seg));
    assert_eq!(sock.flow_ctrl.snd_wnd, 4000);
}

#[test]
fn test_window_opening_releases_writers() {
    let mut h = Harness::new();
    let (_, child) = h.established();
    let events = h.sock(child).events.clone();
    assert!(events.send_open());

    let mut closed = rx_segment(h.sock(child), TcpFlags::ACK, 0, 0);
    closed.wnd = 0;
    h.process(child, &closed);
    assert_eq!(h.sock(child).flow_ctrl.snd_wnd, 0);
    assert!(!events.send_open());

    let send_gen = events.generation(WaitEvent::Send);
    let open = rx_segment(h.sock(child), TcpFlags::ACK, 0, 0);
    h.process(child, &open);
    assert!(events.send_open());
    assert_eq!(events.generation(WaitEvent::Send), send_gen + 1);

    // A non-zero to non-zero change is not an opening
    h.process(child, &open);
    assert_eq!(events.generation(WaitEvent::Send), send_gen + 1);
}

// ============================================================================
// Test 3: Data in ESTABLISHED
// ============================================================================

#[test]
fn test_payload_delivery() {
    let mut h = Harness::new();
    let (_, child) = h.established();
    let recv_gen = h.sock(child).events.generation(WaitEvent::Recv);
    let snd_nxt = h.sock(child).rod.snd_nxt;

    let action = h.process(child, &data(PEER_ISS + 1, snd_nxt, b"hello"));
    assert_eq!(action, InputAction::Delivered(5));
    assert_eq!(h.sock(child).rod.rcv_nxt, PEER_ISS + 6);
    assert_eq!(h.sock(child).events.generation(WaitEvent::Recv), recv_gen + 1);

    let reply = h.env.last().unwrap();
    assert_eq!(reply.flags, TcpFlags::ACK);
    assert_eq!(reply.ackno, PEER_ISS + 6);

    h.process(child, &data(PEER_ISS + 6, snd_nxt, b" world"));
    assert_eq!(read_all(&mut h, child), b"hello world");
}

#[test]
fn test_bare_ack_notifies_readers() {
    let mut h = Harness::new();
    let (_, child) = h.established();
    let recv_gen = h.sock(child).events.generation(WaitEvent::Recv);

    let seg = rx_segment(h.sock(child), TcpFlags::ACK, 0, 0);
    assert_eq!(h.process(child, &seg), InputAction::Delivered(0));
    assert_eq!(h.sock(child).events.generation(WaitEvent::Recv), recv_gen + 1);
    assert!(h.env.tx_segments.is_empty());
}

#[test]
fn test_retransmitted_data_is_acked_not_buffered() {
    let mut h = Harness::new();
    let (_, child) = h.established();
    h.process(child, &data(PEER_ISS + 1, 0, b"abc"));
    h.env.clear();

    assert_eq!(
        h.process(child, &data(PEER_ISS + 1, 0, b"abc")),
        InputAction::Delivered(0)
    );
    assert_eq!(h.env.last().unwrap().ackno, PEER_ISS + 4);
    assert_eq!(read_all(&mut h, child), b"abc");
}

#[test]
fn test_syn_in_established_is_reset() {
    let mut h = Harness::new();
    let (_, child) = h.established();
    let seg = rx_segment(h.sock(child), TcpFlags::SYN, 0, 0);

    assert_eq!(h.process(child, &seg), InputAction::Reset);
    assert_eq!(h.state(child), Some(TcpState::Established));
    assert_eq!(h.env.count(TcpFlags::RST | TcpFlags::ACK), 1);
}

// ============================================================================
// Test 4: Resets
// ============================================================================

#[test]
fn test_rst_in_established_destroys() {
    let mut h = Harness::new();
    let (listener, child) = h.established();
    let events = h.sock(child).events.clone();
    let seg = rx_segment(h.sock(child), TcpFlags::RST, 0, 0);

    assert_eq!(h.process(child, &seg), InputAction::Destroyed);
    assert!(!h.table.contains(child));
    assert!(!h.table.is_ready(listener, child));
    assert!(events.is_reset());
    assert!(events.is_closed());
    assert_eq!(h.stats.destroyed, 1);

    // Nothing reaches the socket any more
    assert_eq!(
        h.process(child, &ack(PEER_ISS + 1, 0)),
        InputAction::Drop(DropReason::NoSocket)
    );
    assert_ne!(h.table.lookup(&ack(PEER_ISS + 1, 0)), Some(child));
}

#[test]
fn test_rst_with_other_flags_is_a_reset() {
    let mut h = Harness::new();
    let (_, child) = h.established();
    let seg = rx_segment(
        h.sock(child),
        TcpFlags::RST | TcpFlags::SYN | TcpFlags::FIN | TcpFlags::ACK,
        0,
        0,
    );

    assert_eq!(h.process(child, &seg), InputAction::Destroyed);
    assert!(h.env.tx_segments.is_empty());
}

// ============================================================================
// Test 5: Passive close
// ============================================================================

#[test]
fn test_fin_in_established_passive_close() {
    let mut h = Harness::new();
    let (_, child) = h.established();
    let x = h.sock(child).rod.rcv_nxt;
    let seg = rx_segment(h.sock(child), TcpFlags::FIN | TcpFlags::ACK, 0, 0);

    assert_eq!(
        h.process(child, &seg),
        InputAction::Transition {
            from: TcpState::Established,
            to: TcpState::CloseWait
        }
    );
    let reply = h.env.last().unwrap();
    assert_eq!(reply.flags, TcpFlags::ACK);
    assert_eq!(reply.ackno, x + 1);
}

#[test]
fn test_last_ack_completes_close() {
    let mut h = Harness::new();
    let (_, child) = h.established();
    let seg = rx_segment(h.sock(child), TcpFlags::FIN | TcpFlags::ACK, 0, 0);
    h.process(child, &seg);

    // Application closes its side
    let sock = h.table.get_mut(child).unwrap();
    tcp_in_rust::tcp_out::TcpTx::send_control(&mut h.env, sock, TcpFlags::FIN | TcpFlags::ACK);
    h.table.transition(child, TcpState::LastAck);

    let seg = rx_segment(h.sock(child), TcpFlags::ACK, 0, 0);
    assert_eq!(h.process(child, &seg), InputAction::Destroyed);
    assert!(!h.table.contains(child));
    assert!(h.env.time_wait.is_empty());
}

#[test]
fn test_close_wait_ignores_ack() {
    let mut h = Harness::new();
    let (_, child) = h.established();
    let seg = rx_segment(h.sock(child), TcpFlags::FIN | TcpFlags::ACK, 0, 0);
    h.process(child, &seg);
    h.env.clear();

    let seg = rx_segment(h.sock(child), TcpFlags::ACK, 0, 0);
    assert_eq!(
        h.process(child, &seg),
        InputAction::Drop(DropReason::Unmatched)
    );
    assert_eq!(h.state(child), Some(TcpState::CloseWait));
}

// ============================================================================
// Test 6: Active close
// ============================================================================

#[test]
fn test_fin_wait_1_ack_of_fin() {
    let mut h = Harness::new();
    let (_, child) = h.established();
    h.send_fin(child);

    let seg = rx_segment(h.sock(child), TcpFlags::ACK, 0, 0);
    assert_eq!(
        h.process(child, &seg),
        InputAction::Transition {
            from: TcpState::FinWait1,
            to: TcpState::FinWait2
        }
    );
    assert_eq!(h.sock(child).rod.snd_una, h.sock(child).rod.snd_nxt);
}

#[test]
fn test_fin_wait_1_stale_ack_is_dropped() {
    let mut h = Harness::new();
    let (_, child) = h.established();
    h.send_fin(child);

    let seg = rx_segment(h.sock(child), TcpFlags::ACK, 0, -1);
    assert_eq!(
        h.process(child, &seg),
        InputAction::Drop(DropReason::Unmatched)
    );
    assert_eq!(h.state(child), Some(TcpState::FinWait1));
}

#[test]
fn test_fin_wait_2_ack_stays() {
    let mut h = Harness::new();
    let (_, child) = h.established();
    h.send_fin(child);
    let seg = rx_segment(h.sock(child), TcpFlags::ACK, 0, 0);
    h.process(child, &seg);

    assert_eq!(h.process(child, &seg), InputAction::Accepted);
    assert_eq!(h.state(child), Some(TcpState::FinWait2));
}

#[test]
fn test_fin_wait_2_fin_enters_time_wait() {
    let mut h = Harness::new();
    let (_, child) = h.established();
    h.send_fin(child);
    let seg = rx_segment(h.sock(child), TcpFlags::ACK, 0, 0);
    h.process(child, &seg);
    h.env.clear();

    let y = h.sock(child).rod.rcv_nxt;
    let seg = rx_segment(h.sock(child), TcpFlags::FIN | TcpFlags::ACK, 0, 0);
    assert_eq!(
        h.process(child, &seg),
        InputAction::Transition {
            from: TcpState::FinWait2,
            to: TcpState::TimeWait
        }
    );
    let reply = h.env.last().unwrap();
    assert_eq!(reply.flags, TcpFlags::ACK);
    assert_eq!(reply.ackno, y + 1);
    assert_eq!(h.env.time_wait, vec![child]);

    // A retransmitted FIN does not re-arm the timer
    h.process(child, &seg);
    assert_eq!(h.env.time_wait.len(), 1);
}

#[test]
fn test_fin_wait_2_data_then_fin_enters_time_wait() {
    let mut h = Harness::new();
    let (_, child) = h.established();
    h.send_fin(child);
    let seg = rx_segment(h.sock(child), TcpFlags::ACK, 0, 0);
    h.process(child, &seg);
    assert_eq!(h.state(child), Some(TcpState::FinWait2));
    h.env.clear();

    // The peer keeps sending on its half of the connection
    let y = h.sock(child).rod.rcv_nxt;
    let tail =
        rx_segment(h.sock(child), TcpFlags::ACK | TcpFlags::PSH, 0, 0).with_payload(b"tail");
    assert_eq!(h.process(child, &tail), InputAction::Delivered(4));
    assert_eq!(h.state(child), Some(TcpState::FinWait2));
    assert_eq!(h.sock(child).rod.rcv_nxt, y + 4);
    assert_eq!(h.env.last().unwrap().ackno, y + 4);

    let seg = rx_segment(h.sock(child), TcpFlags::FIN | TcpFlags::ACK, 0, 0);
    assert_eq!(seg.seqno, y + 4);
    assert_eq!(
        h.process(child, &seg),
        InputAction::Transition {
            from: TcpState::FinWait2,
            to: TcpState::TimeWait
        }
    );
    assert_eq!(h.env.last().unwrap().ackno, y + 5);
    assert_eq!(h.env.time_wait, vec![child]);
    assert_eq!(read_all(&mut h, child), b"tail");
}

#[test]
fn test_fin_wait_2_retransmitted_data_is_trimmed() {
    let mut h = Harness::new();
    let (_, child) = h.established();
    h.send_fin(child);
    let seg = rx_segment(h.sock(child), TcpFlags::ACK, 0, 0);
    h.process(child, &seg);

    let tail =
        rx_segment(h.sock(child), TcpFlags::ACK | TcpFlags::PSH, 0, 0).with_payload(b"tail");
    h.process(child, &tail);
    assert_eq!(h.process(child, &tail), InputAction::Delivered(0));
    assert_eq!(h.state(child), Some(TcpState::FinWait2));
    assert_eq!(read_all(&mut h, child), b"tail");
}

#[test]
fn test_simultaneous_close() {
    let mut h = Harness::new();
    let (_, child) = h.established();
    h.send_fin(child);

    // Peer's FIN crosses ours: it does not acknowledge our FIN yet
    let seg = rx_segment(h.sock(child), TcpFlags::FIN | TcpFlags::ACK, 0, -1);
    assert_eq!(
        h.process(child, &seg),
        InputAction::Transition {
            from: TcpState::FinWait1,
            to: TcpState::Closing
        }
    );
    assert!(h.env.time_wait.is_empty());

    let seg = rx_segment(h.sock(child), TcpFlags::ACK, 0, 0);
    assert_eq!(
        h.process(child, &seg),
        InputAction::Transition {
            from: TcpState::Closing,
            to: TcpState::TimeWait
        }
    );
    assert_eq!(h.env.time_wait, vec![child]);
}

#[test]
fn test_fin_acking_our_fin_goes_to_time_wait() {
    let mut h = Harness::new();
    let (_, child) = h.established();
    h.send_fin(child);

    let seg = rx_segment(h.sock(child), TcpFlags::FIN | TcpFlags::ACK, 0, 0);
    assert_eq!(
        h.process(child, &seg),
        InputAction::Transition {
            from: TcpState::FinWait1,
            to: TcpState::TimeWait
        }
    );
    assert_eq!(h.env.time_wait, vec![child]);
}

#[test]
fn test_data_in_fin_wait_is_delivered_before_fin() {
    let mut h = Harness::new();
    let (_, child) = h.established();
    h.send_fin(child);
    let seg = rx_segment(h.sock(child), TcpFlags::ACK, 0, 0);
    h.process(child, &seg);

    let seg = rx_segment(h.sock(child), TcpFlags::FIN | TcpFlags::ACK, 0, 0).with_payload(b"tail");
    h.process(child, &seg);
    assert_eq!(h.state(child), Some(TcpState::TimeWait));
    assert_eq!(read_all(&mut h, child), b"tail");
}

// ============================================================================
// Test 7: Listener teardown and transmit failures
// ============================================================================

#[test]
fn test_destroying_listener_drops_unaccepted_children() {
    let mut h = Harness::new();
    let listener = h.listener(4);
    let ready = h.accept_from(listener, remote_port(4000));
    h.input(&segment_from(remote_port(4001), TcpFlags::SYN, PEER_ISS, 0));
    assert_eq!(h.table.len(), 3);

    h.table.destroy(listener);
    assert!(h.table.is_empty());
    assert!(h.table.hash_table().is_empty());
    assert!(!h.table.contains(ready));
}

#[test]
fn test_transmit_failure_does_not_block_state_change() {
    let mut h = Harness::new();
    let (_, child) = h.established();
    h.env.fail_tx = true;

    let seg = rx_segment(h.sock(child), TcpFlags::FIN | TcpFlags::ACK, 0, 0);
    assert!(matches!(h.process(child, &seg), InputAction::Transition { .. }));
    assert_eq!(h.state(child), Some(TcpState::CloseWait));
    assert!(h.env.tx_segments.is_empty());
}
