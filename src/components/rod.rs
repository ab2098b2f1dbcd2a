//! Reliable Ordered Delivery Component
//!
//! Sequence counters of a socket and the wrapping comparisons over the
//! 32-bit sequence space.

/// `a < b` in sequence space
#[inline]
pub fn seq_lt(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

/// `a <= b` in sequence space
#[inline]
pub fn seq_leq(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) <= 0
}

/// `a > b` in sequence space
#[inline]
pub fn seq_gt(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) > 0
}

/// `a >= b` in sequence space
#[inline]
pub fn seq_geq(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) >= 0
}

/// Reliable Ordered Delivery State
///
/// Invariant: `snd_una <= snd_nxt` in sequence space.
#[derive(Debug, Clone, Default)]
pub struct ReliableOrderedDeliveryState {
    pub snd_una: u32,      // Oldest unacknowledged sequence number
    pub snd_nxt: u32,      // Next sequence number we will send
    pub rcv_nxt: u32,      // Next sequence number we expect from peer

    /* Initial Sequence Numbers (for handshake) */
    pub iss: u32,          // Our initial send sequence number
    pub irs: u32,          // Peer's initial receive sequence number
}

impl ReliableOrderedDeliveryState {
    pub fn new(iss: u32) -> Self {
        Self {
            snd_una: iss,
            snd_nxt: iss,
            rcv_nxt: 0,
            iss,
            irs: 0,
        }
    }

    /// Record the peer's SYN: RCV.NXT = SEG.SEQ + 1
    pub fn on_syn(&mut self, seqno: u32) {
        self.irs = seqno;
        self.rcv_nxt = seqno.wrapping_add(1);
    }

    /// `snd_una <= ack <= snd_nxt`
    pub fn ack_in_range(&self, ackno: u32) -> bool {
        seq_leq(self.snd_una, ackno) && seq_leq(ackno, self.snd_nxt)
    }

    /// Advance SND.UNA if `ack` acknowledges something new
    ///
    /// Returns true if SND.UNA moved.
    pub fn on_ack(&mut self, ackno: u32) -> bool {
        if seq_lt(self.snd_una, ackno) && seq_leq(ackno, self.snd_nxt) {
            self.snd_una = ackno;
            true
        } else {
            false
        }
    }

    /// Whether `ack` covers everything we have sent (our FIN included)
    pub fn acks_all(&self, ackno: u32) -> bool {
        ackno == self.snd_nxt
    }
}
