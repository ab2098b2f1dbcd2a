//! TCP Protocol Definitions
//!
//! Header flag bits and the flag set carried by every segment descriptor.
//! Header layout and checksums belong to the parsing layer; only the bits the
//! state machine reasons about live here.

use bitflags::bitflags;

/// TCP header flags
pub const TCP_FIN: u8 = 0x01;
pub const TCP_SYN: u8 = 0x02;
pub const TCP_RST: u8 = 0x04;
pub const TCP_PSH: u8 = 0x08;
pub const TCP_ACK: u8 = 0x10;
pub const TCP_URG: u8 = 0x20;
pub const TCP_FLAGS: u8 = 0x3F;

bitflags! {
    /// Flag set of a TCP segment.
    ///
    /// Only the bits understood by the input path are named; anything else
    /// read from the wire is truncated away by [`TcpFlags::from_tcphdr`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TcpFlags: u8 {
        const FIN = TCP_FIN;
        const SYN = TCP_SYN;
        const RST = TCP_RST;
        const PSH = TCP_PSH;
        const ACK = TCP_ACK;
    }
}

impl TcpFlags {
    /// Build from the flag byte of a TCP header
    ///
    /// URG and the ECN bits are not interpreted by this engine and are dropped.
    pub fn from_tcphdr(flags: u8) -> Self {
        Self::from_bits_truncate(flags & TCP_FLAGS)
    }

    /// SYN and nothing else: the only segment that may open a connection
    /// on a listening socket.
    pub fn is_pure_syn(&self) -> bool {
        *self == TcpFlags::SYN
    }

    /// ACK, optionally with PSH, and no other control bit.
    pub fn is_plain_ack(&self) -> bool {
        self.contains(TcpFlags::ACK) && (*self - TcpFlags::PSH) == TcpFlags::ACK
    }

    /// Sequence space consumed by the control bits (SYN and FIN count one each).
    pub fn seq_len(&self) -> u32 {
        self.contains(TcpFlags::SYN) as u32 + self.contains(TcpFlags::FIN) as u32
    }
}

impl std::fmt::Display for TcpFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return f.write_str("-");
        }
        let names = [
            (TcpFlags::SYN, "SYN"),
            (TcpFlags::ACK, "ACK"),
            (TcpFlags::FIN, "FIN"),
            (TcpFlags::RST, "RST"),
            (TcpFlags::PSH, "PSH"),
        ];
        let mut first = true;
        for (flag, name) in names {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}
