//! Socket Lookup Tables
//!
//! Connected sockets (and SYN_RECV children) are keyed by their exact
//! 4-tuple; listening sockets by their local endpoint, where `0.0.0.0`
//! matches any local address.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddrV4};

use crate::state::{TcpSock, TcpState};
use crate::tcp_types::{FourTuple, SockId, TcpSegment};

#[derive(Debug, Default)]
pub struct TcpHashTable {
    established: HashMap<FourTuple, SockId>,
    listen: HashMap<SocketAddrV4, SockId>,
}

impl TcpHashTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `sock` into the table matching its state
    ///
    /// Returns the current owner of the key if it is taken.
    pub fn hash(&mut self, sock: &TcpSock) -> Result<(), SockId> {
        if sock.state() == TcpState::Listen {
            let key = sock.conn_mgmt.local;
            match self.listen.get(&key) {
                Some(&owner) if owner != sock.id => Err(owner),
                _ => {
                    self.listen.insert(key, sock.id);
                    Ok(())
                }
            }
        } else {
            let key = sock.four_tuple();
            match self.established.get(&key) {
                Some(&owner) if owner != sock.id => Err(owner),
                _ => {
                    self.established.insert(key, sock.id);
                    Ok(())
                }
            }
        }
    }

    /// Remove every entry pointing at `sock`
    pub fn unhash(&mut self, sock: &TcpSock) {
        let tuple = sock.four_tuple();
        if self.established.get(&tuple) == Some(&sock.id) {
            self.established.remove(&tuple);
        }
        let local = sock.conn_mgmt.local;
        if self.listen.get(&local) == Some(&sock.id) {
            self.listen.remove(&local);
        }
    }

    /// Exact 4-tuple first, then a listener on the destination endpoint,
    /// then a wildcard listener on the destination port.
    pub fn lookup(&self, seg: &TcpSegment) -> Option<SockId> {
        self.established
            .get(&seg.four_tuple())
            .or_else(|| self.listen.get(&seg.dst))
            .or_else(|| {
                self.listen
                    .get(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, seg.dst.port()))
            })
            .copied()
    }

    pub fn lookup_established(&self, tuple: &FourTuple) -> Option<SockId> {
        self.established.get(tuple).copied()
    }

    pub fn lookup_listen(&self, local: &SocketAddrV4) -> Option<SockId> {
        self.listen.get(local).copied()
    }

    pub fn len(&self) -> usize {
        self.established.len() + self.listen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
