//! In-process link with simulated one-way latency
//!
//! Byte messages go through `std::sync::mpsc`; the receiving end holds them
//! back until the receiver's clock reaches the delivery time.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};

#[derive(Debug)]
struct Packet {
    deliver_at: f32,
    bytes: Vec<u8>,
}

/// Sending half
#[derive(Debug, Clone)]
pub struct LinkTx {
    sender: Sender<Packet>,
    latency: f32,
}

/// Receiving half
#[derive(Debug)]
pub struct LinkRx {
    receiver: Receiver<Packet>,
    /// Arrived but not yet due, in send order
    in_flight: VecDeque<Packet>,
}

/// One-way link delivering messages `latency` seconds after they are sent
#[must_use]
pub fn latency_link(latency: f32) -> (LinkTx, LinkRx) {
    let (sender, receiver) = mpsc::channel();
    (
        LinkTx {
            sender,
            latency: latency.max(0.0),
        },
        LinkRx {
            receiver,
            in_flight: VecDeque::new(),
        },
    )
}

impl LinkTx {
    /// Send at sender time `now`; returns false if the receiver is dropped
    pub fn send(&self, bytes: Vec<u8>, now: f32) -> bool {
        let packet = Packet {
            deliver_at: now + self.latency,
            bytes,
        };
        self.sender.send(packet).is_ok()
    }

    pub fn latency(&self) -> f32 {
        self.latency
    }
}

impl LinkRx {
    /// Messages due at receiver time `now`, in send order
    pub fn poll(&mut self, now: f32) -> Vec<Vec<u8>> {
        while let Ok(packet) = self.receiver.try_recv() {
            self.in_flight.push_back(packet);
        }
        let mut out = Vec::new();
        while let Some(front) = self.in_flight.front() {
            if front.deliver_at > now {
                break;
            }
            if let Some(packet) = self.in_flight.pop_front() {
                out.push(packet.bytes);
            }
        }
        out
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

/// One end of a duplex link
#[derive(Debug)]
pub struct Connection {
    pub tx: LinkTx,
    pub rx: LinkRx,
}

impl Connection {
    pub fn send(&self, bytes: Vec<u8>, now: f32) -> bool {
        self.tx.send(bytes, now)
    }

    pub fn poll(&mut self, now: f32) -> Vec<Vec<u8>> {
        self.rx.poll(now)
    }
}

/// Duplex link with the same latency both ways: (server end, client end)
#[must_use]
pub fn link_pair(latency: f32) -> (Connection, Connection) {
    let (to_client, from_server) = latency_link(latency);
    let (to_server, from_client) = latency_link(latency);
    (
        Connection {
            tx: to_client,
            rx: from_client,
        },
        Connection {
            tx: to_server,
            rx: from_server,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivers_after_latency_in_order() {
        let (tx, mut rx) = latency_link(0.1);
        assert!(tx.send(vec![1], 0.0));
        assert!(tx.send(vec![2], 0.05));
        assert!(rx.poll(0.09).is_empty());
        assert_eq!(rx.poll(0.1), vec![vec![1]]);
        assert_eq!(rx.in_flight(), 1);
        assert_eq!(rx.poll(1.0), vec![vec![2]]);
    }

    #[test]
    fn test_zero_latency_is_immediate() {
        let (tx, mut rx) = latency_link(0.0);
        assert!(tx.send(vec![7], 3.0));
        assert_eq!(rx.poll(3.0), vec![vec![7]]);
    }

    #[test]
    fn test_send_fails_when_receiver_dropped() {
        let (tx, rx) = latency_link(0.0);
        drop(rx);
        assert!(!tx.send(vec![1], 0.0));
    }

    #[test]
    fn test_pair_is_duplex() {
        let (mut server, mut client) = link_pair(0.02);
        assert!(server.send(b"down".to_vec(), 0.0));
        assert!(client.send(b"up".to_vec(), 0.0));
        assert_eq!(client.poll(0.02), vec![b"down".to_vec()]);
        assert_eq!(server.poll(0.02), vec![b"up".to_vec()]);
    }
}
