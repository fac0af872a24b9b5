//! Wire contract and the `Network` capability.
//!
//! The actual P2P transport (sockets, TLS, peer discovery, scoring) lives
//! outside the core; the node consumes anything that implements [`Network`]
//! and feeds inbound envelopes through a channel. [`LoopbackHub`] is the
//! in-process implementation used by tests and single-node runs.

pub mod message;

pub use message::{SignedEnvelope, WireMessage};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bt2c_core::error::Bt2cError;
use tokio::sync::mpsc;
use tracing::debug;

/// Peer identifier as the transport names it.
pub type PeerId = String;

/// Outbound capability the node holds. Implementations are free to drop
/// messages (gossip is best-effort); ordering is not guaranteed across
/// peers.
#[async_trait]
pub trait Network: Send + Sync {
    async fn broadcast(&self, envelope: SignedEnvelope) -> Result<(), Bt2cError>;
    async fn unicast(&self, peer: &PeerId, envelope: SignedEnvelope) -> Result<(), Bt2cError>;
}

// ── Loopback ─────────────────────────────────────────────────────────────────

/// In-process message hub: every registered peer receives broadcasts from
/// all others. The transport analogue for tests and local simulation.
#[derive(Clone, Default)]
pub struct LoopbackHub {
    peers: Arc<Mutex<HashMap<PeerId, mpsc::Sender<(PeerId, SignedEnvelope)>>>>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the hub. Returns the peer's network handle and its inbound
    /// stream of `(from, envelope)` pairs.
    pub fn join(&self, peer: impl Into<PeerId>) -> (LoopbackNetwork, mpsc::Receiver<(PeerId, SignedEnvelope)>) {
        let peer = peer.into();
        let (tx, rx) = mpsc::channel(256);
        self.peers.lock().expect("hub lock").insert(peer.clone(), tx);
        (
            LoopbackNetwork {
                local: peer,
                hub: self.clone(),
            },
            rx,
        )
    }
}

/// One peer's handle onto a [`LoopbackHub`].
#[derive(Clone)]
pub struct LoopbackNetwork {
    local: PeerId,
    hub: LoopbackHub,
}

#[async_trait]
impl Network for LoopbackNetwork {
    async fn broadcast(&self, envelope: SignedEnvelope) -> Result<(), Bt2cError> {
        let targets: Vec<(PeerId, mpsc::Sender<(PeerId, SignedEnvelope)>)> = {
            let peers = self.hub.peers.lock().expect("hub lock");
            peers
                .iter()
                .filter(|(id, _)| **id != self.local)
                .map(|(id, tx)| (id.clone(), tx.clone()))
                .collect()
        };
        for (peer, tx) in targets {
            if tx.send((self.local.clone(), envelope.clone())).await.is_err() {
                debug!(peer = %peer, "loopback peer gone, dropping");
            }
        }
        Ok(())
    }

    async fn unicast(&self, peer: &PeerId, envelope: SignedEnvelope) -> Result<(), Bt2cError> {
        let target = {
            let peers = self.hub.peers.lock().expect("hub lock");
            peers.get(peer).cloned()
        };
        match target {
            Some(tx) => {
                let _ = tx.send((self.local.clone(), envelope)).await;
                Ok(())
            }
            None => Err(Bt2cError::Storage(format!("unknown peer {peer}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt2c_crypto::KeyPair;

    fn envelope(kp: &KeyPair) -> SignedEnvelope {
        SignedEnvelope::seal(kp, &WireMessage::TxGossip { payload: vec![1, 2, 3] })
    }

    #[tokio::test]
    async fn broadcast_reaches_all_other_peers() {
        let hub = LoopbackHub::new();
        let (net_a, _rx_a) = hub.join("a");
        let (_net_b, mut rx_b) = hub.join("b");
        let (_net_c, mut rx_c) = hub.join("c");

        let kp = KeyPair::generate();
        net_a.broadcast(envelope(&kp)).await.unwrap();

        let (from_b, env_b) = rx_b.recv().await.unwrap();
        let (from_c, _) = rx_c.recv().await.unwrap();
        assert_eq!(from_b, "a");
        assert_eq!(from_c, "a");
        env_b.open().unwrap();
    }

    #[tokio::test]
    async fn broadcast_skips_the_sender() {
        let hub = LoopbackHub::new();
        let (net_a, mut rx_a) = hub.join("a");
        let (_net_b, mut rx_b) = hub.join("b");

        let kp = KeyPair::generate();
        net_a.broadcast(envelope(&kp)).await.unwrap();
        rx_b.recv().await.unwrap();
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn unicast_targets_one_peer() {
        let hub = LoopbackHub::new();
        let (net_a, _rx_a) = hub.join("a");
        let (_net_b, mut rx_b) = hub.join("b");
        let (_net_c, mut rx_c) = hub.join("c");

        let kp = KeyPair::generate();
        net_a.unicast(&"b".to_string(), envelope(&kp)).await.unwrap();
        assert!(rx_b.recv().await.is_some());
        assert!(rx_c.try_recv().is_err());

        assert!(net_a
            .unicast(&"nobody".to_string(), envelope(&kp))
            .await
            .is_err());
    }
}
