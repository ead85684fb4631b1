//! Fault channel.
//!
//! A rendezvous: `post` returns only once the receiver has taken the
//! fault, so a fault that nobody drains stalls the inbound task before the
//! next frame is processed.

use tokio::sync::{mpsc, oneshot};

use crate::error::Fault;

/// A posted fault together with the handshake that releases its poster.
type Delivery = (Fault, oneshot::Sender<()>);

/// Create a connected sender/receiver pair.
pub fn fault_channel() -> (FaultSender, FaultReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (FaultSender { tx }, FaultReceiver { rx })
}

#[derive(Debug, Clone)]
pub struct FaultSender {
    tx: mpsc::Sender<Delivery>,
}

impl FaultSender {
    /// Deliver a fault and wait until the receiver has taken it.
    /// Returns `false` if the receiver is gone.
    pub async fn post(&self, fault: Fault) -> bool {
        let (ack_tx, ack_rx) = oneshot::channel();
        if let Err(mpsc::error::SendError((fault, _))) = self.tx.send((fault, ack_tx)).await {
            tracing::debug!(%fault, "fault receiver dropped");
            return false;
        }
        // Dropped unacknowledged only when the receiver goes away first.
        ack_rx.await.is_ok()
    }
}

/// Receiving half handed to the client's owner.
#[derive(Debug)]
pub struct FaultReceiver {
    rx: mpsc::Receiver<Delivery>,
}

impl FaultReceiver {
    /// Wait for the next fault. `None` once the client is dropped.
    pub async fn recv(&mut self) -> Option<Fault> {
        self.rx.recv().await.map(accept)
    }

    /// Take a fault if one is being posted.
    pub fn try_recv(&mut self) -> Option<Fault> {
        self.rx.try_recv().ok().map(accept)
    }
}

fn accept((fault, ack): Delivery) -> Fault {
    let _ = ack.send(());
    fault
}
