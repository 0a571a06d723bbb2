//! Mailbox handles shared by every tier.
//!
//! Each component runs as one task draining an unbounded mailbox in arrival
//! order. An [`ActorRef`] is the only way to reach it: it is cheap to clone,
//! is handed to peers during registration as their reverse channel, and never
//! blocks the sender.

use std::fmt;

use flowbal_types::{Result, Status};
use tokio::sync::{mpsc, oneshot};

/// Receiving half of an actor's mailbox, owned by the actor task.
pub type Mailbox<M> = mpsc::UnboundedReceiver<M>;

/// Clonable address of an actor accepting messages of type `M`.
pub struct ActorRef<M> {
    tx: mpsc::UnboundedSender<M>,
    name: &'static str,
}

impl<M> ActorRef<M> {
    /// Create a fresh mailbox. `name` labels errors and logs.
    pub fn channel(name: &'static str) -> (Self, Mailbox<M>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, name }, rx)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Fire-and-forget delivery.
    pub fn tell(&self, msg: M) -> Result<()> {
        self.tx
            .send(msg)
            .map_err(|_| Status::mailbox_closed(self.name))
    }

    /// Send a request built around a oneshot reply channel and await the answer.
    pub async fn ask<R>(&self, build: impl FnOnce(oneshot::Sender<R>) -> M) -> Result<R> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tell(build(reply_tx))?;
        reply_rx
            .await
            .map_err(|_| Status::reply_dropped(self.name))
    }

    /// Whether both refs point at the same mailbox.
    pub fn same_actor(&self, other: &Self) -> bool {
        self.tx.same_channel(&other.tx)
    }

    /// Whether the actor has stopped receiving.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<M> Clone for ActorRef<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            name: self.name,
        }
    }
}

impl<M> fmt::Debug for ActorRef<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorRef")
            .field("name", &self.name)
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowbal_types::ActorCode;

    enum Probe {
        Ping(u32),
        Echo(u32, oneshot::Sender<u32>),
    }

    #[tokio::test]
    async fn test_tell_delivers_in_order() {
        let (actor, mut mailbox) = ActorRef::<Probe>::channel("probe");
        actor.tell(Probe::Ping(1)).unwrap();
        actor.tell(Probe::Ping(2)).unwrap();
        let mut seen = Vec::new();
        while let Ok(Probe::Ping(n)) = mailbox.try_recv() {
            seen.push(n);
        }
        assert_eq!(seen, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_ask_round_trip() {
        let (actor, mut mailbox) = ActorRef::<Probe>::channel("probe");
        tokio::spawn(async move {
            while let Some(msg) = mailbox.recv().await {
                if let Probe::Echo(n, reply) = msg {
                    let _ = reply.send(n * 2);
                }
            }
        });
        assert_eq!(actor.ask(|tx| Probe::Echo(21, tx)).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_tell_after_close_reports_mailbox_closed() {
        let (actor, mailbox) = ActorRef::<Probe>::channel("probe");
        drop(mailbox);
        let err = actor.tell(Probe::Ping(1)).unwrap_err();
        assert_eq!(err.code(), ActorCode::MAILBOX_CLOSED);
        assert!(actor.is_closed());
    }

    #[tokio::test]
    async fn test_ask_with_dropped_reply() {
        let (actor, mut mailbox) = ActorRef::<Probe>::channel("probe");
        tokio::spawn(async move {
            // Drop every request without answering.
            while mailbox.recv().await.is_some() {}
        });
        let err = actor.ask(|tx| Probe::Echo(1, tx)).await.unwrap_err();
        assert_eq!(err.code(), ActorCode::REPLY_DROPPED);
    }

    #[test]
    fn test_same_actor() {
        let (a, _rx) = ActorRef::<Probe>::channel("a");
        let (b, _rx2) = ActorRef::<Probe>::channel("b");
        assert!(a.same_actor(&a.clone()));
        assert!(!a.same_actor(&b));
    }
}
