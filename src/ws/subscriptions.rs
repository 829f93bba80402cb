//! Subscription handles and events.

use crate::graphql::{GraphQlError, Response};
use crate::ws::native::Command;

use futures_util::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Events delivered to one subscription.
#[derive(Debug, Clone)]
pub enum SubscriptionEvent {
    /// An execution result pushed by the server.
    Next(Response),
    /// The server terminated the subscription with errors.
    Errors(Vec<GraphQlError>),
    /// The server completed the subscription normally.
    Complete,
}

/// A live subscription: a stream of [`SubscriptionEvent`] plus the handle
/// that unsubscribes.
///
/// Dropping the handle sends `complete` for its id, so holding the
/// subscription is what keeps it alive — the subscribe/unsubscribe pair is
/// folded into acquire/release.
pub struct Subscription {
    id: String,
    events: mpsc::Receiver<SubscriptionEvent>,
    cmd_tx: mpsc::Sender<Command>,
}

impl Subscription {
    pub(crate) fn new(
        id: String,
        events: mpsc::Receiver<SubscriptionEvent>,
        cmd_tx: mpsc::Sender<Command>,
    ) -> Self {
        Self { id, events, cmd_tx }
    }

    /// The protocol id this subscription is multiplexed under.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Receive the next event, or `None` once the subscription has ended.
    pub async fn next_event(&mut self) -> Option<SubscriptionEvent> {
        self.events.recv().await
    }

    /// Unsubscribe explicitly. Equivalent to dropping the handle.
    pub fn close(self) {}
}

impl Stream for Subscription {
    type Item = SubscriptionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Best effort: if the client is already gone the channel is closed.
        let _ = self.cmd_tx.try_send(Command::Complete {
            id: self.id.clone(),
        });
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
