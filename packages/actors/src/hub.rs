//! Subscription hub: fans job lifecycle events out to live listeners.

use std::collections::HashMap;

use job_core::{Job, JobEvent, JobEventKind};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use crate::messages::{HubMessage, Subscriber};

/// Receiving halves handed to a subscriber.
///
/// Channels close when the subscriber's context is cancelled or the engine
/// stops.
#[derive(Debug)]
pub struct Subscription {
    pub new_job: mpsc::Receiver<Job>,
    pub updated_job: mpsc::Receiver<Job>,
    pub removed_job: mpsc::Receiver<Job>,
}

impl Subscription {
    /// Create a bounded channel set of the given capacity.
    pub fn channel(capacity: usize) -> (Subscriber, Subscription) {
        let (new_tx, new_rx) = mpsc::channel(capacity);
        let (updated_tx, updated_rx) = mpsc::channel(capacity);
        let (removed_tx, removed_rx) = mpsc::channel(capacity);
        (
            Subscriber {
                new_job: new_tx,
                updated_job: updated_tx,
                removed_job: removed_tx,
            },
            Subscription {
                new_job: new_rx,
                updated_job: updated_rx,
                removed_job: removed_rx,
            },
        )
    }
}

/// A registered subscriber. Dropping it stops the task watching the
/// subscriber's context.
struct Listener {
    subscriber: Subscriber,
    watch: CancellationToken,
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.watch.cancel();
    }
}

/// State for the hub actor.
#[derive(Default)]
pub struct HubState {
    subscribers: HashMap<u64, Listener>,
    next_id: u64,
    dropped: u64,
}

impl HubState {
    /// Register a subscriber. The returned token is cancelled once the
    /// subscriber is removed for any reason.
    fn insert(&mut self, subscriber: Subscriber) -> (u64, CancellationToken) {
        self.next_id += 1;
        let id = self.next_id;
        let watch = CancellationToken::new();
        self.subscribers.insert(
            id,
            Listener {
                subscriber,
                watch: watch.clone(),
            },
        );
        (id, watch)
    }

    fn publish(&mut self, event: JobEvent) {
        let kind = event.kind();
        let job = event.into_job();
        let mut closed = Vec::new();

        for (id, listener) in &self.subscribers {
            let subscriber = &listener.subscriber;
            let sender = match kind {
                JobEventKind::New => &subscriber.new_job,
                JobEventKind::Updated => &subscriber.updated_job,
                JobEventKind::Removed => &subscriber.removed_job,
            };
            match sender.try_send(job.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.dropped += 1;
                    tracing::warn!(
                        subscriber = id,
                        job_id = %job.id,
                        ?kind,
                        "Subscriber buffer full, dropping event"
                    );
                }
                Err(TrySendError::Closed(_)) => closed.push(*id),
            }
        }

        for id in closed {
            self.subscribers.remove(&id);
            tracing::debug!(subscriber = id, "Subscriber went away");
        }
    }
}

/// Hub actor. Its mailbox is the single point through which every event
/// passes, so all subscribers observe the same order.
pub struct HubActor;

impl Actor for HubActor {
    type Msg = HubMessage;
    type State = HubState;
    type Arguments = ();

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        _args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting subscription hub");
        Ok(HubState::default())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            HubMessage::Subscribe { subscriber, ctx } => {
                let (id, watch) = state.insert(subscriber);
                tracing::debug!(subscriber = id, "Subscriber added");

                // Unsubscribe once the subscriber's context ends, unless the
                // hub dropped the subscriber first.
                tokio::spawn(async move {
                    tokio::select! {
                        _ = ctx.cancelled() => {
                            let _ = myself.send_message(HubMessage::Unsubscribe { id });
                        }
                        _ = watch.cancelled() => {}
                    }
                });
            }

            HubMessage::Unsubscribe { id } => {
                if state.subscribers.remove(&id).is_some() {
                    tracing::debug!(subscriber = id, "Subscriber removed");
                }
            }

            HubMessage::Publish(event) => {
                tracing::debug!("{}", event.description());
                state.publish(event);
            }

            HubMessage::Count { reply } => {
                let _ = reply.send(state.subscribers.len());
            }

            HubMessage::Shutdown => {
                tracing::info!(
                    subscribers = state.subscribers.len(),
                    dropped_events = state.dropped,
                    "Shutting down subscription hub"
                );
                state.subscribers.clear();
                myself.stop(None);
            }
        }

        Ok(())
    }
}
