//! Spawning and wiring of the engine's actors.

use ractor::{Actor, ActorRef};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::DispatcherConfig;
use crate::dispatcher::{DispatcherActor, DispatcherArgs};
use crate::hub::HubActor;
use crate::messages::{DispatcherMessage, HubMessage};

/// Handles to the running actors.
pub struct EngineActors {
    pub dispatcher: ActorRef<DispatcherMessage>,
    pub hub: ActorRef<HubMessage>,
    pub handles: Vec<JoinHandle<()>>,
}

/// Start the subscription hub, then the dispatcher that feeds it.
///
/// Actors are unnamed so several engines can live in one process.
pub async fn start_actors(
    config: DispatcherConfig,
    shutdown: CancellationToken,
) -> Result<EngineActors, ractor::SpawnErr> {
    let (hub, hub_handle) = Actor::spawn(None, HubActor, ()).await?;

    let args = DispatcherArgs {
        config,
        hub: hub.clone(),
        shutdown,
    };
    let (dispatcher, dispatcher_handle) = match Actor::spawn(None, DispatcherActor, args).await {
        Ok(spawned) => spawned,
        Err(e) => {
            hub.stop(None);
            return Err(e);
        }
    };

    Ok(EngineActors {
        dispatcher,
        hub,
        handles: vec![dispatcher_handle, hub_handle],
    })
}
