//! Stream supervisor: one listener per room, fail-fast as a group
//!
//! # Protocol
//!
//! ```text
//!   Idle ──spawn one task per room──► Running
//!                                        │  first of: stop requested
//!                                        │            any listener exits
//!                                        ▼
//!                                   Cancelling ──cancel token, await all──► Drained
//! ```
//!
//! Every listener shares one [`CancellationToken`]. Whichever happens first,
//! an external stop or a listener exiting, the token is cancelled and the
//! supervisor waits for every listener before returning. Listener failures
//! end up in the [`DrainReport`] and the log, never in the returned `Result`.

mod context;

pub use crate::integrations::stream::ListenerOutcome;
pub use context::{build_context, filter_rooms, SupervisorContext};

use crate::data::{Message, Room, User};
use crate::inbox::Inbox;
use crate::integrations::gitter::RoomDirectory;
use crate::integrations::stream::RoomListener;
use crate::lifecycle::ManagedTask;
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use std::any::Any;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

/// Where the supervisor is in its single run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Running,
    Cancelling,
    Drained,
}

/// What ended the running phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirstExit {
    StopRequested,
    ListenerDied { room: Room, outcome: ListenerOutcome },
}

/// Summary of a completed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    /// `None` when there were no rooms to monitor
    pub first_exit: Option<FirstExit>,
    /// Final outcome of every listener, in room order
    pub outcomes: Vec<(Room, ListenerOutcome)>,
}

impl DrainReport {
    /// Number of listeners that faulted (cancellations are not faults)
    pub fn faults(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_fault()).count()
    }

    pub fn outcome_for(&self, room_name: &str) -> Option<&ListenerOutcome> {
        self.outcomes
            .iter()
            .find(|(room, _)| room.name_matches(room_name))
            .map(|(_, outcome)| outcome)
    }

    pub fn listener_died(&self) -> bool {
        matches!(self.first_exit, Some(FirstExit::ListenerDied { .. }))
    }
}

pub struct StreamSupervisor {
    directory: Arc<dyn RoomDirectory>,
    listener: Arc<dyn RoomListener>,
    inbox: Arc<dyn Inbox>,
    room_filter: Vec<String>,
    state: watch::Sender<SupervisorState>,
}

impl StreamSupervisor {
    pub fn new(
        directory: Arc<dyn RoomDirectory>,
        listener: Arc<dyn RoomListener>,
        inbox: Arc<dyn Inbox>,
    ) -> Self {
        let (state, _) = watch::channel(SupervisorState::Idle);
        Self {
            directory,
            listener,
            inbox,
            room_filter: Vec::new(),
            state,
        }
    }

    /// Only monitor these rooms (case-insensitive). Empty means all rooms.
    pub fn with_room_filter(mut self, names: Vec<String>) -> Self {
        self.room_filter = names;
        self
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    /// Watch state transitions, e.g. from a test or a status endpoint
    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: SupervisorState) {
        tracing::trace!("Supervisor state -> {:?}", state);
        self.state.send_replace(state);
    }

    /// Run every room's listener until the first one exits or `cancel` fires,
    /// then cancel the rest and wait for all of them.
    ///
    /// Dropping the returned future before it completes cancels `cancel`, so
    /// listeners never outlive the supervisor.
    pub async fn supervise(
        &self,
        context: SupervisorContext,
        cancel: CancellationToken,
    ) -> DrainReport {
        let _guard = cancel.clone().drop_guard();
        let SupervisorContext { bot, rooms } = context;
        let bot = Arc::new(bot);

        let mut units: FuturesUnordered<_> = rooms
            .iter()
            .enumerate()
            .map(|(index, room)| {
                let handle = tokio::spawn(listen_unit(
                    Arc::clone(&self.listener),
                    Arc::clone(&self.inbox),
                    room.clone(),
                    Arc::clone(&bot),
                    cancel.clone(),
                ));
                async move { (index, settle(handle.await)) }
            })
            .collect();
        self.set_state(SupervisorState::Running);

        let mut finished = Vec::with_capacity(rooms.len());
        // A completion that lost the race to a stop request; logged with the drain
        let mut settled_early = None;

        let first_exit = if units.is_empty() {
            tracing::info!("No rooms to monitor.");
            None
        } else {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("{} was requested to stop.", self.name());
                    Some(FirstExit::StopRequested)
                }
                Some((index, outcome)) = units.next() => {
                    if cancel.is_cancelled() {
                        tracing::info!("{} was requested to stop.", self.name());
                        settled_early = Some((index, outcome));
                        Some(FirstExit::StopRequested)
                    } else {
                        let room = &rooms[index];
                        tracing::warn!("The listener for {} died ({}).", room, outcome);
                        tracing::info!("Telling all listeners to cancel...");
                        finished.push((index, outcome.clone()));
                        Some(FirstExit::ListenerDied {
                            room: room.clone(),
                            outcome,
                        })
                    }
                }
            }
        };

        // Whoever won the race, there is one shutdown and it starts here.
        cancel.cancel();
        self.set_state(SupervisorState::Cancelling);

        tracing::info!("Waiting for listeners to stop...");
        if let Some((index, outcome)) = settled_early {
            log_drained(&rooms[index], &outcome);
            finished.push((index, outcome));
        }
        while let Some((index, outcome)) = units.next().await {
            log_drained(&rooms[index], &outcome);
            finished.push((index, outcome));
        }
        tracing::info!("All listeners stopped.");
        self.set_state(SupervisorState::Drained);

        finished.sort_by_key(|(index, _)| *index);
        DrainReport {
            first_exit,
            outcomes: finished
                .into_iter()
                .map(|(index, outcome)| (rooms[index].clone(), outcome))
                .collect(),
        }
    }
}

#[async_trait]
impl ManagedTask for StreamSupervisor {
    type Context = SupervisorContext;
    type Output = DrainReport;

    fn name(&self) -> &str {
        "Stream API client"
    }

    async fn create_context(&self) -> Result<SupervisorContext> {
        build_context(self.directory.as_ref(), &self.room_filter).await
    }

    async fn execute(
        &self,
        context: SupervisorContext,
        cancel: CancellationToken,
    ) -> Result<DrainReport> {
        Ok(self.supervise(context, cancel).await)
    }
}

async fn listen_unit(
    listener: Arc<dyn RoomListener>,
    inbox: Arc<dyn Inbox>,
    room: Room,
    bot: Arc<User>,
    cancel: CancellationToken,
) -> ListenerOutcome {
    let forward = |message: Message| inbox.enqueue(message);
    listener.listen(&room, &bot, &cancel, &forward).await
}

/// Fold a task's join result into an outcome; panics count as faults
fn settle(joined: Result<ListenerOutcome, JoinError>) -> ListenerOutcome {
    match joined {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => {
            ListenerOutcome::Faulted(format!("listener panicked: {}", panic_detail(e.into_panic())))
        }
        Err(e) => ListenerOutcome::Faulted(e.to_string()),
    }
}

fn panic_detail(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn log_drained(room: &Room, outcome: &ListenerOutcome) {
    match outcome {
        ListenerOutcome::Cancelled => {
            tracing::info!("The listener for {} was cancelled.", room)
        }
        ListenerOutcome::Normal => tracing::info!("The listener for {} ended.", room),
        ListenerOutcome::Faulted(detail) => {
            tracing::error!("The listener for {} failed: {}", room, detail)
        }
    }
}
