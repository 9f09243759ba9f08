use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

use crate::entry::EntryForm;
use crate::kiosk::{Kiosk, KioskOutput, KioskSnapshot};
use crate::leaderboard::{GatewayError, LeaderboardEntry, LeaderboardGateway};
use crate::scene::SceneKind;
use crate::session::SessionId;
use crate::sfx::Cue;

const NOTICE_CAPACITY: usize = 256;
const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug)]
pub enum KioskCommand {
    Tap,
    SubmitForm(EntryForm),
    Snapshot {
        respond: oneshot::Sender<KioskSnapshot>,
    },
    Shutdown,
}

/// Discrete events for the rendering/audio layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum KioskNotice {
    SceneChanged { from: SceneKind, to: SceneKind },
    #[serde(rename_all = "camelCase")]
    Feedback { knead_count: u32, volume: f32 },
    Cue { cue: Cue, volume: f32 },
    Rejected { message: String },
    SubmissionSettled { stored: bool },
    LeaderboardRefreshed { entries: usize },
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("kiosk runtime has stopped")]
    Stopped,
    #[error("kiosk runtime did not respond in time")]
    Timeout,
}

enum Completion {
    Inserted {
        session: SessionId,
        result: Result<(), GatewayError>,
    },
    Fetched(Result<Vec<LeaderboardEntry>, GatewayError>),
}

#[derive(Debug, Clone)]
pub struct KioskHandle {
    tx: mpsc::UnboundedSender<KioskCommand>,
    notices: broadcast::Sender<KioskNotice>,
}

impl KioskHandle {
    fn send(&self, cmd: KioskCommand) -> Result<(), RuntimeError> {
        self.tx.send(cmd).map_err(|_| RuntimeError::Stopped)
    }

    pub fn tap(&self) -> Result<(), RuntimeError> {
        self.send(KioskCommand::Tap)
    }

    pub fn submit_form(&self, form: EntryForm) -> Result<(), RuntimeError> {
        self.send(KioskCommand::SubmitForm(form))
    }

    pub fn shutdown(&self) -> Result<(), RuntimeError> {
        self.send(KioskCommand::Shutdown)
    }

    pub async fn snapshot(&self) -> Result<KioskSnapshot, RuntimeError> {
        let (respond, rx) = oneshot::channel();
        self.send(KioskCommand::Snapshot { respond })?;
        match tokio::time::timeout(SNAPSHOT_TIMEOUT, rx).await {
            Ok(Ok(snapshot)) => Ok(snapshot),
            Ok(Err(_)) => Err(RuntimeError::Stopped),
            Err(_) => Err(RuntimeError::Timeout),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KioskNotice> {
        self.notices.subscribe()
    }
}

/// Runs the kiosk on its own task. Taps and form submissions go in through
/// the returned handle; the task exits on `shutdown` or once every handle is
/// dropped.
pub fn spawn<G, R>(kiosk: Kiosk<R>, gateway: G) -> (KioskHandle, JoinHandle<()>)
where
    G: LeaderboardGateway,
    R: Rng + Send + 'static,
{
    let (tx, commands) = mpsc::unbounded_channel();
    let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

    let handle = KioskHandle {
        tx,
        notices: notices.clone(),
    };
    let task = tokio::spawn(run(kiosk, gateway, commands, notices));
    (handle, task)
}

async fn run<G, R>(
    kiosk: Kiosk<R>,
    gateway: G,
    mut commands: mpsc::UnboundedReceiver<KioskCommand>,
    notices: broadcast::Sender<KioskNotice>,
) where
    G: LeaderboardGateway,
    R: Rng + Send + 'static,
{
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let mut driver = Driver {
        kiosk,
        gateway,
        notices,
        done_tx,
        origin: Instant::now(),
    };
    tracing::info!("kiosk runtime started");

    loop {
        let deadline = driver.deadline();
        tokio::select! {
            cmd = commands.recv() => {
                let Some(cmd) = cmd else { break };
                // Timers due before this input fire first.
                driver.catch_up();
                if !driver.command(cmd) {
                    break;
                }
            }
            Some(done) = done_rx.recv() => {
                driver.catch_up();
                driver.completion(done);
            }
            () = sleep_until_deadline(deadline) => {
                driver.catch_up();
            }
        }
    }

    tracing::info!("kiosk runtime stopped");
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

struct Driver<G, R> {
    kiosk: Kiosk<R>,
    gateway: G,
    notices: broadcast::Sender<KioskNotice>,
    done_tx: mpsc::UnboundedSender<Completion>,
    origin: Instant,
}

impl<G, R> Driver<G, R>
where
    G: LeaderboardGateway,
    R: Rng + Send + 'static,
{
    fn deadline(&self) -> Option<Instant> {
        self.kiosk.next_deadline().map(|d| self.origin + d)
    }

    fn catch_up(&mut self) {
        let outputs = self.kiosk.advance_to(self.origin.elapsed());
        self.dispatch(outputs);
    }

    /// Returns `false` when the runtime should stop.
    fn command(&mut self, cmd: KioskCommand) -> bool {
        match cmd {
            KioskCommand::Tap => {
                let outputs = self.kiosk.interact();
                self.dispatch(outputs);
            }
            KioskCommand::SubmitForm(form) => {
                let outputs = self.kiosk.submit_form(form);
                self.dispatch(outputs);
            }
            KioskCommand::Snapshot { respond } => {
                let _ = respond.send(self.kiosk.snapshot());
            }
            KioskCommand::Shutdown => return false,
        }
        true
    }

    fn completion(&mut self, done: Completion) {
        match done {
            Completion::Inserted { session, result } => {
                let stored = result.is_ok();
                self.kiosk.on_insert_result(session, result);
                self.notify(KioskNotice::SubmissionSettled { stored });
            }
            Completion::Fetched(fetched) => {
                if self.kiosk.on_leaderboard(fetched) {
                    self.notify(KioskNotice::LeaderboardRefreshed {
                        entries: self.kiosk.leaderboard().entries().len(),
                    });
                }
            }
        }
    }

    fn dispatch(&mut self, outputs: Vec<KioskOutput>) {
        for output in outputs {
            match output {
                KioskOutput::SceneChanged { from, to } => {
                    self.notify(KioskNotice::SceneChanged { from, to });
                }
                KioskOutput::Feedback {
                    knead_count,
                    volume,
                } => {
                    self.notify(KioskNotice::Feedback {
                        knead_count,
                        volume,
                    });
                }
                KioskOutput::Cue { cue, volume } => {
                    self.notify(KioskNotice::Cue { cue, volume });
                }
                KioskOutput::Rejected(error) => {
                    self.notify(KioskNotice::Rejected {
                        message: error.to_string(),
                    });
                }
                KioskOutput::Submit {
                    session,
                    submission,
                    refresh_limit,
                } => {
                    let gateway = self.gateway.clone();
                    let done = self.done_tx.clone();
                    tokio::spawn(async move {
                        let result = gateway.insert(submission).await;
                        let _ = done.send(Completion::Inserted { session, result });
                        let fetched = gateway.fetch_top(refresh_limit).await;
                        let _ = done.send(Completion::Fetched(fetched));
                    });
                }
                KioskOutput::Refresh { limit } => {
                    let gateway = self.gateway.clone();
                    let done = self.done_tx.clone();
                    tokio::spawn(async move {
                        let fetched = gateway.fetch_top(limit).await;
                        let _ = done.send(Completion::Fetched(fetched));
                    });
                }
            }
        }
    }

    fn notify(&self, notice: KioskNotice) {
        // No subscribers is fine.
        let _ = self.notices.send(notice);
    }
}
