use crate::config::SyncConfig;
use crate::db::Storage;
use crate::db::models::SyncRun;
use crate::db::sync::RunCounters;
use crate::error::LedgerError;
use crate::service::fx_provider::FxProvider;
use crate::service::report_cache::ReportCache;
use crate::service::unified_sync::UnifiedSyncService;

use chrono::Utc;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Resolves with the finished run row once the pass is recorded.
pub type RunDone = oneshot::Receiver<Result<SyncRun, LedgerError>>;

/// Outcome of asking for a sync.
#[derive(Debug)]
pub enum SyncTrigger {
    Started { run_id: String, done: RunDone },
    AlreadyRunning { run_id: String },
}

/// Messages handled by the sync actor.
#[derive(Debug)]
pub enum SyncActorMessage {
    /// Start a pass for the user unless one is already in flight.
    Trigger(String, RpcReplyPort<Result<SyncTrigger, LedgerError>>),
    /// Start a pass for every user whose derived data is out of date.
    Sweep,

    // Internal messages (sent by the actor itself)
    /// A pass finished; record it and wake the waiter.
    SyncComplete {
        user_id: String,
        run_id: String,
        result: Result<RunCounters, String>,
        notify: Option<oneshot::Sender<Result<SyncRun, LedgerError>>>,
    },
}

/// Handle for interacting with the sync actor.
#[derive(Clone)]
pub struct SyncHandle {
    actor: ActorRef<SyncActorMessage>,
    service: UnifiedSyncService,
}

impl SyncHandle {
    pub async fn trigger(&self, user_id: impl Into<String>) -> Result<SyncTrigger, LedgerError> {
        ractor::call!(self.actor, SyncActorMessage::Trigger, user_id.into())
            .map_err(|e| LedgerError::RactorError(format!("Trigger RPC failed: {e}")))?
    }

    pub async fn sweep(&self) {
        let _ = ractor::cast!(self.actor, SyncActorMessage::Sweep);
    }

    /// Read-side access for status and summary queries.
    pub fn service(&self) -> &UnifiedSyncService {
        &self.service
    }
}

struct SyncActorState {
    service: UnifiedSyncService,
    cache: Arc<ReportCache>,
    /// user id -> run id
    in_flight: HashMap<String, String>,
}

pub struct SyncActorArgs {
    pub service: UnifiedSyncService,
    pub cache: Arc<ReportCache>,
}

struct SyncActor;

#[ractor::async_trait]
impl Actor for SyncActor {
    type Msg = SyncActorMessage;
    type State = SyncActorState;
    type Arguments = SyncActorArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let interrupted = args
            .service
            .storage()
            .fail_interrupted_runs()
            .await
            .map_err(|e| ActorProcessingErr::from(format!("DB recovery of sync runs failed: {}", e)))?;
        if interrupted > 0 {
            warn!(interrupted, "marked interrupted sync runs as failed");
        }
        info!("SyncActor started");
        Ok(SyncActorState {
            service: args.service,
            cache: args.cache,
            in_flight: HashMap::new(),
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SyncActorMessage::Trigger(user_id, rp) => {
                let reply = if let Some(run_id) = state.in_flight.get(&user_id) {
                    debug!(user_id, "sync already running; skip duplicate");
                    Ok(SyncTrigger::AlreadyRunning {
                        run_id: run_id.clone(),
                    })
                } else {
                    let (tx, rx) = oneshot::channel();
                    self.start_run(state, &myself, user_id, Some(tx))
                        .await
                        .map(|run_id| SyncTrigger::Started { run_id, done: rx })
                };
                let _ = rp.send(reply);
            }
            SyncActorMessage::Sweep => {
                self.handle_sweep(state, &myself).await;
            }
            SyncActorMessage::SyncComplete {
                user_id,
                run_id,
                result,
                notify,
            } => {
                state.in_flight.remove(&user_id);
                if let Err(e) = &result {
                    warn!(user_id, run_id, "sync failed: {}", e);
                }
                let storage = state.service.storage();
                let recorded = match storage.finish_sync_run(&user_id, &run_id, result).await {
                    Ok(()) => storage.get_sync_run(&user_id, &run_id).await,
                    Err(e) => {
                        error!(user_id, run_id, "DB update after sync failed: {}", e);
                        Err(e)
                    }
                };
                state.cache.invalidate_user(&user_id);
                if let Some(tx) = notify {
                    let _ = tx.send(recorded);
                }
            }
        }
        Ok(())
    }
}

impl SyncActor {
    async fn start_run(
        &self,
        state: &mut SyncActorState,
        myself: &ActorRef<SyncActorMessage>,
        user_id: String,
        notify: Option<oneshot::Sender<Result<SyncRun, LedgerError>>>,
    ) -> Result<String, LedgerError> {
        let run_id = state.service.storage().begin_sync_run(&user_id).await?;
        state.in_flight.insert(user_id.clone(), run_id.clone());
        info!(user_id, run_id, "sync started");

        let service = state.service.clone();
        let me = myself.clone();
        let returned_id = run_id.clone();
        tokio::spawn(async move {
            let today = Utc::now().date_naive();
            let uid = user_id.clone();
            // a panicking pass still reports back so the user is not stuck in flight
            let result = match tokio::spawn(async move { service.run(&uid, today).await }).await {
                Ok(Ok(counters)) => Ok(counters),
                Ok(Err(e)) => Err(e.to_string()),
                Err(e) => Err(format!("sync task aborted: {e}")),
            };
            let _ = ractor::cast!(
                me,
                SyncActorMessage::SyncComplete {
                    user_id,
                    run_id,
                    result,
                    notify
                }
            );
        });
        Ok(returned_id)
    }

    async fn handle_sweep(&self, state: &mut SyncActorState, myself: &ActorRef<SyncActorMessage>) {
        let users = match state.service.storage().list_user_ids().await {
            Ok(users) => users,
            Err(e) => {
                warn!("sweep could not list users: {}", e);
                return;
            }
        };
        let mut started = 0;
        for user_id in users {
            if state.in_flight.contains_key(&user_id) {
                continue;
            }
            match state.service.status().needs_sync(&user_id).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    warn!(user_id, "sweep status check failed: {}", e);
                    continue;
                }
            }
            match self.start_run(state, myself, user_id.clone(), None).await {
                Ok(_) => started += 1,
                Err(e) => warn!(user_id, "sweep could not start sync: {}", e),
            }
        }
        debug!(started, "sweep dispatched");
    }
}

/// Spawn the sync actor, plus the periodic sweep when `sweep_interval_secs > 0`.
pub async fn spawn(
    storage: Storage,
    cfg: &SyncConfig,
    provider: Option<FxProvider>,
    cache: Arc<ReportCache>,
) -> Result<SyncHandle, LedgerError> {
    let service = UnifiedSyncService::new(storage, provider, cfg.stale_after_hours);
    let args = SyncActorArgs {
        service: service.clone(),
        cache,
    };
    let (actor, _jh) = Actor::spawn(None, SyncActor, args)
        .await
        .map_err(|e| LedgerError::RactorError(format!("failed to spawn SyncActor: {e}")))?;

    if cfg.sweep_interval_secs > 0 {
        let me = actor.clone();
        let period = Duration::from_secs(cfg.sweep_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if ractor::cast!(me, SyncActorMessage::Sweep).is_err() {
                    break;
                }
            }
        });
    }

    Ok(SyncHandle { actor, service })
}
