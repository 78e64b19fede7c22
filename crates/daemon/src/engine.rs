//! The monitoring engine.
//!
//! One task owns the [`Engine`] and processes [`EngineMessage`]s in order.
//! Fetches and timers run in spawned tasks and report back on the same
//! channel tagged with the session id they belong to; results for a session
//! that is no longer current are dropped.

use chatwatch_api_client::{ChatPage, ChatSource, FetchError, FetchRequest};
use chatwatch_core::{
    analyze_error, ControlError, ControlRequest, ControlResponse, Deduplicator, FilterConfig,
    MonitoringState, ObserverEvent, ObserverHandle, PollState, SurfaceSignal,
};
use chatwatch_core::{Comment, ErrorInfo};
use chatwatch_local_store::{get_json, set_json, KvStore};
use chatwatch_runtime_config::WatchConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::autostop;
use crate::fanout::FanOut;
use crate::history::HistoryLedger;
use crate::poll::{PollSettings, PollTimer};
use crate::retry::{confirm_with_backoff, ConfirmPolicy};

pub const MONITORING_STATE_KEY: &str = "monitoring_state";
pub const FILTERS_KEY: &str = "comment_filters";
pub const CREDENTIAL_KEY: &str = "api_key";

const DEFAULT_AUTO_STOP_REASON: &str = "Monitoring stopped automatically";

#[derive(Debug)]
pub enum EngineMessage {
    Control {
        request: ControlRequest,
        reply: oneshot::Sender<ControlResponse>,
    },
    FetchCompleted {
        session_id: u64,
        result: Result<ChatPage, FetchError>,
    },
    TimerFired {
        session_id: u64,
    },
}

/// Engine tunables, resolved from [`WatchConfig`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub poll: PollSettings,
    pub max_messages_per_stream: usize,
    pub max_streams: usize,
    pub max_dedup_ids: usize,
    pub default_filters: FilterConfig,
    /// Used when no credential has been saved through the control surface.
    pub fallback_credential: Option<String>,
    pub confirm: ConfirmPolicy,
    pub resume_on_startup: bool,
}

impl EngineConfig {
    pub fn from_watch_config(config: &WatchConfig) -> Self {
        let api_key = config.upstream.api_key.trim();
        Self {
            poll: PollSettings::from_settings(&config.engine),
            max_messages_per_stream: config.retention.max_messages_per_stream,
            max_streams: config.retention.max_streams,
            max_dedup_ids: config.retention.max_dedup_ids,
            default_filters: config.filters,
            fallback_credential: (!api_key.is_empty()).then(|| api_key.to_string()),
            confirm: ConfirmPolicy::from_settings(&config.observer),
            resume_on_startup: config.engine.resume_on_startup,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_watch_config(&WatchConfig::default())
    }
}

/// Durable record of the session, read back on restart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDescriptor {
    pub active: bool,
    pub stream_id: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub observer: Option<ObserverHandle>,
}

#[derive(Debug, Default)]
struct Session {
    id: u64,
    active: bool,
    stream_id: Option<String>,
    chat_id: Option<String>,
    credential: String,
    continuation_token: Option<String>,
    observer: Option<ObserverHandle>,
    poll_state: PollState,
    timer: Option<PollTimer>,
}

/// Cloneable entry point for control requests.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<EngineMessage>,
}

impl EngineHandle {
    pub async fn request(&self, request: ControlRequest) -> ControlResponse {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(EngineMessage::Control { request, reply })
            .is_err()
        {
            return ControlResponse::failure(&ControlError::EngineUnavailable);
        }
        rx.await
            .unwrap_or_else(|_| ControlResponse::failure(&ControlError::EngineUnavailable))
    }
}

pub struct Engine {
    store: Arc<dyn KvStore>,
    source: Arc<dyn ChatSource>,
    fanout: FanOut,
    config: EngineConfig,
    ledger: HistoryLedger,
    dedup: Deduplicator,
    filters: FilterConfig,
    session: Session,
    next_session_id: u64,
    /// False until the first start/stop/restore; until then state queries
    /// fall back to the durable descriptor.
    initialized: bool,
    loopback: mpsc::UnboundedSender<EngineMessage>,
}

impl Engine {
    pub fn new(
        store: Arc<dyn KvStore>,
        source: Arc<dyn ChatSource>,
        fanout: FanOut,
        config: EngineConfig,
    ) -> (Self, mpsc::UnboundedReceiver<EngineMessage>) {
        let (loopback, rx) = mpsc::unbounded_channel();
        let ledger = HistoryLedger::new(
            Arc::clone(&store),
            config.max_messages_per_stream,
            config.max_streams,
        );
        let engine = Self {
            store,
            source,
            fanout,
            ledger,
            dedup: Deduplicator::new(config.max_dedup_ids),
            filters: config.default_filters,
            config,
            session: Session::default(),
            next_session_id: 0,
            initialized: false,
            loopback,
        };
        (engine, rx)
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            tx: self.loopback.clone(),
        }
    }

    pub async fn handle_message(&mut self, message: EngineMessage) {
        match message {
            EngineMessage::Control { request, reply } => {
                let response = self.handle_control(request).await;
                let _ = reply.send(response);
            }
            EngineMessage::FetchCompleted { session_id, result } => {
                self.on_fetch_completed(session_id, result).await;
            }
            EngineMessage::TimerFired { session_id } => self.on_timer(session_id),
        }
    }

    pub async fn handle_control(&mut self, request: ControlRequest) -> ControlResponse {
        let result = match request {
            ControlRequest::StartMonitoring {
                stream_id,
                chat_id,
                observer,
                filters,
            } => match self.start(stream_id, chat_id, observer, filters).await {
                Ok(()) => Ok(ControlResponse::ok().with_state(self.state().await)),
                Err(e) => Err(e),
            },
            ControlRequest::StopMonitoring => {
                self.stop().await;
                Ok(ControlResponse::ok().with_state(self.state().await))
            }
            ControlRequest::SwitchStream { stream_id, chat_id } => {
                match self.switch_stream(stream_id, chat_id).await {
                    Ok(()) => Ok(ControlResponse::ok().with_state(self.state().await)),
                    Err(e) => Err(e),
                }
            }
            ControlRequest::GetMonitoringState => {
                Ok(ControlResponse::ok().with_state(self.state().await))
            }
            ControlRequest::GetMonitoringStream => {
                let mut response = ControlResponse::ok();
                response.monitoring_stream_id = self.monitoring_stream_id().map(str::to_string);
                Ok(response)
            }
            ControlRequest::GetHistory { stream_id } => self
                .history(stream_id)
                .await
                .map(|comments| ControlResponse::ok().with_comments(comments)),
            ControlRequest::SetFilters { filters } => {
                self.set_filters(filters).await;
                Ok(ControlResponse::ok().with_filters(self.filters))
            }
            ControlRequest::GetFilters => Ok(ControlResponse::ok().with_filters(self.filters)),
            ControlRequest::SetCredential { api_key } => match self.set_credential(api_key).await {
                Ok(()) => {
                    let mut response = ControlResponse::ok();
                    response.has_credential = Some(self.credential().await.is_some());
                    Ok(response)
                }
                Err(e) => Err(e),
            },
            ControlRequest::GetCredential => {
                let mut response = ControlResponse::ok();
                response.has_credential = Some(self.credential().await.is_some());
                Ok(response)
            }
            ControlRequest::ResolveChat { stream_id } => {
                self.resolve_chat(&stream_id).await.map(|chat_id| {
                    let mut response = ControlResponse::ok();
                    response.chat_id = Some(chat_id);
                    response
                })
            }
            ControlRequest::RequestAutoStop { reason } => {
                let reason = reason
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_AUTO_STOP_REASON.to_string());
                self.auto_stop(&reason).await;
                Ok(ControlResponse::ok().with_reason(reason))
            }
            ControlRequest::SurfaceSignal { observer, signal } => {
                let mut response = ControlResponse::ok();
                if let Some(reason) = self.surface_signal(&observer, signal).await {
                    response = response.with_reason(reason);
                }
                Ok(response)
            }
        };

        result.unwrap_or_else(|e| {
            debug!("Control request failed: {e}");
            ControlResponse::failure(&e)
        })
    }

    // ── Session lifecycle ─────────────────────────────────────────────────

    /// Record a new session and kick off its first fetch. Any active session
    /// is stopped first. Does not wait for the fetch.
    pub async fn start(
        &mut self,
        stream_id: String,
        chat_id: Option<String>,
        observer: Option<ObserverHandle>,
        filters: Option<FilterConfig>,
    ) -> Result<(), ControlError> {
        let stream_id = stream_id.trim().to_string();
        if stream_id.is_empty() {
            return Err(ControlError::NoStreamTarget);
        }
        let credential = self
            .credential()
            .await
            .ok_or(ControlError::MissingCredential)?;

        let chat_id = match chat_id.filter(|c| !c.trim().is_empty()) {
            Some(chat_id) => chat_id,
            None => self.resolve_chat_with(&stream_id, &credential).await?,
        };

        if self.session.active {
            self.stop().await;
        }
        if let Some(filters) = filters {
            self.set_filters(filters).await;
        }

        // same-stream restarts keep the resident ledger
        self.ledger.retain_only(&stream_id);
        if let Err(e) = self.ledger.load(&stream_id).await {
            warn!(stream_id, "Could not load history, starting empty: {e}");
        }

        self.dedup.reset();
        self.next_session_id += 1;
        self.session = Session {
            id: self.next_session_id,
            active: true,
            stream_id: Some(stream_id.clone()),
            chat_id: Some(chat_id),
            credential,
            continuation_token: None,
            observer,
            poll_state: PollState::Idle,
            timer: None,
        };
        self.initialized = true;
        self.save_descriptor().await;

        info!(
            stream_id,
            session_id = self.session.id,
            history = self.ledger.len(&stream_id),
            "Monitoring started"
        );
        self.emit(ObserverEvent::MonitoringStateChanged {
            active: true,
            stream_id: Some(stream_id),
        });
        self.begin_fetch();
        Ok(())
    }

    /// Idempotent. Cancels the pending timer, flushes the ledger and records
    /// the inactive descriptor.
    pub async fn stop(&mut self) {
        if !self.session.active {
            if !self.initialized {
                self.initialized = true;
                self.deactivate_descriptor().await;
            }
            return;
        }

        self.session.active = false;
        if let Some(timer) = self.session.timer.take() {
            timer.cancel();
        }
        self.session.poll_state = PollState::Stopped;

        if let Some(stream_id) = self.session.stream_id.clone() {
            if let Err(e) = self.ledger.persist(&stream_id).await {
                warn!(stream_id, "Failed to flush history on stop: {e}");
            }
        }
        self.save_descriptor().await;

        info!(
            stream_id = self.session.stream_id.as_deref().unwrap_or_default(),
            session_id = self.session.id,
            "Monitoring stopped"
        );
        self.emit(ObserverEvent::MonitoringStateChanged {
            active: false,
            stream_id: self.session.stream_id.clone(),
        });
    }

    /// Stop, then start on `stream_id` with the same observer and filters.
    pub async fn switch_stream(
        &mut self,
        stream_id: String,
        chat_id: Option<String>,
    ) -> Result<(), ControlError> {
        let observer = self.session.observer.clone();
        self.stop().await;
        self.start(stream_id, chat_id, observer, None).await
    }

    /// Stop with a reason shown to observers. No-op when idle.
    pub async fn auto_stop(&mut self, reason: &str) {
        if !self.session.active {
            return;
        }
        self.stop().await;
        info!(reason, "Monitoring auto-stopped");
        self.emit(ObserverEvent::MonitoringAutoStopped {
            reason: reason.to_string(),
        });
    }

    async fn surface_signal(
        &mut self,
        from: &ObserverHandle,
        signal: SurfaceSignal,
    ) -> Option<String> {
        let reason = autostop::evaluate(
            self.session.active,
            self.session.observer.as_ref(),
            from,
            signal,
        )?;
        debug!(observer = %from, ?signal, "Surface signal ends the session");
        self.auto_stop(reason).await;
        Some(reason.to_string())
    }

    /// Restore filters, evict stale stream records and resume a session that
    /// was active when the process last exited.
    pub async fn prepare(&mut self) {
        match self.ledger.evict_oldest_streams_beyond_cap().await {
            Ok(evicted) if !evicted.is_empty() => {
                info!("Evicted history of {} stale streams", evicted.len());
            }
            Ok(_) => {}
            Err(e) => warn!("History eviction failed: {e}"),
        }

        match get_json::<FilterConfig>(self.store.as_ref(), FILTERS_KEY).await {
            Ok(Some(filters)) => self.filters = filters,
            Ok(None) => {}
            Err(e) => warn!("Could not restore filters: {e}"),
        }

        let Some(descriptor) = self.read_descriptor().await.filter(|d| d.active) else {
            return;
        };
        let Some(stream_id) = descriptor.stream_id.clone() else {
            return;
        };
        if !self.config.resume_on_startup {
            info!(stream_id, "Not resuming previous session");
            self.deactivate_descriptor().await;
            return;
        }

        let observer = match descriptor.observer {
            Some(handle) => {
                let fanout = &self.fanout;
                let target = &handle;
                let confirmed = confirm_with_backoff(&self.config.confirm, "observer", move || {
                    fanout.wait_attached(target)
                })
                .await;
                if confirmed {
                    Some(handle)
                } else {
                    warn!(observer = %handle, "Observer did not re-attach, resuming without it");
                    None
                }
            }
            None => None,
        };

        info!(stream_id, "Resuming previous session");
        if let Err(e) = self
            .start(stream_id, descriptor.chat_id, observer, None)
            .await
        {
            warn!("Could not resume previous session: {e}");
            self.initialized = true;
            self.deactivate_descriptor().await;
        }
    }

    /// Flush on shutdown. The descriptor stays active so the next start
    /// resumes.
    pub async fn suspend(&mut self) {
        if let Some(timer) = self.session.timer.take() {
            timer.cancel();
        }
        if !self.session.active {
            return;
        }
        if let Some(stream_id) = self.session.stream_id.clone() {
            match self.ledger.persist(&stream_id).await {
                Ok(()) => info!(stream_id, "History flushed for suspend"),
                Err(e) => warn!(stream_id, "Failed to flush history on suspend: {e}"),
            }
        }
    }

    // ── Poll loop ─────────────────────────────────────────────────────────

    fn is_current(&self, session_id: u64) -> bool {
        self.session.active && self.session.id == session_id
    }

    fn begin_fetch(&mut self) {
        let Some(chat_id) = self.session.chat_id.clone() else {
            return;
        };
        self.session.poll_state = PollState::Fetching;

        let source = Arc::clone(&self.source);
        let tx = self.loopback.clone();
        let session_id = self.session.id;
        let token = self.session.continuation_token.clone();
        let credential = self.session.credential.clone();
        tokio::spawn(async move {
            let result = source
                .fetch_page(FetchRequest {
                    chat_id: &chat_id,
                    continuation_token: token.as_deref(),
                    credential: &credential,
                })
                .await;
            let _ = tx.send(EngineMessage::FetchCompleted { session_id, result });
        });
    }

    async fn on_fetch_completed(&mut self, session_id: u64, result: Result<ChatPage, FetchError>) {
        if !self.is_current(session_id) {
            debug!(session_id, "Discarding stale fetch result");
            return;
        }

        let delay = match result {
            Ok(page) => {
                let delay = self.config.poll.success_delay(page.suggested_poll_interval_ms);
                self.absorb_page(page).await;
                delay
            }
            Err(err) => {
                let info = analyze_error(&err.to_string());
                warn!(
                    session_id,
                    kind = ?info.kind,
                    "Fetch failed: {}",
                    info.message
                );
                let delay = self.config.poll.failure_delay(info.kind);
                self.report_error(info);
                delay
            }
        };

        if self.is_current(session_id) {
            self.session.poll_state = PollState::Scheduled;
            self.session.timer = Some(PollTimer::schedule(
                delay,
                self.loopback.clone(),
                session_id,
            ));
            debug!(session_id, delay_ms = delay.as_millis() as u64, "Next fetch scheduled");
        }
    }

    fn on_timer(&mut self, session_id: u64) {
        if !self.is_current(session_id) {
            return;
        }
        self.session.timer = None;
        self.begin_fetch();
    }

    /// Advance the token, then dedup, filter, append, persist and fan out.
    async fn absorb_page(&mut self, page: ChatPage) {
        if let Some(token) = page.next_continuation_token {
            self.session.continuation_token = Some(token);
        }
        let Some(stream_id) = self.session.stream_id.clone() else {
            return;
        };

        let fetched = page.messages.len();
        let mut accepted = Vec::new();
        for message in page.messages {
            if !self.dedup.admit(&message.id) {
                continue;
            }
            let comment = Comment::from(message);
            if self.filters.include(comment.role) {
                accepted.push(comment);
            }
        }
        debug!(stream_id, fetched, accepted = accepted.len(), "Page processed");
        if accepted.is_empty() {
            return;
        }

        let len = self.ledger.append(&stream_id, accepted.clone());
        if let Err(e) = self.ledger.persist(&stream_id).await {
            warn!(stream_id, "Failed to persist history: {e}");
        }
        info!(stream_id, new = accepted.len(), history = len, "Accepted comments");
        self.emit(ObserverEvent::NewSpecialComments {
            stream_id,
            comments: accepted,
        });
    }

    // ── Queries and settings ──────────────────────────────────────────────

    async fn state(&self) -> MonitoringState {
        if !self.initialized {
            if let Some(descriptor) = self.read_descriptor().await {
                let history_length = match &descriptor.stream_id {
                    Some(stream_id) => self
                        .ledger
                        .read_durable(stream_id)
                        .await
                        .map_or(0, |entries| entries.len()),
                    None => 0,
                };
                return MonitoringState {
                    active: descriptor.active,
                    stream_id: descriptor.stream_id,
                    has_continuation_token: false,
                    history_length,
                    observer: descriptor.observer,
                    poll_state: PollState::Idle,
                };
            }
        }
        MonitoringState {
            active: self.session.active,
            stream_id: self.session.stream_id.clone(),
            has_continuation_token: self.session.continuation_token.is_some(),
            history_length: self
                .session
                .stream_id
                .as_deref()
                .map_or(0, |s| self.ledger.len(s)),
            observer: self.session.observer.clone(),
            poll_state: self.session.poll_state,
        }
    }

    fn monitoring_stream_id(&self) -> Option<&str> {
        if self.session.active {
            self.session.stream_id.as_deref()
        } else {
            None
        }
    }

    /// History for `stream_id` (or the current stream). A resident copy wins;
    /// an empty resident copy is recovered from the store.
    async fn history(&mut self, stream_id: Option<String>) -> Result<Vec<Comment>, ControlError> {
        let target = stream_id
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.session.stream_id.clone());
        let Some(target) = target else {
            return Ok(Vec::new());
        };

        if !self.ledger.is_resident(&target) {
            return self
                .ledger
                .read_durable(&target)
                .await
                .map_err(|e| ControlError::Store(e.to_string()));
        }

        if self.ledger.len(&target) == 0 {
            self.ledger.release(&target);
            if let Err(e) = self.ledger.load(&target).await {
                return Err(ControlError::Store(e.to_string()));
            }
            if self.ledger.len(&target) > 0 {
                info!(stream_id = target, "Recovered history from store");
            }
        } else if let Err(e) = self.ledger.persist(&target).await {
            warn!(stream_id = target, "History re-sync failed: {e}");
        }
        Ok(self.ledger.snapshot(&target))
    }

    async fn set_filters(&mut self, filters: FilterConfig) {
        self.filters = filters;
        if let Err(e) = set_json(self.store.as_ref(), FILTERS_KEY, &filters).await {
            warn!("Failed to save filters: {e}");
        }
        debug!(?filters, "Filters updated");
    }

    /// Saved credential, else the configured one.
    async fn credential(&self) -> Option<String> {
        match get_json::<String>(self.store.as_ref(), CREDENTIAL_KEY).await {
            Ok(Some(key)) if !key.trim().is_empty() => return Some(key),
            Ok(_) => {}
            Err(e) => warn!("Could not read saved credential: {e}"),
        }
        self.config.fallback_credential.clone()
    }

    async fn set_credential(&mut self, api_key: String) -> Result<(), ControlError> {
        let api_key = api_key.trim().to_string();
        let stored = if api_key.is_empty() {
            self.store.remove(CREDENTIAL_KEY).await
        } else {
            set_json(self.store.as_ref(), CREDENTIAL_KEY, &api_key).await
        };
        stored.map_err(|e| ControlError::Store(e.to_string()))?;

        if self.session.active && !api_key.is_empty() {
            self.session.credential = api_key;
        }
        info!("Credential updated");
        Ok(())
    }

    async fn resolve_chat(&mut self, stream_id: &str) -> Result<String, ControlError> {
        let stream_id = stream_id.trim();
        if stream_id.is_empty() {
            return Err(ControlError::NoStreamTarget);
        }
        let credential = self
            .credential()
            .await
            .ok_or(ControlError::MissingCredential)?;
        self.resolve_chat_with(stream_id, &credential).await
    }

    /// Resolve the live chat of `stream_id`. Upstream failures are also
    /// pushed to observers.
    async fn resolve_chat_with(
        &mut self,
        stream_id: &str,
        credential: &str,
    ) -> Result<String, ControlError> {
        match self.source.resolve_chat_id(stream_id, credential).await {
            Ok(Some(chat_id)) => {
                debug!(stream_id, chat_id, "Resolved live chat");
                Ok(chat_id)
            }
            Ok(None) => Err(ControlError::NoStreamTarget),
            Err(err) => {
                let raw = err.to_string();
                self.report_error(analyze_error(&raw));
                Err(ControlError::Upstream(raw))
            }
        }
    }

    // ── Helpers ───────────────────────────────────────────────────────────

    fn emit(&self, event: ObserverEvent) {
        let name = event.name();
        let delivery = self.fanout.notify(event, self.session.observer.as_ref());
        debug!(event = name, ?delivery, "Observer event");
    }

    fn report_error(&self, error_info: ErrorInfo) {
        self.emit(ObserverEvent::ShowDetailedError { error_info });
    }

    async fn read_descriptor(&self) -> Option<SessionDescriptor> {
        match get_json(self.store.as_ref(), MONITORING_STATE_KEY).await {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!("Could not read session descriptor: {e}");
                None
            }
        }
    }

    async fn save_descriptor(&self) {
        let descriptor = SessionDescriptor {
            active: self.session.active,
            stream_id: self.session.stream_id.clone(),
            chat_id: self.session.chat_id.clone(),
            observer: self.session.observer.clone(),
        };
        if let Err(e) = set_json(self.store.as_ref(), MONITORING_STATE_KEY, &descriptor).await {
            warn!("Failed to save session descriptor: {e}");
        }
    }

    async fn deactivate_descriptor(&self) {
        let Some(mut descriptor) = self.read_descriptor().await else {
            return;
        };
        if !descriptor.active {
            return;
        }
        descriptor.active = false;
        if let Err(e) = set_json(self.store.as_ref(), MONITORING_STATE_KEY, &descriptor).await {
            warn!("Failed to save session descriptor: {e}");
        }
    }
}

/// Drive `engine` until shutdown is signalled, then suspend it.
pub async fn run_engine(
    mut engine: Engine,
    mut rx: mpsc::UnboundedReceiver<EngineMessage>,
    mut shutdown: watch::Receiver<bool>,
) {
    engine.prepare().await;
    info!("Engine ready");

    loop {
        tokio::select! {
            Some(message) = rx.recv() => {
                engine.handle_message(message).await;
            }

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("Engine shutting down");
                    break;
                }
            }
        }
    }

    engine.suspend().await;
}
