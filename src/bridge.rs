//! The session/capture state machine and suggestion scheduling.
//!
//! All mutable state lives in one [`BridgeState`] behind a single lock. Each
//! handler applies its transition under the lock and returns; calls to the
//! sink run on a spawned task, so a stalled external tool holds up only the
//! work that issued it. The lock is never held across such a call, and
//! anything read after one is re-validated (debounce token, prompt epoch)
//! before it is written back.

use crate::clock::Clock;
use crate::config::BridgeConfig;
use crate::correlation::{analyze, CorrelationResult};
use crate::events::{HostEvent, SessionInfo, TokenUsage};
use crate::feedback::FeedbackEmitter;
use crate::host::{Host, LogEntry, LogLevel};
use crate::marker::extract_markers;
use crate::scheduler::{DebounceToken, SchedulerState};
use crate::sink::{ExternalSink, PromptCapture, ResponseCapture, SuggestRequest, SuggestionReport};
use crate::suggestion::{prepare_suggestion, Suggestion};
use colored::Colorize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub session_id: Option<String>,
    pub model: Option<String>,
    pub parent_id: Option<String>,
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CaptureState {
    #[default]
    Idle,
    PromptCaptured,
}

/// Everything the bridge remembers; lost on restart
#[derive(Debug, Default)]
pub struct BridgeState {
    pub session: Session,
    pub capture: CaptureState,
    /// Streamed assistant text, append-only while a prompt is captured
    pub buffer: Vec<String>,
    pub suggestion: Option<Suggestion>,
    pub scheduler: SchedulerState,
    /// Bumped on every captured prompt
    prompt_epoch: u64,
}

impl BridgeState {
    fn reset_capture(&mut self) {
        self.capture = CaptureState::Idle;
        self.buffer.clear();
    }
}

// ============================================================================
// Bridge
// ============================================================================

pub struct SuggestionBridge {
    config: BridgeConfig,
    sink: Arc<dyn ExternalSink>,
    host: Arc<dyn Host>,
    clock: Arc<dyn Clock>,
    feedback: FeedbackEmitter,
    state: Mutex<BridgeState>,
}

impl SuggestionBridge {
    pub fn new(
        config: BridgeConfig,
        sink: Arc<dyn ExternalSink>,
        host: Arc<dyn Host>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let feedback = FeedbackEmitter::new(
            Arc::clone(&sink),
            Arc::clone(&clock),
            &config.source,
            config.feedback_enabled && !config.dry_run,
        );
        Self {
            config,
            sink,
            host,
            clock,
            feedback,
            state: Mutex::new(BridgeState::default()),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// The sink, unless dry-run suppresses external invocations
    fn external(&self) -> Option<&dyn ExternalSink> {
        if self.config.dry_run {
            None
        } else {
            Some(self.sink.as_ref())
        }
    }

    /// Trace locally and mirror to the host; a failing host log is ignored
    async fn log(&self, level: LogLevel, message: String, extra: serde_json::Value) {
        match level {
            LogLevel::Debug => debug!("{}", message),
            LogLevel::Info => info!("{}", message),
            LogLevel::Warn => warn!("{}", message),
            LogLevel::Error => error!("{}", message),
        }
        let _ = self.host.log(LogEntry::new(level, message, extra)).await;
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    pub async fn capture_state(&self) -> CaptureState {
        self.state.lock().await.capture
    }

    pub async fn buffered_text(&self) -> String {
        self.state.lock().await.buffer.concat()
    }

    pub async fn live_suggestion(&self) -> Option<Suggestion> {
        self.state.lock().await.suggestion.clone()
    }

    pub async fn session(&self) -> Session {
        self.state.lock().await.session.clone()
    }

    // ------------------------------------------------------------------------
    // Event dispatch
    // ------------------------------------------------------------------------

    /// Route one host event.
    ///
    /// State transitions are applied before this returns. Any external work
    /// the event started (captures, feedback, a debounce timer) keeps running
    /// on the returned task.
    pub async fn handle(self: &Arc<Self>, event: HostEvent) -> Option<JoinHandle<()>> {
        match event {
            HostEvent::ChatMessage { session, output } => {
                self.on_user_prompt(
                    session.session_id.as_deref(),
                    session.model_id(),
                    &output.text(),
                )
                .await
            }
            HostEvent::PartUpdated { part } => {
                if let Some(text) = part.text() {
                    self.on_assistant_fragment(text).await;
                }
                None
            }
            HostEvent::MessageUpdated { info } if info.is_assistant() => {
                self.on_assistant_complete(
                    info.session_id.as_deref(),
                    info.model_id.as_deref(),
                    info.tokens,
                )
                .await
            }
            HostEvent::MessageUpdated { .. } => None,
            HostEvent::SessionCreated { info } => {
                self.on_session_created(&info).await;
                None
            }
            HostEvent::PromptAppend { text } => Some(self.on_ui_trigger(&text).await),
            HostEvent::Other => None,
        }
    }

    // ------------------------------------------------------------------------
    // Capture state machine
    // ------------------------------------------------------------------------

    /// A new user prompt: correlate against the live suggestion, then capture it.
    ///
    /// Returns the task sending feedback and the capture, or `None` for a
    /// blank prompt.
    pub async fn on_user_prompt(
        self: &Arc<Self>,
        session_id: Option<&str>,
        model: Option<&str>,
        text: &str,
    ) -> Option<JoinHandle<()>> {
        let prompt = text.trim();
        if prompt.is_empty() {
            return None;
        }
        let now = self.clock.now();

        let (epoch, classification, capture) = {
            let mut state = self.state.lock().await;
            if let Some(id) = session_id {
                state.session.session_id = Some(id.to_string());
            }
            if let Some(model) = model {
                state.session.model = Some(model.to_string());
            }
            state.capture = CaptureState::PromptCaptured;
            state.buffer.clear();
            state.prompt_epoch += 1;

            let window = self.config.correlation_window_ms;
            let classification = match state.suggestion.as_mut() {
                Some(suggestion) if !suggestion.accepted_feedback_sent => {
                    let result = analyze(prompt, Some(&*suggestion), now, window);
                    if result.is_some() {
                        suggestion.accepted_feedback_sent = true;
                    }
                    result.map(|r| (suggestion.id, r))
                }
                _ => None,
            };

            let capture = PromptCapture {
                prompt: text.to_string(),
                session_id: state.session.session_id.clone(),
                model: state.session.model.clone(),
                workspace: state
                    .session
                    .directory
                    .clone()
                    .or_else(|| self.config.workspace.clone()),
            };
            (state.prompt_epoch, classification, capture)
        };

        let bridge = Arc::clone(self);
        Some(tokio::spawn(async move {
            bridge.finish_prompt(epoch, classification, capture).await;
        }))
    }

    async fn finish_prompt(
        &self,
        epoch: u64,
        classification: Option<(Uuid, CorrelationResult)>,
        capture: PromptCapture,
    ) {
        if let Some((suggestion_id, result)) = classification {
            info!(
                "Prompt {} suggestion {} ({}, overlap {:.2})",
                result.kind.as_str(),
                suggestion_id,
                result.key,
                result.overlap
            );
            self.feedback.emit_correlation(suggestion_id, &result).await;
        }

        let Some(sink) = self.external() else {
            debug!("Dry run, skipping prompt capture");
            return;
        };
        if let Err(e) = sink.capture_prompt(&capture).await {
            self.log(
                LogLevel::Warn,
                format!("Prompt capture failed: {}", e),
                json!({"session_id": capture.session_id}),
            )
            .await;

            let mut state = self.state.lock().await;
            // A newer prompt owns the capture state now
            if state.prompt_epoch == epoch && state.capture == CaptureState::PromptCaptured {
                state.reset_capture();
            }
        }
    }

    /// Streamed assistant text; dropped unless a prompt is captured
    pub async fn on_assistant_fragment(&self, text: &str) {
        let mut state = self.state.lock().await;
        if state.capture == CaptureState::PromptCaptured {
            state.buffer.push(text.to_string());
        }
    }

    /// The assistant finished: check markers, capture the response, expire the suggestion.
    ///
    /// Returns the task sending feedback and the capture, or `None` when no
    /// prompt was captured.
    pub async fn on_assistant_complete(
        self: &Arc<Self>,
        session_id: Option<&str>,
        model: Option<&str>,
        tokens: TokenUsage,
    ) -> Option<JoinHandle<()>> {
        let now = self.clock.now();
        let window = self.config.correlation_window_ms;

        let (response, implicit, session) = {
            let mut state = self.state.lock().await;
            if state.capture != CaptureState::PromptCaptured {
                return None;
            }
            let response = state.buffer.concat();
            state.reset_capture();

            let mut implicit = None;
            if !response.is_empty() {
                if let Some(suggestion) = state.suggestion.as_mut() {
                    if suggestion.is_within_window(now, window) && !suggestion.implicit_feedback_sent {
                        let matched: Vec<String> = extract_markers(&response)
                            .into_iter()
                            .filter(|key| suggestion.shown_keys.contains(key))
                            .collect();
                        match matched.as_slice() {
                            [key] => {
                                suggestion.implicit_feedback_sent = true;
                                implicit = Some((suggestion.id, key.clone()));
                            }
                            [] => {}
                            many => debug!("Ambiguous markers {:?}, no implicit feedback", many),
                        }
                    }
                }
            }

            if state
                .suggestion
                .as_ref()
                .is_some_and(|s| !s.is_within_window(now, window))
            {
                debug!("Suggestion outside correlation window, discarding");
                state.suggestion = None;
            }

            (response, implicit, state.session.clone())
        };

        let capture = ResponseCapture {
            response,
            session_id: session_id.map(str::to_string).or(session.session_id),
            model: model.map(str::to_string).or(session.model),
            tokens,
        };
        let bridge = Arc::clone(self);
        Some(tokio::spawn(async move {
            bridge.finish_response(implicit, capture).await;
        }))
    }

    async fn finish_response(&self, implicit: Option<(Uuid, String)>, capture: ResponseCapture) {
        if let Some((suggestion_id, key)) = implicit {
            info!("Assistant marked {} as used (suggestion {})", key, suggestion_id);
            self.feedback.emit_implicit(suggestion_id, &key).await;
        }

        if capture.response.is_empty() {
            return;
        }
        let Some(sink) = self.external() else {
            debug!("Dry run, skipping response capture");
            return;
        };
        if let Err(e) = sink.capture_response(&capture).await {
            self.log(
                LogLevel::Warn,
                format!("Response capture failed: {}", e),
                json!({"session_id": capture.session_id}),
            )
            .await;
        }
    }

    /// New (possibly child) session: reset capture, keep the suggestion
    pub async fn on_session_created(&self, info: &SessionInfo) {
        let mut state = self.state.lock().await;
        state.reset_capture();
        state.session = Session {
            session_id: Some(info.id.clone()),
            model: None,
            parent_id: info.parent_id.clone(),
            directory: info.directory.clone(),
        };
        debug!("Session {} created", info.id);
    }

    // ------------------------------------------------------------------------
    // Suggestion scheduling
    // ------------------------------------------------------------------------

    /// Record a UI trigger and start its debounce timer
    pub async fn on_ui_trigger(self: &Arc<Self>, text: &str) -> JoinHandle<()> {
        let token = self.schedule_suggestion(text).await;
        let bridge = Arc::clone(self);
        let delay = Duration::from_millis(self.config.debounce_ms);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            bridge.fire_suggestion(token).await;
        })
    }

    /// Record `text` as the pending input, invalidating earlier tokens
    pub async fn schedule_suggestion(&self, text: &str) -> DebounceToken {
        self.state.lock().await.scheduler.schedule(text)
    }

    /// Debounce timer body: fetch, install and inject a suggestion if `token` is still current
    pub async fn fire_suggestion(&self, token: DebounceToken) {
        let (prompt, attributes) = {
            let state = self.state.lock().await;
            match state.scheduler.claim(token, self.config.skip_trivial_prompts) {
                Ok(prompt) => (prompt, self.attributes(&state.session)),
                Err(reason) => {
                    debug!(
                        "Debounced trigger {} skipped: {}",
                        token.generation(),
                        reason.as_str()
                    );
                    return;
                }
            }
        };

        let Some(sink) = self.external() else {
            debug!("Dry run, skipping suggestion fetch");
            return;
        };

        let request = SuggestRequest {
            prompt: prompt.clone(),
            limit: self.config.limit,
            provision: self.config.provision,
        };
        let raw = match sink.fetch_suggestion(&request).await {
            Ok(raw) => raw,
            Err(e) => {
                self.log(
                    LogLevel::Warn,
                    format!("Suggestion fetch failed: {}", e),
                    json!({"generation": token.generation()}),
                )
                .await;
                return;
            }
        };

        let Some(prepared) = prepare_suggestion(&raw, self.config.provision) else {
            debug!("Fetch for trigger {} produced nothing to show", token.generation());
            return;
        };
        let rendered = prepared.rendered.clone();

        let report = {
            let mut state = self.state.lock().await;
            if !state.scheduler.is_current(token) {
                debug!("Discarding fetch for superseded trigger {}", token.generation());
                return;
            }
            let suggestion = Suggestion::new(prepared, &prompt, self.clock.now());
            let report = SuggestionReport {
                id: suggestion.id,
                prompt: prompt.clone(),
                source: self.config.source.clone(),
                shown_keys: suggestion.shown_keys.to_vec(),
                attributes,
            };
            if let Some(previous) = state.suggestion.replace(suggestion) {
                debug!("Suggestion {} replaced", previous.id);
            }
            state.scheduler.mark_injected(&rendered);
            report
        };

        info!(
            "{} Suggestion {} shown: {}",
            "💡".green(),
            report.id,
            report.shown_keys.join(", ").bold()
        );

        if let Err(e) = sink.report_suggestion(&report).await {
            self.log(
                LogLevel::Warn,
                format!("Suggestion report failed: {}", e),
                json!({"suggestion_id": report.id.to_string()}),
            )
            .await;
        }

        if let Err(e) = self.host.append_prompt(&rendered).await {
            self.log(
                LogLevel::Warn,
                format!("Suggestion injection failed: {}", e),
                json!({"suggestion_id": report.id.to_string()}),
            )
            .await;
        }
    }

    fn attributes(&self, session: &Session) -> serde_json::Value {
        json!({
            "session_id": session.session_id,
            "parent_id": session.parent_id,
            "model": session.model,
            "directory": session.directory.as_ref().map(|d| d.display().to_string()),
            "provision": self.config.provision,
        })
    }
}
