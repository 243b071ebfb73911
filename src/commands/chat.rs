use crate::commands::session::{SendOutcome, SessionState, Snapshot};
use crate::config::ChatConfig;
use crate::error::{ChatError, FailureKind};
use crate::llm::classifier::{classify_line, ContentUpdate, LineEvent, MetadataPolicy, RunningBuffer};
use crate::llm::decoder::decode_lines;
use crate::llm::weather::{WeatherAgentClient, WeatherAgentConfig};
use crate::llm::AgentError;
use crate::notify::{NotificationKind, NotificationSink};
use crate::store::models::Message;
use crate::store::ConversationStore;
use futures::StreamExt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Written into the assistant message when a reply streams no content.
pub const FALLBACK_REPLY: &str =
    "I received your message but didn't get a proper response. Please try again.";

/// Prefix marking an assistant message as an error report.
pub const ERROR_GLYPH: &str = "\u{274C}";

struct InFlight {
    id: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Session {
    state: SessionState,
    error: Option<String>,
    last_user_message: Option<String>,
    in_flight: Option<InFlight>,
    next_request_id: u64,
}

impl Session {
    fn transition(&mut self, target: SessionState) {
        if !self.state.can_transition_to(&target) {
            warn!(from = %self.state, to = %target, "unexpected session transition");
        }
        self.state = target;
    }

    fn is_current(&self, request_id: u64) -> bool {
        self.in_flight.as_ref().is_some_and(|f| f.id == request_id)
    }
}

/// Cancels the request when the deadline passes. Dropping it disarms the timer.
struct Deadline(JoinHandle<()>);

impl Deadline {
    fn arm(cancel: CancellationToken, timeout: Duration) -> Self {
        let timeout_ms = timeout.as_millis() as u64;
        Self(tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    warn!(timeout_ms, "request deadline reached, cancelling");
                    cancel.cancel();
                }
            }
        }))
    }
}

impl Drop for Deadline {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Returns the controller to Idle when a send ends, however it ends.
struct RequestGuard<'a> {
    controller: &'a ChatController,
    request_id: u64,
    _deadline: Deadline,
}

impl Drop for RequestGuard<'_> {
    fn drop(&mut self) {
        self.controller.release(self.request_id);
    }
}

/// Drives one conversation UI: sends messages to the weather agent, streams
/// replies into the conversation store, and publishes snapshots.
///
/// At most one request is in flight. A new send cancels the outstanding one
/// before starting; the cancelled reply keeps whatever content it had.
pub struct ChatController {
    client: WeatherAgentClient,
    store: ConversationStore,
    policy: MetadataPolicy,
    sink: Arc<dyn NotificationSink>,
    session: Mutex<Session>,
    updates: watch::Sender<Snapshot>,
    request_timeout: Duration,
    max_message_chars: usize,
}

impl ChatController {
    pub fn new(config: &ChatConfig, sink: Arc<dyn NotificationSink>) -> Self {
        let (updates, _) = watch::channel(Snapshot::default());
        Self {
            client: WeatherAgentClient::new(WeatherAgentConfig::from(config)),
            store: ConversationStore::new(),
            policy: config.metadata_policy(),
            sink,
            session: Mutex::new(Session::default()),
            updates,
            request_timeout: config.request_timeout(),
            max_message_chars: config.max_message_chars,
        }
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Reads ──

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn state(&self) -> SessionState {
        self.session().state
    }

    pub fn error(&self) -> Option<String> {
        self.session().error.clone()
    }

    pub fn last_user_message(&self) -> Option<String> {
        self.session().last_user_message.clone()
    }

    pub fn snapshot(&self) -> Snapshot {
        let (conversations, active_conversation_id) = self.store.snapshot();
        let session = self.session();
        Snapshot {
            conversations,
            active_conversation_id,
            is_loading: session.state.is_busy(),
            error: session.error.clone(),
            state: session.state,
        }
    }

    /// Receive a fresh snapshot after every state change.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.updates.subscribe()
    }

    fn publish(&self) {
        self.updates.send_replace(self.snapshot());
    }

    // ── Conversations ──

    pub fn create_new_conversation(&self) -> String {
        let id = self.store.create_conversation();
        self.session().error = None;
        self.publish();
        id
    }

    pub fn select_conversation(&self, id: &str) -> bool {
        let selected = self.store.select_conversation(id);
        if selected {
            self.session().error = None;
            self.publish();
        }
        selected
    }

    pub fn delete_conversation(&self, id: &str) -> bool {
        let deleted = self.store.delete_conversation(id);
        if deleted {
            self.publish();
        }
        deleted
    }

    pub fn clear_error(&self) {
        self.session().error = None;
        self.publish();
    }

    /// Abort any in-flight reply and empty the active conversation.
    pub fn clear_chat(&self) {
        {
            let mut session = self.session();
            if let Some(in_flight) = session.in_flight.take() {
                info!(request_id = in_flight.id, "clearing chat, cancelling request");
                in_flight.cancel.cancel();
                session.transition(SessionState::Idle);
            }
            session.error = None;
        }
        if let Some(id) = self.store.active_conversation_id() {
            self.store.clear(&id);
        }
        self.publish();
    }

    // ── Messages ──

    /// Send a message and stream the agent's reply into the active conversation.
    ///
    /// Only validation problems are returned as errors; they leave the
    /// conversation untouched. Everything that goes wrong after that is
    /// reported through the returned [`SendOutcome`], the `error` field,
    /// and an error message in the conversation.
    pub async fn send_message(&self, text: &str) -> Result<SendOutcome, ChatError> {
        let content = self.validate(text)?;

        let conversation_id = self.store.ensure_active();
        self.store
            .append_message(&conversation_id, Message::user(content.clone()));
        let (request_id, cancel) = self.begin_request(&content);
        self.publish();

        let guard = RequestGuard {
            controller: self,
            request_id,
            _deadline: Deadline::arm(cancel.clone(), self.request_timeout),
        };
        let outcome = self
            .stream_reply(request_id, &conversation_id, &content, &cancel)
            .await;
        let outcome = self.settle(request_id, &conversation_id, outcome);
        drop(guard);
        Ok(outcome)
    }

    /// Resend the last submitted message. Returns `None` while a request is
    /// outstanding or when nothing has been sent yet.
    pub async fn retry_last_message(&self) -> Option<Result<SendOutcome, ChatError>> {
        let last = {
            let session = self.session();
            if session.state.is_busy() {
                return None;
            }
            session.last_user_message.clone()
        }?;
        self.clear_error();
        Some(self.send_message(&last).await)
    }

    fn validate(&self, text: &str) -> Result<String, ChatError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if trimmed.chars().count() > self.max_message_chars {
            let err = ChatError::MessageTooLong(self.max_message_chars);
            self.session().error = Some(err.to_string());
            self.publish();
            return Err(err);
        }
        Ok(trimmed.to_string())
    }

    fn begin_request(&self, content: &str) -> (u64, CancellationToken) {
        let mut session = self.session();
        if let Some(previous) = session.in_flight.take() {
            info!(request_id = previous.id, "new message preempts in-flight request");
            previous.cancel.cancel();
        }
        session.next_request_id += 1;
        let id = session.next_request_id;
        let cancel = CancellationToken::new();
        session.in_flight = Some(InFlight {
            id,
            cancel: cancel.clone(),
        });
        session.transition(SessionState::Sending);
        session.error = None;
        session.last_user_message = Some(content.to_string());
        (id, cancel)
    }

    /// Enter Streaming and open the assistant reply, unless a newer request
    /// took over.
    fn mark_streaming(&self, request_id: u64, conversation_id: &str) -> bool {
        let mut session = self.session();
        if !session.is_current(request_id) {
            return false;
        }
        session.transition(SessionState::Streaming);
        self.store
            .append_message(conversation_id, Message::assistant(""));
        true
    }

    /// Run a store write only while `request_id` owns the session. The session
    /// lock is held across the write.
    fn write_if_current(
        &self,
        request_id: u64,
        write: impl FnOnce(&ConversationStore) -> bool,
    ) -> bool {
        let session = self.session();
        session.is_current(request_id) && write(&self.store)
    }

    fn release(&self, request_id: u64) {
        {
            let mut session = self.session();
            if !session.is_current(request_id) {
                return;
            }
            session.in_flight = None;
            session.transition(SessionState::Idle);
        }
        debug!(request_id, "request released");
        self.publish();
    }

    async fn stream_reply(
        &self,
        request_id: u64,
        conversation_id: &str,
        content: &str,
        cancel: &CancellationToken,
    ) -> SendOutcome {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return SendOutcome::Aborted,
            result = self.client.open_stream(content) => result,
        };
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                debug!(error = %e, "agent request failed");
                return SendOutcome::Failed(FailureKind::from(&e));
            }
        };

        if cancel.is_cancelled() || !self.mark_streaming(request_id, conversation_id) {
            return SendOutcome::Aborted;
        }
        self.sink.notify(NotificationKind::Message);
        self.publish();

        let lines = decode_lines(response.bytes_stream());
        tokio::pin!(lines);
        let mut buffer = RunningBuffer::new();
        let mut received_content = false;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return SendOutcome::Aborted,
                next = lines.next() => next,
            };
            match next {
                Some(Ok(line)) => {
                    if self.apply_line(request_id, conversation_id, &line, &mut buffer) {
                        received_content = true;
                        self.publish();
                    }
                }
                Some(Err(e)) => {
                    let e = AgentError::from(e);
                    debug!(error = %e, "failed to read response body");
                    return SendOutcome::Failed(FailureKind::from(&e));
                }
                None => break,
            }
        }

        if !received_content {
            let written = self.write_if_current(request_id, |store| {
                store.mutate_last_message(conversation_id, FALLBACK_REPLY.to_string())
            });
            if !written && cancel.is_cancelled() {
                return SendOutcome::Aborted;
            }
            warn!("no content received from agent, using fallback reply");
            return SendOutcome::Fallback;
        }
        SendOutcome::Completed
    }

    /// Classify one line and apply it to the trailing assistant message.
    /// Returns true if the line carried assistant text that was written.
    fn apply_line(
        &self,
        request_id: u64,
        conversation_id: &str,
        line: &str,
        buffer: &mut RunningBuffer,
    ) -> bool {
        let event = classify_line(line, &self.policy);
        match &event {
            LineEvent::Malformed(reason) => {
                warn!(%reason, line, "failed to parse streaming data");
            }
            LineEvent::Metadata => debug!(line, "skipping metadata line"),
            _ => {}
        }
        match buffer.apply(event) {
            Some(ContentUpdate::Append(delta)) => self.write_if_current(request_id, |store| {
                store.append_to_last_message(conversation_id, &delta)
            }),
            Some(ContentUpdate::Replace(content)) => self.write_if_current(request_id, |store| {
                store.mutate_last_message(conversation_id, content)
            }),
            None => false,
        }
    }

    /// Surface the outcome: notifications, and for failures the error field
    /// plus an error message in the conversation.
    fn settle(&self, request_id: u64, conversation_id: &str, outcome: SendOutcome) -> SendOutcome {
        let outcome = match outcome {
            SendOutcome::Failed(kind) => {
                let mut session = self.session();
                if session.is_current(request_id) {
                    let message = kind.user_message();
                    self.store.append_message(
                        conversation_id,
                        Message::assistant(format!("{} {}", ERROR_GLYPH, message)),
                    );
                    session.error = Some(message);
                    SendOutcome::Failed(kind)
                } else {
                    debug!(kind = %kind.kind_tag(), "failure after cancellation ignored");
                    SendOutcome::Aborted
                }
            }
            other => other,
        };

        match &outcome {
            SendOutcome::Completed => {
                info!(request_id, "reply completed");
                self.sink.notify(NotificationKind::Success);
            }
            SendOutcome::Fallback => info!(request_id, "reply completed without content"),
            SendOutcome::Aborted => info!(request_id, "request aborted"),
            SendOutcome::Failed(kind) => {
                let message = kind.user_message();
                error!(request_id, kind = %kind.kind_tag(), %message, "chat request failed");
                self.sink.notify(NotificationKind::Error);
            }
        }
        outcome
    }
}

impl Drop for ChatController {
    fn drop(&mut self) {
        if let Some(in_flight) = self.session().in_flight.take() {
            in_flight.cancel.cancel();
        }
    }
}
