//! Per-session actor coordinating retrieval, prompting, and dispatch.
//!
//! Each chat session runs as one actor task owning all mutable session
//! state: history, connection state, and the sequence counter. Commands
//! arrive over a flume channel from the client-facing handle and from the
//! in-flight query task, so within a session everything is strictly
//! serialized while separate sessions progress freely in parallel.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::events::{ErrorCode, SessionEvent, WireEvent};
use super::sink::SessionSink;
use crate::boundary::{BoundaryError, ProfileStore};
use crate::embedder::EmbedError;
use crate::message::{ChatMessage, ContextChunk};
use crate::prompt::PromptAssembler;
use crate::providers::{DispatchError, ProviderDispatcher, ProviderError, ProviderRegistry};
use crate::retriever::{RetrieveError, Retriever};
use crate::types::{MessageId, ProfileId, SessionId};

/// Errors returned to the client-facing handle.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// A response is already in flight; the message was not accepted.
    #[error("session is busy with an in-flight response")]
    Busy,
    /// The session actor has shut down.
    #[error("session is closed")]
    Closed,
}

/// Failure anywhere on the query path, mapped to a client error code.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Profile(#[from] BoundaryError),
    #[error(transparent)]
    Retrieve(#[from] RetrieveError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl QueryError {
    fn code(&self) -> ErrorCode {
        match self {
            QueryError::Dispatch(DispatchError::Timeout(_)) => ErrorCode::Timeout,
            QueryError::Dispatch(DispatchError::Provider(ProviderError::RateLimited))
            | QueryError::Retrieve(RetrieveError::Embed(EmbedError::RateLimited)) => {
                ErrorCode::RateLimited
            }
            QueryError::Dispatch(_) | QueryError::Retrieve(RetrieveError::Embed(_)) => {
                ErrorCode::ProviderUnavailable
            }
            QueryError::Profile(_) | QueryError::Retrieve(_) => ErrorCode::Internal,
        }
    }
}

/// The full query path for one user message: profile snapshot, retrieval,
/// prompt assembly, dispatch.
pub struct QueryPipeline {
    profiles: Arc<dyn ProfileStore>,
    retriever: Retriever,
    providers: Arc<dyn ProviderRegistry>,
    dispatcher: ProviderDispatcher,
}

impl QueryPipeline {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        retriever: Retriever,
        providers: Arc<dyn ProviderRegistry>,
        dispatcher: ProviderDispatcher,
    ) -> Self {
        Self {
            profiles,
            retriever,
            providers,
            dispatcher,
        }
    }

    /// Answers `question`, streaming tokens into `tokens`; returns the full
    /// text and the context chunks that grounded it.
    ///
    /// The profile is fetched fresh here and the provider client resolved
    /// from that snapshot, so edits (including provider switches) apply to
    /// the next message and never to one already in flight.
    pub async fn answer(
        &self,
        profile_id: ProfileId,
        question: &str,
        tokens: flume::Sender<String>,
    ) -> Result<(String, Vec<ContextChunk>), QueryError> {
        let profile = self.profiles.get_profile(profile_id).await?;
        let chunks = self.retriever.retrieve(&profile, question).await?;
        let assembled = PromptAssembler::assemble(&profile, question, &chunks);
        let provider = self.providers.provider_for(&profile.provider);
        let text = self
            .dispatcher
            .dispatch(provider.as_ref(), &assembled.request, tokens)
            .await?;
        Ok((text, assembled.context))
    }
}

enum Command {
    Connect {
        sink: Box<dyn SessionSink>,
    },
    Disconnect,
    Send {
        content: String,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    History {
        reply: oneshot::Sender<Vec<ChatMessage>>,
    },
    Close,
    // Posted back by the in-flight query task; only the actor ever touches
    // the sequence counter or history.
    StreamDelta(String),
    Completed {
        text: String,
        context: Vec<ContextChunk>,
        response_time_ms: u64,
    },
    Failed {
        code: ErrorCode,
        message: String,
    },
}

/// Client-facing handle to a running session actor.
#[derive(Clone)]
pub struct SessionHandle {
    session_id: SessionId,
    tx: flume::Sender<Command>,
}

impl SessionHandle {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Attaches (or replaces) the client transport and emits
    /// `session_joined`.
    pub fn connect(&self, sink: impl SessionSink + 'static) -> Result<(), SessionError> {
        self.tx
            .send(Command::Connect {
                sink: Box::new(sink),
            })
            .map_err(|_| SessionError::Closed)
    }

    /// Signals transport loss; session state is preserved server-side.
    pub fn disconnect(&self) -> Result<(), SessionError> {
        self.tx
            .send(Command::Disconnect)
            .map_err(|_| SessionError::Closed)
    }

    /// Submits a user message. Rejected with [`SessionError::Busy`] while a
    /// response is in flight.
    pub async fn send_message(&self, content: impl Into<String>) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send_async(Command::Send {
                content: content.into(),
                reply,
            })
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    /// Full append-only message history; the client's recovery path after a
    /// reconnect.
    pub async fn history(&self) -> Result<Vec<ChatMessage>, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send_async(Command::History { reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Closes the session, cancelling any in-flight generation.
    pub fn close(&self) -> Result<(), SessionError> {
        self.tx.send(Command::Close).map_err(|_| SessionError::Closed)
    }
}

/// Spawns session actors bound to one query pipeline.
pub struct SessionOrchestrator {
    pipeline: Arc<QueryPipeline>,
}

impl SessionOrchestrator {
    pub fn new(pipeline: Arc<QueryPipeline>) -> Self {
        Self { pipeline }
    }

    /// Starts a new session actor for `profile_id` and returns its handle.
    pub fn open_session(&self, profile_id: ProfileId) -> SessionHandle {
        let session_id = SessionId::new();
        let (tx, rx) = flume::unbounded();
        let actor = SessionActor {
            session_id,
            profile_id,
            pipeline: Arc::clone(&self.pipeline),
            tx: tx.clone(),
            sink: None,
            ever_connected: false,
            next_seq: 0,
            history: Vec::new(),
            activity: Activity::Idle,
        };
        tokio::spawn(actor.run(rx));
        info!(session_id = %session_id, profile_id = %profile_id, "session opened");
        SessionHandle { session_id, tx }
    }
}

/// What the session is doing right now. `Idle` accepts a new message;
/// `AwaitingResponse` rejects further sends until the query task posts its
/// outcome. The assistant message id is allocated on entry so every
/// streamed delta can carry the id the final `ai_complete` message will
/// have.
enum Activity {
    Idle,
    AwaitingResponse {
        message_id: MessageId,
        task: JoinHandle<()>,
    },
}

struct SessionActor {
    session_id: SessionId,
    profile_id: ProfileId,
    pipeline: Arc<QueryPipeline>,
    /// Sender back into our own inbox, cloned into the query task.
    tx: flume::Sender<Command>,
    sink: Option<Box<dyn SessionSink>>,
    ever_connected: bool,
    next_seq: u64,
    history: Vec<ChatMessage>,
    activity: Activity,
}

impl SessionActor {
    async fn run(mut self, inbox: flume::Receiver<Command>) {
        while let Ok(command) = inbox.recv_async().await {
            match command {
                Command::Connect { sink } => self.on_connect(sink),
                Command::Disconnect => {
                    debug!(session_id = %self.session_id, "transport lost, state preserved");
                    self.sink = None;
                }
                Command::Send { content, reply } => self.on_send(content, reply),
                Command::History { reply } => {
                    let _ = reply.send(self.history.clone());
                }
                Command::StreamDelta(token) => {
                    if let Activity::AwaitingResponse { message_id, .. } = &self.activity {
                        let message_id = *message_id;
                        self.emit(WireEvent::AiStreaming {
                            message_id,
                            content_delta: token,
                            is_complete: false,
                        });
                    }
                }
                Command::Completed {
                    text,
                    context,
                    response_time_ms,
                } => self.on_completed(text, context, response_time_ms),
                Command::Failed { code, message } => self.on_failed(code, message),
                Command::Close => {
                    if let Activity::AwaitingResponse { task, .. } =
                        std::mem::replace(&mut self.activity, Activity::Idle)
                    {
                        task.abort();
                    }
                    info!(session_id = %self.session_id, "session closed");
                    break;
                }
            }
        }
    }

    fn on_connect(&mut self, sink: Box<dyn SessionSink>) {
        let resumed = self.ever_connected;
        self.sink = Some(sink);
        self.ever_connected = true;
        debug!(session_id = %self.session_id, resumed, "client joined");
        self.emit(WireEvent::SessionJoined { resumed });
    }

    fn on_send(&mut self, content: String, reply: oneshot::Sender<Result<(), SessionError>>) {
        if matches!(self.activity, Activity::AwaitingResponse { .. }) {
            let _ = reply.send(Err(SessionError::Busy));
            self.emit(WireEvent::Error {
                code: ErrorCode::SessionBusy,
                message: "a response is already in flight".into(),
            });
            return;
        }
        let _ = reply.send(Ok(()));

        let message = ChatMessage::user(self.session_id, content.clone());
        self.history.push(message.clone());
        self.emit(WireEvent::MessageReceived { message });
        self.emit(WireEvent::TypingIndicator { typing: true });

        let pipeline = Arc::clone(&self.pipeline);
        let profile_id = self.profile_id;
        let inbox = self.tx.clone();
        let task = tokio::spawn(async move {
            let started = Instant::now();
            let (token_tx, token_rx) = flume::unbounded();
            let relay = {
                let inbox = inbox.clone();
                tokio::spawn(async move {
                    while let Ok(token) = token_rx.recv_async().await {
                        if inbox.send_async(Command::StreamDelta(token)).await.is_err() {
                            break;
                        }
                    }
                })
            };

            let result = pipeline.answer(profile_id, &content, token_tx).await;
            // All deltas are in the inbox before the outcome is posted.
            let _ = relay.await;
            let outcome = match result {
                Ok((text, context)) => Command::Completed {
                    text,
                    context,
                    response_time_ms: started.elapsed().as_millis() as u64,
                },
                Err(err) => Command::Failed {
                    code: err.code(),
                    message: err.to_string(),
                },
            };
            let _ = inbox.send_async(outcome).await;
        });
        self.activity = Activity::AwaitingResponse {
            message_id: MessageId::new(),
            task,
        };
    }

    fn on_completed(&mut self, text: String, context: Vec<ContextChunk>, response_time_ms: u64) {
        let Activity::AwaitingResponse { message_id, .. } =
            std::mem::replace(&mut self.activity, Activity::Idle)
        else {
            return;
        };
        self.emit(WireEvent::TypingIndicator { typing: false });
        let mut message = ChatMessage::assistant(self.session_id, text, context);
        // Same id the streamed deltas carried.
        message.id = message_id;
        self.history.push(message.clone());
        debug!(
            session_id = %self.session_id,
            response_time_ms,
            context_chunks = message.context_chunks.len(),
            "assistant response complete"
        );
        self.emit(WireEvent::AiComplete {
            message,
            response_time_ms,
        });
    }

    fn on_failed(&mut self, code: ErrorCode, message: String) {
        self.activity = Activity::Idle;
        warn!(session_id = %self.session_id, ?code, error = %message, "query failed");
        self.emit(WireEvent::TypingIndicator { typing: false });
        self.emit(WireEvent::Error { code, message });
    }

    /// Wraps `event` in the session envelope, assigning the next sequence
    /// number to sequenced events, and delivers it if a client is attached.
    /// Sequence numbers advance even while disconnected; the client closes
    /// any gap by re-fetching history.
    fn emit(&mut self, event: WireEvent) {
        let seq = event.is_sequenced().then(|| {
            let seq = self.next_seq;
            self.next_seq += 1;
            seq
        });
        let envelope = SessionEvent {
            session_id: self.session_id,
            seq,
            event,
        };
        if let Some(sink) = self.sink.as_mut()
            && let Err(err) = sink.deliver(&envelope)
        {
            warn!(session_id = %self.session_id, error = %err, "delivery failed, dropping sink");
            self.sink = None;
        }
    }
}
