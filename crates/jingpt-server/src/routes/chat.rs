//! POST /api/chat: one question, answered through the tool-use loop.
//!
//! The answer is either a JSON body or a Server-Sent Events stream of
//! `status` and `progress` frames closed by exactly one `final` frame.

use std::convert::Infallible;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use axum::http::header::SET_COOKIE;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{AppendHeaders, IntoResponse, Response};
use futures::{FutureExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, instrument};

use jingpt::answer::{assemble, error_answer};
use jingpt::history;
use jingpt::prompt::{Sources, system_prompt};
use jingpt::{
    ChatAnswer, Conversation, Core, CoreError, CoreEvent, InboundMessage, RunOutcome,
    SourceCredentials, StreamFrame, ToolExecutor, build_executor,
};

use crate::auth::{AtlassianSession, atlassian_session, bearer_token};
use crate::error::ServerError;
use crate::state::AppState;

/// Status shown before the first model turn.
pub const THINKING_STATUS: &str = "Understanding your question";
/// Status shown when the model reviews tool results.
pub const REVIEWING_STATUS: &str = "Reviewing what was found";

const fn default_stream() -> bool {
    true
}

/// Request body for the chat endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatBody {
    pub messages: Vec<InboundMessage>,
    #[serde(default = "default_stream")]
    pub stream: bool,
}

/// The sending half of an SSE stream.
///
/// Status and progress frames may be sent any number of times; the stream
/// ends with [`FrameSink::finish`], which consumes the sink, so the final
/// frame is sent exactly once and nothing follows it.
pub struct FrameSink {
    tx: mpsc::UnboundedSender<StreamFrame>,
}

impl FrameSink {
    /// Creates a sink and the receiver the response body reads from.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StreamFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Sends a non-final frame. Returns `false` if the client is gone.
    pub fn send(&self, frame: StreamFrame) -> bool {
        self.tx.send(frame).is_ok()
    }

    /// Resolves when the client disconnects.
    pub async fn closed(&self) {
        self.tx.closed().await;
    }

    /// A loop event callback that forwards status and progress frames.
    pub fn event_forwarder(&self, max_rounds: usize) -> impl Fn(CoreEvent) + Send + Sync + 'static {
        let tx = self.tx.clone();
        move |event| {
            if let Some(frame) = frame_for(&event, max_rounds) {
                // A closed channel is noticed by the producer; nothing to do here.
                let _ = tx.send(frame);
            }
        }
    }

    /// Sends the final frame and closes this end of the stream.
    pub fn finish(self, answer: ChatAnswer, error: Option<String>) {
        if self.tx.send(StreamFrame::Final { answer, error }).is_err() {
            debug!("Client gone before the final frame");
        }
    }
}

/// The frame shown for a loop event, if any.
#[must_use]
pub fn frame_for(event: &CoreEvent, max_rounds: usize) -> Option<StreamFrame> {
    match event {
        CoreEvent::ModelTurn { round: 1 } => Some(StreamFrame::status(THINKING_STATUS)),
        CoreEvent::ModelTurn { .. } => Some(StreamFrame::status(REVIEWING_STATUS)),
        CoreEvent::ToolStarted { status, .. } => Some(StreamFrame::status(status.clone())),
        CoreEvent::ToolFinished {
            round,
            name,
            success,
            ..
        } => Some(StreamFrame::Progress {
            round: *round,
            max_rounds,
            tool: name.clone(),
            success: *success,
        }),
        CoreEvent::Done { .. } => None,
    }
}

/// Everything a run needs once the request has been validated.
struct PreparedRun {
    executor: ToolExecutor,
    prompt: String,
    conversation: Conversation,
}

/// POST /api/chat
///
/// Credentials are checked before the body: a request without a Graph token
/// is rejected with 401 whatever it contains.
#[instrument(skip_all)]
pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Response, ServerError> {
    let graph_token = bearer_token(&headers).ok_or_else(|| {
        ServerError::Unauthorized("Microsoft login required. Please log in again.".to_string())
    })?;

    let Json(body) =
        body.map_err(|e| ServerError::BadRequest(format!("Invalid request body: {}", e.body_text())))?;

    let window = history::window(body.messages, state.config.orchestration.history_window);
    let conversation = Conversation::from_inbound(window)?;

    let now = chrono::Utc::now();
    let AtlassianSession {
        token: atlassian_token,
        set_cookies,
    } = atlassian_session(
        &state.http,
        state.atlassian.as_deref(),
        &headers,
        now.timestamp(),
        state.config.secure_cookies(),
    )
    .await;

    let sources = Sources {
        confluence: atlassian_token.is_some(),
    };
    info!(
        stream = body.stream,
        messages = conversation.get_messages().len(),
        confluence = sources.confluence,
        "Chat request"
    );

    let executor = build_executor(
        &state.http,
        &state.sources,
        SourceCredentials {
            graph_token,
            atlassian_token,
        },
    )
    .map_err(|e| ServerError::Internal(e.to_string()))?;

    let run = PreparedRun {
        executor,
        prompt: system_prompt(sources, now.date_naive()),
        conversation,
    };

    let cookies = AppendHeaders(
        set_cookies
            .into_iter()
            .map(|cookie| (SET_COOKIE, cookie))
            .collect::<Vec<_>>(),
    );

    if body.stream {
        Ok((cookies, stream_answer(state, run)).into_response())
    } else {
        let outcome = run_loop(&state, run, None).await?;
        Ok((cookies, Json(assemble(&outcome))).into_response())
    }
}

async fn run_loop(
    state: &AppState,
    run: PreparedRun,
    sink: Option<&FrameSink>,
) -> Result<RunOutcome, CoreError> {
    let PreparedRun {
        executor,
        prompt,
        conversation,
    } = run;
    let max_rounds = state.config.orchestration.max_rounds;
    let mut core = Core::new(Arc::clone(&state.llm)).with_max_rounds(max_rounds);
    if let Some(sink) = sink {
        core = core.with_event_callback(sink.event_forwarder(max_rounds));
    }
    core.run(&executor, &prompt, conversation).await
}

fn stream_answer(
    state: AppState,
    run: PreparedRun,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (sink, rx) = FrameSink::channel();
    tokio::spawn(produce(state, run, sink));

    let events = UnboundedReceiverStream::new(rx).map(|frame| {
        Ok(Event::default()
            .json_data(&frame)
            .unwrap_or_else(|_| Event::default()))
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

/// Runs the loop for a streaming request and always ends the stream with a
/// final frame, unless the client has already gone away.
#[instrument(skip_all)]
async fn produce(state: AppState, run: PreparedRun, sink: FrameSink) {
    let result = {
        let work = AssertUnwindSafe(run_loop(&state, run, Some(&sink))).catch_unwind();
        tokio::select! {
            result = work => Some(result),
            () = sink.closed() => None,
        }
    };

    match result {
        None => info!("Client disconnected, run abandoned"),
        Some(Ok(Ok(outcome))) => {
            debug!(rounds = outcome.rounds, stop = ?outcome.stop, "Run finished");
            sink.finish(assemble(&outcome), None);
        }
        Some(Ok(Err(e))) => {
            error!(error = %e, "Run failed");
            sink.finish(error_answer(), Some("orchestration_failed".to_string()));
        }
        Some(Err(_)) => {
            error!("Run panicked");
            sink.finish(error_answer(), Some("internal_error".to_string()));
        }
    }
}
