use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use log::{debug, info};
use uuid::Uuid;

use jingpt_client::LLMClient;
use jingpt_common::{
    ChatRequest, Conversation, Message, MessageRole, StopReason, Tool, ToolChoice, ToolResult,
};
use jingpt_tools::ToolExecutor;

use crate::error::CoreError;
use crate::events::{CoreEvent, EventCallback};

/// Default cap on tool rounds per run.
pub const DEFAULT_MAX_ROUNDS: usize = 8;

/// What a run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Messages added during the run (assistant turns and tool results), in order.
    pub messages: Vec<Message>,
    /// Tool rounds dispatched.
    pub rounds: usize,
    pub stop: StopReason,
    /// Every tool result of the run, in dispatch order.
    pub tool_results: Vec<ToolResult>,
}

/// Per-run state. Lives inside [`Core::run`] only.
struct RunState {
    conversation_id: Uuid,
    /// Everything sent to the model: prompt, history, then the run's turns.
    messages: Vec<Message>,
    history_len: usize,
    rounds: usize,
    tool_results: Vec<ToolResult>,
}

impl RunState {
    fn new(system_prompt: &str, conversation: Conversation) -> Self {
        let conversation_id = conversation.id;
        let mut messages = vec![Message::system(conversation_id, system_prompt)];
        messages.extend(conversation.into_messages());
        Self {
            conversation_id,
            history_len: messages.len(),
            messages,
            rounds: 0,
            tool_results: Vec::new(),
        }
    }

    fn push_results(&mut self, results: Vec<ToolResult>) {
        for result in &results {
            let message = Message::builder()
                .conversation_id(self.conversation_id)
                .role(MessageRole::Tool)
                .content(result.to_content())
                .tool_call_id(Some(result.call_id.clone()))
                .name(Some(result.name.clone()))
                .is_error(result.is_error())
                .build();
            self.messages.push(message);
        }
        self.tool_results.extend(results);
    }

    fn finish(mut self, stop: StopReason) -> RunOutcome {
        RunOutcome {
            messages: self.messages.split_off(self.history_len),
            rounds: self.rounds,
            stop,
            tool_results: self.tool_results,
        }
    }
}

/// The tool-use orchestration loop.
///
/// Alternates model turns and tool dispatch until the model answers without
/// asking for tools or the round cap is reached. Calls within one round run
/// concurrently; rounds run in sequence.
pub struct Core<C: LLMClient + ?Sized> {
    pub client: Arc<C>,
    pub max_rounds: usize,
    pub tool_choice: ToolChoice,
    event_callback: Option<EventCallback>,
}

impl<C: LLMClient + ?Sized> Core<C> {
    pub const fn new(client: Arc<C>) -> Self {
        Self {
            client,
            max_rounds: DEFAULT_MAX_ROUNDS,
            tool_choice: ToolChoice::Auto,
            event_callback: None,
        }
    }

    #[must_use]
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    #[must_use]
    pub fn with_event_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(CoreEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(Box::new(callback));
        self
    }

    fn emit(&self, event: CoreEvent) {
        if let Some(callback) = &self.event_callback {
            callback(event);
        }
    }

    fn request(&self, messages: &[Message], tools: &[Tool]) -> ChatRequest {
        let request = ChatRequest::from((self.client.config(), messages.to_vec()));
        if tools.is_empty() {
            request
        } else {
            request
                .with_tools(tools.to_vec())
                .with_tool_choice(self.tool_choice.clone())
        }
    }

    /// Runs the loop over `conversation` with the tools in `executor`.
    ///
    /// Tool failures never fail the run; they go back to the model as error
    /// results. Reaching the round cap ends the run with
    /// [`StopReason::RoundLimit`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Client`] if a model call fails.
    pub async fn run(
        &self,
        executor: &ToolExecutor,
        system_prompt: &str,
        conversation: Conversation,
    ) -> Result<RunOutcome, CoreError> {
        let start_time = Instant::now();
        let tools = executor.get_all_tools();
        let mut state = RunState::new(system_prompt, conversation);

        loop {
            let turn = state.rounds + 1;
            self.emit(CoreEvent::ModelTurn { round: turn });
            info!(
                "Model turn {turn} ({} of {} tool rounds used)",
                state.rounds, self.max_rounds
            );

            let request = self.request(&state.messages, &tools);
            let response = self
                .client
                .chat(&request)
                .await
                .map_err(CoreError::Client)?;

            let tool_calls = response.message.tool_calls.clone();
            state.messages.push(response.message);

            if tool_calls.is_empty() {
                debug!(
                    "No tool calls in response, run completed after {} rounds ({:.2?})",
                    state.rounds,
                    start_time.elapsed()
                );
                return Ok(self.stop(state, StopReason::Completed));
            }

            if state.rounds >= self.max_rounds {
                info!(
                    "Round cap of {} reached with {} tool calls pending",
                    self.max_rounds,
                    tool_calls.len()
                );
                return Ok(self.stop(state, StopReason::RoundLimit));
            }

            state.rounds += 1;
            let round = state.rounds;
            debug!("Round {round}: dispatching {} tool calls", tool_calls.len());

            for call in &tool_calls {
                self.emit(CoreEvent::ToolStarted {
                    round,
                    call_id: call.id.clone(),
                    name: call.function.name.clone(),
                    status: executor.status_for(call),
                });
            }

            // join_all keeps input order, so results line up with calls.
            let results = join_all(tool_calls.iter().map(|call| executor.execute_tool(call))).await;

            for result in &results {
                self.emit(CoreEvent::ToolFinished {
                    round,
                    call_id: result.call_id.clone(),
                    name: result.name.clone(),
                    success: !result.is_error(),
                });
            }

            state.push_results(results);
        }
    }

    fn stop(&self, state: RunState, stop: StopReason) -> RunOutcome {
        self.emit(CoreEvent::Done {
            rounds: state.rounds,
            stop,
        });
        state.finish(stop)
    }
}
