//! The loop scheduler (spec "Loop Scheduler"): the `Agent` that drives one
//! run — repeatedly streaming from a provider, dispatching the tool calls it
//! asks for, and feeding results back — until the model stops asking for
//! work. Generalizes the original SDK's `Client::auto_execute_loop`, which
//! was specific to one provider and one flat message shape, into a
//! provider-agnostic driver over the closed `Message`/`ContentBlock` model.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tokio::sync::{RwLock, Semaphore};

use crate::compaction::CompactionEngine;
use crate::error::{Error, Result};
use crate::events::{AgentStateSnapshot, Event, EventBus, Unsubscribe};
use crate::hooks::{
    ConfirmDecision, PostToolUseEvent, PreToolUseEvent, ToolCallContext, TurnMetrics,
    UserPromptSubmitEvent,
};
use crate::message::{ContentBlock, Message, StopReason, ToolCall, Usage};
use crate::provider::{CacheRetention, Provider, ProviderOptions, ReasoningEffort, StreamEvent};
use crate::retry::classify_retry_message;
use crate::session::Session;
use crate::tools::{validate_and_coerce, ToolRegistry};
use crate::types::AgentOptions;

/// Scheduler state machine (spec "State machine").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Idle,
    Streaming,
    TurnBetween,
    Draining,
}

/// Per-model pricing used for the cumulative-cost budget. Not part of the
/// wire protocol of any provider; this is a coarse, host-overridable table
/// so `MaxCostUSD` has something to measure against. Unknown models cost
/// nothing, which is conservative for the budget guard (it never stops a
/// run early over an unpriced model).
fn cost_per_million_tokens(model: &str) -> (f64, f64) {
    let lower = model.to_ascii_lowercase();
    if lower.contains("gpt-4o-mini") {
        (0.15, 0.60)
    } else if lower.contains("gpt-4o") {
        (2.50, 10.00)
    } else if lower.contains("gpt-4") {
        (30.00, 60.00)
    } else if lower.contains("gpt-3.5") {
        (0.50, 1.50)
    } else {
        (0.0, 0.0)
    }
}

fn estimate_cost_usd(usage: &Usage, model: &str) -> f64 {
    let (input_rate, output_rate) = cost_per_million_tokens(model);
    let input_cost = (usage.input_tokens as f64 / 1_000_000.0) * input_rate;
    let output_cost = (usage.output_tokens as f64 / 1_000_000.0) * output_rate;
    input_cost + output_cost
}

/// The agentic control loop. Owns conversation history, cumulative cost, the
/// tool registry, and (optionally) a session log. One `Agent` drives one run
/// at a time — a second call to `prompt`/`prompt_messages`/`continue_run`
/// while a run is in progress fails with `Error::AlreadyRunning`.
pub struct Agent {
    options: AgentOptions,
    provider: Arc<dyn Provider>,
    registry: ToolRegistry,
    history: RwLock<Vec<Message>>,
    /// Session entry id for the message at the same index in `history`, or
    /// `None` where there's no session. Parallel to `history` so compaction
    /// can resolve "the first kept message's entry id" without Session
    /// having to expose its own index.
    entry_ids: RwLock<Vec<Option<String>>>,
    events: EventBus,
    state: RwLock<AgentState>,
    cumulative_cost_usd: RwLock<f64>,
    prior_summary: RwLock<Option<String>>,
    pending_injection: RwLock<Option<Vec<Message>>>,
    session: Option<Session>,
    abort_requested: Arc<AtomicBool>,
    running: AtomicBool,
    turn_counter: AtomicU32,
}

impl Agent {
    /// Builds an agent from its options and a concrete provider. Tools
    /// configured on `options` are registered up front; further tools (e.g.
    /// plugins spawned after construction) can be added via `registry()`.
    pub fn new(options: AgentOptions, provider: Arc<dyn Provider>) -> Result<Self> {
        let registry = ToolRegistry::new();
        for tool in options.tools() {
            registry.register((**tool).clone())?;
        }
        Ok(Self {
            options,
            provider,
            registry,
            history: RwLock::new(Vec::new()),
            entry_ids: RwLock::new(Vec::new()),
            events: EventBus::new(),
            state: RwLock::new(AgentState::Idle),
            cumulative_cost_usd: RwLock::new(0.0),
            prior_summary: RwLock::new(None),
            pending_injection: RwLock::new(None),
            session: None,
            abort_requested: Arc::new(AtomicBool::new(false)),
            running: AtomicBool::new(false),
            turn_counter: AtomicU32::new(0),
        })
    }

    /// Attaches a session log; every appended message and compaction is
    /// mirrored to it. Without a session the agent runs purely in memory.
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn options(&self) -> &AgentOptions {
        &self.options
    }

    /// Registers a listener invoked synchronously for every event the
    /// scheduler broadcasts. Returns a handle whose `unsubscribe()` stops
    /// delivery; listeners must not block.
    pub fn subscribe<F>(&self, listener: F) -> Unsubscribe
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.events.subscribe(listener)
    }

    /// Immutable snapshot of observable agent state.
    pub async fn state(&self) -> AgentStateSnapshot {
        let history = self.history.read().await.clone();
        let streaming = matches!(*self.state.read().await, AgentState::Streaming);
        AgentStateSnapshot {
            system_prompt: self.options.system_prompt().to_string(),
            model: self.options.model().to_string(),
            provider_name: self.provider.name().to_string(),
            history,
            streaming,
            in_flight_calls: Vec::new(),
            last_error: None,
            estimated_context_tokens: CompactionEngine::estimate_tokens(
                &self.history.read().await,
            ),
            cumulative_cost_usd: *self.cumulative_cost_usd.read().await,
        }
    }

    pub async fn history(&self) -> Vec<Message> {
        self.history.read().await.clone()
    }

    /// Cancels the in-flight run. Idempotent; has no effect if no run is in
    /// progress.
    pub fn abort(&self) {
        self.abort_requested.store(true, Ordering::SeqCst);
    }

    fn abort_was_requested(&self) -> bool {
        self.abort_requested.load(Ordering::SeqCst)
    }

    /// Appends `text` as a user message and drives the loop until the model
    /// stops requesting work.
    pub async fn prompt(&self, text: impl Into<String>) -> Result<()> {
        self.prompt_messages(vec![Message::user(text)]).await
    }

    /// Appends `messages` and drives the loop. Fails with
    /// `Error::AlreadyRunning` if a run is already in progress.
    ///
    /// Each `User` message's text is first offered to the `UserPromptSubmit`
    /// hooks, run ahead of the scheduler's own single-slot hooks: a blocking
    /// decision aborts before anything is appended, a modifying decision
    /// substitutes the returned text.
    pub async fn prompt_messages(&self, mut messages: Vec<Message>) -> Result<()> {
        self.begin_run()?;

        let snapshot = self.history_as_json().await;
        for message in &mut messages {
            if let Message::User { content, .. } = message {
                let text: String = content.iter().filter_map(|b| b.as_text()).collect();
                if text.is_empty() {
                    continue;
                }
                let event = UserPromptSubmitEvent::new(text, snapshot.clone());
                if let Some(decision) = self.options.hooks().execute_user_prompt_submit(event).await {
                    if !decision.continue_execution {
                        self.running.store(false, Ordering::SeqCst);
                        return Err(Error::other(
                            decision
                                .reason
                                .unwrap_or_else(|| "prompt blocked by hook".to_string()),
                        ));
                    }
                    if let Some(modified) = decision.modified_prompt {
                        *content = vec![ContentBlock::text(modified)];
                    }
                }
            }
        }

        for message in messages {
            self.append_history(message).await;
        }
        let result = self.run_loop().await;
        self.end_run().await;
        result
    }

    /// JSON snapshot of history, for the multi-handler hook events whose
    /// payload predates the closed `Message` enum.
    async fn history_as_json(&self) -> Vec<serde_json::Value> {
        self.history
            .read()
            .await
            .iter()
            .map(|m| serde_json::to_value(m).unwrap_or_default())
            .collect()
    }

    /// Resumes the loop without new input. Fails if history is empty or
    /// already ends in a terminal assistant message with no outstanding
    /// tool work to resume.
    pub async fn continue_run(&self) -> Result<()> {
        self.begin_run()?;
        {
            let history = self.history.read().await;
            if history.is_empty() {
                self.running.store(false, Ordering::SeqCst);
                return Err(Error::invalid_input("cannot continue: history is empty"));
            }
            if matches!(history.last(), Some(Message::Assistant { .. })) {
                self.running.store(false, Ordering::SeqCst);
                return Err(Error::invalid_input(
                    "cannot continue: history already ends in a terminal assistant message",
                ));
            }
        }
        let result = self.run_loop().await;
        self.end_run().await;
        result
    }

    fn begin_run(&self) -> Result<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::AlreadyRunning);
        }
        self.abort_requested.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn end_run(&self) {
        *self.state.write().await = AgentState::Idle;
        self.running.store(false, Ordering::SeqCst);
    }

    async fn set_state(&self, state: AgentState) {
        *self.state.write().await = state;
    }

    async fn append_history(&self, message: Message) {
        let role_tag = message.role_tag();
        self.history.write().await.push(message.clone());
        let entry_id = if let Some(session) = &self.session {
            match session.append_message(role_tag, &message).await {
                Ok(id) => Some(id),
                Err(e) => {
                    log::warn!("session write failed: {e}");
                    None
                }
            }
        } else {
            None
        };
        self.entry_ids.write().await.push(entry_id);
    }

    async fn history_snapshot(&self) -> Vec<Message> {
        self.history.read().await.clone()
    }

    async fn cumulative_cost(&self) -> f64 {
        *self.cumulative_cost_usd.read().await
    }

    async fn add_cumulative_cost(&self, delta: f64) {
        *self.cumulative_cost_usd.write().await += delta;
    }

    // -------------------------------------------------------------
    // Main loop
    // -------------------------------------------------------------

    async fn run_loop(&self) -> Result<()> {
        self.events.publish(Event::AgentStart);
        let result = self.run_loop_inner().await;
        let reason = match &result {
            Ok(()) => "completed".to_string(),
            Err(e) => format!("error: {e}"),
        };
        self.events.publish(Event::AgentEnd { reason });
        result
    }

    async fn run_loop_inner(&self) -> Result<()> {
        loop {
            if self.abort_was_requested() {
                return Err(Error::Aborted);
            }

            let turn = self.turn_counter.fetch_add(1, Ordering::SeqCst) + 1;

            // 1. Turn and cost budgets.
            let max_turns = self.options.max_turns();
            if max_turns > 0 && turn > max_turns {
                self.events.publish(Event::TurnLimitReached { max_turns });
                break;
            }
            if let Some(max_cost) = self.options.max_cost_usd() {
                if self.cumulative_cost().await > max_cost {
                    self.events.publish(Event::TurnLimitReached { max_turns });
                    break;
                }
            }

            self.events.publish(Event::TurnStart { turn });
            let turn_started_at = Instant::now();
            self.set_state(AgentState::Streaming).await;

            // 2. Drain pending steering/follow-up messages.
            if let Some(pending) = self.pending_injection.write().await.take() {
                for message in pending {
                    self.append_history(message).await;
                }
            }

            // 3. Compaction (non-fatal on failure).
            self.maybe_compact().await;

            // 4. Build the provider request.
            let snapshot = self.history_snapshot().await;
            let transformed = self.options.hooks().transform_context(&snapshot);
            let for_llm = self.options.hooks().convert_to_llm(&transformed);
            let provider_options = self.build_provider_options();

            // 5. Stream with retry.
            let stream_result = self
                .stream_turn_with_retry(&for_llm, &provider_options, turn)
                .await;

            let assistant_message = match stream_result {
                Ok(message) => message,
                Err(Error::Aborted) => return Err(Error::Aborted),
                Err(e) => {
                    let err_message = Message::assistant_error(
                        e.to_string(),
                        self.options.model(),
                        self.provider.name(),
                    );
                    self.events.publish(Event::MessageStart);
                    self.append_history(err_message.clone()).await;
                    self.events.publish(Event::MessageEnd {
                        message: err_message,
                    });
                    self.events.publish(Event::TurnEnd {
                        turn,
                        cost_usd: self.cumulative_cost().await,
                    });
                    break;
                }
            };

            self.set_state(AgentState::TurnBetween).await;
            self.append_history(assistant_message.clone()).await;

            // 6. Stop-reason short circuit.
            let stop_reason = match &assistant_message {
                Message::Assistant { stop_reason, .. } => Some(*stop_reason),
                _ => None,
            };
            if matches!(stop_reason, Some(StopReason::Error)) {
                self.events.publish(Event::TurnEnd {
                    turn,
                    cost_usd: self.cumulative_cost().await,
                });
                break;
            }
            if matches!(stop_reason, Some(StopReason::Aborted)) {
                self.events.publish(Event::TurnEnd {
                    turn,
                    cost_usd: self.cumulative_cost().await,
                });
                return Err(Error::Aborted);
            }

            // 7. Tool dispatch.
            let calls: Vec<ToolCall> = assistant_message
                .tool_calls()
                .into_iter()
                .cloned()
                .collect();
            let mut steering_from_dispatch = None;
            if !calls.is_empty() {
                if self.options.max_tool_concurrency() <= 1 {
                    steering_from_dispatch = self.dispatch_sequential(&calls).await?;
                } else {
                    self.dispatch_parallel(&calls).await?;
                }
            }

            // 8/9. Cost accounting and TurnEnd.
            let usage = match &assistant_message {
                Message::Assistant { usage, .. } => *usage,
                _ => Usage::default(),
            };
            let turn_cost = estimate_cost_usd(&usage, self.options.model());
            self.add_cumulative_cost(turn_cost).await;
            let cumulative = self.cumulative_cost().await;
            self.events.publish(Event::TurnEnd {
                turn,
                cost_usd: cumulative,
            });

            // 10. Metrics.
            let metrics = TurnMetrics {
                turn_index: turn,
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
                cache_read_tokens: usage.cache_read_tokens,
                cache_write_tokens: usage.cache_write_tokens,
                cost_usd: cumulative,
                duration_ms: turn_started_at.elapsed().as_millis() as u64,
                tool_calls: calls.len() as u32,
            };
            self.options.hooks().report_metrics(&metrics);

            // 11/12. Steering / follow-up.
            if let Some(steering) = steering_from_dispatch {
                *self.pending_injection.write().await = Some(steering);
                continue;
            }
            if let Some(steering) = self.options.hooks().poll_steering().await {
                *self.pending_injection.write().await = Some(steering);
                continue;
            }
            if calls.is_empty() {
                if let Some(follow_up) = self.options.hooks().poll_follow_up().await {
                    *self.pending_injection.write().await = Some(follow_up);
                    continue;
                }
                break;
            }
        }
        Ok(())
    }

    fn build_provider_options(&self) -> ProviderOptions {
        ProviderOptions {
            max_output_tokens: self.options.max_tokens(),
            temperature: Some(self.options.temperature()),
            api_key: Some(self.options.api_key().to_string()),
            reasoning_effort: ReasoningEffort::default(),
            cache_retention: CacheRetention::default(),
            reasoning_token_budget: None,
            system_prompt: Some(self.options.system_prompt().to_string()),
            tools: self.registry.definitions(),
        }
    }

    async fn maybe_compact(&self) {
        let config = self.options.compaction();
        if !config.enabled {
            return;
        }
        let history = self.history_snapshot().await;
        let entry_ids_before = self.entry_ids.read().await.clone();
        let prior_summary = self.prior_summary.read().await.clone();
        match CompactionEngine::maybe_compact(
            &history,
            &config,
            self.provider.as_ref(),
            self.options.model(),
            prior_summary.as_deref(),
        )
        .await
        {
            Ok(Some(result)) => {
                let removed = result.first_kept_index;
                let summary_tokens =
                    CompactionEngine::estimate_tokens(&[Message::user(result.summary.clone())]);

                // The session log keeps the compaction's own entry as the
                // record of what happened; the synthetic summary message
                // lives only in memory, so it gets no entry id of its own.
                let first_kept_entry_id = entry_ids_before
                    .get(result.first_kept_index)
                    .cloned()
                    .flatten()
                    .unwrap_or_default();

                *self.history.write().await = result.history.clone();
                *self.prior_summary.write().await = Some(result.summary.clone());

                let mut tail = entry_ids_before
                    .get(result.first_kept_index..)
                    .map(|s| s.to_vec())
                    .unwrap_or_default();
                let mut rebuilt = Vec::with_capacity(tail.len() + 1);
                rebuilt.push(None);
                rebuilt.append(&mut tail);
                *self.entry_ids.write().await = rebuilt;

                if let Some(session) = &self.session {
                    if let Err(e) = session
                        .append_compaction(
                            &result.summary,
                            &first_kept_entry_id,
                            result.tokens_before,
                        )
                        .await
                    {
                        log::warn!("session compaction write failed: {e}");
                    }
                }
                self.events.publish(Event::Compaction {
                    removed_messages: removed,
                    summary_tokens,
                });
            }
            Ok(None) => {}
            Err(e) => log::warn!("compaction failed, continuing with uncompacted history: {e}"),
        }
    }

    // -------------------------------------------------------------
    // Streaming + retry
    // -------------------------------------------------------------

    async fn stream_turn_with_retry(
        &self,
        history: &[Message],
        options: &ProviderOptions,
        turn: u32,
    ) -> Result<Message> {
        let max_retries = self.options.max_retries();
        let base_delay = self.options.retry_base_delay();
        let mut attempt = 0u32;

        loop {
            if self.abort_was_requested() {
                return Err(Error::Aborted);
            }
            match self.stream_turn_once(history, options).await {
                Ok(message) => return Ok(message),
                Err(e) if attempt < max_retries && is_turn_error_retryable(&e) => {
                    attempt += 1;
                    let delay_ms = (base_delay.as_millis() as u64)
                        .saturating_mul(1u64 << attempt.min(20))
                        .min(60_000);
                    self.events.publish(Event::Retry {
                        attempt,
                        max_retries,
                        delay_ms,
                        reason: e.to_string(),
                    });
                    tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                    let _ = turn;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn stream_turn_once(
        &self,
        history: &[Message],
        options: &ProviderOptions,
    ) -> Result<Message> {
        let mut provider_stream = self
            .provider
            .stream(self.options.model(), history, options)
            .await?;

        self.events.publish(Event::MessageStart);
        loop {
            match provider_stream.events.next().await {
                Some(StreamEvent::TextDelta { delta, .. })
                | Some(StreamEvent::ThinkingDelta { delta, .. }) => {
                    self.events.publish(Event::MessageUpdate { delta });
                }
                Some(StreamEvent::Error { message }) => {
                    return Err(Error::transient_provider(message));
                }
                Some(_) => {}
                None => break,
            }
            if self.abort_was_requested() {
                self.set_state(AgentState::Draining).await;
                break;
            }
        }

        let message = provider_stream
            .result
            .await
            .map_err(|_| Error::stream("provider result channel dropped before completion"))??;

        self.events.publish(Event::MessageEnd {
            message: message.clone(),
        });
        Ok(message)
    }

    // -------------------------------------------------------------
    // Tool dispatch
    // -------------------------------------------------------------

    /// Sequential dispatch: calls are awaited one at a time and the steering
    /// hook is re-polled between each. A `Some` steering result marks every
    /// remaining call in this group as skipped and stops dispatch early.
    async fn dispatch_sequential(&self, calls: &[ToolCall]) -> Result<Option<Vec<Message>>> {
        for (idx, call) in calls.iter().enumerate() {
            match self.confirm_call(call).await? {
                ConfirmDecision::Allow => {
                    let result = self.dispatch_one(call).await;
                    self.append_history(result).await;
                }
                ConfirmDecision::Deny => {
                    self.append_history(denied_result(call)).await;
                }
                ConfirmDecision::Abort => {
                    self.events.publish(Event::ToolDenied {
                        call_id: call.id.clone(),
                        name: call.name.clone(),
                        reason: "aborted by confirmation hook".to_string(),
                    });
                    return Err(Error::Aborted);
                }
            }

            if let Some(steering) = self.options.hooks().poll_steering().await {
                for skipped in &calls[idx + 1..] {
                    self.append_history(skipped_result(skipped)).await;
                }
                return Ok(Some(steering));
            }
        }
        Ok(None)
    }

    /// Parallel dispatch: every confirmation decision in the group is made
    /// serially up front (so prompts are deterministic), then allowed calls
    /// run concurrently bounded by `MaxToolConcurrency`. Results are
    /// re-assembled in the model-emitted order regardless of completion
    /// order; steering is not consulted mid-group.
    async fn dispatch_parallel(&self, calls: &[ToolCall]) -> Result<()> {
        let mut decisions = Vec::with_capacity(calls.len());
        for call in calls {
            decisions.push(self.confirm_call(call).await?);
        }

        let concurrency = self.options.max_tool_concurrency().max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut slots: Vec<Option<Message>> = vec![None; calls.len()];

        let mut allowed: Vec<(usize, ToolCall)> = Vec::new();
        for (idx, (call, decision)) in calls.iter().zip(decisions.iter()).enumerate() {
            match decision {
                ConfirmDecision::Allow => allowed.push((idx, call.clone())),
                ConfirmDecision::Deny => {
                    slots[idx] = Some(denied_result(call));
                }
                ConfirmDecision::Abort => {
                    self.events.publish(Event::ToolDenied {
                        call_id: call.id.clone(),
                        name: call.name.clone(),
                        reason: "aborted by confirmation hook".to_string(),
                    });
                    return Err(Error::Aborted);
                }
            }
        }

        // Each task holds its semaphore permit for the full dispatch, not
        // just while waiting for one — that's what actually bounds
        // concurrency to MaxToolConcurrency.
        let mut pending = futures::stream::FuturesUnordered::new();
        for (idx, call) in allowed {
            let semaphore = semaphore.clone();
            pending.push(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let result = self.dispatch_one(&call).await;
                (idx, result)
            });
        }
        while let Some((idx, result)) = pending.next().await {
            slots[idx] = Some(result);
        }

        for slot in slots.into_iter().flatten() {
            self.append_history(slot).await;
        }
        Ok(())
    }

    async fn confirm_call(&self, call: &ToolCall) -> Result<ConfirmDecision> {
        let history = self.history_snapshot().await;
        let decision = self
            .options
            .hooks()
            .confirm_tool_call(ToolCallContext::new(call.clone(), history))
            .await;
        Ok(decision)
    }

    /// Looks up, validates, times out, and executes one tool call, always
    /// returning a `ToolResult` message (never an `Err`) — tool failures are
    /// reported to the model, not the scheduler.
    async fn dispatch_one(&self, call: &ToolCall) -> Message {
        let tool = match self.registry.get(&call.name) {
            Some(tool) => tool,
            None => {
                return Message::tool_result(
                    call.id.clone(),
                    call.name.clone(),
                    vec![ContentBlock::text(format!(
                        "Tool not found: '{}'",
                        call.name
                    ))],
                    true,
                );
            }
        };

        let mut arguments = match validate_and_coerce(&tool, call.arguments.clone()) {
            Ok(args) => args,
            Err(e) => {
                return Message::tool_result(
                    call.id.clone(),
                    call.name.clone(),
                    vec![ContentBlock::text(e.to_string())],
                    true,
                );
            }
        };

        let pre_event = PreToolUseEvent::new(
            call.name.clone(),
            arguments.clone(),
            call.id.clone(),
            self.history_as_json().await,
        );
        if let Some(decision) = self.options.hooks().execute_pre_tool_use(pre_event).await {
            if !decision.continue_execution {
                return Message::tool_result(
                    call.id.clone(),
                    call.name.clone(),
                    vec![ContentBlock::text(
                        decision
                            .reason
                            .unwrap_or_else(|| "tool call blocked by hook".to_string()),
                    )],
                    true,
                );
            }
            if let Some(modified) = decision.modified_input {
                arguments = modified;
            }
        }

        self.events.publish(Event::ToolStart {
            call_id: call.id.clone(),
            name: call.name.clone(),
            arguments: arguments.clone(),
        });

        let call_id_for_updates = call.id.clone();
        let events = self.events.clone();
        let on_update: crate::tools::OnUpdate = Arc::new(move |partial| {
            events.publish(Event::ToolUpdate {
                call_id: call_id_for_updates.clone(),
                delta: partial.content.iter().filter_map(|b| b.as_text()).collect(),
            });
        });

        let arguments_for_hook = arguments.clone();
        let tool_for_task = tool.clone();
        let task = tokio::spawn(async move { tool_for_task.execute(arguments, Some(on_update)).await });

        let outcome = match self.options.tool_timeout() {
            Some(timeout) => match tokio::time::timeout(timeout, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    self.events.publish(Event::ToolEnd {
                        call_id: call.id.clone(),
                        name: call.name.clone(),
                        is_error: true,
                    });
                    return Message::tool_result(
                        call.id.clone(),
                        call.name.clone(),
                        vec![ContentBlock::text(format!(
                            "Tool '{}' timed out after {}ms",
                            call.name,
                            timeout.as_millis()
                        ))],
                        true,
                    );
                }
            },
            None => task.await,
        };

        let (content, details, is_error) = match outcome {
            Ok(Ok(output)) => (output.content, output.details, false),
            Ok(Err(e)) => (vec![ContentBlock::text(e.to_string())], None, true),
            Err(join_error) => {
                let message = if join_error.is_panic() {
                    format!("tool '{}' panicked", call.name)
                } else {
                    format!("tool '{}' task was cancelled", call.name)
                };
                (vec![ContentBlock::text(message)], None, true)
            }
        };

        self.events.publish(Event::ToolEnd {
            call_id: call.id.clone(),
            name: call.name.clone(),
            is_error,
        });

        let mut result = Message::tool_result(call.id.clone(), call.name.clone(), content, is_error);
        if let Message::ToolResult {
            details: slot, ..
        } = &mut result
        {
            *slot = details;
        }

        let post_event = PostToolUseEvent::new(
            call.name.clone(),
            arguments_for_hook,
            call.id.clone(),
            serde_json::to_value(&result).unwrap_or_default(),
            self.history_as_json().await,
        );
        if let Some(decision) = self.options.hooks().execute_post_tool_use(post_event).await {
            if !decision.continue_execution {
                log::warn!(
                    "PostToolUse hook requested stopping after '{}', but the call already completed",
                    call.name
                );
            }
        }

        result
    }
}

fn denied_result(call: &ToolCall) -> Message {
    Message::tool_result(
        call.id.clone(),
        call.name.clone(),
        vec![ContentBlock::text("Tool call denied by user.")],
        true,
    )
}

fn skipped_result(call: &ToolCall) -> Message {
    Message::tool_result(
        call.id.clone(),
        call.name.clone(),
        vec![ContentBlock::text("Skipped due to user interrupt.")],
        true,
    )
}

fn is_turn_error_retryable(error: &Error) -> bool {
    match error {
        Error::TransientProvider(msg) => classify_retry_message(msg) || true,
        Error::PermanentProvider(_) => false,
        Error::Http(_) | Error::Timeout => true,
        Error::Stream(msg) | Error::Api(msg) => classify_retry_message(msg),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::Hooks;
    use crate::message::ToolDefinition;
    use crate::provider::{PartialMessage, ProviderStream};
    use async_trait::async_trait;
    use futures::stream::{self, StreamExt as _};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    struct ScriptedProvider {
        turns: StdMutex<Vec<Vec<ContentBlock>>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(turns: Vec<Vec<ContentBlock>>) -> Self {
            Self {
                turns: StdMutex::new(turns),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn stream(
            &self,
            model: &str,
            _history: &[Message],
            _options: &ProviderOptions,
        ) -> Result<ProviderStream> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let content = {
                let mut turns = self.turns.lock().unwrap();
                if turns.is_empty() {
                    vec![ContentBlock::text("done")]
                } else {
                    turns.remove(0)
                }
            };
            let has_tool_call = content.iter().any(|b| matches!(b, ContentBlock::ToolCall(_)));
            let stop_reason = if has_tool_call {
                StopReason::ToolUse
            } else {
                StopReason::Stop
            };
            let message = Message::Assistant {
                content,
                model: model.to_string(),
                provider: "scripted".to_string(),
                usage: Usage::default(),
                stop_reason,
                error: None,
                timestamp: crate::message::now_ms(),
            };
            let (tx, rx) = tokio::sync::oneshot::channel();
            let _ = tx.send(Ok(message));
            let events = stream::iter(Vec::<StreamEvent>::new()).boxed();
            Ok(ProviderStream { events, result: rx })
        }
    }

    fn test_options() -> AgentOptions {
        AgentOptions::builder()
            .model("test-model")
            .base_url("http://localhost:1234")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn single_turn_no_tools_produces_two_messages() {
        let provider = Arc::new(ScriptedProvider::new(vec![vec![ContentBlock::text("hi there")]]));
        let agent = Agent::new(test_options(), provider).unwrap();
        agent.prompt("hello").await.unwrap();
        let history = agent.history().await;
        assert_eq!(history.len(), 2);
        assert!(matches!(history[0], Message::User { .. }));
        assert!(matches!(history[1], Message::Assistant { .. }));
    }

    #[tokio::test]
    async fn tool_call_is_dispatched_and_resolved() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            vec![ContentBlock::tool_call(
                "c1",
                "echo",
                serde_json::json!({"text": "world"}),
            )],
            vec![ContentBlock::text("done")],
        ]));
        let options = AgentOptions::builder()
            .model("test-model")
            .base_url("http://localhost:1234")
            .tool(crate::tools::Tool::new(
                "echo",
                "echoes text",
                serde_json::json!({"text": "string"}),
                |args| async move {
                    let text = args["text"].as_str().unwrap_or_default();
                    Ok(serde_json::json!(format!("echo:{text}")))
                },
            ))
            .build()
            .unwrap();
        let agent = Agent::new(options, provider).unwrap();
        agent.prompt("go").await.unwrap();
        let history = agent.history().await;
        assert_eq!(history.len(), 4);
        match &history[2] {
            Message::ToolResult {
                call_id,
                tool_name,
                is_error,
                ..
            } => {
                assert_eq!(call_id, "c1");
                assert_eq!(tool_name, "echo");
                assert!(!is_error);
            }
            other => panic!("expected tool result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_tool_produces_error_result_not_a_crash() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            vec![ContentBlock::tool_call("c1", "nonexistent", serde_json::json!({}))],
            vec![ContentBlock::text("recovered")],
        ]));
        let agent = Agent::new(test_options(), provider).unwrap();
        agent.prompt("go").await.unwrap();
        let history = agent.history().await;
        match &history[2] {
            Message::ToolResult { is_error, .. } => assert!(is_error),
            other => panic!("expected tool result, got {other:?}"),
        }
        assert!(matches!(history.last(), Some(Message::Assistant { .. })));
    }

    #[tokio::test]
    async fn max_turns_one_stops_after_first_turn() {
        let provider = Arc::new(ScriptedProvider::new(vec![vec![ContentBlock::tool_call(
            "c1",
            "echo",
            serde_json::json!({}),
        )]]));
        let options = AgentOptions::builder()
            .model("test-model")
            .base_url("http://localhost:1234")
            .max_turns(1)
            .tool(crate::tools::Tool::new(
                "echo",
                "echo",
                serde_json::json!({}),
                |_args| async move { Ok(serde_json::json!("ok")) },
            ))
            .build()
            .unwrap();
        let agent = Agent::new(options, provider).unwrap();
        let limit_hits = Arc::new(AtomicUsize::new(0));
        let counter = limit_hits.clone();
        let _unsub = agent.subscribe(move |event| {
            if matches!(event, Event::TurnLimitReached { .. }) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        agent.prompt("go").await.unwrap();
        assert_eq!(limit_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn confirm_deny_synthesizes_denied_result() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            vec![ContentBlock::tool_call("c1", "echo", serde_json::json!({}))],
            vec![ContentBlock::text("done")],
        ]));
        let hooks = Hooks::new().with_confirm_tool_call(|_ctx| async move { ConfirmDecision::Deny });
        let options = AgentOptions::builder()
            .model("test-model")
            .base_url("http://localhost:1234")
            .hooks(hooks)
            .tool(crate::tools::Tool::new(
                "echo",
                "echo",
                serde_json::json!({}),
                |_args| async move { Ok(serde_json::json!("ok")) },
            ))
            .build()
            .unwrap();
        let agent = Agent::new(options, provider).unwrap();
        agent.prompt("go").await.unwrap();
        let history = agent.history().await;
        match &history[2] {
            Message::ToolResult { content, is_error, .. } => {
                assert!(is_error);
                assert_eq!(content[0].as_text(), Some("Tool call denied by user."));
            }
            other => panic!("expected tool result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn already_running_rejects_concurrent_prompt() {
        let provider = Arc::new(ScriptedProvider::new(vec![vec![ContentBlock::text("done")]]));
        let agent = Arc::new(Agent::new(test_options(), provider).unwrap());
        agent.running.store(true, Ordering::SeqCst);
        let err = agent.prompt("go").await.unwrap_err();
        assert!(matches!(err, Error::AlreadyRunning));
    }

    #[tokio::test]
    async fn continue_fails_on_empty_history() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let agent = Agent::new(test_options(), provider).unwrap();
        let err = agent.continue_run().await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn abort_before_run_aborts_immediately() {
        let provider = Arc::new(ScriptedProvider::new(vec![vec![ContentBlock::text("done")]]));
        let agent = Agent::new(test_options(), provider).unwrap();
        agent.abort();
        let err = agent.prompt("go").await.unwrap_err();
        assert!(matches!(err, Error::Aborted));
    }

    #[allow(unused)]
    fn _tool_definition_used(_d: ToolDefinition) {}
    #[allow(unused)]
    fn _partial_message_used(_p: PartialMessage) {}
}
