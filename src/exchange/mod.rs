//! Exchanges: multi-step conversations carried out in a thread
//!
//! An `ExchangeTemplate` is configured once at startup. When an addressed
//! message matches its pattern, the bot instantiates an `Exchange` from the
//! template, registers it under the triggering message's timestamp (which
//! becomes the thread), and drives it step by step. Steps that need user
//! input suspend the exchange until the next message on its thread.

mod registry;
mod step;

pub use registry::{ExchangeHandle, ExchangeRegistry};
pub use step::{MessageHandler, MessageOutcome, Step, StepAction, StepHandler};

use crate::bot::Bot;
use crate::error::{BotError, Result};
use crate::responder::compile_pattern;
use crate::store::Store;
use crate::types::{MessageEvent, OutgoingMessage, PostedMessage};
use regex::Regex;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Index of the step every exchange starts on
pub const FIRST_STEP: usize = 1;

/// Notice posted into the thread when an exchange fails
pub fn unrecoverable_error_message(err: &BotError) -> String {
    format!(
        "An unrecoverable error has occurred. This exchange will be terminated.\nError: {}",
        err
    )
}

/// Configured blueprint for an exchange
#[derive(Clone, Debug)]
pub struct ExchangeTemplate {
    pattern: Regex,
    usage: String,
    steps: BTreeMap<usize, Step>,
}

impl ExchangeTemplate {
    /// Create an empty template; fails if the trigger pattern does not compile
    pub fn new(pattern: &str, usage: impl Into<String>) -> Result<Self> {
        Ok(Self::with_regex(compile_pattern(pattern)?, usage))
    }

    pub fn with_regex(pattern: Regex, usage: impl Into<String>) -> Self {
        Self {
            pattern,
            usage: usage.into(),
            steps: BTreeMap::new(),
        }
    }

    /// Insert a step at an explicit index
    pub fn with_step(mut self, index: usize, step: Step) -> Self {
        self.steps.insert(index, step);
        self
    }

    /// Append a step after the current last index
    pub fn then(self, step: Step) -> Self {
        let next = self.steps.keys().next_back().map_or(FIRST_STEP, |last| last + 1);
        self.with_step(next, step)
    }

    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    pub fn usage(&self) -> &str {
        &self.usage
    }

    pub fn steps(&self) -> &BTreeMap<usize, Step> {
        &self.steps
    }

    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    /// Steps must be keyed exactly `1..=n` with at least one step
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(BotError::Config(format!(
                "exchange '{}' has no steps",
                self.pattern.as_str()
            )));
        }
        for (expected, index) in (FIRST_STEP..).zip(self.steps.keys()) {
            if *index != expected {
                return Err(BotError::Config(format!(
                    "exchange '{}' steps must be numbered from {} without gaps, found {} where {} was expected",
                    self.pattern.as_str(),
                    FIRST_STEP,
                    index,
                    expected
                )));
            }
        }
        Ok(())
    }
}

/// Lifecycle of a running exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    /// Executing steps
    Running,
    /// Parked on a message-handler step, waiting for the next message
    Suspended,
    /// Ran past its last step
    Completed,
    /// A step failed
    Failed,
    /// Ended by `terminate` or by the idle sweeper
    Terminated,
}

impl ExchangeState {
    /// Whether the exchange is still registered and may receive messages
    pub fn is_active(self) -> bool {
        matches!(self, ExchangeState::Running | ExchangeState::Suspended)
    }
}

/// A running conversation tied to one thread
pub struct Exchange {
    id: String,
    pattern: Regex,
    usage: String,
    steps: BTreeMap<usize, Step>,

    /// Data passed between steps of this exchange
    pub store: Box<dyn Store>,

    bot: Bot,
    channel: String,
    thread: String,
    user: String,
    cursor: usize,
    state: ExchangeState,
    last_activity: Instant,
}

impl Exchange {
    /// Instantiate from a template for the given triggering message
    ///
    /// Steps are copied out of the template so every run owns its own map.
    pub(crate) fn start(
        template: &ExchangeTemplate,
        bot: Bot,
        trigger: &MessageEvent,
        store: Box<dyn Store>,
    ) -> Self {
        Self {
            id: format!("exc-{}", uuid::Uuid::new_v4()),
            pattern: template.pattern.clone(),
            usage: template.usage.clone(),
            steps: template.steps.clone(),
            store,
            bot,
            channel: trigger.channel.clone(),
            thread: trigger.timestamp.clone(),
            user: trigger.user.clone(),
            cursor: FIRST_STEP,
            state: ExchangeState::Running,
            last_activity: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    pub fn usage(&self) -> &str {
        &self.usage
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn thread(&self) -> &str {
        &self.thread
    }

    /// User that started the exchange
    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn current_index(&self) -> usize {
        self.cursor
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// The step at the cursor
    pub fn current_step(&self) -> Result<&Step> {
        self.steps
            .get(&self.cursor)
            .ok_or(BotError::StepNotFound(self.cursor))
    }

    /// Move the cursor to an existing step; the cursor is untouched on error
    pub fn skip_to_step(&mut self, index: usize) -> Result<()> {
        if !self.steps.contains_key(&index) {
            return Err(BotError::StepNotFound(index));
        }
        self.cursor = index;
        Ok(())
    }

    /// End the exchange and drop it from the registry
    ///
    /// A handler calling this finishes its own step; no further steps run.
    pub async fn terminate(&mut self) {
        self.bot
            .log_debug(&format!("killing exchange {}", self.thread))
            .await;
        self.finish(ExchangeState::Terminated);
    }

    /// Post a message into the exchange thread
    pub async fn reply(&self, text: &str) -> Result<PostedMessage> {
        self.reply_with_options(OutgoingMessage::text(text)).await
    }

    /// Post a message with options into the exchange thread
    pub async fn reply_with_options(&self, message: OutgoingMessage) -> Result<PostedMessage> {
        let message = message.in_thread(self.thread.clone());
        self.bot.reply_with_options(&self.channel, message).await
    }

    /// Whether the exchange has been idle for longer than `timeout`
    pub fn is_idle(&self, timeout: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.last_activity) > timeout
    }

    pub(crate) fn expire(&mut self) {
        self.state = ExchangeState::Terminated;
    }

    /// Drive the exchange until it suspends or ends
    ///
    /// `event` is the inbound message that woke the exchange, if any. It is
    /// offered only to the step at the cursor on entry; steps reached by
    /// auto-advancing run without it.
    pub async fn resume(&mut self, event: Option<&MessageEvent>) -> ExchangeState {
        if !self.is_active() {
            return self.state;
        }
        self.state = ExchangeState::Running;
        if event.is_some() {
            self.last_activity = Instant::now();
        }

        let mut event = event;
        loop {
            let step = match self.current_step() {
                Ok(step) => step.clone(),
                Err(e) => {
                    self.fail("", e).await;
                    return self.state;
                }
            };
            let start = self.cursor;

            tracing::debug!(
                exchange = %self.id,
                thread = %self.thread,
                step = start,
                name = %step.name(),
                kind = step.action().kind(),
                "Running exchange step"
            );

            match step.action() {
                StepAction::Message(text) => {
                    if let Err(e) = self.reply(text).await {
                        self.fail(step.name(), e).await;
                        return self.state;
                    }
                }
                StepAction::Handler(handler) => {
                    if let Err(e) = handler(self).await {
                        self.fail(step.name(), e).await;
                        return self.state;
                    }
                }
                StepAction::MessageHandler(handler) => {
                    let Some(ev) = event.take() else {
                        self.state = ExchangeState::Suspended;
                        return self.state;
                    };
                    match handler(self, ev).await {
                        Err(e) => {
                            self.fail(step.name(), e).await;
                            return self.state;
                        }
                        Ok(MessageOutcome::Retry) => {
                            if !self.is_active() {
                                return self.state;
                            }
                            // Re-enter without the consumed message; the step suspends again
                            continue;
                        }
                        Ok(MessageOutcome::Advance) => {}
                    }
                }
            }
            event = None;

            if !self.is_active() {
                return self.state;
            }

            if self.cursor == start && !self.advance() {
                tracing::debug!(
                    exchange = %self.id,
                    thread = %self.thread,
                    "Exchange completed"
                );
                self.finish(ExchangeState::Completed);
                return self.state;
            }
        }
    }

    fn advance(&mut self) -> bool {
        let next = self.cursor + 1;
        if self.steps.contains_key(&next) {
            self.cursor = next;
            true
        } else {
            false
        }
    }

    async fn fail(&mut self, step_name: &str, err: BotError) {
        let msg = format!(
            "An error has occurred in exchange {}-{}, step {} {}: {}",
            self.channel, self.thread, self.cursor, step_name, err
        );
        tracing::warn!(
            exchange = %self.id,
            channel = %self.channel,
            thread = %self.thread,
            step = self.cursor,
            name = %step_name,
            error = %err,
            "Exchange step failed"
        );
        self.bot.log_debug(&msg).await;

        if !matches!(err, BotError::CircuitOpen) {
            let _ = self.reply(&unrecoverable_error_message(&err)).await;
        }
        self.finish(ExchangeState::Failed);
    }

    fn finish(&mut self, state: ExchangeState) {
        self.state = state;
        self.bot.registry().remove(&self.thread, &self.id);
    }
}

impl std::fmt::Debug for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("thread", &self.thread)
            .field("user", &self.user)
            .field("cursor", &self.cursor)
            .field("state", &self.state)
            .finish()
    }
}
