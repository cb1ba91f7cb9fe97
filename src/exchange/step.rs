//! Exchange steps
//!
//! A step does exactly one of three things. The variant is fixed when the
//! step is built, so a step can never carry more than one behavior.

use super::Exchange;
use crate::error::Result;
use crate::types::MessageEvent;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Side-effecting step handler; an error terminates the exchange
pub type StepHandler =
    Arc<dyn for<'a> Fn(&'a mut Exchange) -> BoxFuture<'a, Result<()>> + Send + Sync>;

/// Handler that consumes one inbound message on the exchange thread
pub type MessageHandler = Arc<
    dyn for<'a> Fn(&'a mut Exchange, &'a MessageEvent) -> BoxFuture<'a, Result<MessageOutcome>>
        + Send
        + Sync,
>;

/// What a message handler wants to happen next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Move on to the next step
    Advance,
    /// Stay on this step and wait for another message
    Retry,
}

/// The behavior of a step
#[derive(Clone)]
pub enum StepAction {
    /// Post a fixed message into the exchange thread, then advance
    Message(String),
    /// Run a handler, then advance
    Handler(StepHandler),
    /// Wait for the next message on the thread and hand it to the handler
    MessageHandler(MessageHandler),
}

impl StepAction {
    pub fn kind(&self) -> &'static str {
        match self {
            StepAction::Message(_) => "message",
            StepAction::Handler(_) => "handler",
            StepAction::MessageHandler(_) => "message-handler",
        }
    }

    /// Whether the step waits for inbound input
    pub fn awaits_input(&self) -> bool {
        matches!(self, StepAction::MessageHandler(_))
    }
}

/// One step of an exchange
#[derive(Clone)]
pub struct Step {
    name: String,
    action: StepAction,
}

impl Step {
    /// A step that posts `text` into the exchange thread
    pub fn message(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            action: StepAction::Message(text.into()),
        }
    }

    /// A step that runs `handler`
    ///
    /// ```ignore
    /// Step::handler("greet", |ex| Box::pin(async move {
    ///     ex.reply("hello").await?;
    ///     Ok(())
    /// }))
    /// ```
    pub fn handler<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut Exchange) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            action: StepAction::Handler(Arc::new(handler)),
        }
    }

    /// A step that waits for a message on the thread
    pub fn message_handler<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut Exchange, &'a MessageEvent) -> BoxFuture<'a, Result<MessageOutcome>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            action: StepAction::MessageHandler(Arc::new(handler)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action(&self) -> &StepAction {
        &self.action
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("kind", &self.action.kind())
            .finish()
    }
}
