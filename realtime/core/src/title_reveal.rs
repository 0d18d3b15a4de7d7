//! Title reveal animation
//!
//! Types a conversation title in one character at a time. Each reveal is a
//! tokio task emitting growing prefixes on a shared channel; the owner applies
//! them and can cancel a reveal at any point.
//!
//! Every reveal gets a generation number. A step is handed out only while its
//! generation is still the running one for that conversation, so steps sent by
//! a replaced or cancelled task are dropped even if the abort lands late.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::binder::RevealRequest;
use crate::messages::ConversationId;

/// Default delay between revealed characters
pub const DEFAULT_REVEAL_INTERVAL: Duration = Duration::from_millis(50);

/// One frame of a reveal
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevealStep {
    /// Conversation being relabelled
    pub conversation_id: ConversationId,
    /// Title prefix to display
    pub title: String,
    /// Last step of this reveal
    pub finished: bool,
    generation: u64,
}

#[derive(Debug)]
struct Running {
    generation: u64,
    task: JoinHandle<()>,
}

/// Running reveals, at most one per conversation
#[derive(Debug)]
pub struct TitleReveal {
    interval: Duration,
    tasks: HashMap<ConversationId, Running>,
    next_generation: u64,
    steps_tx: mpsc::UnboundedSender<RevealStep>,
    steps_rx: mpsc::UnboundedReceiver<RevealStep>,
}

impl TitleReveal {
    /// Reveal one character per `interval`; zero shows the title at once
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        let (steps_tx, steps_rx) = mpsc::unbounded_channel();
        Self {
            interval,
            tasks: HashMap::new(),
            next_generation: 0,
            steps_tx,
            steps_rx,
        }
    }

    /// Start revealing `request.title`, replacing any reveal for the same id
    pub fn start(&mut self, request: RevealRequest) {
        let RevealRequest {
            conversation_id,
            title,
        } = request;

        if let Some(previous) = self.tasks.remove(&conversation_id) {
            previous.task.abort();
        }

        self.next_generation += 1;
        let generation = self.next_generation;

        debug!(conversation = %conversation_id, chars = title.chars().count(), "Title reveal started");

        let tx = self.steps_tx.clone();
        let interval = self.interval;
        let id = conversation_id.clone();
        let task = tokio::spawn(async move {
            if interval.is_zero() || title.is_empty() {
                let _ = tx.send(RevealStep {
                    conversation_id: id,
                    title,
                    finished: true,
                    generation,
                });
                return;
            }

            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            for (start, ch) in title.char_indices() {
                ticker.tick().await;
                let end = start + ch.len_utf8();
                let step = RevealStep {
                    conversation_id: id.clone(),
                    title: title[..end].to_string(),
                    finished: end == title.len(),
                    generation,
                };
                if tx.send(step).is_err() {
                    return;
                }
            }
        });

        self.tasks
            .insert(conversation_id, Running { generation, task });
    }

    /// Stop the reveal for `id`; true if one was running
    pub fn cancel(&mut self, id: &ConversationId) -> bool {
        match self.tasks.remove(id) {
            Some(Running { task, .. }) => {
                let running = !task.is_finished();
                task.abort();
                running
            }
            None => false,
        }
    }

    /// Stop every reveal and discard steps not yet applied
    pub fn cancel_all(&mut self) {
        for (_, running) in self.tasks.drain() {
            running.task.abort();
        }
        while self.steps_rx.try_recv().is_ok() {}
    }

    /// Forget a reveal whose final step has been applied
    pub fn finished(&mut self, id: &ConversationId) {
        self.tasks.remove(id);
    }

    /// Wait for the next step from any reveal
    ///
    /// Pends forever while nothing is running, so it can sit in a `select!`.
    pub async fn next_step(&mut self) -> Option<RevealStep> {
        loop {
            let step = self.steps_rx.recv().await?;
            if self.is_current(&step) {
                return Some(step);
            }
        }
    }

    /// Take a step without waiting
    pub fn try_next_step(&mut self) -> Option<RevealStep> {
        while let Ok(step) = self.steps_rx.try_recv() {
            if self.is_current(&step) {
                return Some(step);
            }
        }
        None
    }

    fn is_current(&self, step: &RevealStep) -> bool {
        let current = self
            .tasks
            .get(&step.conversation_id)
            .is_some_and(|running| running.generation == step.generation);
        if !current {
            debug!(conversation = %step.conversation_id, "Stale title step dropped");
        }
        current
    }

    /// Number of reveals that have not finished
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|running| !running.task.is_finished())
            .count()
    }
}

impl Default for TitleReveal {
    fn default() -> Self {
        Self::new(DEFAULT_REVEAL_INTERVAL)
    }
}

impl Drop for TitleReveal {
    fn drop(&mut self) {
        for running in self.tasks.values() {
            running.task.abort();
        }
    }
}
