//! Dismissible user notices raised by the controller.
//!
//! Notices are pushed into an append-only sink owned by the host
//! application; the controller never mutates or removes entries. Delivery
//! is best-effort — a sink with no listener makes `push` a logged no-op.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Visual severity of a notice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NoticeVariant {
    #[default]
    Info,
    Warning,
    Error,
}

/// A user-selectable action attached to a notice.
#[derive(Clone)]
pub struct NoticeAction {
    pub title: String,
    on_select: Arc<dyn Fn() + Send + Sync>,
}

impl NoticeAction {
    pub fn new(title: impl Into<String>, on_select: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            title: title.into(),
            on_select: Arc::new(on_select),
        }
    }

    /// Run the action callback.
    pub fn invoke(&self) {
        (self.on_select)();
    }
}

impl fmt::Debug for NoticeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoticeAction")
            .field("title", &self.title)
            .finish_non_exhaustive()
    }
}

/// A dismissible, timed notice.
#[derive(Debug, Clone)]
pub struct Notice {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub init_expanded: bool,
    pub variant: NoticeVariant,
    pub actions: Vec<NoticeAction>,
    pub raised_at: DateTime<Utc>,
}

impl Notice {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            init_expanded: false,
            variant: NoticeVariant::default(),
            actions: Vec::new(),
            raised_at: Utc::now(),
        }
    }

    pub fn with_action(mut self, action: NoticeAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_variant(mut self, variant: NoticeVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn with_init_expanded(mut self, init_expanded: bool) -> Self {
        self.init_expanded = init_expanded;
        self
    }
}

/// Append-only destination for notices.
pub trait NoticeSink: Send + Sync {
    fn push(&self, notice: Notice);
}

/// Sink that delivers notices over an unbounded channel.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Notice>,
}

/// Create a channel-backed sink and the receiver the host drains.
pub fn channel() -> (ChannelSink, mpsc::UnboundedReceiver<Notice>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelSink { tx }, rx)
}

impl NoticeSink for ChannelSink {
    fn push(&self, notice: Notice) {
        // Ignore send errors — no receiver means no one is listening
        if self.tx.send(notice).is_err() {
            tracing::debug!(event = "core.notices.push_dropped");
        }
    }
}

/// Sink that discards every notice. Useful as a test double and for
/// immediate-update controllers that never raise notices anyway.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl NoticeSink for NullSink {
    fn push(&self, _notice: Notice) {}
}
