use tokio::sync::broadcast;
use tracing::debug;

/// Capacity of each broadcast channel. Slow subscribers that lag past this
/// many signals observe a `Lagged` error, which consumers treat as "something
/// happened" rather than a fault.
const BUS_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// Task-scoped notification forwarded to the external toast/popup
/// collaborator. Carries a human-readable title plus the underlying cause.
#[derive(Debug, Clone)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub detail: String,
}

impl Notice {
    pub fn success(title: impl Into<String>, detail: impl ToString) -> Self {
        Self {
            level: NoticeLevel::Success,
            title: title.into(),
            detail: detail.to_string(),
        }
    }

    pub fn error(title: impl Into<String>, detail: impl ToString) -> Self {
        Self {
            level: NoticeLevel::Error,
            title: title.into(),
            detail: detail.to_string(),
        }
    }
}

/// Process-wide signal bus, constructed once and passed by reference to every
/// task. `render` asks collaborators to re-read the mirrors; `refresh` asks
/// every waiting sync task to poll immediately; `notices` feeds the
/// notification collaborator.
///
/// A signal fired while nobody is subscribed is dropped silently: `refresh`
/// is a best-effort "hurry up", not a delivery guarantee.
#[derive(Debug)]
pub struct EventBus {
    render: broadcast::Sender<()>,
    refresh: broadcast::Sender<()>,
    notices: broadcast::Sender<Notice>,
}

impl EventBus {
    pub fn new() -> Self {
        let (render, _) = broadcast::channel(BUS_CAPACITY);
        let (refresh, _) = broadcast::channel(BUS_CAPACITY);
        let (notices, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            render,
            refresh,
            notices,
        }
    }

    /// State changed; collaborators should redraw. Carries no payload.
    pub fn render(&self) {
        let _ = self.render.send(());
    }

    /// A user action invalidated mirror state; tasks blocked in a wait should
    /// poll immediately.
    pub fn refresh(&self) {
        let _ = self.refresh.send(());
    }

    pub fn notify(&self, notice: Notice) {
        debug!(level = ?notice.level, title = %notice.title, detail = %notice.detail, "notice");
        let _ = self.notices.send(notice);
    }

    pub fn success(&self, title: &str, detail: impl ToString) {
        self.notify(Notice::success(title, detail));
    }

    pub fn error(&self, title: &str, cause: impl ToString) {
        self.notify(Notice::error(title, cause));
    }

    pub fn subscribe_render(&self) -> broadcast::Receiver<()> {
        self.render.subscribe()
    }

    pub fn subscribe_refresh(&self) -> broadcast::Receiver<()> {
        self.refresh.subscribe()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
