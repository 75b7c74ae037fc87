//! Single-slot notification surface.
//!
//! One notice is visible at a time; a new notice replaces the current one.
//! Every `show` bumps an epoch so that the expiry timer of an older notice
//! cannot hide a newer one.

use std::time::{Duration, Instant};

pub const ERROR_DURATION: Duration = Duration::from_millis(5000);
pub const MESSAGE_DURATION: Duration = Duration::from_millis(3000);
pub const COPY_DURATION: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Info,
    Error,
}

impl NoticeKind {
    #[must_use]
    pub fn default_duration(self) -> Duration {
        match self {
            Self::Error => ERROR_DURATION,
            Self::Success | Self::Info => MESSAGE_DURATION,
        }
    }

    #[must_use]
    pub fn icon(self) -> &'static str {
        match self {
            Self::Success => "✅",
            Self::Info => "ℹ️",
            Self::Error => "❌",
        }
    }
}

/// Tone applied on top of the default (error) look.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeTone {
    Success,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
    pub epoch: u64,
    pub shown_at: Instant,
    pub duration: Duration,
}

impl Notice {
    #[must_use]
    pub fn expires_at(&self) -> Instant {
        self.shown_at + self.duration
    }

    #[must_use]
    pub fn render(&self) -> String {
        format!("{} {}", self.kind.icon(), self.message)
    }
}

#[derive(Debug, Default)]
pub struct Notifier {
    current: Option<Notice>,
    tone: Option<NoticeTone>,
    epoch: u64,
}

impl Notifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Show a notice, replacing whatever is visible. Returns the notice so
    /// the caller can schedule its expiry.
    pub fn show(
        &mut self,
        kind: NoticeKind,
        message: impl Into<String>,
        duration: Duration,
        now: Instant,
    ) -> &Notice {
        self.epoch += 1;
        self.tone = match kind {
            NoticeKind::Success => Some(NoticeTone::Success),
            NoticeKind::Info => Some(NoticeTone::Info),
            NoticeKind::Error => None,
        };
        self.current.insert(Notice {
            kind,
            message: message.into(),
            epoch: self.epoch,
            shown_at: now,
            duration,
        })
    }

    /// Hide the notice shown at `epoch`, if it is still the current one.
    pub fn expire(&mut self, epoch: u64) -> bool {
        if self.current.as_ref().is_some_and(|n| n.epoch == epoch) {
            self.hide();
            return true;
        }
        false
    }

    /// Hide anything whose deadline has passed at `now`.
    pub fn tick(&mut self, now: Instant) {
        if self.current.as_ref().is_some_and(|n| now >= n.expires_at()) {
            self.hide();
        }
    }

    pub fn hide(&mut self) {
        self.current = None;
        self.tone = None;
    }

    #[must_use]
    pub fn current(&self) -> Option<&Notice> {
        self.current.as_ref()
    }

    #[must_use]
    pub fn tone(&self) -> Option<NoticeTone> {
        self.tone
    }
}
