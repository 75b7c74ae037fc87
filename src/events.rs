//! Events delivered to the session controller's loop.
//!
//! Spawned work (uploads, preview decodes, assist/generate calls, notice
//! timers) never touches session state directly. It reports back through a
//! channel and the controller applies the result on its own loop.

use tokio::sync::mpsc::UnboundedSender;

use crate::error_taxonomy::SessionError;
use crate::models::{AssistResponse, GeneratedImage, UploadedRef};
use crate::operation::OperationTicket;
use crate::preview::{PreviewHandle, PreviewOutcome};
use crate::slots::SlotId;

#[derive(Debug)]
pub enum SessionEvent {
    /// An upload finished, one way or another.
    UploadFinished {
        slot: SlotId,
        attempt: u64,
        result: Result<UploadedRef, SessionError>,
    },

    /// A preview decode settled.
    PreviewSettled {
        slot: SlotId,
        handle: PreviewHandle,
        outcome: PreviewOutcome,
    },

    AssistFinished {
        ticket: OperationTicket,
        result: Result<AssistResponse, SessionError>,
    },

    GenerateFinished {
        ticket: OperationTicket,
        result: Result<GeneratedImage, SessionError>,
    },

    /// The auto-hide timer of the notice shown at `epoch` fired.
    NoticeExpired { epoch: u64 },
}

impl SessionEvent {
    /// Whether this event completes work the controller is waiting on.
    #[must_use]
    pub fn completes_pending_work(&self) -> bool {
        !matches!(self, Self::NoticeExpired { .. })
    }
}

/// Sends exactly one event for a piece of spawned work.
///
/// If the work ends without calling [`Reply::send`] (it panicked or was
/// aborted), the fallback event is sent on drop instead, so the controller
/// is never left waiting and no control stays disabled.
#[derive(Debug)]
pub struct Reply {
    tx: UnboundedSender<SessionEvent>,
    fallback: Option<SessionEvent>,
}

impl Reply {
    #[must_use]
    pub fn new(tx: UnboundedSender<SessionEvent>, fallback: SessionEvent) -> Self {
        Self {
            tx,
            fallback: Some(fallback),
        }
    }

    pub fn send(mut self, event: SessionEvent) {
        self.fallback = None;
        let _ = self.tx.send(event);
    }
}

impl Drop for Reply {
    fn drop(&mut self) {
        if let Some(event) = self.fallback.take() {
            let _ = self.tx.send(event);
        }
    }
}
