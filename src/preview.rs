//! Local preview handles for selected files.
//!
//! A handle keeps a file's bytes reachable for the preview surface until it
//! is released. Handle numbers are never reused, so releasing a handle twice
//! is a no-op and can never free somebody else's bytes.

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;

use crate::slots::LocalFile;

/// Opaque, revocable reference to previewed file bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PreviewHandle(u64);

impl fmt::Display for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "preview:{}", self.0)
    }
}

/// How decoding a preview settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewOutcome {
    Decoded {
        format: &'static str,
        width: u32,
        height: u32,
    },
    Failed,
}

#[derive(Debug, Default)]
pub struct PreviewStore {
    next_id: u64,
    live: HashMap<PreviewHandle, Bytes>,
    released: u64,
}

impl PreviewStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&mut self, file: &LocalFile) -> PreviewHandle {
        self.next_id += 1;
        let handle = PreviewHandle(self.next_id);
        self.live.insert(handle, file.bytes.clone());
        handle
    }

    /// Release a handle. Returns `true` only for the call that freed it.
    pub fn release(&mut self, handle: PreviewHandle) -> bool {
        let freed = self.live.remove(&handle).is_some();
        if freed {
            self.released += 1;
        }
        freed
    }

    #[must_use]
    pub fn bytes(&self, handle: PreviewHandle) -> Option<&Bytes> {
        self.live.get(&handle)
    }

    #[must_use]
    pub fn is_live(&self, handle: PreviewHandle) -> bool {
        self.live.contains_key(&handle)
    }

    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    #[must_use]
    pub fn acquired_count(&self) -> u64 {
        self.next_id
    }

    #[must_use]
    pub fn released_count(&self) -> u64 {
        self.released
    }
}

/// Decode the bytes the way the preview surface would. Any decode error,
/// including a valid header over a corrupt body, settles as `Failed`.
#[must_use]
pub fn decode_preview(bytes: &[u8]) -> PreviewOutcome {
    let Ok(format) = image::guess_format(bytes) else {
        return PreviewOutcome::Failed;
    };
    match image::load_from_memory_with_format(bytes, format) {
        Ok(decoded) => PreviewOutcome::Decoded {
            format: format.extensions_str().first().copied().unwrap_or("image"),
            width: decoded.width(),
            height: decoded.height(),
        },
        Err(_) => PreviewOutcome::Failed,
    }
}
