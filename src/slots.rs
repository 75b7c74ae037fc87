//! Upload slot registry.
//!
//! Each slot is an independent upload affordance with its own lifecycle:
//! `Empty -> Selected -> Uploading -> Confirmed | Failed`. Failed slots are
//! removed immediately so the user retries through a fresh slot.
//!
//! The registry is only ever mutated from the controller's loop. Upload
//! results that arrive for a slot that has since been removed, or for an
//! attempt that has been superseded by a newer selection, are ignored.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use bytes::Bytes;

use crate::error_taxonomy::{SessionError, ValidationError};
use crate::models::UploadedRef;
use crate::preview::{PreviewHandle, PreviewOutcome, PreviewStore};

// === Types ===

/// Stable slot identifier. Allocation order is creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(u64);

impl SlotId {
    /// Correlation token sent alongside the uploaded file.
    #[must_use]
    pub fn token(self) -> String {
        self.to_string()
    }

    #[must_use]
    pub fn number(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "upload-{}", self.0)
    }
}

/// A user-selected file with its declared MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub name: String,
    pub mime: String,
    pub bytes: Bytes,
}

impl LocalFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes,
        }
    }

    /// Read a file from disk, declaring its type from the extension.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "image".to_string());
        let mime = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Ok(Self::new(name, mime, Bytes::from(bytes)))
    }

    #[must_use]
    pub fn is_image(&self) -> bool {
        self.mime.starts_with("image/")
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    Empty,
    Selected,
    Uploading,
    Confirmed,
    Failed,
}

impl SlotStatus {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Selected => "selected",
            Self::Uploading => "uploading",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadSlot {
    id: SlotId,
    local_file: Option<LocalFile>,
    preview: Option<PreviewHandle>,
    server_ref: Option<UploadedRef>,
    status: SlotStatus,
    upload_attempt: u64,
    preview_unavailable: bool,
}

impl UploadSlot {
    fn new(id: SlotId) -> Self {
        Self {
            id,
            local_file: None,
            preview: None,
            server_ref: None,
            status: SlotStatus::Empty,
            upload_attempt: 0,
            preview_unavailable: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> SlotId {
        self.id
    }

    #[must_use]
    pub fn status(&self) -> SlotStatus {
        self.status
    }

    #[must_use]
    pub fn local_file(&self) -> Option<&LocalFile> {
        self.local_file.as_ref()
    }

    #[must_use]
    pub fn preview(&self) -> Option<PreviewHandle> {
        self.preview
    }

    #[must_use]
    pub fn server_ref(&self) -> Option<&UploadedRef> {
        self.server_ref.as_ref()
    }

    #[must_use]
    pub fn preview_unavailable(&self) -> bool {
        self.preview_unavailable
    }
}

/// Everything a spawned upload needs, detached from the registry.
#[derive(Debug, Clone)]
pub struct UploadTicket {
    pub slot: SlotId,
    pub attempt: u64,
    pub file: LocalFile,
}

/// What applying an upload result did to the registry.
#[derive(Debug)]
pub enum UploadApplied {
    Confirmed(UploadedRef),
    /// The slot was marked failed and removed.
    Failed {
        removed: UploadSlot,
        error: SessionError,
    },
    /// The slot is gone or the result belongs to a superseded attempt.
    Ignored,
}

// === SlotRegistry ===

#[derive(Debug, Default)]
pub struct SlotRegistry {
    next_id: u64,
    slots: BTreeMap<SlotId, UploadSlot>,
    previews: PreviewStore,
}

impl SlotRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_slot(&mut self) -> SlotId {
        self.next_id += 1;
        let id = SlotId(self.next_id);
        self.slots.insert(id, UploadSlot::new(id));
        id
    }

    #[must_use]
    pub fn get(&self, id: SlotId) -> Option<&UploadSlot> {
        self.slots.get(&id)
    }

    #[must_use]
    pub fn contains(&self, id: SlotId) -> bool {
        self.slots.contains_key(&id)
    }

    /// Slots in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &UploadSlot> {
        self.slots.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[must_use]
    pub fn previews(&self) -> &PreviewStore {
        &self.previews
    }

    /// Resolve a slot by its number or its `upload-N` token.
    #[must_use]
    pub fn find(&self, key: &str) -> Option<SlotId> {
        let key = key.trim();
        let number = key.strip_prefix("upload-").unwrap_or(key);
        let id = SlotId(number.parse().ok()?);
        self.contains(id).then_some(id)
    }

    /// Put a file into a slot. Non-image files are ignored and `Ok(None)` is
    /// returned without touching the slot.
    pub fn select_file(
        &mut self,
        id: SlotId,
        file: LocalFile,
    ) -> Result<Option<PreviewHandle>, SessionError> {
        if !self.contains(id) {
            return Err(ValidationError::UnknownSlot(id).into());
        }
        if !file.is_image() {
            return Ok(None);
        }
        self.release_preview(id);
        let handle = self.previews.acquire(&file);
        let Some(slot) = self.slots.get_mut(&id) else {
            self.previews.release(handle);
            return Err(ValidationError::UnknownSlot(id).into());
        };
        slot.local_file = Some(file);
        slot.preview = Some(handle);
        slot.preview_unavailable = false;
        slot.server_ref = None;
        slot.status = SlotStatus::Selected;
        Ok(Some(handle))
    }

    /// Handle a drop of one or more files; only the first one counts.
    pub fn drop_files(
        &mut self,
        id: SlotId,
        files: Vec<LocalFile>,
    ) -> Result<Option<PreviewHandle>, SessionError> {
        match files.into_iter().next() {
            Some(file) => self.select_file(id, file),
            None => Ok(None),
        }
    }

    /// Move a selected slot to `Uploading` and hand out what the transport
    /// needs.
    pub fn begin_upload(&mut self, id: SlotId) -> Result<UploadTicket, SessionError> {
        let slot = self
            .slots
            .get_mut(&id)
            .ok_or(ValidationError::UnknownSlot(id))?;
        let Some(file) = slot.local_file.clone() else {
            return Err(ValidationError::UnknownSlot(id).into());
        };
        slot.upload_attempt += 1;
        slot.server_ref = None;
        slot.status = SlotStatus::Uploading;
        Ok(UploadTicket {
            slot: id,
            attempt: slot.upload_attempt,
            file,
        })
    }

    pub fn apply_upload(
        &mut self,
        slot_id: SlotId,
        attempt: u64,
        result: Result<UploadedRef, SessionError>,
    ) -> UploadApplied {
        let Some(slot) = self.slots.get_mut(&slot_id) else {
            return UploadApplied::Ignored;
        };
        if slot.upload_attempt != attempt || slot.status != SlotStatus::Uploading {
            return UploadApplied::Ignored;
        }
        match result {
            Ok(server_ref) => {
                slot.server_ref = Some(server_ref.clone());
                slot.status = SlotStatus::Confirmed;
                UploadApplied::Confirmed(server_ref)
            }
            Err(error) => {
                slot.status = SlotStatus::Failed;
                match self.remove_slot(slot_id) {
                    Some(removed) => UploadApplied::Failed { removed, error },
                    None => UploadApplied::Ignored,
                }
            }
        }
    }

    /// Delete a slot, releasing its preview. In-flight uploads keep running;
    /// their results are ignored when they arrive.
    pub fn remove_slot(&mut self, id: SlotId) -> Option<UploadSlot> {
        self.release_preview(id);
        self.slots.remove(&id)
    }

    /// Remove every slot, releasing every preview.
    pub fn clear(&mut self) {
        let ids: Vec<SlotId> = self.slots.keys().copied().collect();
        for id in ids {
            self.remove_slot(id);
        }
    }

    /// The preview decode for `handle` settled. Stale handles are no-ops.
    pub fn settle_preview(&mut self, id: SlotId, handle: PreviewHandle, outcome: PreviewOutcome) {
        if let Some(slot) = self.slots.get_mut(&id)
            && slot.preview == Some(handle)
        {
            slot.preview_unavailable = matches!(outcome, PreviewOutcome::Failed);
            self.release_preview(id);
        } else {
            self.previews.release(handle);
        }
    }

    /// Single release point for a slot's preview handle.
    fn release_preview(&mut self, id: SlotId) -> bool {
        let Some(handle) = self.slots.get_mut(&id).and_then(|slot| slot.preview.take()) else {
            return false;
        };
        self.previews.release(handle)
    }

    /// Confirmed filenames in slot creation order.
    #[must_use]
    pub fn reference_images(&self) -> Vec<String> {
        self.slots
            .values()
            .filter(|slot| slot.status == SlotStatus::Confirmed)
            .filter_map(|slot| slot.server_ref.as_ref())
            .map(|server_ref| server_ref.filename.clone())
            .collect()
    }

    #[must_use]
    pub fn uploads_in_flight(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| slot.status == SlotStatus::Uploading)
            .count()
    }
}
