//! Session controller: one owner for all session state.
//!
//! The controller owns the slot registry, the prompt form, the two
//! single-flight operations and the notification surface. Network calls and
//! preview decodes are spawned onto the runtime and report back as
//! [`SessionEvent`]s, which are applied on the controller's own loop via
//! [`SessionController::step`] or [`SessionController::settle`].
//!
//! Methods that start work spawn tasks, so the controller must be driven
//! from inside a tokio runtime.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::config::Config;
use crate::error_taxonomy::{SessionError, ValidationError};
use crate::events::{Reply, SessionEvent};
use crate::form::{AdvancedOptions, PromptForm};
use crate::logging;
use crate::messages::{Locale, Messages};
use crate::models::{AspectRatio, AssistRequest, AssistResponse, GenerateRequest, GeneratedImage};
use crate::notify::{COPY_DURATION, Notice, NoticeKind, Notifier};
use crate::operation::{Operation, OperationKind, OperationState, OperationTicket};
use crate::preview::{PreviewHandle, PreviewOutcome, decode_preview};
use crate::slots::{LocalFile, SlotId, SlotRegistry, UploadApplied};
use crate::transport::SessionTransport;

// === Types ===

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub locale: Locale,
    pub initial_slots: usize,
    pub aspect_ratio: Option<AspectRatio>,
    pub advanced: AdvancedOptions,
    /// Spawn auto-hide timers for notices.
    pub notice_timers: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            locale: Locale::default(),
            initial_slots: 1,
            aspect_ratio: Some(AspectRatio::default()),
            advanced: AdvancedOptions::default(),
            notice_timers: true,
        }
    }
}

impl SessionOptions {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            locale: config.locale(),
            initial_slots: config.initial_slots(),
            aspect_ratio: Some(config.aspect_ratio()),
            advanced: config.advanced_options(),
            notice_timers: true,
        }
    }
}

/// Per-slot user actions. Each is bound to exactly one slot id.
#[derive(Debug, Clone)]
pub enum SlotAction {
    Select(LocalFile),
    Drop(Vec<LocalFile>),
    Remove,
}

/// What a failure message is about, for picking the fallback text.
#[derive(Debug, Clone, Copy)]
enum FailureContext {
    Upload,
    Operation(OperationKind),
}

// === SessionController ===

pub struct SessionController {
    transport: Arc<dyn SessionTransport>,
    registry: SlotRegistry,
    form: PromptForm,
    assist: Operation<AssistResponse>,
    generate: Operation<GeneratedImage>,
    expanded: Option<String>,
    generated: Option<GeneratedImage>,
    notifier: Notifier,
    messages: Messages,
    notice_timers: bool,
    tx: UnboundedSender<SessionEvent>,
    rx: UnboundedReceiver<SessionEvent>,
    pending: usize,
}

impl SessionController {
    pub fn new(transport: Arc<dyn SessionTransport>, options: SessionOptions) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut registry = SlotRegistry::new();
        for _ in 0..options.initial_slots {
            registry.create_slot();
        }
        Self {
            transport,
            registry,
            form: PromptForm::new(options.aspect_ratio, options.advanced),
            assist: Operation::new(OperationKind::Assist),
            generate: Operation::new(OperationKind::Generate),
            expanded: None,
            generated: None,
            notifier: Notifier::new(),
            messages: Messages::new(options.locale),
            notice_timers: options.notice_timers,
            tx,
            rx,
            pending: 0,
        }
    }

    // --- Accessors ---

    #[must_use]
    pub fn slots(&self) -> &SlotRegistry {
        &self.registry
    }

    #[must_use]
    pub fn form(&self) -> &PromptForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut PromptForm {
        &mut self.form
    }

    #[must_use]
    pub fn messages(&self) -> Messages {
        self.messages
    }

    #[must_use]
    pub fn assist_state(&self) -> &OperationState<AssistResponse> {
        self.assist.state()
    }

    #[must_use]
    pub fn generate_state(&self) -> &OperationState<GeneratedImage> {
        self.generate.state()
    }

    #[must_use]
    pub fn is_enabled(&self, kind: OperationKind) -> bool {
        match kind {
            OperationKind::Assist => self.assist.is_enabled(),
            OperationKind::Generate => self.generate.is_enabled(),
        }
    }

    #[must_use]
    pub fn is_loading(&self, kind: OperationKind) -> bool {
        !self.is_enabled(kind)
    }

    /// Expanded prompt currently on display.
    #[must_use]
    pub fn expanded_text(&self) -> Option<&str> {
        self.expanded.as_deref()
    }

    #[must_use]
    pub fn generated(&self) -> Option<&GeneratedImage> {
        self.generated.as_ref()
    }

    #[must_use]
    pub fn notice(&self) -> Option<&Notice> {
        self.notifier.current()
    }

    #[must_use]
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Spawned work that has not reported back yet.
    #[must_use]
    pub fn pending_work(&self) -> usize {
        self.pending
    }

    // --- Slots ---

    pub fn create_slot(&mut self) -> SlotId {
        let id = self.registry.create_slot();
        logging::debug(format!("Created slot {id}"));
        id
    }

    pub fn dispatch_slot(&mut self, id: SlotId, action: SlotAction) -> Result<bool, SessionError> {
        match action {
            SlotAction::Select(file) => self.select_file(id, file),
            SlotAction::Drop(files) => self.drop_files(id, files),
            SlotAction::Remove => Ok(self.remove_slot(id)),
        }
    }

    /// Put a file into a slot and start uploading it. Returns `false` when
    /// the file was ignored for not being an image.
    pub fn select_file(&mut self, id: SlotId, file: LocalFile) -> Result<bool, SessionError> {
        let handle = self.registry.select_file(id, file)?;
        self.accept_selection(id, handle)
    }

    pub fn drop_files(&mut self, id: SlotId, files: Vec<LocalFile>) -> Result<bool, SessionError> {
        let handle = self.registry.drop_files(id, files)?;
        self.accept_selection(id, handle)
    }

    fn accept_selection(
        &mut self,
        id: SlotId,
        handle: Option<PreviewHandle>,
    ) -> Result<bool, SessionError> {
        let Some(handle) = handle else {
            logging::debug(format!("Ignored non-image file for {id}"));
            return Ok(false);
        };
        self.spawn_preview_decode(id, handle);
        self.upload_slot(id)?;
        Ok(true)
    }

    /// Start uploading the slot's current file.
    pub fn upload_slot(&mut self, id: SlotId) -> Result<(), SessionError> {
        let ticket = self.registry.begin_upload(id)?;
        let (slot, attempt) = (ticket.slot, ticket.attempt);
        let reply = Reply::new(
            self.tx.clone(),
            SessionEvent::UploadFinished {
                slot,
                attempt,
                result: Err(SessionError::Transport(
                    "upload ended without a response".to_string(),
                )),
            },
        );
        let transport = Arc::clone(&self.transport);
        self.pending += 1;
        tokio::spawn(async move {
            let result = transport.upload(ticket.file, slot.token()).await;
            reply.send(SessionEvent::UploadFinished {
                slot,
                attempt,
                result,
            });
        });
        Ok(())
    }

    /// Remove a slot. An in-flight upload keeps running and its result is
    /// discarded.
    pub fn remove_slot(&mut self, id: SlotId) -> bool {
        let removed = self.registry.remove_slot(id).is_some();
        if removed {
            logging::debug(format!("Removed slot {id}"));
        }
        removed
    }

    fn spawn_preview_decode(&mut self, slot: SlotId, handle: PreviewHandle) {
        let Some(bytes) = self.registry.previews().bytes(handle).cloned() else {
            return;
        };
        let reply = Reply::new(
            self.tx.clone(),
            SessionEvent::PreviewSettled {
                slot,
                handle,
                outcome: PreviewOutcome::Failed,
            },
        );
        self.pending += 1;
        tokio::spawn(async move {
            let outcome = tokio::task::spawn_blocking(move || decode_preview(&bytes))
                .await
                .unwrap_or(PreviewOutcome::Failed);
            reply.send(SessionEvent::PreviewSettled {
                slot,
                handle,
                outcome,
            });
        });
    }

    // --- Operations ---

    fn validated_form(&mut self) -> Result<(String, AspectRatio), SessionError> {
        match self.form.validated() {
            Ok(valid) => Ok(valid),
            Err(err) => {
                let message = match err {
                    ValidationError::EmptyPrompt => self.messages.prompt_required(),
                    ValidationError::MissingAspectRatio => self.messages.aspect_ratio_required(),
                    ValidationError::UnknownSlot(_) => err.to_string(),
                };
                self.notify(NoticeKind::Error, message);
                Err(err.into())
            }
        }
    }

    /// Submit the prompt for expansion.
    pub fn submit_assist(&mut self) -> Result<OperationTicket, SessionError> {
        if !self.assist.is_enabled() {
            return Err(SessionError::Busy(OperationKind::Assist));
        }
        let (prompt, aspect_ratio) = self.validated_form()?;
        let ticket = self.assist.begin()?;
        let request = AssistRequest {
            prompt,
            aspect_ratio,
            reference_images: self.registry.reference_images(),
        };
        logging::info(format!(
            "Submitting assist ({aspect_ratio}, {} reference image(s))",
            request.reference_images.len()
        ));

        let reply = Reply::new(
            self.tx.clone(),
            SessionEvent::AssistFinished {
                ticket,
                result: Err(SessionError::Transport(
                    "assist ended without a response".to_string(),
                )),
            },
        );
        let transport = Arc::clone(&self.transport);
        self.pending += 1;
        tokio::spawn(async move {
            let result = transport.assist(request).await;
            reply.send(SessionEvent::AssistFinished { ticket, result });
        });
        Ok(ticket)
    }

    /// Submit an image generation request.
    pub fn submit_generate(&mut self) -> Result<OperationTicket, SessionError> {
        if !self.generate.is_enabled() {
            return Err(SessionError::Busy(OperationKind::Generate));
        }
        let (prompt, aspect_ratio) = self.validated_form()?;
        let ticket = self.generate.begin()?;
        let advanced = &self.form.advanced;
        let request = GenerateRequest {
            prompt,
            aspect_ratio,
            negative_prompt: advanced.negative_prompt.trim().to_string(),
            guidance_scale: advanced.guidance_scale(),
            num_inference_steps: advanced.inference_steps(),
            reference_images: self.registry.reference_images(),
        };
        logging::info(format!(
            "Submitting generate ({aspect_ratio}, guidance {}, {} steps)",
            request.guidance_scale, request.num_inference_steps
        ));

        let reply = Reply::new(
            self.tx.clone(),
            SessionEvent::GenerateFinished {
                ticket,
                result: Err(SessionError::Transport(
                    "generate ended without a response".to_string(),
                )),
            },
        );
        let transport = Arc::clone(&self.transport);
        self.pending += 1;
        tokio::spawn(async move {
            let result = transport.generate(request).await;
            reply.send(SessionEvent::GenerateFinished { ticket, result });
        });
        Ok(ticket)
    }

    /// Reset the expanded result and the prompt. Slots, references and
    /// advanced options are kept.
    pub fn clear(&mut self) {
        self.expanded = None;
        self.form.clear_prompt();
        self.assist.reset();
    }

    /// Hide the generated image section.
    pub fn clear_generated(&mut self) {
        self.generated = None;
        self.generate.reset();
    }

    pub fn notify_copied(&mut self) {
        let message = self.messages.copied();
        self.show_notice(NoticeKind::Success, message, COPY_DURATION);
    }

    /// Save the generated image under `dir`, named after its server filename.
    pub async fn download_generated(&mut self, dir: &Path) -> Result<PathBuf> {
        let image = self
            .generated
            .clone()
            .context("No generated image to download")?;
        let bytes = match self.transport.download(image.url.clone()).await {
            Ok(bytes) => bytes,
            Err(err) => {
                let context = FailureContext::Operation(OperationKind::Generate);
                let message = self.failure_message(context, &err);
                self.notify(NoticeKind::Error, message);
                return Err(err.into());
            }
        };
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = dir.join(safe_filename(&image.filename));
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        logging::info(format!("Saved {} ({} bytes)", path.display(), bytes.len()));
        Ok(path)
    }

    // --- Event Loop ---

    /// Wait for and apply one event. The controller keeps its own sender, so
    /// with nothing pending and no notice timer running this never returns;
    /// race it against other input or use [`Self::settle`].
    pub async fn step(&mut self) {
        if let Some(event) = self.rx.recv().await {
            self.handle_event(event);
        }
    }

    /// Apply events until every upload, preview decode and operation has
    /// reported back, then drain whatever else is already queued.
    pub async fn settle(&mut self) {
        while self.pending > 0 {
            self.step().await;
        }
        self.drain_ready();
    }

    /// Apply queued events without waiting.
    pub fn drain_ready(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            self.handle_event(event);
        }
    }

    pub fn handle_event(&mut self, event: SessionEvent) {
        if event.completes_pending_work() {
            self.pending = self.pending.saturating_sub(1);
        }
        match event {
            SessionEvent::UploadFinished {
                slot,
                attempt,
                result,
            } => self.apply_upload(slot, attempt, result),
            SessionEvent::PreviewSettled {
                slot,
                handle,
                outcome,
            } => self.registry.settle_preview(slot, handle, outcome),
            SessionEvent::AssistFinished { ticket, result } => {
                self.apply_assist(ticket, result);
            }
            SessionEvent::GenerateFinished { ticket, result } => {
                self.apply_generate(ticket, result);
            }
            SessionEvent::NoticeExpired { epoch } => {
                self.notifier.expire(epoch);
            }
        }
    }

    fn apply_upload(
        &mut self,
        slot: SlotId,
        attempt: u64,
        result: Result<crate::models::UploadedRef, SessionError>,
    ) {
        match self.registry.apply_upload(slot, attempt, result) {
            UploadApplied::Confirmed(server_ref) => {
                logging::info(format!("{slot} confirmed as {}", server_ref.filename));
                let message = self.messages.upload_succeeded();
                self.notify(NoticeKind::Success, message);
            }
            UploadApplied::Failed { error, .. } => {
                logging::warn(format!("{slot} upload failed: {error}"));
                let message = self.failure_message(FailureContext::Upload, &error);
                self.notify(NoticeKind::Error, message);
            }
            UploadApplied::Ignored => {
                logging::debug(format!("Discarded late upload result for {slot}"));
            }
        }
    }

    fn apply_assist(
        &mut self,
        ticket: OperationTicket,
        result: Result<AssistResponse, SessionError>,
    ) {
        match result {
            Ok(response) => {
                let expanded = response.expanded.clone();
                let cached = response.cached;
                if !self.assist.settle(ticket, OperationState::Succeeded(response)) {
                    return;
                }
                self.expanded = Some(expanded);
                if cached {
                    let message = self.messages.from_cache();
                    self.notify(NoticeKind::Info, message);
                }
            }
            Err(err) => self.apply_failure(OperationKind::Assist, ticket, err),
        }
    }

    fn apply_generate(
        &mut self,
        ticket: OperationTicket,
        result: Result<GeneratedImage, SessionError>,
    ) {
        match result {
            Ok(image) => {
                if !self
                    .generate
                    .settle(ticket, OperationState::Succeeded(image.clone()))
                {
                    return;
                }
                logging::info(format!("Generated {} ({})", image.filename, image.size_label()));
                self.generated = Some(image);
                let message = self.messages.image_generated();
                self.notify(NoticeKind::Success, message);
            }
            Err(err) => self.apply_failure(OperationKind::Generate, ticket, err),
        }
    }

    fn apply_failure(&mut self, kind: OperationKind, ticket: OperationTicket, err: SessionError) {
        let message = self.failure_message(FailureContext::Operation(kind), &err);
        let settled = match kind {
            OperationKind::Assist => self.assist.settle(ticket, failure_state(&err, &message)),
            OperationKind::Generate => {
                self.generate.settle(ticket, failure_state(&err, &message))
            }
        };
        if !settled {
            return;
        }
        logging::warn(format!("{kind} failed: {err} ({:?})", err.category()));
        if err.notice_kind().is_some() {
            self.notify(NoticeKind::Error, message);
        }
    }

    fn failure_message(&self, context: FailureContext, err: &SessionError) -> String {
        let fallback = || match context {
            FailureContext::Upload => self.messages.upload_failed(),
            FailureContext::Operation(kind) => self.messages.operation_failed(kind),
        };
        match err {
            SessionError::Validation(ValidationError::EmptyPrompt) => {
                self.messages.prompt_required()
            }
            SessionError::Validation(ValidationError::MissingAspectRatio) => {
                self.messages.aspect_ratio_required()
            }
            SessionError::RateLimited { retry_after_secs } => {
                self.messages.rate_limited(*retry_after_secs)
            }
            SessionError::Transport(_) => self.messages.connection_failed(),
            other => other
                .server_message()
                .map(ToString::to_string)
                .unwrap_or_else(fallback),
        }
    }

    // --- Notices ---

    fn notify(&mut self, kind: NoticeKind, message: String) {
        self.show_notice(kind, message, kind.default_duration());
    }

    fn show_notice(&mut self, kind: NoticeKind, message: String, duration: std::time::Duration) {
        logging::debug(format!("Notice ({kind:?}): {message}"));
        let epoch = self
            .notifier
            .show(kind, message, duration, Instant::now())
            .epoch;
        if self.notice_timers {
            let tx = self.tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                let _ = tx.send(SessionEvent::NoticeExpired { epoch });
            });
        }
    }
}

fn failure_state<T>(err: &SessionError, message: &str) -> OperationState<T> {
    match err {
        SessionError::RateLimited { retry_after_secs } => {
            OperationState::RateLimited(*retry_after_secs)
        }
        _ => OperationState::Failed(message.to_string()),
    }
}

/// Reduce a server-provided filename to a safe basename.
#[must_use]
pub fn safe_filename(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .map(|base| base.to_string_lossy().to_string())
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "generated.png".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UploadedRef;
    use crate::slots::{SlotStatus, UploadSlot};
    use async_trait::async_trait;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::oneshot;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\nrest";

    type UploadGate = oneshot::Receiver<Result<UploadedRef, SessionError>>;

    #[derive(Default)]
    struct FakeTransport {
        calls: Mutex<Vec<&'static str>>,
        upload_gates: Mutex<HashMap<String, UploadGate>>,
        assist_reply: Mutex<Option<Result<AssistResponse, SessionError>>>,
        generate_reply: Mutex<Option<Result<GeneratedImage, SessionError>>>,
        last_assist: Mutex<Option<AssistRequest>>,
        last_generate: Mutex<Option<GenerateRequest>>,
        panic_on_generate: bool,
    }

    impl FakeTransport {
        fn gate_upload(&self, slot: SlotId) -> oneshot::Sender<Result<UploadedRef, SessionError>> {
            let (tx, rx) = oneshot::channel();
            self.upload_gates.lock().unwrap().insert(slot.token(), rx);
            tx
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SessionTransport for FakeTransport {
        async fn upload(
            &self,
            file: LocalFile,
            correlation: String,
        ) -> Result<UploadedRef, SessionError> {
            self.calls.lock().unwrap().push("upload");
            let gate = self.upload_gates.lock().unwrap().remove(&correlation);
            match gate {
                Some(gate) => gate
                    .await
                    .unwrap_or_else(|_| Err(SessionError::Transport("gate dropped".into()))),
                None => Ok(uploaded(&file.name)),
            }
        }

        async fn assist(&self, request: AssistRequest) -> Result<AssistResponse, SessionError> {
            self.calls.lock().unwrap().push("assist");
            *self.last_assist.lock().unwrap() = Some(request);
            self.assist_reply.lock().unwrap().take().unwrap_or_else(|| {
                Ok(AssistResponse {
                    expanded: "expanded".into(),
                    cached: false,
                })
            })
        }

        async fn generate(&self, request: GenerateRequest) -> Result<GeneratedImage, SessionError> {
            self.calls.lock().unwrap().push("generate");
            *self.last_generate.lock().unwrap() = Some(request);
            if self.panic_on_generate {
                panic!("generator crashed");
            }
            self.generate_reply
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(generated_image()))
        }

        async fn download(&self, _url: String) -> Result<Bytes, SessionError> {
            self.calls.lock().unwrap().push("download");
            Ok(Bytes::from_static(PNG))
        }
    }

    fn uploaded(name: &str) -> UploadedRef {
        UploadedRef {
            url: format!("/uploads/{name}"),
            filename: name.to_string(),
        }
    }

    fn generated_image() -> GeneratedImage {
        GeneratedImage {
            url: "/output/cat.png".into(),
            filename: "cat.png".into(),
            width: Some(1024),
            height: Some(1820),
            seed: None,
        }
    }

    fn image(name: &str) -> LocalFile {
        LocalFile::new(name, "image/png", Bytes::from_static(PNG))
    }

    fn controller(fake: &Arc<FakeTransport>) -> SessionController {
        let transport: Arc<dyn SessionTransport> = fake.clone();
        SessionController::new(
            transport,
            SessionOptions {
                initial_slots: 0,
                notice_timers: false,
                ..SessionOptions::default()
            },
        )
    }

    async fn settle(controller: &mut SessionController) {
        tokio::time::timeout(Duration::from_secs(5), controller.settle())
            .await
            .expect("session settled");
    }

    fn notice(controller: &SessionController) -> (NoticeKind, String) {
        let notice = controller.notice().expect("a notice is shown");
        (notice.kind, notice.message.clone())
    }

    #[tokio::test]
    async fn empty_prompt_never_reaches_the_network() {
        let fake = Arc::new(FakeTransport::default());
        let mut controller = controller(&fake);
        controller.form_mut().set_prompt("   \t ");

        assert_eq!(
            controller.submit_assist(),
            Err(SessionError::Validation(ValidationError::EmptyPrompt))
        );
        assert_eq!(
            controller.submit_generate(),
            Err(SessionError::Validation(ValidationError::EmptyPrompt))
        );
        settle(&mut controller).await;

        assert!(fake.calls().is_empty());
        assert_eq!(
            notice(&controller),
            (NoticeKind::Error, controller.messages().prompt_required())
        );
        assert!(controller.is_enabled(OperationKind::Assist));
        assert!(controller.is_enabled(OperationKind::Generate));
    }

    #[tokio::test]
    async fn references_follow_slot_creation_order() {
        let fake = Arc::new(FakeTransport::default());
        let mut controller = controller(&fake);
        let first = controller.create_slot();
        let second = controller.create_slot();
        let first_gate = fake.gate_upload(first);
        let second_gate = fake.gate_upload(second);

        assert_eq!(controller.select_file(first, image("a.png")), Ok(true));
        assert_eq!(controller.select_file(second, image("b.png")), Ok(true));

        second_gate.send(Ok(uploaded("b.png"))).expect("gate open");
        tokio::time::timeout(Duration::from_secs(5), async {
            while controller.slots().get(second).map(UploadSlot::status)
                != Some(SlotStatus::Confirmed)
            {
                controller.step().await;
            }
        })
        .await
        .expect("second slot confirmed first");
        assert_eq!(
            controller.slots().get(first).map(UploadSlot::status),
            Some(SlotStatus::Uploading)
        );

        first_gate.send(Ok(uploaded("a.png"))).expect("gate open");
        settle(&mut controller).await;

        controller.form_mut().set_prompt("a cat on a roof");
        controller.submit_assist().expect("submit");
        settle(&mut controller).await;

        let request = fake.last_assist.lock().unwrap().clone().expect("assist sent");
        assert_eq!(
            request.reference_images,
            vec!["a.png".to_string(), "b.png".to_string()]
        );
        assert_eq!(controller.slots().previews().live_count(), 0);
    }

    #[tokio::test]
    async fn rate_limited_assist_cites_wait_and_stays_usable() {
        let fake = Arc::new(FakeTransport::default());
        *fake.assist_reply.lock().unwrap() = Some(Err(SessionError::RateLimited {
            retry_after_secs: 43,
        }));
        let mut controller = controller(&fake);
        controller.form_mut().set_prompt("a cat");

        controller.submit_assist().expect("submit");
        settle(&mut controller).await;

        assert_eq!(controller.assist_state(), &OperationState::RateLimited(43));
        assert!(controller.is_enabled(OperationKind::Assist));
        let (kind, message) = notice(&controller);
        assert_eq!(kind, NoticeKind::Error);
        assert!(message.contains("43"), "{message}");
        assert_eq!(fake.calls(), vec!["assist"]);
    }

    #[tokio::test]
    async fn removed_slot_is_not_resurrected_by_late_success() {
        let fake = Arc::new(FakeTransport::default());
        let mut controller = controller(&fake);
        let slot = controller.create_slot();
        let gate = fake.gate_upload(slot);

        controller.select_file(slot, image("a.png")).expect("select");
        assert!(controller.remove_slot(slot));
        assert_eq!(controller.slots().previews().live_count(), 0);

        gate.send(Ok(uploaded("a.png"))).expect("gate open");
        settle(&mut controller).await;

        assert!(!controller.slots().contains(slot));
        assert!(controller.slots().reference_images().is_empty());
        assert!(controller.notice().is_none());
        assert_eq!(controller.pending_work(), 0);
    }

    #[tokio::test]
    async fn generate_is_re_enabled_after_network_error() {
        let fake = Arc::new(FakeTransport::default());
        *fake.generate_reply.lock().unwrap() =
            Some(Err(SessionError::Transport("connection refused".into())));
        let mut controller = controller(&fake);
        controller.form_mut().set_prompt("a cat");

        controller.submit_generate().expect("submit");
        assert!(controller.is_loading(OperationKind::Generate));
        assert_eq!(
            controller.submit_generate(),
            Err(SessionError::Busy(OperationKind::Generate))
        );
        settle(&mut controller).await;

        assert!(controller.is_enabled(OperationKind::Generate));
        assert!(!controller.is_loading(OperationKind::Generate));
        let expected = controller.messages().connection_failed();
        assert_eq!(
            controller.generate_state(),
            &OperationState::Failed(expected.clone())
        );
        assert_eq!(notice(&controller), (NoticeKind::Error, expected));
        assert_eq!(fake.calls(), vec!["generate"]);
    }

    #[tokio::test]
    async fn crashed_generate_task_still_releases_the_control() {
        let fake = Arc::new(FakeTransport {
            panic_on_generate: true,
            ..FakeTransport::default()
        });
        let mut controller = controller(&fake);
        controller.form_mut().set_prompt("a cat");

        controller.submit_generate().expect("submit");
        settle(&mut controller).await;

        assert!(controller.is_enabled(OperationKind::Generate));
        assert!(matches!(
            controller.generate_state(),
            OperationState::Failed(_)
        ));
    }

    #[tokio::test]
    async fn rate_limited_generate_leaves_assist_untouched() {
        let fake = Arc::new(FakeTransport::default());
        *fake.generate_reply.lock().unwrap() = Some(Err(SessionError::RateLimited {
            retry_after_secs: 9,
        }));
        let mut controller = controller(&fake);
        controller.form_mut().set_prompt("a cat");

        controller.submit_generate().expect("submit");
        settle(&mut controller).await;

        assert_eq!(controller.generate_state(), &OperationState::RateLimited(9));
        assert_eq!(controller.assist_state(), &OperationState::Idle);
        assert!(controller.is_enabled(OperationKind::Generate));
        assert_eq!(
            notice(&controller),
            (NoticeKind::Error, controller.messages().rate_limited(9))
        );
    }

    #[tokio::test]
    async fn settle_returns_when_nothing_is_pending() {
        let fake = Arc::new(FakeTransport::default());
        let mut controller = controller(&fake);
        settle(&mut controller).await;
        assert_eq!(controller.pending_work(), 0);

        controller.form_mut().set_prompt("a cat");
        controller.submit_assist().expect("submit");
        assert_eq!(controller.pending_work(), 1);
        settle(&mut controller).await;
        assert_eq!(controller.pending_work(), 0);
        settle(&mut controller).await;
    }

    #[tokio::test]
    async fn preview_needs_a_decodable_image_not_just_a_header() {
        let mut encoded = Vec::new();
        image::RgbImage::new(2, 2)
            .write_to(&mut std::io::Cursor::new(&mut encoded), image::ImageFormat::Png)
            .expect("encode png");
        let fake = Arc::new(FakeTransport::default());
        let mut controller = controller(&fake);
        let real = controller.create_slot();
        let corrupt = controller.create_slot();

        controller
            .select_file(real, LocalFile::new("real.png", "image/png", Bytes::from(encoded)))
            .expect("select");
        controller
            .select_file(
                corrupt,
                LocalFile::new(
                    "corrupt.png",
                    "image/png",
                    Bytes::from_static(b"\x89PNG\r\n\x1a\ngarbage-not-an-image"),
                ),
            )
            .expect("select");
        settle(&mut controller).await;

        let unavailable = |id| controller.slots().get(id).map(UploadSlot::preview_unavailable);
        assert_eq!(unavailable(real), Some(false));
        assert_eq!(unavailable(corrupt), Some(true));
        assert_eq!(controller.slots().previews().live_count(), 0);
    }

    #[tokio::test]
    async fn cached_assist_shows_text_and_cache_notice() {
        let fake = Arc::new(FakeTransport::default());
        *fake.assist_reply.lock().unwrap() = Some(Ok(AssistResponse {
            expanded: "A tabby cat lounging on a terracotta roof".into(),
            cached: true,
        }));
        let mut controller = controller(&fake);
        controller.form_mut().set_prompt("a cat");

        controller.submit_assist().expect("submit");
        settle(&mut controller).await;

        assert_eq!(
            controller.expanded_text(),
            Some("A tabby cat lounging on a terracotta roof")
        );
        assert_eq!(
            notice(&controller),
            (NoticeKind::Info, controller.messages().from_cache())
        );
        let request = fake.last_assist.lock().unwrap().clone().expect("assist sent");
        assert!(request.reference_images.is_empty());
    }

    #[tokio::test]
    async fn failed_upload_removes_slot_with_server_message() {
        let fake = Arc::new(FakeTransport::default());
        let mut controller = controller(&fake);
        let slot = controller.create_slot();
        let gate = fake.gate_upload(slot);

        controller.select_file(slot, image("a.png")).expect("select");
        gate.send(Err(SessionError::Upload {
            message: Some("Invalid image file".into()),
        }))
        .expect("gate open");
        settle(&mut controller).await;

        assert!(!controller.slots().contains(slot));
        assert_eq!(
            notice(&controller),
            (NoticeKind::Error, "Invalid image file".to_string())
        );
        assert_eq!(controller.slots().previews().live_count(), 0);
    }

    #[tokio::test]
    async fn non_image_selection_is_a_silent_no_op() {
        let fake = Arc::new(FakeTransport::default());
        let mut controller = controller(&fake);
        let slot = controller.create_slot();
        let text = LocalFile::new("notes.txt", "text/plain", Bytes::from_static(b"hello"));

        assert_eq!(
            controller.dispatch_slot(slot, SlotAction::Drop(vec![text])),
            Ok(false)
        );
        settle(&mut controller).await;

        assert!(fake.calls().is_empty());
        assert!(controller.notice().is_none());
        assert_eq!(
            controller.slots().get(slot).map(UploadSlot::status),
            Some(SlotStatus::Empty)
        );
    }

    #[tokio::test]
    async fn generate_sends_advanced_options_and_clear_keeps_slots() {
        let fake = Arc::new(FakeTransport::default());
        let mut controller = controller(&fake);
        let slot = controller.create_slot();
        controller.select_file(slot, image("ref.png")).expect("select");
        settle(&mut controller).await;

        controller.form_mut().set_prompt("  a cat  ");
        controller.form_mut().set_aspect_ratio(Some(AspectRatio::Landscape));
        controller.form_mut().advanced.negative_prompt = " blurry ".into();
        controller.form_mut().advanced.guidance_scale.set(9.0);
        controller.submit_generate().expect("submit");
        settle(&mut controller).await;

        let request = fake
            .last_generate
            .lock()
            .unwrap()
            .clone()
            .expect("generate sent");
        assert_eq!(
            request,
            GenerateRequest {
                prompt: "a cat".into(),
                aspect_ratio: AspectRatio::Landscape,
                negative_prompt: "blurry".into(),
                guidance_scale: 9.0,
                num_inference_steps: 20,
                reference_images: vec!["ref.png".into()],
            }
        );
        assert_eq!(controller.generated(), Some(&generated_image()));
        assert_eq!(
            notice(&controller),
            (NoticeKind::Success, controller.messages().image_generated())
        );

        controller.clear();
        assert_eq!(controller.form().prompt(), "");
        assert!(controller.expanded_text().is_none());
        assert_eq!(controller.slots().reference_images(), vec!["ref.png".to_string()]);
        assert_eq!(controller.form().advanced.guidance_scale(), 9.0);
        assert!(controller.generated().is_some());

        controller.clear_generated();
        assert!(controller.generated().is_none());
        assert_eq!(controller.generate_state(), &OperationState::Idle);
    }

    #[tokio::test]
    async fn download_saves_generated_image() -> Result<()> {
        let fake = Arc::new(FakeTransport::default());
        let mut controller = controller(&fake);
        controller.form_mut().set_prompt("a cat");
        controller.submit_generate().expect("submit");
        settle(&mut controller).await;

        let dir = tempfile::tempdir()?;
        let path = controller.download_generated(dir.path()).await?;
        assert_eq!(path, dir.path().join("cat.png"));
        assert_eq!(std::fs::read(&path)?, PNG);
        Ok(())
    }

    #[test]
    fn safe_filename_strips_paths_and_odd_characters() {
        assert_eq!(safe_filename("../../etc/passwd"), "passwd");
        assert_eq!(safe_filename("cat pic (1).png"), "cat_pic__1_.png");
        assert_eq!(safe_filename(".."), "generated.png");
        assert_eq!(safe_filename(""), "generated.png");
    }
}
