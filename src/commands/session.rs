//! Session commands: status, assist, generate, copy, download, clear

use std::fmt::Write;
use std::path::PathBuf;

use crate::controller::SessionController;
use crate::error_taxonomy::SessionError;
use crate::operation::{OperationKind, OperationState};

use super::{CommandAction, CommandResult};

fn state_label<T>(state: &OperationState<T>) -> String {
    match state {
        OperationState::Idle => "idle".to_string(),
        OperationState::InFlight => "in flight".to_string(),
        OperationState::Succeeded(_) => "done".to_string(),
        OperationState::Failed(message) => format!("failed: {message}"),
        OperationState::RateLimited(secs) => format!("rate limited ({secs}s)"),
    }
}

pub fn status(session: &mut SessionController) -> CommandResult {
    let mut out = String::from("Slots:\n");
    if session.slots().is_empty() {
        out.push_str("  (none)\n");
    }
    for slot in session.slots().iter() {
        let file = slot
            .local_file()
            .map(|file| format!("{} ({} bytes)", file.name, file.size()))
            .unwrap_or_else(|| "-".to_string());
        let _ = write!(out, "  {}  {:<10} {file}", slot.id(), slot.status().label());
        if let Some(server_ref) = slot.server_ref() {
            let _ = write!(out, " -> {}", server_ref.filename);
        }
        if slot.preview_unavailable() {
            let _ = write!(out, " [{}]", session.messages().preview_unavailable());
        }
        out.push('\n');
    }

    let form = session.form();
    let aspect = form
        .aspect_ratio()
        .map_or_else(|| "none".to_string(), |ratio| ratio.to_string());
    let _ = writeln!(
        out,
        "Prompt: {} characters, aspect {aspect}",
        form.char_count()
    );
    let _ = writeln!(
        out,
        "Advanced: guidance {}, steps {}, negative {}",
        form.advanced.guidance_scale(),
        form.advanced.inference_steps(),
        if form.advanced.negative_prompt.trim().is_empty() {
            "-"
        } else {
            form.advanced.negative_prompt.trim()
        }
    );
    let _ = writeln!(out, "Assist: {}", state_label(session.assist_state()));
    let _ = write!(out, "Generate: {}", state_label(session.generate_state()));
    if let Some(image) = session.generated() {
        let _ = write!(
            out,
            "\n  {} ({}, seed {})",
            image.filename,
            image.size_label(),
            image.seed_label()
        );
    }
    if let Some(expanded) = session.expanded_text() {
        let _ = write!(out, "\nExpanded prompt:\n{expanded}");
    }
    CommandResult::message(out)
}

fn submitted(kind: OperationKind, result: Result<impl Sized, SessionError>) -> CommandResult {
    match result {
        Ok(_) => CommandResult::message(format!("{kind} submitted")),
        Err(SessionError::Busy(kind)) => {
            CommandResult::message(format!("{kind} is already in flight"))
        }
        // Validation failures are already on the notice line.
        Err(_) => CommandResult::ok(),
    }
}

pub fn assist(session: &mut SessionController) -> CommandResult {
    submitted(OperationKind::Assist, session.submit_assist())
}

pub fn generate(session: &mut SessionController) -> CommandResult {
    submitted(OperationKind::Generate, session.submit_generate())
}

pub fn copy(session: &mut SessionController) -> CommandResult {
    if session.expanded_text().is_none() {
        return CommandResult::error("Nothing to copy; run assist first");
    }
    CommandResult::action(CommandAction::Copy)
}

pub fn download(session: &mut SessionController, arg: Option<&str>) -> CommandResult {
    if session.generated().is_none() {
        return CommandResult::error("Nothing to download; run generate first");
    }
    let dir = arg.map(|dir| PathBuf::from(shellexpand::tilde(dir).as_ref()));
    CommandResult::action(CommandAction::Download(dir))
}

pub fn clear(session: &mut SessionController) -> CommandResult {
    session.clear();
    CommandResult::message("Prompt and expanded result cleared")
}

pub fn clear_generated(session: &mut SessionController) -> CommandResult {
    session.clear_generated();
    CommandResult::message("Generated image cleared")
}
