//! Slot commands: add, attach, remove

use std::path::PathBuf;

use crate::controller::{SessionController, SlotAction};

use super::{CommandAction, CommandResult, resolve_slot};

pub fn add(session: &mut SessionController) -> CommandResult {
    let id = session.create_slot();
    CommandResult::message(format!("Added {id}"))
}

pub fn attach(session: &mut SessionController, arg: Option<&str>) -> CommandResult {
    let Some(arg) = arg else {
        return CommandResult::error("Usage: attach <slot> <path> [path...]");
    };
    let mut words = arg.split_whitespace();
    let Some(key) = words.next() else {
        return CommandResult::error("Usage: attach <slot> <path> [path...]");
    };
    let slot = match resolve_slot(session, key) {
        Ok(slot) => slot,
        Err(result) => return result,
    };
    let paths: Vec<PathBuf> = words
        .map(|word| PathBuf::from(shellexpand::tilde(word).as_ref()))
        .collect();
    if paths.is_empty() {
        return CommandResult::error("Usage: attach <slot> <path> [path...]");
    }
    CommandResult::action(CommandAction::Attach { slot, paths })
}

pub fn remove(session: &mut SessionController, arg: Option<&str>) -> CommandResult {
    let Some(key) = arg else {
        return CommandResult::error("Usage: remove <slot>");
    };
    let slot = match resolve_slot(session, key) {
        Ok(slot) => slot,
        Err(result) => return result,
    };
    match session.dispatch_slot(slot, SlotAction::Remove) {
        Ok(true) => CommandResult::message(format!("Removed {slot}")),
        Ok(false) => CommandResult::error(format!("No such slot: {key}")),
        Err(err) => CommandResult::error(err.to_string()),
    }
}
