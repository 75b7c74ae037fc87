//! REPL command registry and dispatch.
//!
//! Commands are plain words (an optional leading `/` is accepted). Each
//! command mutates the session synchronously and may hand an action back to
//! the REPL loop for anything that needs to await: reading files, waiting
//! for in-flight work, the clipboard, downloads.

mod compose;
mod session;
mod slots;

use std::path::PathBuf;

use crate::controller::SessionController;
use crate::slots::SlotId;

/// Work the REPL loop performs after a command returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandAction {
    /// Read the files and put them into the slot.
    Attach { slot: SlotId, paths: Vec<PathBuf> },
    /// Wait until every in-flight upload and operation has reported back.
    Wait,
    /// Copy the expanded prompt to the clipboard.
    Copy,
    /// Save the generated image, to the configured directory if none given.
    Download(Option<PathBuf>),
    Quit,
}

/// Result of executing a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub message: Option<String>,
    pub action: Option<CommandAction>,
}

impl CommandResult {
    pub fn ok() -> Self {
        Self {
            message: None,
            action: None,
        }
    }

    pub fn message(msg: impl Into<String>) -> Self {
        Self {
            message: Some(msg.into()),
            action: None,
        }
    }

    pub fn action(action: CommandAction) -> Self {
        Self {
            message: None,
            action: Some(action),
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            message: Some(format!("Error: {}", msg.into())),
            action: None,
        }
    }
}

/// Command metadata for help and completion
#[derive(Debug, Clone, Copy)]
pub struct CommandInfo {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub description: &'static str,
    pub usage: &'static str,
}

/// All registered commands
pub const COMMANDS: &[CommandInfo] = &[
    CommandInfo {
        name: "help",
        aliases: &["?"],
        description: "Show help information",
        usage: "help [command]",
    },
    CommandInfo {
        name: "status",
        aliases: &["slots", "ls"],
        description: "Show slots, the prompt form and operation states",
        usage: "status",
    },
    // Slot commands
    CommandInfo {
        name: "add",
        aliases: &["new"],
        description: "Add an empty reference image slot",
        usage: "add",
    },
    CommandInfo {
        name: "attach",
        aliases: &["select", "drop"],
        description: "Put an image into a slot and upload it (first image file wins)",
        usage: "attach <slot> <path> [path...]",
    },
    CommandInfo {
        name: "remove",
        aliases: &["rm"],
        description: "Remove a slot and its reference",
        usage: "remove <slot>",
    },
    // Form commands
    CommandInfo {
        name: "prompt",
        aliases: &["p"],
        description: "Set or show the prompt",
        usage: "prompt [text]",
    },
    CommandInfo {
        name: "aspect",
        aliases: &["ratio"],
        description: "Set the aspect ratio (9:16, 16:9 or none)",
        usage: "aspect <9:16|16:9|none>",
    },
    CommandInfo {
        name: "negative",
        aliases: &[],
        description: "Set or clear the negative prompt",
        usage: "negative [text]",
    },
    CommandInfo {
        name: "guidance",
        aliases: &["cfg"],
        description: "Set the guidance scale (1-20, step 0.5)",
        usage: "guidance <value>",
    },
    CommandInfo {
        name: "steps",
        aliases: &[],
        description: "Set the number of inference steps (1-100)",
        usage: "steps <value>",
    },
    CommandInfo {
        name: "advanced",
        aliases: &["adv"],
        description: "Toggle or reset the advanced options",
        usage: "advanced [reset]",
    },
    // Session commands
    CommandInfo {
        name: "assist",
        aliases: &["expand"],
        description: "Expand the prompt with the assistant",
        usage: "assist",
    },
    CommandInfo {
        name: "generate",
        aliases: &["gen"],
        description: "Generate an image",
        usage: "generate",
    },
    CommandInfo {
        name: "wait",
        aliases: &[],
        description: "Wait for in-flight uploads and requests",
        usage: "wait",
    },
    CommandInfo {
        name: "copy",
        aliases: &[],
        description: "Copy the expanded prompt to the clipboard",
        usage: "copy",
    },
    CommandInfo {
        name: "download",
        aliases: &["save"],
        description: "Save the generated image",
        usage: "download [dir]",
    },
    CommandInfo {
        name: "clear",
        aliases: &[],
        description: "Clear the prompt and the expanded result",
        usage: "clear",
    },
    CommandInfo {
        name: "clear-generated",
        aliases: &["clear-image"],
        description: "Hide the generated image",
        usage: "clear-generated",
    },
    CommandInfo {
        name: "exit",
        aliases: &["quit", "q"],
        description: "Exit the studio",
        usage: "exit",
    },
];

/// Execute a command line against the session.
pub fn execute(cmd: &str, session: &mut SessionController) -> CommandResult {
    let parts: Vec<&str> = cmd.trim().splitn(2, ' ').collect();
    let command = parts[0].to_lowercase();
    let command = command.strip_prefix('/').unwrap_or(&command);
    let arg = parts
        .get(1)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty());

    match command {
        "" => CommandResult::ok(),
        "help" | "?" => help(arg),
        "status" | "slots" | "ls" => session::status(session),
        "exit" | "quit" | "q" => CommandResult::action(CommandAction::Quit),

        "add" | "new" => slots::add(session),
        "attach" | "select" | "drop" => slots::attach(session, arg),
        "remove" | "rm" => slots::remove(session, arg),

        "prompt" | "p" => compose::prompt(session, arg),
        "aspect" | "ratio" => compose::aspect(session, arg),
        "negative" => compose::negative(session, arg),
        "guidance" | "cfg" => compose::guidance(session, arg),
        "steps" => compose::steps(session, arg),
        "advanced" | "adv" => compose::advanced(session, arg),

        "assist" | "expand" => session::assist(session),
        "generate" | "gen" => session::generate(session),
        "wait" => CommandResult::action(CommandAction::Wait),
        "copy" => session::copy(session),
        "download" | "save" => session::download(session, arg),
        "clear" => session::clear(session),
        "clear-generated" | "clear-image" => session::clear_generated(session),

        _ => CommandResult::error(format!(
            "Unknown command: {command}. Type help for available commands."
        )),
    }
}

fn help(topic: Option<&str>) -> CommandResult {
    if let Some(topic) = topic {
        return match get_command_info(topic) {
            Some(cmd) => {
                let mut help = format!(
                    "{}\n\n  {}\n\n  Usage: {}",
                    cmd.name, cmd.description, cmd.usage
                );
                if !cmd.aliases.is_empty() {
                    help.push_str(&format!("\n  Aliases: {}", cmd.aliases.join(", ")));
                }
                CommandResult::message(help)
            }
            None => CommandResult::error(format!("Unknown command: {topic}")),
        };
    }

    let width = COMMANDS.iter().map(|cmd| cmd.usage.len()).max().unwrap_or(0);
    let lines: Vec<String> = COMMANDS
        .iter()
        .map(|cmd| format!("  {:width$}  {}", cmd.usage, cmd.description))
        .collect();
    CommandResult::message(format!("Commands:\n{}", lines.join("\n")))
}

/// Get command info by name or alias
pub fn get_command_info(name: &str) -> Option<&'static CommandInfo> {
    let name = name.strip_prefix('/').unwrap_or(name);
    COMMANDS
        .iter()
        .find(|cmd| cmd.name == name || cmd.aliases.contains(&name))
}

/// Get all commands matching a prefix (for completion)
pub fn commands_matching(prefix: &str) -> Vec<&'static CommandInfo> {
    let prefix = prefix.strip_prefix('/').unwrap_or(prefix).to_lowercase();
    COMMANDS
        .iter()
        .filter(|cmd| {
            cmd.name.starts_with(&prefix) || cmd.aliases.iter().any(|a| a.starts_with(&prefix))
        })
        .collect()
}

/// Resolve a slot argument, reporting unknown slots as command errors.
fn resolve_slot(session: &SessionController, key: &str) -> Result<SlotId, CommandResult> {
    session
        .slots()
        .find(key)
        .ok_or_else(|| CommandResult::error(format!("No such slot: {key}")))
}
