//! Form commands: prompt, aspect, negative, guidance, steps, advanced

use crate::controller::SessionController;
use crate::form::PROMPT_SOFT_LIMIT;
use crate::models::AspectRatio;

use super::CommandResult;

pub fn prompt(session: &mut SessionController, text: Option<&str>) -> CommandResult {
    let Some(text) = text else {
        let form = session.form();
        if form.prompt().is_empty() {
            return CommandResult::message("Prompt is empty");
        }
        return CommandResult::message(format!(
            "{}\n({}/{PROMPT_SOFT_LIMIT} characters)",
            form.prompt(),
            form.char_count()
        ));
    };
    session.form_mut().set_prompt(text);
    let form = session.form();
    let count = format!("{}/{PROMPT_SOFT_LIMIT} characters", form.char_count());
    if form.over_soft_limit() {
        CommandResult::message(format!("Prompt set ({count}, over the recommended length)"))
    } else {
        CommandResult::message(format!("Prompt set ({count})"))
    }
}

pub fn aspect(session: &mut SessionController, arg: Option<&str>) -> CommandResult {
    let Some(arg) = arg else {
        let current = session
            .form()
            .aspect_ratio()
            .map_or_else(|| "none".to_string(), |ratio| ratio.to_string());
        return CommandResult::message(format!("Aspect ratio: {current}"));
    };
    if arg.eq_ignore_ascii_case("none") {
        session.form_mut().set_aspect_ratio(None);
        return CommandResult::message("Aspect ratio cleared");
    }
    match arg.parse::<AspectRatio>() {
        Ok(ratio) => {
            session.form_mut().set_aspect_ratio(Some(ratio));
            CommandResult::message(format!("Aspect ratio: {ratio}"))
        }
        Err(err) => CommandResult::error(err),
    }
}

pub fn negative(session: &mut SessionController, text: Option<&str>) -> CommandResult {
    let advanced = &mut session.form_mut().advanced;
    match text {
        Some(text) => {
            advanced.negative_prompt = text.to_string();
            CommandResult::message("Negative prompt set")
        }
        None => {
            advanced.negative_prompt.clear();
            CommandResult::message("Negative prompt cleared")
        }
    }
}

pub fn guidance(session: &mut SessionController, arg: Option<&str>) -> CommandResult {
    let control = &mut session.form_mut().advanced.guidance_scale;
    match arg {
        None => CommandResult::message(format!("Guidance scale: {}", control.value())),
        Some(raw) if control.set_from_str(raw) => {
            CommandResult::message(format!("Guidance scale: {}", control.value()))
        }
        Some(raw) => CommandResult::error(format!("Invalid guidance scale: {raw}")),
    }
}

pub fn steps(session: &mut SessionController, arg: Option<&str>) -> CommandResult {
    let advanced = &mut session.form_mut().advanced;
    match arg {
        None => CommandResult::message(format!("Inference steps: {}", advanced.inference_steps())),
        Some(raw) if advanced.inference_steps.set_from_str(raw) => {
            CommandResult::message(format!("Inference steps: {}", advanced.inference_steps()))
        }
        Some(raw) => CommandResult::error(format!("Invalid step count: {raw}")),
    }
}

pub fn advanced(session: &mut SessionController, arg: Option<&str>) -> CommandResult {
    let advanced = &mut session.form_mut().advanced;
    match arg {
        Some("reset") => {
            advanced.reset();
            CommandResult::message("Advanced options reset")
        }
        Some(other) => CommandResult::error(format!("Usage: advanced [reset] (got '{other}')")),
        None => {
            let visible = advanced.toggle();
            let summary = format!(
                "negative: {}, guidance: {}, steps: {}",
                if advanced.negative_prompt.trim().is_empty() {
                    "-"
                } else {
                    advanced.negative_prompt.trim()
                },
                advanced.guidance_scale(),
                advanced.inference_steps()
            );
            if visible {
                CommandResult::message(format!("Advanced options shown ({summary})"))
            } else {
                CommandResult::message("Advanced options hidden")
            }
        }
    }
}
