//! CLI entry point for the prompt studio client.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use dotenvy::dotenv;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;

use prompt_studio::commands::{self, CommandAction};
use prompt_studio::config::Config;
use prompt_studio::controller::{SessionController, SessionOptions, SlotAction};
use prompt_studio::logging;
use prompt_studio::models::AspectRatio;
use prompt_studio::notify::{Notice, NoticeKind};
use prompt_studio::operation::OperationState;
use prompt_studio::slots::LocalFile;
use prompt_studio::transport::{HttpTransport, SessionTransport};

#[derive(Parser, Debug)]
#[command(
    name = "studio",
    version,
    about = "Prompt studio client - expand prompts and generate images",
    long_about = "Client for a prompt expansion and image generation studio.\n\nRun 'studio' for the interactive session, or use the assist/generate subcommands."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Config profile name
    #[arg(long)]
    profile: Option<String>,

    /// Studio base URL (overrides config)
    #[arg(long)]
    base_url: Option<String>,

    /// Message language: en or th (overrides config)
    #[arg(long)]
    locale: Option<String>,

    /// Enable debug logging (overrides PROMPT_STUDIO_LOG and RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Interactive session (default)
    Repl,
    /// Expand a prompt and print the result
    Assist(PromptArgs),
    /// Generate an image and save it
    Generate(GenerateArgs),
}

#[derive(Args, Debug, Clone)]
struct PromptArgs {
    /// The prompt text
    prompt: String,

    /// Aspect ratio: 9:16 (portrait) or 16:9 (landscape)
    #[arg(short, long)]
    aspect: Option<AspectRatio>,

    /// Reference image, one slot each (repeatable)
    #[arg(short, long = "image")]
    images: Vec<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct GenerateArgs {
    #[command(flatten)]
    prompt: PromptArgs,

    /// Negative prompt
    #[arg(short, long)]
    negative: Option<String>,

    /// Guidance scale (1-20)
    #[arg(short, long)]
    guidance: Option<f64>,

    /// Number of inference steps (1-100)
    #[arg(short, long)]
    steps: Option<u32>,

    /// Directory to save the image in (defaults to the configured one)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = load_config_from_cli(&cli)?;
    let transport: Arc<dyn SessionTransport> = Arc::new(HttpTransport::connect(&config).await?);

    match cli.command.clone().unwrap_or(Commands::Repl) {
        Commands::Repl => run_repl(&config, transport).await,
        Commands::Assist(args) => run_assist(&config, transport, args).await,
        Commands::Generate(args) => run_generate(&config, transport, args).await,
    }
}

fn load_config_from_cli(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.clone(), cli.profile.as_deref())?;
    if let Some(base_url) = cli.base_url.clone() {
        config.base_url = Some(base_url);
    }
    if let Some(locale) = cli.locale.clone() {
        config.locale = Some(locale);
    }
    config.validate()?;
    Ok(config)
}

// === One-shot Commands ===

async fn one_shot_session(
    config: &Config,
    transport: Arc<dyn SessionTransport>,
    args: &PromptArgs,
) -> Result<SessionController> {
    let mut options = SessionOptions::from_config(config);
    options.initial_slots = 0;
    options.notice_timers = false;
    let mut session = SessionController::new(transport, options);

    for path in &args.images {
        let file = LocalFile::from_path(path).await?;
        let slot = session.create_slot();
        if !session.select_file(slot, file)? {
            bail!("{} is not an image", path.display());
        }
    }
    session.settle().await;
    print_notice(session.notice());
    if session.slots().len() != args.images.len() {
        bail!("Reference image upload failed");
    }

    session.form_mut().set_prompt(args.prompt.as_str());
    if let Some(aspect) = args.aspect {
        session.form_mut().set_aspect_ratio(Some(aspect));
    }
    Ok(session)
}

async fn run_assist(
    config: &Config,
    transport: Arc<dyn SessionTransport>,
    args: PromptArgs,
) -> Result<()> {
    let mut session = one_shot_session(config, transport, &args).await?;
    let submitted = session.submit_assist();
    session.settle().await;
    print_notice(session.notice());
    submitted?;

    match session.expanded_text() {
        Some(text) => {
            println!("{text}");
            Ok(())
        }
        None => bail!("Prompt expansion failed"),
    }
}

async fn run_generate(
    config: &Config,
    transport: Arc<dyn SessionTransport>,
    args: GenerateArgs,
) -> Result<()> {
    let mut session = one_shot_session(config, transport, &args.prompt).await?;
    let advanced = &mut session.form_mut().advanced;
    if let Some(negative) = args.negative {
        advanced.negative_prompt = negative;
    }
    if let Some(guidance) = args.guidance {
        advanced.guidance_scale.set(guidance);
    }
    if let Some(steps) = args.steps {
        advanced.inference_steps.set(f64::from(steps));
    }

    let submitted = session.submit_generate();
    session.settle().await;
    print_notice(session.notice());
    submitted?;

    let Some(image) = session.generated().cloned() else {
        bail!("Image generation failed");
    };
    let dir = args.output.unwrap_or_else(|| config.download_dir());
    let path = session.download_generated(&dir).await?;
    println!(
        "{} ({}, seed {})",
        path.display(),
        image.size_label(),
        image.seed_label()
    );
    Ok(())
}

// === Interactive Session ===

/// Reads lines on a blocking thread. The next prompt is shown only after
/// the loop acknowledges the previous line, so output never lands on top of
/// the prompt.
fn spawn_line_reader() -> Result<(
    mpsc::UnboundedReceiver<String>,
    std::sync::mpsc::Sender<()>,
)> {
    let mut editor = DefaultEditor::new().context("Failed to start line editor")?;
    let (line_tx, line_rx) = mpsc::unbounded_channel();
    let (ack_tx, ack_rx) = std::sync::mpsc::channel::<()>();

    std::thread::spawn(move || {
        loop {
            match editor.readline("studio> ") {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        let _ = editor.add_history_entry(line.as_str());
                    }
                    if line_tx.send(line).is_err() || ack_rx.recv().is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
                Err(err) => {
                    logging::warn(format!("Line editor failed: {err}"));
                    break;
                }
            }
        }
    });
    Ok((line_rx, ack_tx))
}

/// What the REPL has already printed, so each change is printed once.
#[derive(Default)]
struct Printed {
    notice_epoch: Option<u64>,
    expanded: Option<String>,
    generated: Option<String>,
}

impl Printed {
    fn update(&mut self, session: &SessionController) {
        if let Some(notice) = session.notice()
            && self.notice_epoch != Some(notice.epoch)
        {
            self.notice_epoch = Some(notice.epoch);
            print_notice(Some(notice));
        }

        let expanded = session.expanded_text().map(str::to_string);
        if expanded != self.expanded {
            if let Some(text) = &expanded {
                println!("{}\n{text}", "Expanded prompt:".bold());
            }
            self.expanded = expanded;
        }

        let generated = session.generated().map(|image| image.url.clone());
        if generated != self.generated {
            if let Some(image) = session.generated() {
                println!(
                    "{} {} ({}, seed {})",
                    "Generated:".bold(),
                    image.filename,
                    image.size_label(),
                    image.seed_label()
                );
            }
            self.generated = generated;
        }
    }
}

async fn run_repl(config: &Config, transport: Arc<dyn SessionTransport>) -> Result<()> {
    let mut session = SessionController::new(transport, SessionOptions::from_config(config));
    let (mut lines, ack) = spawn_line_reader()?;
    let mut printed = Printed::default();

    println!(
        "{} {}",
        "Prompt studio".bold(),
        "(type help for commands)".dimmed()
    );

    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else { break };
                let result = commands::execute(&line, &mut session);
                if let Some(message) = &result.message {
                    println!("{message}");
                }
                let quit = match result.action {
                    Some(action) => run_action(&mut session, config, action).await,
                    None => false,
                };
                printed.update(&session);
                if quit || ack.send(()).is_err() {
                    break;
                }
            }
            _ = session.step() => {
                printed.update(&session);
            }
        }
    }

    if session.pending_work() > 0 {
        logging::debug(format!(
            "Exiting with {} request(s) in flight",
            session.pending_work()
        ));
    }
    Ok(())
}

/// Run a deferred command action. Returns whether the REPL should exit.
async fn run_action(
    session: &mut SessionController,
    config: &Config,
    action: CommandAction,
) -> bool {
    match action {
        CommandAction::Quit => return true,
        CommandAction::Attach { slot, paths } => {
            let mut files = Vec::with_capacity(paths.len());
            for path in &paths {
                match LocalFile::from_path(path).await {
                    Ok(file) => files.push(file),
                    Err(err) => println!("{}", format!("Error: {err:#}").red()),
                }
            }
            if files.is_empty() {
                return false;
            }
            let action = match <[LocalFile; 1]>::try_from(files) {
                Ok([file]) => SlotAction::Select(file),
                Err(files) => SlotAction::Drop(files),
            };
            match session.dispatch_slot(slot, action) {
                Ok(true) => println!("Uploading to {slot}..."),
                Ok(false) => println!("{}", "No image file given; slot unchanged".dimmed()),
                Err(err) => println!("{}", format!("Error: {err}").red()),
            }
        }
        CommandAction::Wait => {
            session.settle().await;
            if matches!(session.assist_state(), OperationState::Idle)
                && matches!(session.generate_state(), OperationState::Idle)
                && session.slots().uploads_in_flight() == 0
            {
                println!("{}", "Nothing in flight".dimmed());
            }
        }
        CommandAction::Copy => copy_expanded(session),
        CommandAction::Download(dir) => {
            let dir = dir.unwrap_or_else(|| config.download_dir());
            match session.download_generated(&dir).await {
                Ok(path) => println!("Saved {}", path.display()),
                Err(err) => println!("{}", format!("Error: {err:#}").red()),
            }
        }
    }
    false
}

fn copy_expanded(session: &mut SessionController) {
    let Some(text) = session.expanded_text().map(str::to_string) else {
        return;
    };
    match arboard::Clipboard::new().and_then(|mut clipboard| clipboard.set_text(text)) {
        Ok(()) => session.notify_copied(),
        Err(err) => println!("{}", format!("Error: clipboard unavailable: {err}").red()),
    }
}

fn print_notice(notice: Option<&Notice>) {
    let Some(notice) = notice else {
        return;
    };
    let line = notice.render();
    match notice.kind {
        NoticeKind::Error => eprintln!("{}", line.red()),
        NoticeKind::Success => println!("{}", line.green()),
        NoticeKind::Info => println!("{}", line.cyan()),
    }
}
