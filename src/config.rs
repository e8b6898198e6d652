use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use colored::Color;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the YAML test bench file
    #[arg(short = 't', long, default_value = "testbench.yml")]
    pub testbench: PathBuf,

    /// Bench entry to grade against (defaults to the only entry, or the
    /// entry named like the assignment file stem)
    #[arg(short = 'b', long)]
    pub bench: Option<String>,

    /// Interpreter used to run submissions
    #[arg(long, default_value = "python3")]
    pub python: String,

    /// External style checker; its stdout is captured verbatim
    #[arg(long, default_value = "flake8")]
    pub style_checker: String,

    /// When to display the submission code
    #[arg(long, value_parser = ["always", "never", "ask"], default_value = "ask")]
    pub show_code: String,

    /// When to attach the language feedback message
    #[arg(long, value_parser = ["always", "never", "ask"], default_value = "ask")]
    pub lang_feedback: String,

    /// Language feedback message appended when all cases pass
    #[arg(long)]
    pub lang_message: Option<String>,

    /// Keep the assignment and derived files instead of deleting them
    #[arg(short = 'k', long)]
    pub keep_files: bool,

    /// Don't copy the collected feedback to the system clipboard
    #[arg(long)]
    pub no_clipboard: bool,

    /// Per-case execution time limit in seconds, 0 disables the limit
    #[arg(long, value_parser = clap::value_parser!(u32), default_value = "0")]
    pub limit_run: u32,

    /// Print a JSON report of all graded assignments at the end
    #[arg(long)]
    pub json: bool,

    /// Assignment source files to grade
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

/// Policy for the two checkpoints that used to be interactive-only.
/// `Ask` keeps the yes/no prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    Always,
    Never,
    Ask,
}

impl Checkpoint {
    fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "always" => Checkpoint::Always,
            "never" => Checkpoint::Never,
            "ask" => Checkpoint::Ask,
            other => bail!("Unknown checkpoint policy: {other}"),
        })
    }
}

/// Everything the orchestrator needs, resolved once from the CLI.
pub struct Settings {
    pub python: String,
    pub style_checker: String,
    pub show_code: Checkpoint,
    pub lang_feedback: Checkpoint,
    pub lang_message: Option<String>,
    pub clean_files: bool,
    pub clipboard: bool,
    pub limit_run: Option<Duration>,
    pub display: DisplayStyle,
}

impl Settings {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        Ok(Settings {
            python: cli.python.clone(),
            style_checker: cli.style_checker.clone(),
            show_code: Checkpoint::parse(&cli.show_code)?,
            lang_feedback: Checkpoint::parse(&cli.lang_feedback)?,
            lang_message: cli.lang_message.clone(),
            clean_files: !cli.keep_files,
            clipboard: !cli.no_clipboard,
            limit_run: match cli.limit_run {
                0 => None,
                secs => Some(Duration::from_secs(secs as u64)),
            },
            display: DisplayStyle::default(),
        })
    }
}

/// Color and marker used for each case verdict.
pub struct DisplayStyle {
    pub pass: (Color, &'static str),
    pub fail: (Color, &'static str),
}

impl Default for DisplayStyle {
    fn default() -> Self {
        DisplayStyle {
            pass: (Color::Green, "✔"),
            fail: (Color::Red, "✘"),
        }
    }
}

impl DisplayStyle {
    pub fn verdict(&self, passed: bool) -> (Color, &'static str) {
        if passed {
            self.pass
        } else {
            self.fail
        }
    }
}
