use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use arboard::Clipboard;
use colored::Colorize;
use serde::Serialize;

use crate::config::{Checkpoint, Settings};
use crate::feedback;
use crate::runner;
use crate::testbench::TestBench;
use crate::transform;

#[derive(Debug, Serialize)]
pub struct CaseReport {
    pub args: Vec<String>,
    pub desired_output: String,
    pub output: String,
    pub passed: bool,
    pub exception: bool,
}

#[derive(Debug, Serialize)]
pub struct AssignmentReport {
    pub file: PathBuf,
    pub bench: String,
    pub cases: Vec<CaseReport>,
    pub all_passed: bool,
    pub any_exception: bool,
    pub feedback: Vec<String>,
}

/// Grades one assignment file against one bench, start to finish: derive
/// the securized and injected files, run every case, surface feedback,
/// honor the show-code and language-feedback checkpoints, clean up, and
/// put the queued feedback on the clipboard.
pub fn handle_assignment(
    asgmt_file: &Path,
    bench_name: &str,
    bench: &TestBench,
    interpreter: &Path,
    settings: &Settings,
) -> Result<AssignmentReport> {
    let file_name = asgmt_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| asgmt_file.display().to_string());
    println!("\n{}", format!("# {file_name}").bold());

    println!("{}", "Securizing input code...".magenta());
    let securized_file = transform::create_securized_file(asgmt_file)?;
    println!("{}", "Injecting testing code...".magenta());
    let injected_file =
        transform::create_injected_file(asgmt_file, &securized_file, &bench.vars)?;

    let mut cases = Vec::new();
    for case in &bench.cases {
        let args = case.args();
        println!(
            "{}",
            format!(
                "$ {} \"{}\" {}",
                settings.python,
                injected_file.display(),
                args.join(" ")
            )
            .cyan()
            .bold()
        );
        let outcome = runner::run_case(settings, interpreter, &injected_file, case)?;
        println!("Desired output: {}", case.desired_output());
        let (color, marker) = settings.display.verdict(outcome.code_works);
        println!(
            "{}",
            format!("Program output: {} {marker}", outcome.output).color(color)
        );
        cases.push(CaseReport {
            args,
            desired_output: case.desired_output(),
            output: outcome.output,
            passed: outcome.code_works,
            exception: outcome.exception_raised,
        });
    }

    show_testbench_results(&cases, settings);

    let all_passed = cases.iter().all(|c| c.passed);
    let any_exception = cases.iter().any(|c| c.exception);
    let mut queued: Vec<String> = Vec::new();

    if all_passed {
        println!("{}", "Getting runtime feedback...".magenta());
        let code = fs::read_to_string(asgmt_file)
            .with_context(|| format!("Failed to read {}", asgmt_file.display()))?;
        let items = feedback::runtime_feedback(&code, &bench.feedback)?;
        if !items.is_empty() {
            let text = items.join("\n");
            println!("{}", text.yellow());
            queued.push(text);
        }

        println!("{}", "Getting style feedback...".magenta());
        let style = feedback::style_feedback(&settings.style_checker, asgmt_file)?;
        let style = style.trim_end();
        if !style.is_empty() {
            println!("{}", style.yellow());
            queued.push(style.to_string());
        }
    }

    if checkpoint(settings.show_code, "Do you want to see the code?")? {
        // show the code that actually ran when something blew up
        let file_to_show = if any_exception {
            injected_file.as_path()
        } else {
            asgmt_file
        };
        show_code(file_to_show)?;

        if all_passed && checkpoint(settings.lang_feedback, "Do you want to add language feedback?")?
        {
            let message = settings
                .lang_message
                .as_deref()
                .context("No language feedback message configured (--lang-message)")?;
            println!("{}", message.yellow());
            queued.push(message.to_string());
        }
    }

    if settings.clean_files {
        println!("{}", "Cleaning temp files and assignment code...".magenta());
        clean_files(&[asgmt_file, securized_file.as_path(), injected_file.as_path()])?;
    }

    if settings.clipboard {
        println!("{}", "Copying feedback to clipboard...".magenta());
        copy_to_clipboard(queued.join("\n\n"))?;
    }

    Ok(AssignmentReport {
        file: asgmt_file.to_path_buf(),
        bench: bench_name.to_string(),
        cases,
        all_passed,
        any_exception,
        feedback: queued,
    })
}

fn show_testbench_results(cases: &[CaseReport], settings: &Settings) {
    let markers = cases
        .iter()
        .map(|c| {
            let (color, marker) = settings.display.verdict(c.passed);
            marker.color(color).to_string()
        })
        .collect::<Vec<_>>()
        .join(" ");
    let passed = cases.iter().filter(|c| c.passed).count();
    println!("Results: {markers}  ({passed}/{} cases passed)", cases.len());
}

fn checkpoint(policy: Checkpoint, prompt: &str) -> Result<bool> {
    match policy {
        Checkpoint::Always => Ok(true),
        Checkpoint::Never => Ok(false),
        Checkpoint::Ask => confirm(prompt),
    }
}

/// Yes/no prompt on stdin, defaulting to yes on an empty answer.
fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [Y/n] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin()
        .read_line(&mut answer)
        .context("Failed to read answer")?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "" | "y" | "yes"))
}

fn show_code(path: &Path) -> Result<()> {
    let code =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    println!("{}", format!("--- {} ---", path.display()).bold());
    for (i, line) in code.lines().enumerate() {
        println!("{:>4} | {line}", i + 1);
    }
    Ok(())
}

fn clean_files(files: &[&Path]) -> Result<()> {
    for file in files {
        fs::remove_file(file)
            .with_context(|| format!("Failed to remove {}", file.display()))?;
    }
    Ok(())
}

fn copy_to_clipboard(payload: String) -> Result<()> {
    let mut clipboard = Clipboard::new().context("Clipboard is not available")?;
    clipboard
        .set_text(payload)
        .context("Failed to copy feedback to clipboard")
}
