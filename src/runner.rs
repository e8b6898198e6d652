use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use regex::Regex;
use wait_timeout::ChildExt;

use crate::config::Settings;
use crate::testbench::Case;

/// What one test case produced: the comparable output (or exception
/// summary), whether it matched the expected output, and whether the
/// interpreter blew up.
#[derive(Debug)]
pub struct CaseOutcome {
    pub output: String,
    pub code_works: bool,
    pub exception_raised: bool,
}

enum Execution {
    Completed { success: bool, text: String },
    TimedOut,
}

/// Resolves the interpreter command before any case runs.
pub fn interpreter_path(python: &str) -> Result<PathBuf> {
    which::which(python).with_context(|| format!("Cannot find {python} on PATH"))
}

/// Runs the injected script once with the case's inputs as positional
/// arguments. A zero exit compares the last non-empty line of the combined
/// capture against the expected output; a non-zero exit is classified into
/// a short exception summary instead.
pub fn run_case(
    settings: &Settings,
    interpreter: &Path,
    injected_file: &Path,
    case: &Case,
) -> Result<CaseOutcome> {
    let desired_output = case.desired_output();
    let execution = execute(settings, interpreter, injected_file, &case.args())?;

    Ok(match execution {
        Execution::Completed { success: true, text } => {
            let output = last_line(&text).to_string();
            let code_works = output == desired_output;
            CaseOutcome {
                output,
                code_works,
                exception_raised: false,
            }
        }
        Execution::Completed { success: false, text } => CaseOutcome {
            output: parse_exception(&text),
            code_works: false,
            exception_raised: true,
        },
        Execution::TimedOut => CaseOutcome {
            output: "Timeout".to_string(),
            code_works: false,
            exception_raised: true,
        },
    })
}

fn execute(
    settings: &Settings,
    interpreter: &Path,
    injected_file: &Path,
    args: &[String],
) -> Result<Execution> {
    let mut cmd = Command::new(interpreter);
    cmd.arg(injected_file).args(args).stdin(Stdio::null());

    let Some(limit) = settings.limit_run else {
        let output = cmd
            .output()
            .with_context(|| format!("Failed to run {}", injected_file.display()))?;
        return Ok(Execution::Completed {
            success: output.status.success(),
            text: combine(&output.stdout, &output.stderr),
        });
    };

    let mut child = cmd
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to run {}", injected_file.display()))?;

    match child.wait_timeout(limit)? {
        Some(status) => {
            let mut stdout = Vec::new();
            let mut stderr = Vec::new();
            if let Some(mut pipe) = child.stdout.take() {
                pipe.read_to_end(&mut stdout)?;
            }
            if let Some(mut pipe) = child.stderr.take() {
                pipe.read_to_end(&mut stderr)?;
            }
            Ok(Execution::Completed {
                success: status.success(),
                text: combine(&stdout, &stderr),
            })
        }
        None => {
            child.kill()?;
            child.wait()?;
            Ok(Execution::TimedOut)
        }
    }
}

fn combine(stdout: &[u8], stderr: &[u8]) -> String {
    let mut text = String::from_utf8_lossy(stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(stderr));
    text
}

/// Last non-empty line of the capture, the way the injected print
/// statements leave it (possibly with a trailing space).
fn last_line(text: &str) -> &str {
    text.trim().lines().last().unwrap_or("")
}

/// Boils an interpreter traceback down to `SomeError: message (line N)`,
/// or just the error token when no line number is present, or `Exception`
/// when the text matches no known shape.
pub fn parse_exception(message: &str) -> String {
    let error_re = Regex::new(r"\w+Error:.*").unwrap();
    let line_re = Regex::new(r"line \d+").unwrap();

    match error_re.find(message) {
        Some(error) => match line_re.find(message) {
            Some(at) => format!("{} ({})", error.as_str(), at.as_str()),
            None => error.as_str().to_string(),
        },
        None => "Exception".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use clap::Parser;

    use super::*;
    use crate::config::Cli;

    const TRACEBACK: &str = r#"Traceback (most recent call last):
  File "sub.injected.py", line 3, in <module>
    y = x / 0
ZeroDivisionError: division by zero"#;

    #[test]
    fn parse_exception_extracts_type_and_line() {
        let summary = parse_exception(TRACEBACK);
        assert!(summary.contains("ZeroDivisionError"));
        assert!(summary.contains("line 3"));
        assert_eq!(summary, "ZeroDivisionError: division by zero (line 3)");
    }

    #[test]
    fn parse_exception_without_line_number() {
        assert_eq!(
            parse_exception("ValueError: invalid literal"),
            "ValueError: invalid literal"
        );
    }

    #[test]
    fn parse_exception_falls_back_to_generic() {
        assert_eq!(parse_exception("KeyboardInterrupt"), "Exception");
    }

    #[test]
    fn last_line_skips_trailing_whitespace() {
        assert_eq!(last_line("4 5 \n"), "4 5");
        assert_eq!(last_line("warming up\n4 5"), "4 5");
        assert_eq!(last_line(""), "");
    }

    fn settings() -> Settings {
        Settings::from_cli(&Cli::parse_from(["pygrade", "sub.py"])).unwrap()
    }

    fn case(yaml: &str) -> Case {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn matching_case_passes_and_mismatch_fails() {
        let Ok(python) = which::which("python3") else {
            return;
        };
        let dir = tempdir::TempDir::new("pygrade").unwrap();
        let script = dir.path().join("sub.injected.py");
        fs::write(
            &script,
            "import sys\nx = int(sys.argv[1])\nprint(globals().get('x', 'UNDEF'), end=' ')\n",
        )
        .unwrap();

        let outcome = run_case(
            &settings(),
            &python,
            &script,
            &case("input: [3]\noutput: [3]"),
        )
        .unwrap();
        assert_eq!(outcome.output, "3");
        assert!(outcome.code_works);
        assert!(!outcome.exception_raised);

        let outcome = run_case(
            &settings(),
            &python,
            &script,
            &case("input: [3]\noutput: [4]"),
        )
        .unwrap();
        assert!(!outcome.code_works);
        assert!(!outcome.exception_raised);
    }

    #[test]
    fn exception_is_classified_not_propagated() {
        let Ok(python) = which::which("python3") else {
            return;
        };
        let dir = tempdir::TempDir::new("pygrade").unwrap();
        let script = dir.path().join("boom.injected.py");
        fs::write(&script, "import sys\nx = int(sys.argv[1])\ny = x / 0\n").unwrap();

        let outcome = run_case(
            &settings(),
            &python,
            &script,
            &case("input: [3]\noutput: [3]"),
        )
        .unwrap();
        assert!(outcome.exception_raised);
        assert!(!outcome.code_works);
        assert!(outcome.output.contains("ZeroDivisionError"));
        assert!(outcome.output.contains("line 3"));
    }
}
