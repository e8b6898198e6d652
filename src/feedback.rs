use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use colored::Colorize;
use regex::Regex;
use thiserror::Error;

use crate::testbench::{FeedbackConfig, Rule};

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Invalid {kind} rule /{regex}/: {source}")]
    Invalid {
        kind: &'static str,
        regex: String,
        source: regex::Error,
    },
}

fn compile(rule: &Rule, kind: &'static str) -> Result<Regex, RuleError> {
    Regex::new(&rule.regex).map_err(|source| RuleError::Invalid {
        kind,
        regex: rule.regex.clone(),
        source,
    })
}

/// Evaluates every configured rule against the original (unmodified)
/// source and returns the messages of the violated ones. Expected rules
/// must match somewhere in the source; unexpected rules must not match on
/// any line that isn't a comment.
pub fn runtime_feedback(code: &str, config: &FeedbackConfig) -> Result<Vec<String>> {
    let mut items = Vec::new();

    for rule in &config.expected {
        let re = compile(rule, "expected")?;
        if !re.is_match(code) {
            items.push(rule.message.clone());
        }
    }

    let unexpected = config
        .unexpected
        .iter()
        .map(|rule| Ok((compile(rule, "unexpected")?, rule)))
        .collect::<Result<Vec<_>, RuleError>>()?;
    for (re, rule) in &unexpected {
        let violated = code
            .lines()
            .filter(|line| !line.trim_start().starts_with('#'))
            .any(|line| re.is_match(line));
        if violated {
            items.push(rule.message.clone());
        }
    }

    Ok(items)
}

/// Runs the external style checker on the original file and returns its
/// stdout verbatim. The checker's exit status is ignored (style checkers
/// exit non-zero when they find something). A checker missing from PATH
/// degrades to an empty report with a console notice.
pub fn style_feedback(checker: &str, asgmt_file: &Path) -> Result<String> {
    if which::which(checker).is_err() {
        println!(
            "{}",
            format!("{checker} not found on PATH, skipping style feedback").yellow()
        );
        return Ok(String::new());
    }

    let output = Command::new(checker)
        .arg(asgmt_file)
        .output()
        .with_context(|| format!("Failed to run {checker}"))?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
