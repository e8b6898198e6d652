use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_yaml::Value;

// A test bench file is a mapping of bench name to bench description:
//
// sum-asgmt:
//   vars:
//     input:
//       - a: int
//       - b: int
//     output:
//       - total
//   cases:
//     - input: [2, 2]
//       output: [4]
//   feedback:
//     expected:
//       - regex: 'def '
//         message: Use a function to structure your code.
//     unexpected:
//       - regex: 'eval\('
//         message: Don't use eval.
//
// Input variables are either bare names or single-entry `name: cast` maps,
// where the cast is a Python callable applied to the raw argument string.

#[derive(Debug, Deserialize)]
pub struct TestBench {
    pub vars: Vars,
    pub cases: Vec<Case>,
    #[serde(default)]
    pub feedback: FeedbackConfig,
}

#[derive(Debug, Deserialize)]
pub struct Vars {
    pub input: Vec<InputVar>,
    pub output: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawInputVar")]
pub struct InputVar {
    pub name: String,
    pub cast: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawInputVar {
    Bare(String),
    Typed(BTreeMap<String, String>),
}

impl TryFrom<RawInputVar> for InputVar {
    type Error = String;

    fn try_from(raw: RawInputVar) -> Result<Self, Self::Error> {
        match raw {
            RawInputVar::Bare(name) => Ok(InputVar { name, cast: None }),
            RawInputVar::Typed(map) => {
                let mut entries = map.into_iter();
                match (entries.next(), entries.next()) {
                    (Some((name, cast)), None) => Ok(InputVar {
                        name,
                        cast: Some(cast),
                    }),
                    _ => Err("expected a single `name: cast` entry".to_string()),
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Case {
    pub input: Vec<Value>,
    pub output: Vec<Value>,
}

impl Case {
    /// Positional arguments handed to the injected script.
    pub fn args(&self) -> Vec<String> {
        self.input.iter().map(scalar_to_string).collect()
    }

    /// Expected output values joined the same way the injected print
    /// statements join them.
    pub fn desired_output(&self) -> String {
        self.output
            .iter()
            .map(scalar_to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    pub regex: String,
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct FeedbackConfig {
    #[serde(default)]
    pub expected: Vec<Rule>,
    #[serde(default)]
    pub unexpected: Vec<Rule>,
}

/// Stringifies a YAML scalar the way the injected script sees its
/// command-line arguments (Python's str() spelling for bools and null).
fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .unwrap_or_default()
            .trim_end()
            .to_string(),
    }
}

pub fn read_testbench(path: &Path) -> Result<BTreeMap<String, TestBench>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read test bench {}", path.display()))?;
    serde_yaml::from_str(&text)
        .with_context(|| format!("Malformed test bench {}", path.display()))
}

/// Picks the bench entry for an assignment: an explicit name wins, a file
/// with a single entry needs no name, otherwise the assignment file stem
/// must match an entry.
pub fn select_bench<'a>(
    benches: &'a BTreeMap<String, TestBench>,
    name: Option<&str>,
    asgmt_file: &Path,
) -> Result<(&'a str, &'a TestBench)> {
    if let Some(name) = name {
        return match benches.get_key_value(name) {
            Some((k, v)) => Ok((k.as_str(), v)),
            None => bail!(
                "No bench named {name} (available: {})",
                available(benches)
            ),
        };
    }

    if benches.len() == 1 {
        let (k, v) = benches.iter().next().expect("len checked above");
        return Ok((k.as_str(), v));
    }

    let stem = asgmt_file
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    match benches.get_key_value(&stem) {
        Some((k, v)) => Ok((k.as_str(), v)),
        None => bail!(
            "No bench named after {stem:?}; pass --bench (available: {})",
            available(benches)
        ),
    }
}

fn available(benches: &BTreeMap<String, TestBench>) -> String {
    benches.keys().cloned().collect::<Vec<_>>().join(", ")
}
