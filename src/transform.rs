use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use tree_sitter::Node;

use crate::testbench::{InputVar, Vars};

/// Comments out every line containing the word `import`, leaving all other
/// lines and the line count untouched. Best-effort safeguard against the
/// submission's own imports running during testing, not a sandbox.
pub fn securize_code(code: &str) -> String {
    let import_re = Regex::new(r"\bimport\b").unwrap();
    code.split('\n')
        .map(|line| {
            if import_re.is_match(line) {
                format!("#{line}")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Rewrites the submission so it can be driven from the command line:
/// prepends `import sys`, overwrites the first top-level assignment of each
/// input variable with `name = cast(sys.argv[i + 1])`, and appends a print
/// of every output variable's final value (`UNDEF` if never bound).
///
/// Assignments are located on the parse tree, so a variable name that only
/// appears as the suffix of another identifier, or inside a function body,
/// is never rewritten. An input variable with no top-level assignment is a
/// silent no-op.
pub fn inject_checking_code(
    code: &str,
    input_vars: &[InputVar],
    output_vars: &[String],
) -> Result<String> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .context("Failed to load Python grammar")?;
    let tree = parser
        .parse(code, None)
        .ok_or_else(|| anyhow!("Error parsing submission code"))?;

    let assignments = top_level_assignments(tree.root_node(), code)?;

    let mut edits: Vec<(Range<usize>, String)> = Vec::new();
    for (i, var) in input_vars.iter().enumerate() {
        let cast = var.cast.as_deref().unwrap_or("str");
        let claimed: Vec<&Range<usize>> = edits.iter().map(|(r, _)| r).collect();
        let target = assignments
            .iter()
            .find(|(name, range)| name == &var.name && !claimed.contains(&range));
        if let Some((name, range)) = target {
            edits.push((
                range.clone(),
                format!("{} = {}(sys.argv[{}])", name, cast, i + 1),
            ));
        }
    }

    // Splice from the back so earlier ranges stay valid.
    edits.sort_by(|a, b| b.0.start.cmp(&a.0.start));
    let mut injected = code.to_string();
    for (range, replacement) in edits {
        injected.replace_range(range, &replacement);
    }

    let mut result = String::from("import sys\n\n");
    result.push_str(&injected);
    result.push('\n');
    for var in output_vars {
        result.push_str(&format!("print(globals().get('{var}', 'UNDEF'), end=' ')\n"));
    }
    Ok(result)
}

/// Collects `(identifier, byte range)` for every assignment statement that
/// is a direct child of the module, in source order.
fn top_level_assignments(root: Node, code: &str) -> Result<Vec<(String, Range<usize>)>> {
    let mut found = Vec::new();
    let mut cursor = root.walk();
    for stmt in root.named_children(&mut cursor) {
        if stmt.kind() != "expression_statement" {
            continue;
        }
        let Some(expr) = stmt.named_child(0) else {
            continue;
        };
        if expr.kind() != "assignment" {
            continue;
        }
        let Some(left) = expr.child_by_field_name("left") else {
            continue;
        };
        if left.kind() != "identifier" {
            continue;
        }
        let name = left
            .utf8_text(code.as_bytes())
            .context("Assignment target is not valid UTF-8")?;
        found.push((name.to_string(), expr.byte_range()));
    }
    Ok(found)
}

/// Inserts a marker before the file extension: `sub.py` becomes
/// `sub.<marker>.py`.
pub fn derived_path(path: &Path, marker: &str) -> PathBuf {
    let mut path = path.to_path_buf();
    match path.extension() {
        Some(ext) => {
            let mut new_ext = std::ffi::OsString::from(marker);
            new_ext.push(".");
            new_ext.push(ext);
            path.set_extension(new_ext);
            path
        }
        None => {
            path.set_extension(marker);
            path
        }
    }
}

pub fn create_securized_file(asgmt_file: &Path) -> Result<PathBuf> {
    let code = fs::read_to_string(asgmt_file)
        .with_context(|| format!("Failed to read {}", asgmt_file.display()))?;
    let securized_file = derived_path(asgmt_file, "securized");
    fs::write(&securized_file, securize_code(&code))
        .with_context(|| format!("Failed to write {}", securized_file.display()))?;
    Ok(securized_file)
}

/// Reads the securized source and writes the injected sibling, named after
/// the original assignment file.
pub fn create_injected_file(
    asgmt_file: &Path,
    securized_file: &Path,
    vars: &Vars,
) -> Result<PathBuf> {
    let code = fs::read_to_string(securized_file)
        .with_context(|| format!("Failed to read {}", securized_file.display()))?;
    let injected_code = inject_checking_code(&code, &vars.input, &vars.output)?;
    let injected_file = derived_path(asgmt_file, "injected");
    fs::write(&injected_file, injected_code)
        .with_context(|| format!("Failed to write {}", injected_file.display()))?;
    Ok(injected_file)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str, cast: Option<&str>) -> InputVar {
        InputVar {
            name: name.to_string(),
            cast: cast.map(str::to_string),
        }
    }

    #[test]
    fn securize_comments_out_imports_and_keeps_line_count() {
        let code = "import os\nfrom sys import argv\nx = 1\n\nprint(x)";
        let securized = securize_code(code);
        assert_eq!(securized.split('\n').count(), code.split('\n').count());
        assert_eq!(
            securized,
            "#import os\n#from sys import argv\nx = 1\n\nprint(x)"
        );
    }

    #[test]
    fn inject_rewrites_first_top_level_assignment() {
        let injected =
            inject_checking_code("x = 5\nprint(x)\n", &[var("x", Some("int"))], &[]).unwrap();
        assert!(injected.starts_with("import sys\n\n"));
        assert!(injected.contains("x = int(sys.argv[1])"));
        assert!(!injected.contains("x = 5"));
        assert!(injected.contains("print(x)"));
    }

    #[test]
    fn inject_defaults_to_str_cast() {
        let injected = inject_checking_code("name = 'bob'\n", &[var("name", None)], &[]).unwrap();
        assert!(injected.contains("name = str(sys.argv[1])"));
    }

    #[test]
    fn inject_leaves_later_assignments_alone() {
        let injected =
            inject_checking_code("x = 1\nx = 2\n", &[var("x", Some("int"))], &[]).unwrap();
        assert!(injected.contains("x = int(sys.argv[1])"));
        assert!(injected.contains("x = 2"));
    }

    #[test]
    fn inject_ignores_suffix_collisions_and_nested_scopes() {
        let code = "max = 5\ndef f():\n    x = 99\nx = 1\n";
        let injected = inject_checking_code(code, &[var("x", Some("int"))], &[]).unwrap();
        assert!(injected.contains("max = 5"));
        assert!(injected.contains("    x = 99"));
        assert!(injected.contains("x = int(sys.argv[1])"));
        assert!(!injected.contains("x = 1"));
    }

    #[test]
    fn inject_without_matching_assignment_is_a_no_op() {
        let injected = inject_checking_code("print('hi')\n", &[var("x", None)], &[]).unwrap();
        assert!(injected.contains("print('hi')"));
        assert!(!injected.contains("sys.argv"));
    }

    #[test]
    fn inject_appends_output_prints_with_sentinel() {
        let injected =
            inject_checking_code("y = 1\n", &[], &["y".to_string(), "z".to_string()]).unwrap();
        assert!(injected.contains("print(globals().get('y', 'UNDEF'), end=' ')"));
        assert!(injected.ends_with("print(globals().get('z', 'UNDEF'), end=' ')\n"));
    }

    #[test]
    fn repeated_input_vars_claim_successive_assignments() {
        let injected = inject_checking_code(
            "x = 1\nx = 2\n",
            &[var("x", Some("int")), var("x", Some("int"))],
            &[],
        )
        .unwrap();
        assert!(injected.contains("x = int(sys.argv[1])"));
        assert!(injected.contains("x = int(sys.argv[2])"));
    }

    #[test]
    fn derived_path_inserts_marker_before_extension() {
        assert_eq!(
            derived_path(Path::new("sub.py"), "securized"),
            PathBuf::from("sub.securized.py")
        );
        assert_eq!(
            derived_path(Path::new("dir/sub.py"), "injected"),
            PathBuf::from("dir/sub.injected.py")
        );
        assert_eq!(
            derived_path(Path::new("noext"), "securized"),
            PathBuf::from("noext.securized")
        );
    }

    #[test]
    fn derived_files_round_trip_on_disk() {
        let dir = tempdir::TempDir::new("pygrade").unwrap();
        let asgmt = dir.path().join("sub.py");
        fs::write(&asgmt, "import os\nx = 5\nprint(x)\n").unwrap();

        let securized = create_securized_file(&asgmt).unwrap();
        assert_eq!(securized, dir.path().join("sub.securized.py"));
        assert!(fs::read_to_string(&securized)
            .unwrap()
            .starts_with("#import os"));

        let vars: Vars =
            serde_yaml::from_str("input: [{x: int}]\noutput: [x]").unwrap();
        let injected = create_injected_file(&asgmt, &securized, &vars).unwrap();
        assert_eq!(injected, dir.path().join("sub.injected.py"));
        let code = fs::read_to_string(&injected).unwrap();
        assert!(code.contains("x = int(sys.argv[1])"));
        assert!(code.contains("globals().get('x', 'UNDEF')"));
    }
}
