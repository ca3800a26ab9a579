//! Strategy 2: delete one declared function argument.
//!
//! The argument set is read from the substring between the first `{` and
//! the first `}` after it. That single pass is not brace-depth aware, so a
//! default value containing `{ }` truncates the scan, an accepted
//! limitation of staying out of the parsing business.
//!
//! Removal is an ordered chain of textual rewrites, each tried only when
//! the previous one changed nothing. The chain trades precision for
//! robustness against formatting variance and may over-delete.

use rand::Rng;

use crate::MutateError;

/// Names that must never be deleted: the ellipsis placeholder, core
/// library and tooling handles, and package-building primitives.
pub const PROTECTED_NAMES: &[&str] = &[
    "...",
    "lib",
    "pkgs",
    "stdenv",
    "buildPythonPackage",
    "callPackage",
    "isPy3k",
];

/// Collect the declared argument names in declaration order, deduplicated.
///
/// Per token: strip an optional-parameter suffix after `?`, then a line
/// comment after `#`, trim, and drop empties.
fn declared_arguments(source: &str) -> Result<Vec<String>, MutateError> {
    let (_, after_open) = source
        .split_once('{')
        .ok_or(MutateError::MissingArgumentBlock)?;
    let (block, _) = after_open
        .split_once('}')
        .ok_or(MutateError::MissingArgumentBlock)?;

    let mut names = Vec::new();
    for token in block.split(',') {
        let token = token.split('?').next().unwrap_or_default().trim();
        let token = token.split('#').next().unwrap_or_default().trim();
        if token.is_empty() {
            continue;
        }
        if !names.iter().any(|name| name == token) {
            names.push(token.to_string());
        }
    }
    Ok(names)
}

fn is_protected(name: &str) -> bool {
    PROTECTED_NAMES.contains(&name) || name.contains("fetch")
}

/// Sample names without replacement until one survives the protected
/// filter; an exhausted set is a hard failure.
fn pick_target<R: Rng>(mut names: Vec<String>, rng: &mut R) -> Result<String, MutateError> {
    loop {
        if names.is_empty() {
            return Err(MutateError::NoSuitableDependency);
        }
        let chosen = names.swap_remove(rng.gen_range(0..names.len()));
        if is_protected(&chosen) {
            continue;
        }
        return Ok(chosen);
    }
}

/// Rule (a): drop every line where the name sits next to a comma in either
/// direction or before an optional-parameter marker, in the spacing
/// variants seen in practice.
fn drop_from_declaration(source: &str, name: &str) -> String {
    let needles = [
        format!("{name},"),
        format!(", {name}"),
        format!(",  {name}"),
        format!("{name} ?"),
        format!("{name}?"),
    ];
    let kept: Vec<&str> = source
        .split('\n')
        .filter(|line| !needles.iter().any(|needle| line.contains(needle.as_str())))
        .collect();
    kept.join("\n")
}

/// Rule (b): drop every line whose trimmed content is exactly the name,
/// covering list-style dependency entries such as `buildInputs` elements.
fn drop_list_entries(source: &str, name: &str) -> String {
    let kept: Vec<&str> = source
        .split('\n')
        .filter(|line| line.trim() != name)
        .collect();
    kept.join("\n")
}

pub(crate) fn execute<R: Rng>(source: &str, rng: &mut R) -> Result<String, MutateError> {
    let target = pick_target(declared_arguments(source)?, rng)?;

    let rewritten = drop_from_declaration(source, &target);
    if rewritten != source {
        return Ok(rewritten);
    }
    let rewritten = drop_list_entries(source, &target);
    if rewritten != source {
        return Ok(rewritten);
    }
    let rewritten = source.replace(&format!("{target} "), "");
    if rewritten != source {
        return Ok(rewritten);
    }
    Ok(source.replace(&target, ""))
}
