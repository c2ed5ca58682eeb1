//! Source-tree rewriting with the substitution ruleset.
//!
//! Walks a destination tree that already holds a copy of the sources, applies
//! the same substitutions used for constant-pool rewriting to each qualifying
//! file, and relocates files whose own class is a relocation target: their
//! leading `package` declaration is stripped and the file moves to the tree
//! root under its simple name. Files the ruleset does not touch are left
//! exactly where the upstream copy placed them.

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::rules::Ruleset;

#[derive(Debug, Default, Clone, Serialize)]
pub struct SourceRewriteResult {
    pub files_scanned: usize,
    pub files_rewritten: usize,
    pub files_relocated: usize,
}

enum Outcome {
    Unchanged,
    Rewritten,
    Relocated,
}

/// Rewrites every file under `directory` whose extension satisfies
/// `valid_extension`, in place.
pub fn apply_to_all_in_directory<F>(
    rules: &Ruleset,
    directory: &Path,
    valid_extension: F,
) -> Result<SourceRewriteResult>
where
    F: Fn(&str) -> bool,
{
    let files = collect_files(directory, &valid_extension)?;
    let mut result = SourceRewriteResult {
        files_scanned: files.len(),
        ..Default::default()
    };

    for path in &files {
        match apply_to(rules, path, directory)
            .with_context(|| format!("Failed to rewrite source file: {}", path.display()))?
        {
            Outcome::Unchanged => {}
            Outcome::Rewritten => result.files_rewritten += 1,
            Outcome::Relocated => {
                result.files_rewritten += 1;
                result.files_relocated += 1;
            }
        }
    }

    Ok(result)
}

fn collect_files<F>(directory: &Path, valid_extension: &F) -> Result<Vec<PathBuf>>
where
    F: Fn(&str) -> bool,
{
    let mut files = Vec::new();
    for entry in WalkBuilder::new(directory)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .build()
    {
        let entry = entry?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();
        if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(valid_extension)
        {
            files.push(path.to_path_buf());
        }
    }
    // The walk is collected up front so files written during rewriting are
    // never revisited; sorting keeps processing order deterministic.
    files.sort();
    Ok(files)
}

fn apply_to(rules: &Ruleset, path: &Path, directory: &Path) -> Result<Outcome> {
    let relative = path
        .strip_prefix(directory)
        .with_context(|| format!("path escapes source tree: {}", path.display()))?;
    let full = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    let Some(dot) = full.rfind('.') else {
        return Ok(Outcome::Unchanged);
    };
    let extension = &full[dot + 1..];
    let class_name = &full[..dot];

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read source file: {}", path.display()))?;
    let mut rewritten = rules.apply(&contents);

    let mut new_class_name = class_name.to_string();
    if rules.contains_class(class_name) {
        new_class_name = rules.apply(class_name);
        strip_package_declaration(&mut rewritten);
    }

    if contents == rewritten && new_class_name == class_name {
        return Ok(Outcome::Unchanged);
    }

    std::fs::remove_file(path)
        .with_context(|| format!("Failed to remove original file: {}", path.display()))?;
    let target = directory.join(format!("{new_class_name}.{extension}"));
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    std::fs::write(&target, rewritten)
        .with_context(|| format!("Failed to write rewritten file: {}", target.display()))?;

    Ok(if new_class_name == class_name {
        Outcome::Rewritten
    } else {
        Outcome::Relocated
    })
}

/// Drops the leading `package` statement through its terminating `;`. When no
/// terminator exists the first line goes instead; a file that is nothing but
/// an unterminated one-line declaration is left as is.
fn strip_package_declaration(rewritten: &mut String) {
    if !rewritten.trim_start().starts_with("package ") {
        return;
    }
    if let Some(end) = rewritten.find(';') {
        *rewritten = rewritten[end + 1..].to_string();
    } else if let Some(line) = rewritten.find('\n') {
        *rewritten = rewritten[line + 1..].to_string();
    }
}
