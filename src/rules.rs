//! Substitution ruleset derivation, application, and persistence.
//!
//! Every target class contributes two rules: its dot-separated qualified name
//! and its slash-separated internal name, both mapping to the bare simple
//! name. Rules are ordered ascending by match length and applied as global
//! substring replaces, so a target name that happens to be a prefix of a
//! longer unrelated identifier is rewritten inside it (`a/b/Foo` inside
//! `a/b/FooBar` yields `FooBar`). That is intentional and kept for output
//! compatibility; matching is not boundary-aware.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;

use crate::marker;

#[derive(Debug, Clone)]
struct Replacement {
    target: String,
    replacement: String,
}

#[derive(Debug, Clone)]
pub struct Ruleset {
    rewrite: Vec<Replacement>,
    classes: Vec<String>,
    classes_set: HashSet<String>,
}

impl Ruleset {
    pub fn new(classes: impl IntoIterator<Item = String>) -> Self {
        let mut rewrite = Vec::new();
        let mut list = Vec::new();
        let mut set = HashSet::new();

        for class in classes {
            if !set.insert(class.clone()) {
                continue;
            }
            let dot_name = class.replace('/', ".");
            let slash_name = class.replace('.', "/");
            let simple_name = slash_name
                .rsplit('/')
                .next()
                .unwrap_or(slash_name.as_str())
                .to_string();
            rewrite.push(Replacement {
                target: dot_name,
                replacement: simple_name.clone(),
            });
            rewrite.push(Replacement {
                target: slash_name,
                replacement: simple_name,
            });
            list.push(class);
        }

        rewrite.sort_by_key(|replacement| replacement.target.len());
        list.sort();

        Self {
            rewrite,
            classes: list,
            classes_set: set,
        }
    }

    /// Derives a ruleset by inspecting compiled classes for the marker
    /// annotation. Inputs that do not parse as class files are skipped:
    /// derivation only ever adds confirmed matches.
    pub fn derive<I, B>(inputs: I, marker_descriptor: &str) -> Self
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let mut classes = Vec::new();
        for bytes in inputs {
            if let Ok(inspection) = marker::inspect(bytes.as_ref(), marker_descriptor)
                && inspection.marked
            {
                classes.push(inspection.name);
            }
        }
        Self::new(classes)
    }

    pub fn from_list_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read class list: {}", path.display()))?;
        Ok(Self::new(
            contents
                .lines()
                .filter(|line| !line.is_empty())
                .map(str::to_string),
        ))
    }

    pub fn write_target_classes(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create list directory: {}", parent.display())
            })?;
        }
        std::fs::write(path, self.list_contents())
            .with_context(|| format!("Failed to write class list: {}", path.display()))
    }

    /// SHA-256 over the persisted list form; stable across runs for the same
    /// target set.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.list_contents().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Applies every applicable substitution to `s`.
    ///
    /// The early break compares each rule against the length `s` had before
    /// any replacement, not the current (possibly shortened) string.
    pub fn apply(&self, s: &str) -> String {
        let original_length = s.len();
        let mut s = s.to_string();
        for rule in &self.rewrite {
            if rule.target.len() > original_length {
                break;
            }
            if s == rule.target {
                return rule.replacement.clone();
            }
            s = s.replace(&rule.target, &rule.replacement);
        }
        s
    }

    pub fn contains_class(&self, class_name: &str) -> bool {
        self.classes_set.contains(class_name)
    }

    /// Sorted target class names, as persisted.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    fn list_contents(&self) -> String {
        let mut out = String::new();
        for class in &self.classes {
            out.push_str(class);
            out.push('\n');
        }
        out
    }
}
