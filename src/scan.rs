//! Compiled-class discovery: loose `.class` files under directories and
//! `.class` entries inside jar archives.

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use memmap2::Mmap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use zip::ZipArchive;

/// One compiled-class input together with where it came from, for reporting.
#[derive(Debug, Clone)]
pub struct ClassInput {
    pub origin: String,
    pub bytes: Vec<u8>,
}

/// Expands a mixed list of directories, loose `.class` files, and jar
/// archives into raw class buffers.
pub fn collect_class_inputs(inputs: &[PathBuf]) -> Result<Vec<ClassInput>> {
    let mut collected = Vec::new();
    for input in inputs {
        if input.is_dir() {
            for path in scan_class_files(input)? {
                collected.push(read_class_file(&path)?);
            }
        } else if has_extension(input, "jar") || has_extension(input, "zip") {
            collected.extend(read_jar_classes(input)?);
        } else if has_extension(input, "class") {
            collected.push(read_class_file(input)?);
        } else {
            anyhow::bail!(
                "Unsupported input (expected a directory, .class file, or jar): {}",
                input.display()
            );
        }
    }
    Ok(collected)
}

pub fn scan_class_files(base_path: &Path) -> Result<Vec<PathBuf>> {
    let (tx, rx) = mpsc::channel();

    let walker = WalkBuilder::new(base_path)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .build_parallel();

    walker.run(|| {
        let tx = tx.clone();
        Box::new(move |entry| {
            if let Ok(entry) = entry {
                let path = entry.path();
                if path.extension().is_some_and(|e| e == "class") {
                    let _ = tx.send(path.to_path_buf());
                }
            }
            ignore::WalkState::Continue
        })
    });

    drop(tx);
    let mut files: Vec<PathBuf> = rx.iter().collect();
    files.sort();
    Ok(files)
}

pub fn read_jar_classes(jar_path: &Path) -> Result<Vec<ClassInput>> {
    let file = File::open(jar_path)
        .with_context(|| format!("Failed to open jar: {}", jar_path.display()))?;
    // SAFETY: The file is opened read-only and remains valid for the lifetime
    // of the mmap. The mmap is dropped before the file.
    let mmap = unsafe { Mmap::map(&file) }
        .with_context(|| format!("Failed to mmap jar: {}", jar_path.display()))?;
    let mut archive = ZipArchive::new(Cursor::new(&mmap[..]))
        .with_context(|| format!("Failed to read zip structure: {}", jar_path.display()))?;

    let mut classes = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if !entry.name().ends_with(".class") {
            continue;
        }
        let origin = format!("{}!{}", jar_path.display(), entry.name());
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut bytes)
            .with_context(|| format!("Failed to read jar entry: {origin}"))?;
        classes.push(ClassInput { origin, bytes });
    }
    Ok(classes)
}

fn read_class_file(path: &Path) -> Result<ClassInput> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read class file: {}", path.display()))?;
    Ok(ClassInput {
        origin: path.display().to_string(),
        bytes,
    })
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}
