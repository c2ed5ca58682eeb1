use anyhow::{Context, Result};
use clap::Parser;
use class_relocator::cli::{Cli, Commands, OutputFormat};
use class_relocator::marker;
use class_relocator::rewrite::rewrite_class;
use class_relocator::rules::Ruleset;
use class_relocator::scan::{ClassInput, collect_class_inputs};
use class_relocator::sources;
use ignore::WalkBuilder;
use rayon::prelude::*;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Instant;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::List {
            inputs,
            output,
            marker,
            format,
        } => {
            let result = derive_list(&inputs, &output, &marker)?;
            write_output(&result, format)?;
        }
        Commands::Classes {
            inputs,
            list,
            output_dir,
            format,
        } => {
            let result = transform_classes(&inputs, &list, &output_dir)?;
            write_output(&result, format)?;
        }
        Commands::Sources {
            list,
            dir,
            copy_from,
            extensions,
            format,
        } => {
            let result = transform_sources(&list, &dir, copy_from.as_deref(), &extensions)?;
            write_output(&result, format)?;
        }
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct ListResult {
    inputs_scanned: usize,
    classes_found: usize,
    list_path: String,
    ruleset_hash: String,
    duration_ms: u64,
    classes: Vec<String>,
}

#[derive(Debug, Serialize)]
struct TransformedEntry {
    origin: String,
    class_name: String,
    renamed: bool,
    patched_constants: usize,
    output_path: String,
}

#[derive(Debug, Serialize)]
struct ClassesResult {
    classes_processed: usize,
    classes_renamed: usize,
    constants_patched: usize,
    output_dir: String,
    ruleset_hash: String,
    duration_ms: u64,
    entries: Vec<TransformedEntry>,
}

#[derive(Debug, Serialize)]
struct SourcesResult {
    destination: String,
    ruleset_hash: String,
    duration_ms: u64,
    files_scanned: usize,
    files_rewritten: usize,
    files_relocated: usize,
}

fn derive_list(inputs: &[PathBuf], output: &Path, marker_class: &str) -> Result<ListResult> {
    let start = Instant::now();
    let descriptor = marker::descriptor_for(marker_class);
    let class_inputs = collect_class_inputs(inputs)?;

    let ruleset = Ruleset::derive(
        class_inputs.iter().map(|input| input.bytes.as_slice()),
        &descriptor,
    );
    ruleset.write_target_classes(output)?;

    Ok(ListResult {
        inputs_scanned: class_inputs.len(),
        classes_found: ruleset.len(),
        list_path: output.display().to_string(),
        ruleset_hash: ruleset.fingerprint(),
        duration_ms: start.elapsed().as_millis() as u64,
        classes: ruleset.classes().to_vec(),
    })
}

fn transform_classes(inputs: &[PathBuf], list: &Path, output_dir: &Path) -> Result<ClassesResult> {
    let start = Instant::now();
    let ruleset = Ruleset::from_list_file(list)?;
    let class_inputs = collect_class_inputs(inputs)?;

    clear_directory(output_dir)?;

    // The ruleset is immutable from here on; every file is an independent
    // unit of work.
    let entries: Vec<TransformedEntry> = class_inputs
        .par_iter()
        .map(|input| {
            transform_one(&ruleset, input, output_dir)
                .with_context(|| format!("Failed to transform {}", input.origin))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ClassesResult {
        classes_processed: entries.len(),
        classes_renamed: entries.iter().filter(|e| e.renamed).count(),
        constants_patched: entries.iter().map(|e| e.patched_constants).sum(),
        output_dir: output_dir.display().to_string(),
        ruleset_hash: ruleset.fingerprint(),
        duration_ms: start.elapsed().as_millis() as u64,
        entries,
    })
}

fn transform_one(
    ruleset: &Ruleset,
    input: &ClassInput,
    output_dir: &Path,
) -> Result<TransformedEntry> {
    let mut output_path = PathBuf::new();
    let rewritten = rewrite_class(ruleset, &input.bytes, |name| {
        let path = output_dir.join(format!("{name}.class"));
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create output directory: {}", parent.display())
            })?;
        }
        let file = File::create(&path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        output_path = path;
        Ok(BufWriter::new(file))
    })?;

    Ok(TransformedEntry {
        origin: input.origin.clone(),
        class_name: rewritten.class_name,
        renamed: rewritten.renamed,
        patched_constants: rewritten.patched_constants,
        output_path: output_path.display().to_string(),
    })
}

fn transform_sources(
    list: &Path,
    dir: &Path,
    copy_from: Option<&Path>,
    extensions: &[String],
) -> Result<SourcesResult> {
    let start = Instant::now();
    let ruleset = Ruleset::from_list_file(list)?;

    if let Some(source) = copy_from {
        clear_directory(dir)?;
        copy_tree(source, dir)?;
    }

    let result = sources::apply_to_all_in_directory(&ruleset, dir, |extension| {
        extensions.iter().any(|e| e == extension)
    })?;

    Ok(SourcesResult {
        destination: dir.display().to_string(),
        ruleset_hash: ruleset.fingerprint(),
        duration_ms: start.elapsed().as_millis() as u64,
        files_scanned: result.files_scanned,
        files_rewritten: result.files_rewritten,
        files_relocated: result.files_relocated,
    })
}

fn clear_directory(dir: &Path) -> Result<()> {
    if dir.exists() {
        std::fs::remove_dir_all(dir)
            .with_context(|| format!("Failed to clear output directory: {}", dir.display()))?;
    }
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))
}

fn copy_tree(source: &Path, destination: &Path) -> Result<()> {
    for entry in WalkBuilder::new(source)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .build()
    {
        let entry = entry?;
        let path = entry.path();
        let relative = path
            .strip_prefix(source)
            .with_context(|| format!("path escapes source tree: {}", path.display()))?;
        let target = destination.join(relative);

        if entry.file_type().is_some_and(|t| t.is_dir()) {
            std::fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create directory: {}", target.display()))?;
        } else if entry.file_type().is_some_and(|t| t.is_file()) {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create directory: {}", parent.display())
                })?;
            }
            std::fs::copy(path, &target).with_context(|| {
                format!(
                    "Failed to copy source file: {} -> {}",
                    path.display(),
                    target.display()
                )
            })?;
        }
    }
    Ok(())
}

fn write_output<T: Serialize>(result: &T, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(result)?),
        OutputFormat::Text => {
            let value = serde_json::to_value(result)?;
            if let serde_json::Value::Object(map) = value {
                for (key, value) in map {
                    match value {
                        serde_json::Value::Array(items) => {
                            println!("{key}:");
                            for item in items {
                                println!("- {}", serde_json::to_string(&item)?);
                            }
                        }
                        serde_json::Value::String(s) => println!("{key}: {s}"),
                        other => println!("{key}: {other}"),
                    }
                }
            }
        }
    }
    Ok(())
}
