use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::marker::DEFAULT_MARKER_CLASS;

#[derive(Debug, Clone, Parser)]
#[command(name = "class-relocator")]
#[command(about = "Relocate annotated Java classes to the root package by patching constant-pool strings")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    List {
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<PathBuf>,

        #[arg(short = 'o', long, value_name = "FILE")]
        output: PathBuf,

        #[arg(long, value_name = "CLASS", default_value = DEFAULT_MARKER_CLASS)]
        marker: String,

        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    Classes {
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<PathBuf>,

        #[arg(short = 'l', long, value_name = "FILE")]
        list: PathBuf,

        #[arg(short = 'o', long, value_name = "DIR")]
        output_dir: PathBuf,

        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    Sources {
        #[arg(short = 'l', long, value_name = "FILE")]
        list: PathBuf,

        #[arg(short = 'd', long, value_name = "DIR")]
        dir: PathBuf,

        #[arg(long, value_name = "DIR")]
        copy_from: Option<PathBuf>,

        #[arg(short = 'e', long = "extension", value_name = "EXT", default_value = "java")]
        extensions: Vec<String>,

        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}
