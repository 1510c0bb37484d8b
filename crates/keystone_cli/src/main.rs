//! KEYSTONE CLI
//!
//! Compile and validate infrastructure blueprints from the command line.

#![warn(missing_docs)]
#![warn(clippy::all)]

use clap::{Parser, Subcommand};
use color_eyre::Result;
use keystone_core::ValueMap;
use keystone_plan::{CompileOptions, FsResolver, compile_source};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "keystone")]
#[command(about = "KEYSTONE - infrastructure blueprint compiler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a blueprint into a deployment plan
    Compile {
        /// Path to the blueprint file
        #[arg(short, long)]
        file: PathBuf,
        /// Write the plan here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Accept document keys not declared in the schema
        #[arg(long)]
        lenient: bool,
        /// Skip the DSL version compatibility check
        #[arg(long)]
        skip_version_check: bool,
    },
    /// Validate a blueprint without emitting a plan
    Validate {
        /// Path to the blueprint file
        #[arg(short, long)]
        file: PathBuf,
        /// Accept document keys not declared in the schema
        #[arg(long)]
        lenient: bool,
        /// Skip the DSL version compatibility check
        #[arg(long)]
        skip_version_check: bool,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Compile {
            file,
            output,
            lenient,
            skip_version_check,
        } => {
            let plan = compile_file(&file, lenient, skip_version_check)?;
            let rendered = serde_json::to_string_pretty(&plan)?;
            match output {
                Some(path) => std::fs::write(path, rendered)?,
                None => println!("{rendered}"),
            }
            Ok(())
        }
        Commands::Validate {
            file,
            lenient,
            skip_version_check,
        } => {
            compile_file(&file, lenient, skip_version_check)?;
            tracing::info!(file = %file.display(), "blueprint is valid");
            println!("ok");
            Ok(())
        }
    }
}

fn compile_file(
    file: &Path,
    lenient: bool,
    skip_version_check: bool,
) -> Result<keystone_plan::Plan> {
    let text = std::fs::read_to_string(file)?;
    let root = file.parent().unwrap_or_else(|| Path::new("."));
    let resolver = FsResolver::new(root);

    let mut inputs = ValueMap::new();
    if skip_version_check {
        inputs.insert("validate_version".to_string(), serde_json::Value::Bool(false));
    }
    let options = CompileOptions { lenient, inputs };

    Ok(compile_source(&text, &options, &resolver)?)
}
