use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "clauseforge",
    version,
    about = "Contract decomposition and conditional assembly tooling"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decompose a styled-paragraph stream into the clause store.
    Ingest(IngestArgs),
    /// Import a project with its home models, units and milestones.
    Project(ProjectArgs),
    /// Compute the pricing summary for a project.
    Pricing(PricingArgs),
    /// Assemble contract documents for a project.
    Assemble(AssembleArgs),
    /// Report store contents.
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    /// JSON file holding the extracted (style, text) paragraph stream.
    #[arg(long)]
    pub input: PathBuf,

    /// Contract type whose clause set this run replaces.
    #[arg(long)]
    pub contract_type: String,

    #[arg(long, default_value = ".cache/clauseforge")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    /// Optional JSON file of jurisdiction disclosure texts to load.
    #[arg(long)]
    pub disclosures_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    /// JSON file holding the project, its models, units and milestones.
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long, default_value = ".cache/clauseforge")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct PricingArgs {
    #[arg(long)]
    pub project_id: i64,

    #[arg(long, default_value = ".cache/clauseforge")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Write the summary to this path instead of stdout.
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct AssembleArgs {
    #[arg(long)]
    pub project_id: i64,

    /// Contract types to assemble; defaults to every type with an
    /// active template.
    #[arg(long = "contract-type")]
    pub contract_types: Vec<String>,

    /// Condition overrides as key=value pairs.
    #[arg(long = "set")]
    pub set: Vec<String>,

    #[arg(long, default_value = ".cache/clauseforge")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".cache/clauseforge")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}
