use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "formmap",
    version,
    about = "Map fillable form regions to canonical data model keys"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Map(MapArgs),
    Infer(InferArgs),
    Labels(LabelsArgs),
    Cdm(CdmArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RecordSourceArgs {
    #[arg(long)]
    pub record: Option<PathBuf>,

    #[arg(long)]
    pub db: Option<PathBuf>,

    #[arg(long, default_value = "clients")]
    pub table: String,

    #[arg(long, default_value = "client_id")]
    pub key_column: String,

    #[arg(long)]
    pub key_value: Option<String>,

    #[arg(long = "override", value_name = "COLUMN=KEY")]
    pub overrides: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct MapArgs {
    #[arg(long)]
    pub document: PathBuf,

    #[arg(long)]
    pub cdm: Option<PathBuf>,

    #[command(flatten)]
    pub record: RecordSourceArgs,

    #[arg(long)]
    pub form_description: Option<String>,

    #[arg(long)]
    pub classifier_cmd: Option<String>,

    #[arg(long = "classifier-arg", allow_hyphen_values = true)]
    pub classifier_args: Vec<String>,

    #[arg(long)]
    pub recorded_responses: Option<PathBuf>,

    #[arg(long, default_value_t = 60_000)]
    pub timeout_ms: u64,

    #[arg(long, default_value_t = 25)]
    pub chunk_size: usize,

    #[arg(long, default_value_t = 0.15)]
    pub search_radius: f64,

    #[arg(long, default_value_t = false)]
    pub parallel: bool,

    #[arg(long)]
    pub patterns: Option<PathBuf>,

    #[arg(long = "deny")]
    pub deny: Vec<String>,

    #[arg(long, default_value = ".cache/formmap")]
    pub output_dir: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct InferArgs {
    #[arg(long = "identifier")]
    pub identifiers: Vec<String>,

    #[arg(long)]
    pub patterns: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub list_keys: bool,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct LabelsArgs {
    #[arg(long)]
    pub document: PathBuf,

    #[arg(long, default_value_t = 0.15)]
    pub search_radius: f64,

    #[arg(long = "deny")]
    pub deny: Vec<String>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CdmArgs {
    #[command(flatten)]
    pub record: RecordSourceArgs,

    #[arg(long)]
    pub patterns: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub template: bool,

    #[arg(long)]
    pub output: Option<PathBuf>,
}
