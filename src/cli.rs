use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::engine::xref::NoteSections;

pub const DEFAULT_AUTHOR: &str = "xref-annotate@localhost";

#[derive(Parser, Debug)]
#[command(
    name = "xref-annotate",
    version,
    about = "Exhibit and Bates reference highlighting for annotation stores"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Scan(ScanArgs),
    Link(LinkArgs),
    Dedupe(DedupeArgs),
    Filter(FilterArgs),
    Diff(DiffArgs),
    Extract(ExtractArgs),
    Notes(NotesArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CorpusArgs {
    /// Directory of per-document page-text files (`<doc id>.json`).
    #[arg(long)]
    pub corpus_dir: PathBuf,

    #[arg(long, default_value_t = false)]
    pub recursive: bool,

    #[arg(long)]
    pub pattern_config: Option<PathBuf>,

    #[arg(long, default_value_t = 100.0)]
    pub stamp_width: f64,

    #[arg(long, default_value_t = 50.0)]
    pub stamp_height: f64,

    /// Worker threads for the document scan; 1 scans sequentially.
    #[arg(long, default_value_t = 1)]
    pub jobs: usize,
}

#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    #[command(flatten)]
    pub corpus: CorpusArgs,

    #[arg(long)]
    pub report_path: PathBuf,

    #[arg(long)]
    pub referenced_in_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct LinkArgs {
    #[command(flatten)]
    pub corpus: CorpusArgs,

    /// Existing annotation table (`.json`, or `.sqlite`/`.sqlite3`/`.db`).
    #[arg(long)]
    pub store_path: Option<PathBuf>,

    #[arg(long)]
    pub output_path: PathBuf,

    #[arg(long)]
    pub report_path: Option<PathBuf>,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long, default_value = DEFAULT_AUTHOR)]
    pub author: String,

    #[arg(long, default_value = "BLUE")]
    pub color: String,

    #[arg(long, default_value_t = false)]
    pub skip_notes: bool,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct DedupeArgs {
    #[arg(long)]
    pub store_path: PathBuf,

    #[arg(long)]
    pub output_path: PathBuf,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum SelectionMode {
    Include,
    Exclude,
}

impl SelectionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Include => "include",
            Self::Exclude => "exclude",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct FilterArgs {
    #[arg(long)]
    pub store_path: PathBuf,

    #[arg(long)]
    pub output_path: PathBuf,

    #[arg(long)]
    pub user: Option<String>,

    #[arg(long, value_enum, default_value_t = SelectionMode::Include)]
    pub user_mode: SelectionMode,

    /// First page of the range, 1-based.
    #[arg(long, requires = "end_page")]
    pub start_page: Option<u32>,

    #[arg(long, requires = "start_page")]
    pub end_page: Option<u32>,

    #[arg(long, value_enum, default_value_t = SelectionMode::Include)]
    pub page_mode: SelectionMode,

    #[arg(long, default_value_t = false)]
    pub drop_blank: bool,
}

#[derive(Args, Debug, Clone)]
pub struct DiffArgs {
    #[arg(long)]
    pub master_path: PathBuf,

    #[arg(long)]
    pub other_path: PathBuf,

    #[arg(long)]
    pub report_path: PathBuf,

    #[arg(long = "user")]
    pub users: Vec<String>,

    #[arg(long)]
    pub fix_output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    #[arg(long)]
    pub store_path: PathBuf,

    #[arg(long)]
    pub output_path: PathBuf,

    /// Only export highlights created by this user.
    #[arg(long)]
    pub user: Option<String>,
}

/// Rebuilds document notes from a saved match report without rescanning.
#[derive(Args, Debug, Clone)]
pub struct NotesArgs {
    #[arg(long)]
    pub store_path: Option<PathBuf>,

    /// Match report written by `scan` or `link`.
    #[arg(long)]
    pub report_path: PathBuf,

    #[arg(long)]
    pub output_path: PathBuf,

    #[arg(long, default_value = DEFAULT_AUTHOR)]
    pub author: String,

    #[arg(long, value_enum, default_value_t = NoteSections::All)]
    pub sections: NoteSections,
}
