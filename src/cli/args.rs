//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// XCPC contest booklet compiler
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path (default: booklet.toml, searched upward)
    #[arg(short = 'C', long, global = true, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Data directory holding the document, blobs and history
    #[arg(short = 'D', long, global = true, value_hint = clap::ValueHint::DirPath)]
    pub data_dir: Option<PathBuf>,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Write a default booklet.toml into the current directory
    #[command(visible_alias = "i")]
    Init {
        /// Overwrite an existing booklet.toml
        #[arg(short, long)]
        force: bool,
    },

    /// Compile the booklet (or one problem) once
    #[command(visible_alias = "c")]
    Compile {
        #[command(flatten)]
        args: CompileArgs,
    },

    /// Recompile whenever a contest file changes
    #[command(visible_alias = "w")]
    Watch {
        #[command(flatten)]
        args: CompileArgs,
    },

    /// Write the stored contest as portable JSON
    Export {
        /// Output file (default: stdout)
        #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
        output: Option<PathBuf>,
    },

    /// Replace the stored contest with a portable JSON file
    Import {
        #[arg(value_hint = clap::ValueHint::FilePath)]
        input: PathBuf,
    },

    /// Named snapshots of the contest
    #[command(subcommand)]
    Version(VersionCommand),

    /// Branches of the version history
    #[command(subcommand)]
    Branch(BranchCommand),

    /// Move the whole version history between machines
    #[command(subcommand)]
    History(HistoryCommand),

    /// Exchange the contest and history with the configured remote
    #[command(subcommand)]
    Sync(SyncCommand),

    /// Report statement references to unregistered images
    #[command(visible_alias = "l")]
    Lint,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// One PDF file
    #[default]
    Pdf,
    /// All pages merged into one SVG file
    Svg,
    /// One SVG file per page, in a directory
    Pages,
}

impl OutputFormat {
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Svg => "svg",
            Self::Pages => "pages",
        }
    }
}

/// Shared arguments of `compile` and `watch`.
#[derive(clap::Args, Debug, Clone)]
pub struct CompileArgs {
    /// Contest JSON to compile instead of the stored document
    /// (required by `watch`)
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub input: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Pdf)]
    pub format: OutputFormat,

    /// Compile only the problem with this letter (A, B, ..., AA)
    #[arg(short, long)]
    pub problem: Option<String>,

    /// Output path (default: `<title>.<format>` in the current directory)
    #[arg(short, long, value_hint = clap::ValueHint::AnyPath)]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum VersionCommand {
    /// Snapshot the stored contest
    Save {
        name: String,

        #[arg(short, long, default_value = "")]
        description: String,

        /// Branch id or name (default: main)
        #[arg(short, long)]
        branch: Option<String>,
    },

    /// List versions, newest last
    #[command(visible_alias = "ls")]
    List {
        /// Only versions of this branch (id or name)
        #[arg(short, long)]
        branch: Option<String>,
    },

    /// Load a version into the stored contest
    Restore { id: String },

    /// Delete one version
    #[command(visible_alias = "rm")]
    Delete { id: String },
}

#[derive(Subcommand, Debug, Clone)]
pub enum BranchCommand {
    /// Create a branch, optionally starting at an existing version
    Create {
        name: String,

        /// Version id the branch starts at
        #[arg(short, long)]
        from: Option<String>,
    },

    #[command(visible_alias = "ls")]
    List,

    Rename {
        /// Branch id or current name
        branch: String,
        name: String,
    },

    /// Delete a branch and all of its versions
    #[command(visible_alias = "rm")]
    Delete {
        /// Branch id or name
        branch: String,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum HistoryCommand {
    /// Write every branch and version as JSON
    Export {
        #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
        output: Option<PathBuf>,
    },

    /// Add the branches and versions of an export, under new ids
    Import {
        #[arg(value_hint = clap::ValueHint::FilePath)]
        input: PathBuf,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum SyncCommand {
    /// Upload the contest, its images and the history
    Push {
        /// Overwrite remote changes that were never pulled
        #[arg(short, long)]
        force: bool,
    },

    /// Merge the remote contest and history into the local ones
    Pull {
        /// Resolve every conflict this way instead of asking
        #[arg(short, long, value_enum)]
        prefer: Option<Prefer>,
    },

    /// Compare the local contest with the remote one
    Status,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prefer {
    Local,
    Remote,
}
