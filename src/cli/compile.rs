//! `compile`: one-shot PDF or SVG output.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result, bail};

use super::{CompileArgs, OutputFormat, session};
use crate::contest::{Contest, DocumentStore, ImageBlobs};
use crate::gateway::{CompilerGateway, GatewayError};
use crate::storage::export::ContestExport;

/// Compiled output, ready to be written.
pub enum Artifact {
    Pdf(Arc<[u8]>),
    Svg(String),
    Pages(Vec<String>),
}

impl Artifact {
    /// Write to `path`. Pages go into `path` as a directory.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        match self {
            Self::Pdf(bytes) => fs::write(path, bytes)?,
            Self::Svg(svg) => fs::write(path, svg)?,
            Self::Pages(pages) => {
                fs::create_dir_all(path)?;
                for (index, page) in pages.iter().enumerate() {
                    fs::write(path.join(format!("page-{}.svg", index + 1)), page)?;
                }
            }
        }
        Ok(())
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Pdf(bytes) => crate::utils::fmt::bytes(bytes.len() as u64),
            Self::Svg(svg) => crate::utils::fmt::bytes(svg.len() as u64),
            Self::Pages(pages) => format!("{} pages", pages.len()),
        }
    }
}

/// What to produce from a contest.
#[derive(Debug, Clone)]
pub struct Target {
    pub format: OutputFormat,
    /// Problem index, when compiling a single problem.
    pub problem: Option<usize>,
}

impl Target {
    /// Resolve the problem letter against `contest`.
    pub fn new(args: &CompileArgs, contest: &Contest) -> Result<Self> {
        let problem = match &args.problem {
            Some(letter) => match contest.index_of_letter(letter) {
                Some(index) => Some(index),
                None => bail!(
                    "no problem `{}` (the contest has {} problems)",
                    letter,
                    contest.problems.len()
                ),
            },
            None => None,
        };
        Ok(Self {
            format: args.format,
            problem,
        })
    }

    pub async fn produce(
        &self,
        gateway: &CompilerGateway,
        contest: Contest,
    ) -> Result<Artifact, GatewayError> {
        let contest = match (self.format, self.problem) {
            (OutputFormat::Pdf, Some(index)) => {
                return gateway.compile_problem(&contest, index).await.map(Artifact::Pdf);
            }
            (_, Some(index)) => contest
                .single_problem(index)
                .ok_or(GatewayError::NoSuchProblem(index))?,
            (_, None) => contest,
        };
        match self.format {
            OutputFormat::Pdf => gateway.compile_pdf(contest).await.map(Artifact::Pdf),
            OutputFormat::Svg => gateway.render_svg(contest).await.map(Artifact::Svg),
            OutputFormat::Pages => gateway.render_pages(contest).await.map(Artifact::Pages),
        }
    }

    /// Output path when none was given.
    pub fn default_output(&self, contest: &Contest) -> PathBuf {
        let title = match self.problem {
            Some(index) => format!("{} {}", contest.meta.title, crate::contest::problem_letter(index)),
            None => contest.meta.title.clone(),
        };
        session::default_output(&title, self.format.extension())
    }
}

/// Read a contest JSON export.
pub fn read_contest(path: &Path) -> Result<(Contest, ImageBlobs)> {
    let json = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let document = ContestExport::from_json(&json)
        .and_then(ContestExport::into_document)
        .with_context(|| format!("invalid contest file {}", path.display()))?;
    Ok(document)
}

pub async fn run(args: &CompileArgs, workspace: &session::Workspace) -> Result<()> {
    let document = match &args.input {
        Some(path) => {
            let (contest, blobs) = read_contest(path)?;
            DocumentStore::new(contest, blobs)
        }
        None => workspace.document(),
    };
    let contest = document.contest().clone();
    let target = Target::new(args, &contest)?;
    let output = args.output.clone().unwrap_or_else(|| target.default_output(&contest));

    let gateway = session::start_gateway(&workspace.config)?;
    let outcome = async {
        session::initialize(&gateway).await?;
        gateway.register_images(document.blobs()).await?;
        let artifact = target.produce(&gateway, contest).await?;
        artifact.write(&output)?;
        anyhow::Ok(artifact)
    }
    .await;
    gateway.shutdown().await;

    let artifact = outcome?;
    crate::log!("compile"; "wrote {} ({})", output.display(), artifact.describe());
    Ok(())
}
