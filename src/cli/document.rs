//! `export`, `import`, `lint` and `init`.

use std::{fs, io::Write, path::Path};

use anyhow::{Context, Result, bail};
use owo_colors::OwoColorize;

use super::{compile::read_contest, session::Workspace};
use crate::config::CONFIG_FILE;
use crate::contest::{assets, problem_letter};
use crate::embed::DEFAULT_CONFIG;
use crate::storage::export::ContestExport;

/// Write `text` to `output`, or stdout without one.
pub(super) fn emit(text: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
            crate::log!("export"; "wrote {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{text}")?;
        }
    }
    Ok(())
}

pub fn export(workspace: &Workspace, output: Option<&Path>) -> Result<()> {
    let document = workspace.document();
    let export = ContestExport::new(&document);
    emit(&export.to_json()?, output)
}

/// Replace the stored document with the contents of `input`.
pub fn import(workspace: &Workspace, input: &Path) -> Result<()> {
    let (contest, blobs) = read_contest(input)?;
    let problems = contest.problems.len();
    let images = contest.images.len();
    workspace.store.save_document(&contest, &blobs)?;
    crate::log!("import"; "imported `{}` ({} problems, {} images)", contest.meta.title, problems, images);
    Ok(())
}

pub fn lint(workspace: &Workspace) -> Result<()> {
    let document = workspace.document();
    let dangling = assets::dangling_references(document.contest());
    if dangling.is_empty() {
        crate::log!("lint"; "{} every image reference resolves", "✓".green());
        return Ok(());
    }

    for reference in &dangling {
        crate::log!(
            "lint";
            "problem {}: {}{} is not a registered image",
            problem_letter(reference.problem),
            assets::ASSET_PREFIX,
            reference.uuid
        );
    }
    bail!("{} dangling image reference(s)", dangling.len())
}

/// Write the default `booklet.toml` into the current directory.
pub fn init(force: bool) -> Result<()> {
    let path = Path::new(CONFIG_FILE);
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", CONFIG_FILE);
    }
    fs::write(path, DEFAULT_CONFIG).with_context(|| format!("failed to write {}", CONFIG_FILE))?;
    crate::log!("init"; "wrote {}", CONFIG_FILE);
    Ok(())
}
