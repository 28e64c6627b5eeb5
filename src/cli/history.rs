//! `version`, `branch` and `history` commands.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Local, TimeZone};
use owo_colors::OwoColorize;

use super::{BranchCommand, HistoryCommand, VersionCommand, document::emit, session::Workspace};
use crate::storage::{Branch, History, Version, export::HistoryExport};

fn format_time(millis: i64) -> String {
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|time| time.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| millis.to_string())
}

/// Branch named on the command line, or the default one.
fn branch_or_default(history: &History, branch: Option<&str>) -> Result<Branch> {
    Ok(match branch {
        Some(branch) => history.find_branch(branch)?,
        None => history.ensure_branch()?,
    })
}

fn print_version(version: &Version, branch: &str, current: bool) {
    let marker = if current { "*".green().to_string() } else { " ".to_string() };
    println!(
        "{} {}  {}  {}  {}{}",
        marker,
        version.id.dimmed(),
        format_time(version.created_at),
        branch.cyan(),
        version.name,
        if version.description.is_empty() {
            String::new()
        } else {
            format!(" - {}", version.description.dimmed())
        }
    );
}

pub fn version(workspace: &Workspace, command: &VersionCommand) -> Result<()> {
    let history = workspace.store.history();
    match command {
        VersionCommand::Save {
            name,
            description,
            branch,
        } => {
            let branch = branch_or_default(&history, branch.as_deref())?;
            let document = workspace.document();
            let version = history.save_version(&branch.id, name, description, document.contest())?;
            crate::log!("version"; "saved `{}` on {} ({})", version.name, branch.name, version.id);
        }
        VersionCommand::List { branch } => {
            let branches = history.branches()?;
            let filter = match branch {
                Some(branch) => Some(history.find_branch(branch)?.id),
                None => None,
            };
            for version in history.versions(filter.as_deref())? {
                let owner = branches.iter().find(|b| b.id == version.branch_id);
                let current = owner.is_some_and(|b| b.current_version_id.as_deref() == Some(version.id.as_str()));
                print_version(&version, owner.map_or("?", |b| b.name.as_str()), current);
            }
        }
        VersionCommand::Restore { id } => {
            let version = history.version(id)?;
            let blobs = workspace.store.blobs_for(&version.contest);
            let mut document = workspace.document();
            document.replace(version.contest, blobs);
            workspace.store.save_document(document.contest(), document.blobs())?;
            crate::log!("version"; "restored `{}`", version.name);
        }
        VersionCommand::Delete { id } => {
            let version = history.delete_version(id)?;
            crate::log!("version"; "deleted `{}`", version.name);
        }
    }
    Ok(())
}

pub fn branch(workspace: &Workspace, command: &BranchCommand) -> Result<()> {
    let history = workspace.store.history();
    match command {
        BranchCommand::Create { name, from } => {
            let branch = history.create_branch(name, from.as_deref())?;
            crate::log!("branch"; "created `{}` ({})", branch.name, branch.id);
        }
        BranchCommand::List => {
            history.ensure_branch()?;
            for branch in history.branches()? {
                let versions = history.versions(Some(&branch.id))?.len();
                println!(
                    "{}  {}  {} version{}",
                    branch.id.dimmed(),
                    branch.name.cyan(),
                    versions,
                    if versions == 1 { "" } else { "s" }
                );
            }
        }
        BranchCommand::Rename { branch, name } => {
            let id = history.find_branch(branch)?.id;
            let renamed = history.rename_branch(&id, name)?;
            crate::log!("branch"; "renamed to `{}`", renamed.name);
        }
        BranchCommand::Delete { branch } => {
            let branch = history.find_branch(branch)?;
            let removed = history.delete_branch(&branch.id)?;
            crate::log!("branch"; "deleted `{}` and {} version(s)", branch.name, removed);
        }
    }
    Ok(())
}

pub fn history(workspace: &Workspace, command: &HistoryCommand) -> Result<()> {
    let history = workspace.store.history();
    match command {
        HistoryCommand::Export { output } => {
            let export = HistoryExport::collect(&history)?;
            emit(&export.to_json()?, output.as_deref())
        }
        HistoryCommand::Import { input } => import(&history, input),
    }
}

fn import(history: &History, input: &Path) -> Result<()> {
    let json = std::fs::read_to_string(input).with_context(|| format!("failed to read {}", input.display()))?;
    let (branches, versions) = HistoryExport::from_json(&json)?.import_into(history)?;
    crate::log!("history"; "imported {} branch(es) and {} version(s)", branches, versions);
    Ok(())
}
