//! `sync push|pull|status`.

use std::sync::Arc;

use anyhow::{Result, anyhow};

use super::{Prefer, SyncCommand, prompt, session::Workspace};
use crate::sync::{Decision, DirRemote, Resolution, SyncConnector};

fn connector(workspace: &Workspace) -> Result<SyncConnector> {
    let remote = workspace
        .config
        .sync_remote()
        .ok_or_else(|| anyhow!("no sync remote configured, set `remote` under [sync] in booklet.toml"))?;
    crate::debug!("sync"; "remote {}", remote.display());
    Ok(SyncConnector::new(
        Arc::new(DirRemote::new(remote)),
        workspace.config.sync.prefix.clone(),
        workspace.sync_state_path(),
    ))
}

pub async fn run(workspace: &Workspace, command: &SyncCommand) -> Result<()> {
    let connector = connector(workspace)?;
    let history = workspace.store.history();
    let mut document = workspace.document();

    match command {
        SyncCommand::Push { force } => {
            connector
                .push(document.contest(), document.blobs(), &history, *force)
                .await?;
        }
        SyncCommand::Pull { prefer } => {
            let preset = prefer.map(|prefer| match prefer {
                Prefer::Local => Resolution::KeepLocal,
                Prefer::Remote => Resolution::TakeRemote,
            });
            let mut ask = |conflict: &crate::sync::Conflict<'_>| match preset {
                Some(resolution) => Decision::once(resolution),
                None => tokio::task::block_in_place(|| prompt::resolve(conflict))
                    .unwrap_or(Decision::once(Resolution::KeepLocal)),
            };
            let pulled = connector
                .pull(document.contest(), document.blobs(), &history, &mut ask)
                .await?;
            connector.apply(pulled, &mut document, &history)?;
            workspace.store.save_document(document.contest(), document.blobs())?;
            if let Some(choice) = connector.remembered() {
                crate::debug!("sync"; "applied {:?} to every conflict after the first", choice);
            }
        }
        SyncCommand::Status => {
            let status = connector.status(document.contest()).await?;
            match status.remote {
                None => crate::log!("sync"; "{} was never pushed", status.root),
                Some(remote) => {
                    let p = &remote.problems;
                    crate::log!(
                        "sync";
                        "{}: {} since last sync, {} local-only, {} remote-only, {} differing problem(s)",
                        status.root,
                        if remote.changed_since_sync { "changed" } else { "unchanged" },
                        p.only_local,
                        p.only_remote,
                        p.differing
                    );
                }
            }
        }
    }
    Ok(())
}
