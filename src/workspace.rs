use anyhow::Result;
use std::path::{Path, PathBuf};

pub fn resolve_workspace_root(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(p) = explicit {
        return Ok(p);
    }

    let cwd = std::env::current_dir()?;
    Ok(find_git_root(&cwd).unwrap_or(cwd))
}

fn find_git_root(start: &Path) -> Option<PathBuf> {
    let mut cur = Some(start);
    while let Some(dir) = cur {
        if dir.join(".git").exists() {
            return Some(dir.to_path_buf());
        }
        cur = dir.parent();
    }
    None
}

/// Writes `content` to `root.join(rel_path)` by staging it in a temp sibling
/// file and renaming into place, so a reader never observes a partial
/// file. The single safe-write helper shared by the DAG Orchestrator and
/// the Agentic Executor.
pub async fn write_file_atomic(root: &Path, rel_path: &Path, content: &str) -> Result<PathBuf> {
    let full = root.join(rel_path);
    if let Some(parent) = full.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_name = format!(
        ".{}.tmp-{}",
        full.file_name().and_then(|n| n.to_str()).unwrap_or("file"),
        uuid::Uuid::new_v4()
    );
    let tmp = full.with_file_name(tmp_name);
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, &full).await?;
    Ok(full)
}
