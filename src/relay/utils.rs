// Helpers shared by the executor, dispatcher and worker pool

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;
use tracing::debug;

use super::errors::RelayError;

pub const CMD_SNAPSHOT: &str = "cmd.txt";

/// Run a command, capturing its output. `limit = None` waits forever.
pub async fn run_output_with_timeout(
    program: &str,
    args: &[String],
    limit: Option<Duration>,
) -> Result<std::process::Output, RelayError> {
    let mut child = TokioCommand::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => RelayError::ToolNotFound(program.to_string()),
            _ => RelayError::Io(e),
        })?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| RelayError::Io(std::io::Error::other(format!("no stdout from {}", program))))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| RelayError::Io(std::io::Error::other(format!("no stderr from {}", program))))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    let status = match limit {
        Some(limit) => match timeout(limit, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                let _ = child.kill().await;
                stdout_task.abort();
                stderr_task.abort();
                debug!(program, ?limit, "command timed out");
                return Err(RelayError::UploadExecution { code: None });
            }
        },
        None => child.wait().await?,
    };

    let stdout = join_pipe(stdout_task).await?;
    let stderr = join_pipe(stderr_task).await?;
    Ok(std::process::Output { status, stdout, stderr })
}

async fn join_pipe(task: tokio::task::JoinHandle<std::io::Result<Vec<u8>>>) -> Result<Vec<u8>, RelayError> {
    task.await
        .map_err(|e| RelayError::Io(std::io::Error::other(e.to_string())))?
        .map_err(RelayError::from)
}

/// Move one file, falling back to copy + remove across filesystems
pub async fn move_file(from: &Path, to: &Path) -> Result<(), RelayError> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to).await?;
    tokio::fs::remove_file(from).await?;
    Ok(())
}

/// Move every still-present artifact into `dir`, rewriting each entry as its
/// move lands. Missing artifacts are dropped. On error `artifacts` still names
/// where every remaining file actually is.
pub async fn relocate(artifacts: &mut Vec<PathBuf>, dir: &Path) -> Result<(), RelayError> {
    artifacts.retain(|artifact| {
        let present = artifact.is_file();
        if !present {
            debug!(path = %artifact.display(), "artifact gone, not relocating");
        }
        present
    });
    tokio::fs::create_dir_all(dir).await?;
    for artifact in artifacts.iter_mut() {
        let Some(name) = artifact.file_name() else {
            continue;
        };
        let target = dir.join(name);
        move_file(artifact, &target).await?;
        *artifact = target;
    }
    Ok(())
}

/// Write the argv as a JSON array next to the relocated files
pub async fn write_cmd_snapshot(dir: &Path, argv: &[String]) -> Result<PathBuf, RelayError> {
    let path = dir.join(CMD_SNAPSHOT);
    tokio::fs::write(&path, serde_json::to_string(argv)?).await?;
    Ok(path)
}

/// Artifacts that still exist on disk
pub fn still_present(artifacts: &[PathBuf]) -> Vec<PathBuf> {
    artifacts.iter().filter(|p| p.is_file()).cloned().collect()
}
