use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::relay::errors::RelayError;
use crate::relay::tools::ToolManager;
use crate::relay::traits::UploadExecutor;
use crate::relay::utils;

/// Runs the upload argv as a subprocess
pub struct ProcessExecutor {
    /// Replaces `argv[0]` when the program was found on disk
    binary_path: Option<String>,
    timeout: Option<Duration>,
}

impl ProcessExecutor {
    /// Locates `program` once; argv still names it in `cmd.txt` snapshots
    pub fn new(program: &str) -> Self {
        let binary_path = ToolManager::new().locate(program);
        if binary_path.is_none() {
            warn!(program, "upload program not found, relying on PATH");
        }
        Self {
            binary_path,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl UploadExecutor for ProcessExecutor {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn execute(&self, argv: &[String]) -> Result<(), RelayError> {
        let Some((program, args)) = argv.split_first() else {
            return Err(RelayError::Config("empty upload command".to_string()));
        };
        let program = self.binary_path.as_deref().unwrap_or(program);

        let output = utils::run_output_with_timeout(program, args, self.timeout).await?;
        if output.status.success() {
            debug!(program, "upload command succeeded");
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(
            program,
            code = ?output.status.code(),
            stderr = %stderr.lines().last().unwrap_or_default(),
            "upload command failed"
        );
        Err(RelayError::UploadExecution {
            code: output.status.code(),
        })
    }
}
