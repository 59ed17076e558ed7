use std::ffi::OsString;
use std::process::Stdio;

use ferry_core::TransferContext;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, trace};

use super::parse_progress;
use crate::error::{ProviderError, ProviderResult};

/// Terminal state of a MEGAcmd invocation.
#[derive(Debug)]
pub(crate) struct CommandOutcome {
    /// Exit code; `None` when the process was killed by a signal.
    pub(crate) code: Option<i32>,
    /// Captured standard output.
    pub(crate) stdout: String,
}

/// Where stderr progress lines are reported.
pub(crate) struct ProgressTarget<'a> {
    pub(crate) ctx: &'a TransferContext,
    pub(crate) name: &'a str,
    pub(crate) message: &'a str,
}

/// Run `program` to completion, turning stderr progress lines into reports.
///
/// The child is killed if the returned future is dropped.
pub(crate) async fn run(
    operation: &'static str,
    program: &str,
    args: Vec<OsString>,
    progress: Option<ProgressTarget<'_>>,
) -> ProviderResult<CommandOutcome> {
    let spawn_error = |source: std::io::Error| ProviderError::Process {
        operation,
        program: program.to_string(),
        source,
    };
    debug!(program, ?args, "spawning mega command");
    let mut child = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(spawn_error)?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let collect_stdout = async move {
        let mut captured = String::new();
        if let Some(mut stdout) = stdout {
            let _ = stdout.read_to_string(&mut captured).await;
        }
        captured
    };
    let watch_stderr = async move {
        let Some(stderr) = stderr else {
            return;
        };
        // Progress bars redraw with carriage returns, so split on both terminators.
        let mut segments = BufReader::new(stderr).split(b'\r');
        let mut last = 0_u8;
        while let Ok(Some(segment)) = segments.next_segment().await {
            for line in String::from_utf8_lossy(&segment).lines() {
                trace!(program, line, "mega stderr");
                let Some(target) = progress.as_ref() else {
                    continue;
                };
                match parse_progress(line) {
                    Some(percentage) if percentage > last => {
                        last = percentage;
                        target.ctx.report(target.name, target.message, percentage).await;
                    }
                    _ => {}
                }
            }
        }
    };

    let (stdout, ()) = tokio::join!(collect_stdout, watch_stderr);
    let status = child.wait().await.map_err(spawn_error)?;
    debug!(program, code = ?status.code(), "mega command exited");
    Ok(CommandOutcome {
        code: status.code(),
        stdout,
    })
}
