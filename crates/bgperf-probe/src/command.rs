use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::error::{ProbeError, Result};

/// Run `program args...` to completion and return its stdout.
///
/// A non-zero exit is an error carrying the captured stderr.
pub async fn run_command(program: &str, args: &[&str]) -> Result<String> {
    debug!(program, ?args, "running command");
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| ProbeError::Launch {
            program: program.to_string(),
            source,
        })?;

    if !output.status.success() {
        let program = program.to_string();
        return Err(match output.status.code() {
            Some(code) => ProbeError::Exit {
                program,
                code,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            },
            None => ProbeError::Signalled { program },
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Run a command inside a running container.
pub async fn docker_exec(container: &str, cmd: &[&str]) -> Result<String> {
    let mut args = vec!["exec", container];
    args.extend_from_slice(cmd);
    run_command("docker", &args).await
}
