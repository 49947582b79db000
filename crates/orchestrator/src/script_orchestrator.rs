//! Script Orchestrator (component D): installs and launches the optional
//! maintenance/dev scripts under a persistent multiplexer session named
//! `cmux`.

use std::time::Duration;

use cmux_providers::{ExecOpts, SandboxInstance};
use tokio::time::sleep;
use uuid::Uuid;

const MULTIPLEXER_SESSION: &str = "cmux";
const MAINTENANCE_POLL_INTERVAL: Duration = Duration::from_secs(2);
const MAINTENANCE_POLL_MAX_ATTEMPTS: u32 = 60 * 60 / 2; // hours-scale upper bound
const DEV_WINDOW_SETTLE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ScriptOutcome {
    pub ran: bool,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
}

impl ScriptOutcome {
    /// Used by callers when the corresponding script was never configured.
    pub fn not_run() -> Self {
        Self {
            ran: false,
            exit_code: None,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            ran: true,
            exit_code: None,
            error: Some(error.into()),
        }
    }

    fn completed(exit_code: i32) -> Self {
        Self {
            ran: true,
            exit_code: Some(exit_code),
            error: None,
        }
    }
}

/// A single run's identifiers, so a re-run never collides with an
/// unterminated prior run.
pub struct RunPaths {
    suffix: String,
}

impl RunPaths {
    pub fn new() -> Self {
        Self {
            suffix: Uuid::new_v4().simple().to_string(),
        }
    }

    fn script_path(&self, label: &str) -> String {
        format!("/tmp/cmux-{label}-{}.sh", self.suffix)
    }

    fn exit_code_path(&self) -> String {
        format!("/tmp/cmux-maintenance-{}.exitcode", self.suffix)
    }

    fn completed_marker_path(&self) -> String {
        format!("/tmp/cmux-maintenance-{}.done", self.suffix)
    }

    fn window_name(&self, label: &str) -> String {
        format!("{label}-{}", self.suffix)
    }
}

impl Default for RunPaths {
    fn default() -> Self {
        Self::new()
    }
}

async fn write_script(sandbox: &dyn SandboxInstance, instance_id: &str, path: &str, script: &str) -> cmux_providers::Result<()> {
    let heredoc = format!("cat > {path} <<'CMUX_SCRIPT_EOF'\n{script}\nCMUX_SCRIPT_EOF\nchmod +x {path}");
    let outcome = sandbox.exec(instance_id, &heredoc, &ExecOpts::default()).await?;
    if outcome.exit_code != 0 {
        return Err(cmux_providers::Error::message(format!(
            "failed to write script {path}: {}",
            outcome.stderr
        )));
    }
    Ok(())
}

/// Opens a persistent multiplexer session if one doesn't already exist.
async fn ensure_session(sandbox: &dyn SandboxInstance, instance_id: &str) -> cmux_providers::Result<()> {
    let cmd = format!("tmux has-session -t {MULTIPLEXER_SESSION} 2>/dev/null || tmux new-session -d -s {MULTIPLEXER_SESSION}");
    sandbox.exec(instance_id, &cmd, &ExecOpts::default()).await?;
    Ok(())
}

/// Launches the maintenance script in a new window and returns immediately;
/// the caller should poll [`poll_maintenance`] in a background task.
pub async fn launch_maintenance(
    sandbox: &dyn SandboxInstance,
    instance_id: &str,
    paths: &RunPaths,
    script: &str,
) -> cmux_providers::Result<()> {
    ensure_session(sandbox, instance_id).await?;
    let script_path = paths.script_path("maintenance");
    write_script(sandbox, instance_id, &script_path, script).await?;

    let window = paths.window_name("maintenance");
    let exit_code_path = paths.exit_code_path();
    let completed_path = paths.completed_marker_path();
    let command = format!(
        "zsh {script_path}; print $? > {exit_code_path}; touch {completed_path}; exec zsh"
    );
    let tmux_cmd = format!(
        "tmux new-window -t {MULTIPLEXER_SESSION} -n {window} {}",
        shell_single_quote(&command)
    );
    sandbox.exec(instance_id, &tmux_cmd, &ExecOpts::default()).await?;
    Ok(())
}

/// Background waiter: polls the exit-code file via `exec` until the
/// completion marker appears, with an hours-scale upper bound.
pub async fn poll_maintenance(sandbox: &dyn SandboxInstance, instance_id: &str, paths: &RunPaths) -> ScriptOutcome {
    let completed_path = paths.completed_marker_path();
    let exit_code_path = paths.exit_code_path();

    for _ in 0..MAINTENANCE_POLL_MAX_ATTEMPTS {
        let check = format!("test -f {completed_path} && cat {exit_code_path}");
        match sandbox.exec(instance_id, &check, &ExecOpts::default()).await {
            Ok(outcome) if outcome.exit_code == 0 => {
                return match outcome.stdout.trim().parse::<i32>() {
                    Ok(code) => ScriptOutcome::completed(code),
                    Err(_) => ScriptOutcome::failed("maintenance exit code file was not an integer"),
                };
            }
            Ok(_) => {}
            Err(err) => return ScriptOutcome::failed(err.to_string()),
        }
        sleep(MAINTENANCE_POLL_INTERVAL).await;
    }
    ScriptOutcome::failed("maintenance script did not complete within the polling budget")
}

/// Waits on the maintenance completion marker if one was configured,
/// otherwise proceeds immediately, then launches the dev script and checks
/// the window actually exists after a short settle period.
pub async fn launch_dev(
    sandbox: &dyn SandboxInstance,
    instance_id: &str,
    paths: &RunPaths,
    script: &str,
    wait_for_maintenance: bool,
) -> ScriptOutcome {
    if wait_for_maintenance {
        let completed_path = paths.completed_marker_path();
        for _ in 0..MAINTENANCE_POLL_MAX_ATTEMPTS {
            let check = format!("test -f {completed_path}");
            match sandbox.exec(instance_id, &check, &ExecOpts::default()).await {
                Ok(outcome) if outcome.exit_code == 0 => break,
                Ok(_) => {}
                Err(err) => return ScriptOutcome::failed(err.to_string()),
            }
            sleep(MAINTENANCE_POLL_INTERVAL).await;
        }
    }

    if let Err(err) = ensure_session(sandbox, instance_id).await {
        return ScriptOutcome::failed(err.to_string());
    }
    let script_path = paths.script_path("dev");
    if let Err(err) = write_script(sandbox, instance_id, &script_path, script).await {
        return ScriptOutcome::failed(err.to_string());
    }

    let window = paths.window_name("dev");
    let tmux_cmd = format!(
        "tmux new-window -t {MULTIPLEXER_SESSION} -n {window} {}",
        shell_single_quote(&format!("zsh {script_path}"))
    );
    if let Err(err) = sandbox.exec(instance_id, &tmux_cmd, &ExecOpts::default()).await {
        return ScriptOutcome::failed(err.to_string());
    }

    sleep(DEV_WINDOW_SETTLE).await;
    let list_cmd = format!("tmux list-windows -t {MULTIPLEXER_SESSION} -F '#{{window_name}}'");
    match sandbox.exec(instance_id, &list_cmd, &ExecOpts::default()).await {
        Ok(outcome) if outcome.stdout.lines().any(|line| line == window) => ScriptOutcome {
            ran: true,
            exit_code: None,
            error: None,
        },
        Ok(_) => ScriptOutcome::failed(format!("dev window {window} was not found after launch")),
        Err(err) => ScriptOutcome::failed(err.to_string()),
    }
}

fn shell_single_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_paths_are_unique_across_instances() {
        let a = RunPaths::new();
        let b = RunPaths::new();
        assert_ne!(a.script_path("dev"), b.script_path("dev"));
    }

    #[test]
    fn shell_single_quote_escapes_embedded_quotes() {
        assert_eq!(shell_single_quote("echo 'hi'"), r"'echo '\''hi'\'''");
    }
}
