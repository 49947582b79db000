//! Installs code-host CLI auth into a running container, and the retry wrapper both the initial install and the
//! on-demand refresh (step 4) share.

use std::time::Duration;

use cmux_providers::{ExecOpts, SandboxInstance};
use secrecy::{ExposeSecret, SecretString};
use tracing::warn;

use crate::error::{Error, Result};

const MAX_ATTEMPTS: u32 = 5;
const BASE_DELAY: Duration = Duration::from_secs(1);
const CAP_DELAY: Duration = Duration::from_secs(5);

/// Removes any existing code-host CLI config, pipes the token through its
/// login flow, and overwrites the git credential-helper config keys so
/// non-interactive git works (including the code-editor's integrated git).
pub async fn install_git_auth(
    sandbox: &dyn SandboxInstance,
    instance_id: &str,
    token: &SecretString,
) -> Result<()> {
    with_retries(|| install_once(sandbox, instance_id, token)).await
}

/// Re-runs the same install on an already-running container, used by the
/// on-demand refresh endpoint.
pub async fn refresh_git_auth(
    sandbox: &dyn SandboxInstance,
    instance_id: &str,
    token: &SecretString,
) -> Result<()> {
    install_git_auth(sandbox, instance_id, token).await
}

async fn install_once(sandbox: &dyn SandboxInstance, instance_id: &str, token: &SecretString) -> Result<()> {
    let login_script = format!(
        "rm -rf ~/.config/gh && mkdir -p ~/.config/gh && echo {token} | gh auth login --with-token && gh auth setup-git",
        token = shell_quote(token.expose_secret()),
    );
    let outcome = sandbox
        .exec(instance_id, &login_script, &ExecOpts::default())
        .await?;
    if outcome.exit_code != 0 {
        return Err(Error::InstallFailed(outcome.stderr));
    }

    for key in ["credential.helper", "credential.https://github.com.helper", "credential.useHttpPath"] {
        let set_script = format!("git config --global {key} \"!gh auth git-credential\"");
        let outcome = sandbox
            .exec(instance_id, &set_script, &ExecOpts::default())
            .await?;
        if outcome.exit_code != 0 {
            return Err(Error::InstallFailed(outcome.stderr));
        }
    }
    Ok(())
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Exponential backoff with base 1s, cap 5s, up to 5 attempts total.
async fn with_retries<F, Fut>(mut op: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let mut delay = BASE_DELAY;
    let mut last_err = None;
    for attempt in 1..=MAX_ATTEMPTS {
        match op().await {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(attempt, error = %e, "container auth install attempt failed");
                last_err = Some(e);
                if attempt < MAX_ATTEMPTS {
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(CAP_DELAY);
                }
            }
        }
    }
    Err(last_err.expect("loop runs at least once"))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("a'b"), r"'a'\''b'");
    }

    #[tokio::test(start_paused = true)]
    async fn with_retries_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result = with_retries(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::InstallFailed("boom".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test(start_paused = true)]
    async fn with_retries_succeeds_once_the_operation_does() {
        let calls = AtomicU32::new(0);
        let result = with_retries(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::InstallFailed("not yet".into()))
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
