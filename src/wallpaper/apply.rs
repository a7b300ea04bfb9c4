//! Wallpaper applier — bind an image to an output via `swaymsg`, with
//! bounded retry.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::process::Command;

use crate::config::OutputSelector;

/// Scale mode passed to `output <name> bg`.
const FILL_MODE: &str = "fill";
/// Shown behind the image when it does not cover the output.
const FALLBACK_COLOR: &str = "#000000";

/// Applier errors.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("{program} exited with {status}: {output}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        output: String,
    },
    #[error("wallpaper for {output} could not be set after {attempts} attempts: {last}")]
    RetriesExhausted {
        output: OutputSelector,
        attempts: u32,
        last: Box<ApplyError>,
    },
}

/// Sets the background image of an output.
pub trait WallpaperSetter: Send + Sync {
    /// One attempt, no retry.
    fn set<'a>(
        &'a self,
        output: &'a OutputSelector,
        path: &'a Path,
    ) -> BoxFuture<'a, Result<(), ApplyError>>;
}

/// Sets wallpapers through `swaymsg output <sel> bg <path> fill #000000`.
pub struct Swaymsg {
    program: String,
    socket: Option<PathBuf>,
}

impl Swaymsg {
    /// `socket` is passed as `--socket`; `None` lets swaymsg use `$SWAYSOCK`.
    pub fn new(socket: Option<PathBuf>) -> Self {
        Self {
            program: "swaymsg".to_string(),
            socket,
        }
    }

    /// Full argument list for one invocation.
    pub fn args(&self, output: &OutputSelector, path: &Path) -> Vec<String> {
        let mut args = Vec::with_capacity(8);
        if let Some(socket) = &self.socket {
            args.push("--socket".to_string());
            args.push(socket.display().to_string());
        }
        args.extend([
            "output".to_string(),
            output.to_string(),
            "bg".to_string(),
            // swaymsg joins its arguments into one command string, so
            // the path must be quoted to survive spaces.
            format!("\"{}\"", path.display()),
            FILL_MODE.to_string(),
            FALLBACK_COLOR.to_string(),
        ]);
        args
    }
}

impl WallpaperSetter for Swaymsg {
    fn set<'a>(
        &'a self,
        output: &'a OutputSelector,
        path: &'a Path,
    ) -> BoxFuture<'a, Result<(), ApplyError>> {
        Box::pin(async move {
            let result = Command::new(&self.program)
                .args(self.args(output, path))
                .stdin(Stdio::null())
                .output()
                .await
                .map_err(|e| ApplyError::Spawn {
                    program: self.program.clone(),
                    source: e,
                })?;

            let mut captured = String::from_utf8_lossy(&result.stdout).into_owned();
            captured.push_str(&String::from_utf8_lossy(&result.stderr));
            let captured = captured.trim().to_string();
            tracing::debug!(output = %output, reply = %captured, "swaymsg reply");

            if result.status.success() {
                Ok(())
            } else {
                Err(ApplyError::Failed {
                    program: self.program.clone(),
                    status: result.status,
                    output: captured,
                })
            }
        })
    }
}

/// Bounded retry with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_secs(2),
        }
    }
}

/// Apply a wallpaper, retrying failed attempts per `policy`.
///
/// Returns [`ApplyError::RetriesExhausted`] when every attempt failed;
/// callers treat that as fatal.
pub async fn apply(
    setter: &dyn WallpaperSetter,
    policy: RetryPolicy,
    output: &OutputSelector,
    path: &Path,
) -> Result<(), ApplyError> {
    tracing::info!(output = %output, path = %path.display(), "setting wallpaper");

    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match setter.set(output, path).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt >= attempts => {
                return Err(ApplyError::RetriesExhausted {
                    output: output.clone(),
                    attempts,
                    last: Box::new(e),
                });
            }
            Err(e) => {
                tracing::warn!(
                    output = %output,
                    attempt,
                    attempts,
                    error = %e,
                    "setting wallpaper failed, retrying"
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}
