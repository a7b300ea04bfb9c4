//! Variant generation — crop/scale and blur each source image once at
//! startup, fanned out across every configured output.
//!
//! The image pipeline is ImageMagick's `convert`; [`VariantRenderer`] is
//! the seam that lets tests count and reorder renders without it.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::process::Command;
use tokio::task::JoinSet;

use super::paths::Variant;
use crate::config::{BlurIntensity, OutputConfig, OutputSelector};

/// Output resolution every variant is cropped to.
pub const TARGET_GEOMETRY: &str = "1920x1080";

/// Shrink factor before blurring; blurring a tiny image is cheap and
/// spreads further once scaled back up.
const SHRINK: &str = "5%";
/// Inverse of [`SHRINK`].
const REGROW: &str = "2000%";

/// Variant generation errors. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("{variant:?} variant for {output} failed ({status}): {stderr}")]
    Failed {
        output: OutputSelector,
        variant: Variant,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("generation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// One image to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantJob {
    pub output: OutputSelector,
    pub variant: Variant,
    pub source: PathBuf,
    pub dest: PathBuf,
}

/// Produces a variant image on disk.
///
/// `Send + Sync` because renders for all outputs run concurrently from
/// spawned tasks.
pub trait VariantRenderer: Send + Sync {
    fn render<'a>(&'a self, job: &'a VariantJob) -> BoxFuture<'a, Result<(), GenerateError>>;
}

/// Renders variants with ImageMagick.
pub struct ImageMagick {
    program: String,
    blur: BlurIntensity,
}

impl ImageMagick {
    pub fn new(blur: BlurIntensity) -> Self {
        Self {
            program: "convert".to_string(),
            blur,
        }
    }

    /// Command-line arguments for a job.
    pub fn args(&self, job: &VariantJob) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            job.source.clone().into(),
            "-geometry".into(),
            format!("{TARGET_GEOMETRY}^").into(),
            "-gravity".into(),
            "center".into(),
            "-crop".into(),
            format!("{TARGET_GEOMETRY}+0+0").into(),
        ];
        if job.variant == Variant::Blurred {
            for arg in ["-resize", SHRINK, "-blur", self.blur.as_str(), "-resize", REGROW] {
                args.push(arg.into());
            }
        }
        args.push(job.dest.clone().into());
        args
    }
}

impl VariantRenderer for ImageMagick {
    fn render<'a>(&'a self, job: &'a VariantJob) -> BoxFuture<'a, Result<(), GenerateError>> {
        Box::pin(async move {
            let output = Command::new(&self.program)
                .args(self.args(job))
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|e| GenerateError::Spawn {
                    program: self.program.clone(),
                    source: e,
                })?;

            if output.status.success() {
                Ok(())
            } else {
                Err(GenerateError::Failed {
                    output: job.output.clone(),
                    variant: job.variant,
                    status: output.status,
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                })
            }
        })
    }
}

/// Jobs for every configured output: one normal and one blurred each.
pub fn plan_jobs(dir: &Path, config: &OutputConfig) -> Vec<VariantJob> {
    config
        .entries()
        .into_iter()
        .flat_map(|(output, source)| {
            [Variant::Blurred, Variant::Normal].map(|variant| VariantJob {
                dest: variant.path(output.file_stem(), dir),
                output: output.clone(),
                variant,
                source: source.to_path_buf(),
            })
        })
        .collect()
}

/// Render every variant in parallel and wait until all `2 × outputs`
/// are on disk.
///
/// Returns on the first failure; the remaining renders are aborted
/// (their child processes are killed). There is no per-render timeout.
pub async fn generate_all(
    renderer: Arc<dyn VariantRenderer>,
    dir: &Path,
    config: &OutputConfig,
) -> Result<(), GenerateError> {
    let mut tasks = JoinSet::new();
    for job in plan_jobs(dir, config) {
        let renderer = Arc::clone(&renderer);
        tasks.spawn(async move {
            tracing::info!(output = %job.output, variant = ?job.variant, "generating variant");
            renderer.render(&job).await?;
            tracing::info!(
                output = %job.output,
                variant = ?job.variant,
                path = %job.dest.display(),
                "variant ready"
            );
            Ok::<(), GenerateError>(())
        });
    }

    let mut remaining = tasks.len();
    while let Some(result) = tasks.join_next().await {
        result??;
        remaining -= 1;
        tracing::debug!(remaining, "variant task finished");
    }

    tracing::info!("all wallpaper variants created");
    Ok(())
}
