//! Per-output single-flight dispatch of blur signals.
//!
//! Each output seen in a tree snapshot gets one long-lived worker task
//! fed through a `watch` channel. The channel holds only the latest
//! signal, so a burst of events while an apply is running collapses
//! into one follow-up evaluation, and at most one apply per output is
//! ever in flight.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use super::state::BlurStates;
use crate::config::{OutputConfig, OutputSelector};
use crate::wallpaper::{ApplyError, RetryPolicy, WallpaperSetter, apply};

/// Everything a worker needs to turn a signal into a wallpaper.
pub struct BlurContext {
    pub config: Arc<OutputConfig>,
    pub cache_dir: PathBuf,
    pub setter: Arc<dyn WallpaperSetter>,
    pub policy: RetryPolicy,
    pub states: BlurStates,
}

/// Routes per-output blur signals to their workers.
pub struct BlurDispatcher {
    ctx: Arc<BlurContext>,
    workers: HashMap<String, watch::Sender<bool>>,
    tasks: JoinSet<()>,
    failures: mpsc::UnboundedSender<ApplyError>,
}

impl BlurDispatcher {
    /// Failed applies (retries exhausted) are reported on `failures`.
    pub fn new(ctx: Arc<BlurContext>, failures: mpsc::UnboundedSender<ApplyError>) -> Self {
        Self {
            ctx,
            workers: HashMap::new(),
            tasks: JoinSet::new(),
            failures,
        }
    }

    /// Hand the latest signal for `output` to its worker, starting one
    /// on first sight. Outputs with no configured wallpaper are ignored.
    pub fn submit(&mut self, output: &str, should_blur: bool) {
        if let Some(tx) = self.workers.get(output) {
            tx.send_replace(should_blur);
            return;
        }

        if self.ctx.config.variant_selector(output).is_none() {
            tracing::debug!(output, "no wallpaper configured, ignoring");
            return;
        }

        let (tx, rx) = watch::channel(should_blur);
        self.workers.insert(output.to_string(), tx);
        self.tasks.spawn(run_worker(
            Arc::clone(&self.ctx),
            output.to_string(),
            rx,
            self.failures.clone(),
        ));
        tracing::debug!(output, "started blur worker");
    }

    /// Close every worker's channel and wait for in-flight applies.
    pub async fn shutdown(mut self) {
        self.workers.clear();
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "blur worker panicked");
            }
        }
    }
}

async fn run_worker(
    ctx: Arc<BlurContext>,
    output: String,
    mut signals: watch::Receiver<bool>,
    failures: mpsc::UnboundedSender<ApplyError>,
) {
    loop {
        let should_blur = *signals.borrow_and_update();
        if let Err(e) = evaluate(&ctx, &output, should_blur).await {
            let _ = failures.send(e);
            return;
        }
        if signals.changed().await.is_err() {
            return;
        }
    }
}

/// Apply the variant matching `should_blur` if the output's state flips.
async fn evaluate(ctx: &BlurContext, output: &str, should_blur: bool) -> Result<(), ApplyError> {
    let Some(variant) = ctx.states.transition(output, should_blur) else {
        return Ok(());
    };
    let Some(selector) = ctx.config.variant_selector(output) else {
        return Ok(());
    };

    tracing::info!(
        output,
        blurred = should_blur,
        source = ?ctx.config.source_for(output),
        "blur changed"
    );
    let path = variant.path(selector.file_stem(), &ctx.cache_dir);
    let target = OutputSelector::Named(output.to_string());
    apply::apply(ctx.setter.as_ref(), ctx.policy, &target, &path).await
}
