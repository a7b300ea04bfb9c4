//! Daemon — startup sequence and the compositor event loop.
//!
//! Startup: render every variant, apply the normal variants, subscribe
//! to window/workspace events, re-check the whole tree once, then
//! re-check on every event that can change visibility. Blur signals go
//! to [`BlurDispatcher`], which owns the per-output workers.
//!
//! Every fatal condition comes back here as an `Err`; nothing below this
//! module exits the process.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use swayipc_async::EventType;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::blur::{self, BlurContext, BlurDispatcher, BlurStates};
use crate::config::{ConfigError, OutputConfig, OutputSelector};
use crate::ipc::client::EventStream;
use crate::ipc::{IpcError, SceneNode, SwayClient};
use crate::wallpaper::{
    ApplyError, GenerateError, RetryPolicy, Variant, VariantRenderer, WallpaperSetter,
    generate_all,
};

/// Event families the daemon subscribes to.
const SUBSCRIBED_EVENTS: [EventType; 2] = [EventType::Window, EventType::Workspace];

/// Daemon errors.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Generate(#[from] GenerateError),
    #[error(transparent)]
    Apply(#[from] ApplyError),
    #[error("compositor: {0}")]
    Ipc(#[from] IpcError),
    #[error("compositor event stream ended")]
    EventStreamEnded,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolved startup settings.
pub struct Settings {
    pub outputs: Arc<OutputConfig>,
    pub cache_dir: PathBuf,
    pub socket: PathBuf,
    pub retry: RetryPolicy,
}

/// External programs the daemon drives.
pub struct Backends {
    pub renderer: Arc<dyn VariantRenderer>,
    pub setter: Arc<dyn WallpaperSetter>,
}

/// Run until `shutdown` is cancelled or a fatal error occurs.
pub async fn run(
    settings: Settings,
    backends: Backends,
    shutdown: CancellationToken,
) -> Result<(), DaemonError> {
    // Variants must exist before anything references them.
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => return Ok(()),
        result = generate_all(Arc::clone(&backends.renderer), &settings.cache_dir, &settings.outputs) => result?,
    }

    tokio::select! {
        biased;
        _ = shutdown.cancelled() => return Ok(()),
        result = apply_initial(&settings, backends.setter.as_ref()) => result?,
    }

    // Subscribe before the initial re-check so no event between the two
    // is lost.
    let events = tokio::select! {
        biased;
        _ = shutdown.cancelled() => return Ok(()),
        result = subscribe(&settings.socket) => result?,
    };
    tracing::info!("listening for compositor events");

    let ctx = Arc::new(BlurContext {
        config: Arc::clone(&settings.outputs),
        cache_dir: settings.cache_dir.clone(),
        setter: Arc::clone(&backends.setter),
        policy: settings.retry,
        states: BlurStates::new(),
    });
    let (failures_tx, failures) = mpsc::unbounded_channel();
    let mut dispatcher = BlurDispatcher::new(ctx, failures_tx);
    let tree = TreeQuery::new(settings.socket.clone());

    let result = listen(events, tree, &mut dispatcher, failures, &shutdown).await;
    dispatcher.shutdown().await;
    result
}

async fn subscribe(socket: &Path) -> Result<EventStream, IpcError> {
    SwayClient::connect(socket)
        .await?
        .subscribe(&SUBSCRIBED_EVENTS)
        .await
}

/// Initial re-check, then one re-check per relevant event until
/// cancelled or a fatal error arrives. Tree queries are raced against
/// `shutdown` so a silent compositor cannot hold up exit.
async fn listen(
    mut events: EventStream,
    mut tree: TreeQuery,
    dispatcher: &mut BlurDispatcher,
    mut failures: mpsc::UnboundedReceiver<ApplyError>,
    shutdown: &CancellationToken,
) -> Result<(), DaemonError> {
    if shutdown
        .run_until_cancelled(recheck(&mut tree, dispatcher))
        .await
        .is_none()
    {
        tracing::info!("shutting down");
        return Ok(());
    }

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                tracing::info!("shutting down");
                return Ok(());
            }

            Some(e) = failures.recv() => return Err(e.into()),

            event = events.next_event() => match event {
                Ok(Some(event)) if event.triggers_recheck() => {
                    tracing::debug!(?event, "re-checking tree");
                    if shutdown
                        .run_until_cancelled(recheck(&mut tree, dispatcher))
                        .await
                        .is_none()
                    {
                        tracing::info!("shutting down");
                        return Ok(());
                    }
                }
                Ok(Some(_)) => {}
                Ok(None) => return Err(DaemonError::EventStreamEnded),
                Err(e) => return Err(e.into()),
            },
        }
    }
}

/// Apply every configured selector's normal variant: the wildcard
/// first so named outputs end up on top, then named outputs in parallel.
async fn apply_initial(settings: &Settings, setter: &dyn WallpaperSetter) -> Result<(), ApplyError> {
    let entries = settings.outputs.entries();
    let (global, named): (Vec<_>, Vec<_>) = entries
        .iter()
        .partition(|(selector, _)| *selector == OutputSelector::All);

    for (selector, _) in &global {
        apply_normal(settings, setter, selector).await?;
    }

    futures::future::try_join_all(
        named
            .iter()
            .map(|(selector, _)| apply_normal(settings, setter, selector)),
    )
    .await?;
    Ok(())
}

async fn apply_normal(
    settings: &Settings,
    setter: &dyn WallpaperSetter,
    selector: &OutputSelector,
) -> Result<(), ApplyError> {
    let path = Variant::Normal.path(selector.file_stem(), &settings.cache_dir);
    crate::wallpaper::apply::apply(setter, settings.retry, selector, &path).await
}

/// Snapshot the tree and hand each output's signal to the dispatcher.
/// A failed query skips this cycle.
async fn recheck(tree: &mut TreeQuery, dispatcher: &mut BlurDispatcher) {
    let Some(root) = tree.snapshot().await else {
        return;
    };
    for (output, should_blur) in blur::output_signals(&root) {
        dispatcher.submit(&output, should_blur);
    }
}

/// Command connection for tree queries, reconnected after failures.
struct TreeQuery {
    socket: PathBuf,
    client: Option<SwayClient>,
}

impl TreeQuery {
    fn new(socket: PathBuf) -> Self {
        Self {
            socket,
            client: None,
        }
    }

    async fn snapshot(&mut self) -> Option<SceneNode> {
        match self.try_snapshot().await {
            Ok(root) => Some(root),
            Err(e) => {
                tracing::warn!(error = %e, "tree query failed, skipping re-check");
                self.client = None;
                None
            }
        }
    }

    async fn try_snapshot(&mut self) -> Result<SceneNode, IpcError> {
        let client = match self.client.take() {
            Some(client) => client,
            None => SwayClient::connect(&self.socket).await?,
        };
        self.client.insert(client).get_tree().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use futures::future::BoxFuture;
    use parking_lot::Mutex;
    use tokio::net::{UnixListener, UnixStream};

    use crate::ipc::testing::{
        GET_TREE, SUBSCRIBE, WINDOW_EVENT, WORKSPACE_EVENT, read_frame, tree, window_event,
        workspace_event, write_frame,
    };
    use crate::wallpaper::generate::VariantJob;

    // -- Fakes --

    struct NoopRenderer {
        rendered: Mutex<Vec<PathBuf>>,
    }

    impl VariantRenderer for NoopRenderer {
        fn render<'a>(&'a self, job: &'a VariantJob) -> BoxFuture<'a, Result<(), GenerateError>> {
            Box::pin(async move {
                self.rendered.lock().push(job.dest.clone());
                Ok(())
            })
        }
    }

    struct Recording {
        applied: mpsc::UnboundedSender<(String, PathBuf)>,
        fail_blurred: bool,
    }

    impl WallpaperSetter for Recording {
        fn set<'a>(
            &'a self,
            output: &'a OutputSelector,
            path: &'a Path,
        ) -> BoxFuture<'a, Result<(), ApplyError>> {
            Box::pin(async move {
                if self.fail_blurred && path.to_string_lossy().ends_with("_blur.jpg") {
                    return Err(ApplyError::Spawn {
                        program: "swaymsg".into(),
                        source: std::io::Error::other("refused"),
                    });
                }
                let _ = self.applied.send((output.to_string(), path.to_path_buf()));
                Ok(())
            })
        }
    }

    /// Fake compositor: answers `GET_TREE` with the current tree and
    /// forwards pushed events to the subscriber. With `answer_tree` off,
    /// tree requests are read and never answered.
    struct FakeSway {
        tree: Arc<Mutex<serde_json::Value>>,
        events: mpsc::UnboundedSender<(u32, Vec<u8>)>,
    }

    fn start_fake_sway(path: &Path, initial: serde_json::Value, answer_tree: bool) -> FakeSway {
        let listener = UnixListener::bind(path).unwrap();
        let tree = Arc::new(Mutex::new(initial));
        let (events_tx, events_rx) = mpsc::unbounded_channel::<(u32, Vec<u8>)>();
        let events_rx = Arc::new(Mutex::new(Some(events_rx)));

        let served_tree = Arc::clone(&tree);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let tree = Arc::clone(&served_tree);
                let events_rx = Arc::clone(&events_rx);
                tokio::spawn(serve(stream, tree, events_rx, answer_tree));
            }
        });

        FakeSway {
            tree,
            events: events_tx,
        }
    }

    async fn serve(
        mut stream: UnixStream,
        tree: Arc<Mutex<serde_json::Value>>,
        events_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<(u32, Vec<u8>)>>>>,
        answer_tree: bool,
    ) {
        while let Some((kind, _)) = read_frame(&mut stream).await {
            match kind {
                GET_TREE if answer_tree => {
                    let body = serde_json::to_vec(&*tree.lock()).unwrap();
                    write_frame(&mut stream, GET_TREE, &body).await.unwrap();
                }
                GET_TREE => {}
                SUBSCRIBE => {
                    write_frame(&mut stream, SUBSCRIBE, br#"{"success":true}"#)
                        .await
                        .unwrap();
                    let rx = events_rx.lock().take();
                    let Some(mut rx) = rx else {
                        return;
                    };
                    while let Some((kind, body)) = rx.recv().await {
                        if write_frame(&mut stream, kind, &body).await.is_err() {
                            return;
                        }
                    }
                    return;
                }
                _ => return,
            }
        }
    }

    impl FakeSway {
        fn set_tree(&self, value: serde_json::Value) {
            *self.tree.lock() = value;
        }

        fn window(&self, change: &str) {
            self.events.send((WINDOW_EVENT, window_event(change))).unwrap();
        }

        fn workspace(&self) {
            self.events.send((WORKSPACE_EVENT, workspace_event())).unwrap();
        }
    }

    struct Setup {
        settings: Settings,
        backends: Backends,
        renderer: Arc<NoopRenderer>,
        applied: mpsc::UnboundedReceiver<(String, PathBuf)>,
    }

    fn setup(dir: &Path, args: &[&str], fail_blurred: bool) -> Setup {
        let (applied_tx, applied) = mpsc::unbounded_channel();
        let renderer = Arc::new(NoopRenderer {
            rendered: Mutex::new(Vec::new()),
        });
        Setup {
            settings: Settings {
                outputs: Arc::new(OutputConfig::from_args(args).unwrap()),
                cache_dir: dir.join("cache"),
                socket: dir.join("sway.sock"),
                retry: RetryPolicy {
                    attempts: 2,
                    delay: Duration::from_millis(1),
                },
            },
            backends: Backends {
                renderer: renderer.clone(),
                setter: Arc::new(Recording {
                    applied: applied_tx,
                    fail_blurred,
                }),
            },
            renderer,
            applied,
        }
    }

    async fn next_apply(rx: &mut mpsc::UnboundedReceiver<(String, PathBuf)>) -> (String, String) {
        let (output, path) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for apply")
            .expect("setter dropped");
        let file = path.file_name().unwrap().to_string_lossy().into_owned();
        (output, file)
    }

    fn pair(output: &str, file: &str) -> (String, String) {
        (output.to_string(), file.to_string())
    }

    #[tokio::test]
    async fn startup_then_event_driven_blur() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = setup(dir.path(), &["eDP-1:/a.png", "/g.png"], false);
        let sway = start_fake_sway(
            &s.settings.socket,
            tree(&[("__i3", true), ("eDP-1", true), ("HDMI-A-1", false)]),
            true,
        );

        let token = CancellationToken::new();
        let daemon = tokio::spawn(run(s.settings, s.backends, token.clone()));

        // Initial apply: wildcard first, then the named output.
        assert_eq!(next_apply(&mut s.applied).await, pair("*", "_global.jpg"));
        assert_eq!(next_apply(&mut s.applied).await, pair("eDP-1", "eDP-1.jpg"));
        assert_eq!(s.renderer.rendered.lock().len(), 4);

        // Initial re-check blurs the output with a visible window.
        assert_eq!(next_apply(&mut s.applied).await, pair("eDP-1", "eDP-1_blur.jpg"));

        // Focus moves to the other output.
        sway.set_tree(tree(&[("eDP-1", false), ("HDMI-A-1", true)]));
        sway.window("focus");
        let mut got = vec![
            next_apply(&mut s.applied).await,
            next_apply(&mut s.applied).await,
        ];
        got.sort();
        assert_eq!(
            got,
            vec![pair("HDMI-A-1", "_global_blur.jpg"), pair("eDP-1", "eDP-1.jpg")]
        );

        // Title changes are ignored; the workspace event picks up the tree.
        sway.set_tree(tree(&[("eDP-1", false), ("HDMI-A-1", false)]));
        sway.window("title");
        sway.workspace();
        assert_eq!(next_apply(&mut s.applied).await, pair("HDMI-A-1", "_global.jpg"));

        token.cancel();
        daemon.await.unwrap().unwrap();
        assert!(s.applied.try_recv().is_err());
    }

    #[tokio::test]
    async fn event_stream_end_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = setup(dir.path(), &["/g.png"], false);
        let sway = start_fake_sway(&s.settings.socket, tree(&[("eDP-1", false)]), true);

        let daemon = tokio::spawn(run(s.settings, s.backends, CancellationToken::new()));
        assert_eq!(next_apply(&mut s.applied).await, pair("*", "_global.jpg"));

        drop(sway);
        let err = daemon.await.unwrap().unwrap_err();
        assert!(matches!(err, DaemonError::EventStreamEnded));
    }

    #[tokio::test]
    async fn exhausted_retries_stop_the_daemon() {
        let dir = tempfile::tempdir().unwrap();
        let s = setup(dir.path(), &["eDP-1:/a.png"], true);
        let _sway = start_fake_sway(&s.settings.socket, tree(&[("eDP-1", true)]), true);

        let err = run(s.settings, s.backends, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DaemonError::Apply(ApplyError::RetriesExhausted { attempts: 2, .. })
        ));
    }

    #[tokio::test]
    async fn missing_compositor_fails_after_startup_applies() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = setup(dir.path(), &["eDP-1:/a.png"], false);

        let err = run(s.settings, s.backends, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DaemonError::Ipc(IpcError::Connect { .. })));
        assert_eq!(next_apply(&mut s.applied).await, pair("eDP-1", "eDP-1.jpg"));
    }

    #[tokio::test]
    async fn cancelled_before_start_returns_ok() {
        let dir = tempfile::tempdir().unwrap();
        let s = setup(dir.path(), &["/g.png"], false);
        let token = CancellationToken::new();
        token.cancel();
        run(s.settings, s.backends, token).await.unwrap();
    }

    async fn assert_stops_on_cancel(s: Setup) {
        let token = CancellationToken::new();
        let daemon = tokio::spawn(run(s.settings, s.backends, token.clone()));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!daemon.is_finished());

        token.cancel();
        tokio::time::timeout(Duration::from_secs(3), daemon)
            .await
            .expect("daemon ignored cancellation")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn cancel_while_subscribe_unanswered() {
        let dir = tempfile::tempdir().unwrap();
        let s = setup(dir.path(), &["/g.png"], false);
        let listener = UnixListener::bind(&s.settings.socket).unwrap();
        let _silent = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        assert_stops_on_cancel(s).await;
    }

    #[tokio::test]
    async fn cancel_while_tree_query_unanswered() {
        let dir = tempfile::tempdir().unwrap();
        let s = setup(dir.path(), &["/g.png"], false);
        let _sway = start_fake_sway(&s.settings.socket, tree(&[("eDP-1", true)]), false);

        assert_stops_on_cancel(s).await;
    }
}
