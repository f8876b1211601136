//! Daily encoder module
//!
//! Builds the command line for the external daily encoder, launches it with
//! the overlay configuration in its environment, and supervises it until it
//! exits. Progress lines on the encoder's error stream are forwarded as
//! events while it runs; everything else it writes is captured for the final
//! [`RunResult`].

use crate::config::CONFIG_ENV_VAR;
use crate::dimensions::Dimensions;
use crate::overlay::OverlayFile;
use crate::protocol::{parse_progress_line, ProgressEvent};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, trace, warn, Instrument};
use uuid::Uuid;

/// Encoder program used when none is configured
pub const DEFAULT_ENCODER: &str = "daily";

/// Error type for a run that never produced an exit status
#[derive(Debug, Error)]
pub enum RunError {
    /// The encoder could not be started
    #[error("Failed to launch daily encoder: {0}")]
    Launch(std::io::Error),

    /// Waiting for the encoder to exit failed
    #[error("Failed to wait for daily encoder: {0}")]
    Wait(std::io::Error),

    /// The worker task ended without reporting a result
    #[error("Run worker stopped unexpectedly: {0}")]
    Worker(String),
}

/// Lifecycle of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Launching,
    Running,
    Succeeded,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &str {
        match self {
            RunState::Idle => "idle",
            RunState::Launching => "launching",
            RunState::Running => "running",
            RunState::Succeeded => "succeeded",
            RunState::Failed => "failed",
        }
    }

    /// Whether the run has reached a final state
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed)
    }
}

/// Outcome of an encoder process that ran to exit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// Process exit code, -1 when terminated by a signal
    pub exit_code: i32,
    pub stdout: String,
    /// Error output that was not part of the progress protocol
    pub stderr: String,
}

impl RunResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Notification from a run's worker to the coordinating side
#[derive(Debug)]
pub enum RunEvent {
    State(RunState),
    Progress(ProgressEvent),
    /// Always the last event of a run
    Finished(Result<RunResult, RunError>),
}

/// How to invoke the external daily encoder
///
/// `leading_args` go before the per-run arguments, which allows wrapping the
/// encoder in an interpreter (`python3 daily3`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderProgram {
    pub program: PathBuf,
    pub leading_args: Vec<String>,
}

impl EncoderProgram {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }
}

impl Default for EncoderProgram {
    fn default() -> Self {
        Self::new(DEFAULT_ENCODER)
    }
}

/// Everything the operator chose for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub sequence_folder: PathBuf,
    /// Output folder; `None` lets the encoder pick its own
    pub output_folder: Option<PathBuf>,
    /// Preset key into `output_codecs`
    pub codec: String,
    pub output: Dimensions,
    pub fit: bool,
}

/// Build the daily encoder command for a run
///
/// The command line is `<first-frame> -c <codec> [-o <output-folder>]`
/// after any leading arguments, and the environment is the current one with
/// the overlay path set in `DAILIES_CONFIG`. Both output streams are piped.
pub fn build_daily_command(
    encoder: &EncoderProgram,
    request: &RunRequest,
    first_frame: &Path,
    overlay_config: &Path,
) -> Command {
    let mut cmd = Command::new(&encoder.program);
    cmd.args(&encoder.leading_args);

    cmd.arg(first_frame);
    cmd.arg("-c").arg(&request.codec);

    if let Some(output_folder) = &request.output_folder {
        if !output_folder.as_os_str().is_empty() {
            cmd.arg("-o").arg(output_folder);
        }
    }

    cmd.env(CONFIG_ENV_VAR, overlay_config);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    cmd
}

/// Run the encoder to completion, forwarding progress as it arrives
///
/// State changes and progress events are sent on `events` in the order they
/// happen; a closed receiver does not stop the run. The returned result is
/// only produced after the process has exited and both streams are drained.
///
/// # Errors
/// Returns [`RunError::Launch`] if the process cannot be started, in which
/// case no progress is reported, and [`RunError::Wait`] if its exit status
/// cannot be collected.
pub async fn run_daily(
    mut cmd: Command,
    events: &mpsc::UnboundedSender<RunEvent>,
) -> Result<RunResult, RunError> {
    let _ = events.send(RunEvent::State(RunState::Launching));

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            let _ = events.send(RunEvent::State(RunState::Failed));
            return Err(RunError::Launch(e));
        }
    };
    info!(pid = child.id(), "daily encoder started");
    let _ = events.send(RunEvent::State(RunState::Running));

    // Stdout is drained alongside so a chatty encoder never blocks on a full pipe
    let stdout_task = child.stdout.take().map(|stdout| tokio::spawn(read_all(stdout)));

    let mut stderr = String::new();
    let mut progress_events = 0u64;
    if let Some(pipe) = child.stderr.take() {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "stopped reading encoder error stream");
                    break;
                }
            }

            let line = String::from_utf8_lossy(&buf);
            match parse_progress_line(&line) {
                Some(event) => {
                    progress_events += 1;
                    let _ = events.send(RunEvent::Progress(event));
                }
                None => {
                    trace!(line = %line.trim_end(), "encoder diagnostic");
                    stderr.push_str(&line);
                }
            }
        }
    }

    let status = match child.wait().await {
        Ok(status) => status,
        Err(e) => {
            let _ = events.send(RunEvent::State(RunState::Failed));
            return Err(RunError::Wait(e));
        }
    };

    let stdout = match stdout_task {
        Some(task) => match task.await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                warn!(error = %e, "stdout reader stopped");
                String::new()
            }
        },
        None => String::new(),
    };

    let exit_code = match status.code() {
        Some(code) => code,
        None => {
            warn!("daily encoder was terminated by a signal");
            -1
        }
    };

    let result = RunResult {
        exit_code,
        stdout,
        stderr,
    };
    let state = if result.success() {
        RunState::Succeeded
    } else {
        RunState::Failed
    };
    info!(exit_code, progress_events, state = state.as_str(), "daily encoder exited");
    let _ = events.send(RunEvent::State(state));

    Ok(result)
}

async fn read_all<R: AsyncRead + Unpin>(mut reader: R) -> Vec<u8> {
    let mut bytes = Vec::new();
    if let Err(e) = reader.read_to_end(&mut bytes).await {
        warn!(error = %e, "failed to read encoder output");
    }
    bytes
}

/// Handle to a run executing on its own worker task
///
/// The worker owns the child process and the overlay file. Events arrive in
/// order through [`RunHandle::next_event`], ending with exactly one
/// [`RunEvent::Finished`].
#[derive(Debug)]
pub struct RunHandle {
    id: Uuid,
    events: mpsc::UnboundedReceiver<RunEvent>,
    worker: JoinHandle<()>,
    finished: bool,
}

impl RunHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether the finished event has been handed out
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Wait for the next event of this run
    ///
    /// Returns `None` once the finished event has been delivered. If the
    /// worker dies without reporting, a synthetic failure is returned so the
    /// caller still sees exactly one finish.
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        if self.finished {
            return None;
        }

        let event = match self.events.recv().await {
            Some(event) => event,
            None => {
                let reason = match (&mut self.worker).await {
                    Err(e) => e.to_string(),
                    Ok(()) => "no result reported".to_string(),
                };
                RunEvent::Finished(Err(RunError::Worker(reason)))
            }
        };

        if matches!(event, RunEvent::Finished(_)) {
            self.finished = true;
        }
        Some(event)
    }
}

/// Start a run on a dedicated worker task
///
/// The overlay is removed after the encoder exits (or fails to start) and
/// before the finished event is sent. Must be called within a tokio runtime.
pub fn spawn_run(cmd: Command, overlay: OverlayFile) -> RunHandle {
    let id = Uuid::new_v4();
    let (tx, rx) = mpsc::unbounded_channel();
    let span = info_span!("daily_run", run_id = %id);

    let worker = tokio::spawn(
        async move {
            debug!(overlay = %overlay.path().display(), "run worker started");
            let result = run_daily(cmd, &tx).await;
            if let Err(e) = &result {
                warn!(error = %e, "daily run failed before exit");
            }
            overlay.remove();
            let _ = tx.send(RunEvent::Finished(result));
        }
        .instrument(span),
    );

    RunHandle {
        id,
        events: rx,
        worker,
        finished: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::ffi::OsStr;

    /// Helper to convert Command args to a Vec of strings for easier testing
    fn get_command_args(cmd: &Command) -> Vec<String> {
        cmd.as_std()
            .get_args()
            .filter_map(|arg| arg.to_str().map(String::from))
            .collect()
    }

    /// Helper to check if args contain a flag with a specific value
    fn has_flag_with_value(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|pair| pair[0] == flag && pair[1] == value)
    }

    fn config_env(cmd: &Command) -> Option<String> {
        cmd.as_std()
            .get_envs()
            .find(|(key, _)| *key == OsStr::new(CONFIG_ENV_VAR))
            .and_then(|(_, value)| value)
            .and_then(|value| value.to_str().map(String::from))
    }

    fn request(output_folder: Option<&str>) -> RunRequest {
        RunRequest {
            sequence_folder: PathBuf::from("/shots/sh010"),
            output_folder: output_folder.map(PathBuf::from),
            codec: "h264_hq".to_string(),
            output: Dimensions::new(1920, 1080).unwrap(),
            fit: false,
        }
    }

    #[test]
    fn test_command_shape() {
        let encoder = EncoderProgram::new("python3").with_leading_args(["/opt/daily3"]);
        let cmd = build_daily_command(
            &encoder,
            &request(Some("/out")),
            Path::new("/shots/sh010/sh010.0001.exr"),
            Path::new("/tmp/dailies-x.toml"),
        );

        assert_eq!(cmd.as_std().get_program(), OsStr::new("python3"));
        assert_eq!(
            get_command_args(&cmd),
            vec![
                "/opt/daily3",
                "/shots/sh010/sh010.0001.exr",
                "-c",
                "h264_hq",
                "-o",
                "/out"
            ]
        );
        assert_eq!(config_env(&cmd).as_deref(), Some("/tmp/dailies-x.toml"));
    }

    #[test]
    fn test_command_without_output_folder() {
        for folder in [None, Some("")] {
            let cmd = build_daily_command(
                &EncoderProgram::default(),
                &request(folder),
                Path::new("/shots/a.0001.exr"),
                Path::new("/tmp/o.toml"),
            );
            let args = get_command_args(&cmd);
            assert_eq!(cmd.as_std().get_program(), OsStr::new(DEFAULT_ENCODER));
            assert!(!args.iter().any(|arg| arg == "-o"), "args: {:?}", args);
        }
    }

    #[test]
    fn test_run_state_terminal() {
        assert!(!RunState::Idle.is_terminal());
        assert!(!RunState::Launching.is_terminal());
        assert!(!RunState::Running.is_terminal());
        assert!(RunState::Succeeded.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert_eq!(RunState::Running.as_str(), "running");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_command_completeness(
            frame in "[a-zA-Z0-9_/.-]{1,40}",
            codec in "[a-zA-Z0-9_]{1,20}",
            output in proptest::option::of("[a-zA-Z0-9_/.-]{1,40}"),
        ) {
            let mut req = request(output.as_deref());
            req.codec = codec.clone();
            let cmd = build_daily_command(
                &EncoderProgram::default(),
                &req,
                Path::new(&frame),
                Path::new("/tmp/overlay.toml"),
            );
            let args = get_command_args(&cmd);

            prop_assert_eq!(&args[0], &frame);
            prop_assert!(has_flag_with_value(&args, "-c", &codec), "args: {:?}", args);
            match &output {
                Some(folder) => {
                    prop_assert!(has_flag_with_value(&args, "-o", folder));
                }
                None => {
                    prop_assert_eq!(args.len(), 3);
                }
            }
        }
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::time::Duration;

        fn sh(script: &str) -> EncoderProgram {
            EncoderProgram::new("sh").with_leading_args(["-c", script, "daily"])
        }

        fn command(encoder: &EncoderProgram, overlay: &Path) -> Command {
            build_daily_command(
                encoder,
                &request(None),
                Path::new("/shots/sh010/sh010.0001.exr"),
                overlay,
            )
        }

        async fn collect(cmd: Command) -> (Vec<RunEvent>, Result<RunResult, RunError>) {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let result = run_daily(cmd, &tx).await;
            drop(tx);
            let mut events = Vec::new();
            while let Some(event) = rx.recv().await {
                events.push(event);
            }
            (events, result)
        }

        fn progress(events: &[RunEvent]) -> Vec<&ProgressEvent> {
            events
                .iter()
                .filter_map(|event| match event {
                    RunEvent::Progress(p) => Some(p),
                    _ => None,
                })
                .collect()
        }

        fn states(events: &[RunEvent]) -> Vec<RunState> {
            events
                .iter()
                .filter_map(|event| match event {
                    RunEvent::State(s) => Some(*s),
                    _ => None,
                })
                .collect()
        }

        #[tokio::test]
        async fn test_progress_events_in_order_then_success() {
            let script = r#"
i=1
while [ $i -le 240 ]; do
  echo "PROGRESS $i 240 AAAA==" >&2
  i=$((i + 1))
done
echo "wrote $1 with $3"
"#;
            let (events, result) = collect(command(&sh(script), Path::new("/tmp/o.toml"))).await;

            let frames: Vec<u64> = progress(&events).iter().map(|p| p.current_frame).collect();
            assert_eq!(frames, (1..=240).collect::<Vec<u64>>());
            assert!(progress(&events)
                .iter()
                .all(|p| p.total_frames == 240 && p.preview == "AAAA=="));

            let result = result.expect("run should complete");
            assert_eq!(result.exit_code, 0);
            assert!(result.success());
            assert_eq!(result.stdout.trim(), "wrote /shots/sh010/sh010.0001.exr with h264_hq");
            assert_eq!(result.stderr, "");
            assert_eq!(
                states(&events),
                vec![RunState::Launching, RunState::Running, RunState::Succeeded]
            );
        }

        #[tokio::test]
        async fn test_progress_arrives_while_encoder_runs() {
            let script = r#"
echo "PROGRESS 1 2 AAAA" >&2
sleep 2
"#;
            let cmd = command(&sh(script), Path::new("/tmp/o.toml"));
            let (tx, mut rx) = mpsc::unbounded_channel();
            let worker = tokio::spawn(async move { run_daily(cmd, &tx).await });

            let first = tokio::time::timeout(Duration::from_millis(1500), async {
                while let Some(event) = rx.recv().await {
                    if let RunEvent::Progress(p) = event {
                        return Some(p);
                    }
                }
                None
            })
            .await
            .expect("progress should arrive before the encoder exits");

            assert_eq!(first, Some(ProgressEvent::new(1, 2, "AAAA")));
            assert!(!worker.is_finished());

            let result = worker.await.unwrap().unwrap();
            assert!(result.success());
        }

        #[tokio::test]
        async fn test_failure_keeps_diagnostics() {
            let script = r#"
echo "PROGRESS 1 10 AAAA" >&2
echo "warning: missing frame 2" >&2
echo "PROGRESS 3 10 AAAA" >&2
echo "fatal: codec exploded" >&2
echo "partial"
exit 2
"#;
            let (events, result) = collect(command(&sh(script), Path::new("/tmp/o.toml"))).await;

            assert_eq!(progress(&events).len(), 2);
            let result = result.expect("run should complete");
            assert_eq!(result.exit_code, 2);
            assert!(!result.success());
            assert_eq!(result.stdout, "partial\n");
            assert_eq!(result.stderr, "warning: missing frame 2\nfatal: codec exploded\n");
            assert_eq!(states(&events).last(), Some(&RunState::Failed));
        }

        #[tokio::test]
        async fn test_overlay_path_is_exported() {
            let script = r#"printf '%s' "$DAILIES_CONFIG""#;
            let overlay = Path::new("/tmp/dailies-abc.toml");
            let (_, result) = collect(command(&sh(script), overlay)).await;
            assert_eq!(result.unwrap().stdout, "/tmp/dailies-abc.toml");
        }

        #[tokio::test]
        async fn test_missing_encoder_is_launch_failure() {
            let encoder = EncoderProgram::new("/nonexistent/daily-encoder");
            let (events, result) = collect(command(&encoder, Path::new("/tmp/o.toml"))).await;

            assert!(matches!(result, Err(RunError::Launch(_))));
            assert!(progress(&events).is_empty());
            assert_eq!(states(&events), vec![RunState::Launching, RunState::Failed]);
        }

        #[tokio::test]
        async fn test_large_stdout_does_not_stall() {
            let script = r#"
i=0
while [ $i -lt 4000 ]; do
  echo "stdout line $i padded to make the pipe fill up quickly ................"
  i=$((i + 1))
done
echo "PROGRESS 1 1 AAAA" >&2
"#;
            let (events, result) = collect(command(&sh(script), Path::new("/tmp/o.toml"))).await;
            let result = result.unwrap();
            assert_eq!(result.stdout.lines().count(), 4000);
            assert_eq!(progress(&events).len(), 1);
        }

        #[tokio::test]
        async fn test_signal_exit_reports_minus_one() {
            let (_, result) = collect(command(&sh("kill -9 $$"), Path::new("/tmp/o.toml"))).await;
            assert_eq!(result.unwrap().exit_code, -1);
        }

        #[tokio::test]
        async fn test_spawned_run_finishes_once_and_removes_overlay() {
            use crate::config::Config;
            use crate::overlay::write_overlay_in;
            use tempfile::TempDir;

            let temp_dir = TempDir::new().unwrap();
            let base = Config::parse_toml("[globals]\nwidth = 1920\nheight = 1080\n").unwrap();
            let overlay = write_overlay_in(
                temp_dir.path(),
                &base,
                Dimensions::new(960, 540).unwrap(),
                false,
                "dailies-",
            )
            .unwrap();
            let overlay_path = overlay.path().to_path_buf();

            let script = r#"
echo "PROGRESS 1 2 AAAA" >&2
cat "$DAILIES_CONFIG"
echo "PROGRESS 2 2 AAAA" >&2
"#;
            let cmd = command(&sh(script), &overlay_path);
            let mut handle = spawn_run(cmd, overlay);

            let mut frames = Vec::new();
            let mut finished = Vec::new();
            while let Some(event) = handle.next_event().await {
                match event {
                    RunEvent::Progress(p) => frames.push(p.current_frame),
                    RunEvent::Finished(result) => finished.push(result),
                    RunEvent::State(_) => {}
                }
            }

            assert!(handle.is_finished());
            assert_eq!(frames, vec![1, 2]);
            assert_eq!(finished.len(), 1);
            let result = finished.pop().unwrap().unwrap();
            assert!(result.stdout.contains("width = 960"));
            assert!(result.stdout.contains("height = 540"));
            assert!(!overlay_path.exists());
        }
    }
}
