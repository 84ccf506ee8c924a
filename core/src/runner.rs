//! Child process lifecycle for one tool invocation.
//!
//! stdout is copied into a bounded in-memory pipe that the parser reads
//! while the tool is still running. stderr is captured (tail only) and also
//! offered line by line to an optional receiver. Both pumps keep draining
//! after their consumer goes away so the child never blocks on a full pipe.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::io::{
    self, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream,
};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::options::RunnerSettings;

/// Capacity of the stdout pipe between the process and the parser.
const STDOUT_PIPE_SIZE: usize = 64 * 1024;

/// Most recent stderr bytes kept for error reports.
const STDERR_CAPTURE_LIMIT: usize = 64 * 1024;

/// Buffered stderr lines before new ones are dropped for the receiver.
const STDERR_LINE_BACKLOG: usize = 256;

/// How long to wait for the output pumps once the process has exited.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Spawns the tool with fixed binary and runtime settings.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    binary: PathBuf,
    settings: RunnerSettings,
}

impl ProcessRunner {
    pub fn new(binary: impl Into<PathBuf>, settings: RunnerSettings) -> Self {
        Self {
            binary: binary.into(),
            settings,
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    /// Start the tool with `args`.
    ///
    /// Must be called within a tokio runtime. A token that is already
    /// cancelled fails with [`Error::Cancelled`] and nothing is spawned.
    pub fn spawn(&self, args: &[String], cancel: CancelToken) -> Result<RunHandle> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut command = Command::new(&self.binary);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.settings.working_dir {
            command.current_dir(dir);
        }
        command.envs(self.settings.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let mut child = command.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::ToolNotFound {
                searched: vec![self.binary.clone()],
            },
            _ => Error::CommandFailed(format!("Failed to start {}: {}", self.binary.display(), e)),
        })?;

        let id = Uuid::new_v4();
        let pid = child.id();
        debug!(run_id = %id, pid = ?pid, binary = %self.binary.display(), ?args, "process spawned");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::CommandFailed("stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::CommandFailed("stderr was not captured".to_string()))?;

        let (reader, writer) = io::duplex(STDOUT_PIPE_SIZE);
        let (line_tx, line_rx) = mpsc::channel(STDERR_LINE_BACKLOG);
        let capture = Arc::new(Mutex::new(StderrCapture::default()));

        let stdout_pump = tokio::spawn(pump_stdout(id, stdout, writer));
        let stderr_pump = tokio::spawn(pump_stderr(stderr, capture.clone(), line_tx));

        Ok(RunHandle {
            id,
            pid,
            child,
            stdout: Some(reader),
            stderr_lines: Some(line_rx),
            stdout_pump,
            stderr_pump,
            stderr: capture,
            cancel,
            grace_period: self.settings.grace_period,
            timeout: self.settings.timeout,
            started: Instant::now(),
        })
    }
}

/// One in-flight tool process.
///
/// Dropping the handle kills the process. Call [`RunHandle::wait`] to reap
/// it and collect the outcome.
#[derive(Debug)]
pub struct RunHandle {
    id: Uuid,
    pid: Option<u32>,
    child: Child,
    stdout: Option<DuplexStream>,
    stderr_lines: Option<mpsc::Receiver<String>>,
    stdout_pump: JoinHandle<io::Result<u64>>,
    stderr_pump: JoinHandle<()>,
    stderr: Arc<Mutex<StderrCapture>>,
    cancel: CancelToken,
    grace_period: Duration,
    timeout: Option<Duration>,
    started: Instant,
}

/// How a process run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub id: Uuid,
    pub exit_code: Option<i32>,
    /// Bytes the process wrote to stdout.
    pub stdout_bytes: u64,
    /// Captured stderr (tail).
    pub stderr: String,
    pub elapsed: Duration,
}

enum Stop {
    Exited(std::io::Result<ExitStatus>),
    Cancelled,
    TimedOut(Duration),
}

impl RunHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// The process's stdout, readable while it runs. Available once.
    pub fn take_stdout(&mut self) -> Option<DuplexStream> {
        self.stdout.take()
    }

    /// stderr lines as they arrive. Available once.
    ///
    /// Lines are dropped for this receiver when it falls behind; the full
    /// tail is still reported in [`RunOutcome::stderr`].
    pub fn take_stderr_lines(&mut self) -> Option<mpsc::Receiver<String>> {
        self.stderr_lines.take()
    }

    /// Wait for the process to exit, be cancelled, or time out.
    ///
    /// On cancellation or timeout the process gets SIGTERM, then SIGKILL
    /// after the grace period. The process is reaped in every case.
    pub async fn wait(mut self) -> Result<RunOutcome> {
        // An untaken stdout would stall the pump once the pipe fills.
        self.stdout = None;

        let deadline = self
            .timeout
            .map(|limit| (tokio::time::Instant::from_std(self.started + limit), limit));
        let deadline = async move {
            match deadline {
                Some((at, limit)) => {
                    tokio::time::sleep_until(at).await;
                    limit
                }
                None => std::future::pending().await,
            }
        };

        let stop = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Stop::Cancelled,
            limit = deadline => Stop::TimedOut(limit),
            status = self.child.wait() => Stop::Exited(status),
        };

        match stop {
            Stop::Cancelled => {
                debug!(run_id = %self.id, "cancellation requested");
                self.terminate().await;
                self.drain(self.grace_period).await;
                Err(Error::Cancelled)
            }
            Stop::TimedOut(limit) => {
                warn!(run_id = %self.id, ?limit, "run timed out");
                self.terminate().await;
                self.drain(self.grace_period).await;
                Err(Error::Timeout(limit))
            }
            Stop::Exited(status) => {
                let status = status?;
                let stdout_bytes = self.drain(DRAIN_TIMEOUT).await;
                let stderr = self.stderr.lock().text.clone();
                let elapsed = self.started.elapsed();
                debug!(
                    run_id = %self.id,
                    code = ?status.code(),
                    stdout_bytes,
                    ?elapsed,
                    "process exited"
                );

                if !status.success() {
                    return Err(Error::ProcessExecution {
                        code: status.code(),
                        stderr: stderr.trim_end().to_string(),
                    });
                }

                Ok(RunOutcome {
                    id: self.id,
                    exit_code: status.code(),
                    stdout_bytes,
                    stderr,
                    elapsed,
                })
            }
        }
    }

    /// SIGTERM, wait for the grace period, then SIGKILL.
    async fn terminate(&mut self) {
        if let Ok(Some(_)) = self.child.try_wait() {
            return;
        }

        if send_terminate(&mut self.child) {
            match timeout(self.grace_period, self.child.wait()).await {
                Ok(_) => {
                    debug!(run_id = %self.id, "process exited after SIGTERM");
                    return;
                }
                Err(_) => {
                    warn!(
                        run_id = %self.id,
                        grace = ?self.grace_period,
                        "grace period elapsed, killing process"
                    );
                }
            }
        }

        // kill() also reaps.
        if let Err(e) = self.child.kill().await {
            warn!(run_id = %self.id, error = %e, "failed to kill process");
        }
    }

    /// Wait for both pumps, giving up after `limit`. Returns the stdout byte count.
    async fn drain(&mut self, limit: Duration) -> u64 {
        let bytes = match timeout(limit, &mut self.stdout_pump).await {
            Ok(Ok(Ok(bytes))) => bytes,
            Ok(Ok(Err(e))) => {
                warn!(run_id = %self.id, error = %e, "stdout pump failed");
                0
            }
            Ok(Err(e)) => {
                warn!(run_id = %self.id, error = %e, "stdout pump panicked");
                0
            }
            Err(_) => {
                warn!(run_id = %self.id, "stdout still open after exit, abandoning it");
                self.stdout_pump.abort();
                0
            }
        };

        if timeout(limit, &mut self.stderr_pump).await.is_err() {
            self.stderr_pump.abort();
        }
        bytes
    }
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match child.id() {
        Some(pid) => kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok(),
        None => false,
    }
}

/// No graceful signal outside unix; fall straight through to kill.
#[cfg(not(unix))]
fn send_terminate(_child: &mut Child) -> bool {
    false
}

/// Copy stdout into the pipe. Once the reader is gone, keep reading and discard.
async fn pump_stdout<R>(id: Uuid, mut source: R, mut sink: DuplexStream) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; 8 * 1024];
    let mut total = 0u64;
    let mut discarding = false;

    loop {
        let n = source.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        total += n as u64;

        if discarding {
            continue;
        }
        if let Err(e) = sink.write_all(&buf[..n]).await {
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(e);
            }
            trace!(run_id = %id, "stdout reader dropped, discarding the rest");
            discarding = true;
        }
    }

    if !discarding {
        let _ = sink.shutdown().await;
    }
    Ok(total)
}

async fn pump_stderr<R>(
    source: R,
    capture: Arc<Mutex<StderrCapture>>,
    lines: mpsc::Sender<String>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(source);
    let mut raw = Vec::new();

    loop {
        raw.clear();
        match reader.read_until(b'\n', &mut raw).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        let line = String::from_utf8_lossy(&raw);
        capture.lock().push(&line);
        let _ = lines.try_send(line.trim_end_matches(['\r', '\n']).to_string());
    }
}

/// Tail of the stderr stream, bounded to [`STDERR_CAPTURE_LIMIT`] bytes.
#[derive(Debug, Default)]
struct StderrCapture {
    text: String,
}

impl StderrCapture {
    fn push(&mut self, chunk: &str) {
        self.text.push_str(chunk);
        if self.text.len() > STDERR_CAPTURE_LIMIT {
            let mut cut = self.text.len() - STDERR_CAPTURE_LIMIT;
            while !self.text.is_char_boundary(cut) {
                cut += 1;
            }
            self.text.drain(..cut);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::tool::tests::write_script;
    use tempfile::tempdir;

    fn runner(binary: &Path) -> ProcessRunner {
        ProcessRunner::new(
            binary,
            RunnerSettings {
                grace_period: Duration::from_millis(300),
                ..RunnerSettings::default()
            },
        )
    }

    fn process_gone(pid: u32) -> bool {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;
        kill(Pid::from_raw(pid as i32), None).is_err()
    }

    #[tokio::test]
    async fn test_streams_stdout_and_stderr() {
        let dir = tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "tool",
            "echo \"args: $*\"\necho warming up >&2\necho done\n",
        );

        let mut handle = runner(&script)
            .spawn(&["-a".to_string(), "b".to_string()], CancelToken::new())
            .unwrap();
        let mut stdout = handle.take_stdout().unwrap();
        let mut lines = handle.take_stderr_lines().unwrap();

        let mut out = String::new();
        let (read, outcome) = tokio::join!(stdout.read_to_string(&mut out), handle.wait());
        read.unwrap();
        let outcome = outcome.unwrap();

        assert_eq!(out, "args: -a b\ndone\n");
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.stdout_bytes, out.len() as u64);
        assert_eq!(outcome.stderr, "warming up\n");
        assert_eq!(lines.recv().await.as_deref(), Some("warming up"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_carries_stderr() {
        let dir = tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "tool",
            "echo 'Failed to resolve \"nope\".' >&2\nexit 1\n",
        );

        let handle = runner(&script).spawn(&[], CancelToken::new()).unwrap();
        match handle.wait().await {
            Err(Error::ProcessExecution { code, stderr }) => {
                assert_eq!(code, Some(1));
                assert!(stderr.contains("Failed to resolve"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unread_stdout_does_not_block() {
        let dir = tempdir().unwrap();
        // Well past the pipe capacity.
        let script = write_script(
            dir.path(),
            "tool",
            "i=0\nwhile [ $i -lt 4000 ]; do echo 'padding padding padding padding padding'; i=$((i+1)); done\n",
        );

        let handle = runner(&script).spawn(&[], CancelToken::new()).unwrap();
        let outcome = handle.wait().await.unwrap();
        assert_eq!(outcome.stdout_bytes, 4000 * 40);
    }

    #[tokio::test]
    async fn test_cancel_terminates_and_reaps() {
        let dir = tempdir().unwrap();
        let script = write_script(dir.path(), "tool", "exec sleep 30\n");

        let cancel = CancelToken::new();
        let handle = runner(&script).spawn(&[], cancel.clone()).unwrap();
        let pid = handle.pid().unwrap();

        cancel.cancel();
        let started = Instant::now();
        assert!(matches!(handle.wait().await, Err(Error::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(process_gone(pid));
    }

    #[tokio::test]
    async fn test_sigterm_ignored_escalates_to_kill() {
        let dir = tempdir().unwrap();
        let script = write_script(dir.path(), "tool", "trap '' TERM\nexec sleep 30\n");

        let cancel = CancelToken::new();
        let handle = runner(&script).spawn(&[], cancel.clone()).unwrap();
        let pid = handle.pid().unwrap();

        // Let the shell install its trap before signalling.
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();

        let started = Instant::now();
        assert!(matches!(handle.wait().await, Err(Error::Cancelled)));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(5), "{elapsed:?}");
        assert!(process_gone(pid));
    }

    #[tokio::test]
    async fn test_pre_cancelled_never_spawns() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = runner(Path::new("/nonexistent/nmap")).spawn(&[], cancel);
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_timeout() {
        let dir = tempdir().unwrap();
        let script = write_script(dir.path(), "tool", "exec sleep 30\n");

        let runner = ProcessRunner::new(
            &script,
            RunnerSettings {
                grace_period: Duration::from_millis(200),
                timeout: Some(Duration::from_millis(100)),
                ..RunnerSettings::default()
            },
        );
        let handle = runner.spawn(&[], CancelToken::new()).unwrap();
        let pid = handle.pid().unwrap();

        match handle.wait().await {
            Err(Error::Timeout(limit)) => assert_eq!(limit, Duration::from_millis(100)),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(process_gone(pid));
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let result = runner(Path::new("/nonexistent/nmap")).spawn(&[], CancelToken::new());
        assert!(matches!(result, Err(Error::ToolNotFound { .. })));
    }

    #[test]
    fn test_stderr_capture_keeps_tail() {
        let mut capture = StderrCapture::default();
        let line = "x".repeat(1000) + "\n";
        for _ in 0..100 {
            capture.push(&line);
        }
        capture.push("last line\n");
        assert!(capture.text.len() <= STDERR_CAPTURE_LIMIT);
        assert!(capture.text.ends_with("last line\n"));
    }
}
