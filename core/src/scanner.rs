//! The scanner facade: options in, parsed results out.
//!
//! A [`Scanner`] is built once from a list of [`ScanOption`]s, which also
//! locates and version-checks the binary. Each [`Scanner::run`] spawns one
//! process and parses its output while it is being written.

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tokio::runtime::Builder;
use tokio::task::JoinHandle;
use tracing::{debug, debug_span, warn, Instrument};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::models::{ScanMetadata, ScanResult};
use crate::options::{RunnerSettings, ScanConfiguration, ScanOption};
use crate::parser::{self, OutputFormat};
use crate::runner::ProcessRunner;
use crate::tool::{self, ToolInfo};

// ============================================================================
// Run state
// ============================================================================

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Configuring,
    Spawning,
    /// Process running, parser consuming its output.
    Streaming,
    /// Process done, result being assembled.
    Parsing,
    Completed,
    Failed(String),
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed(_))
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Configuring => write!(f, "configuring"),
            RunState::Spawning => write!(f, "spawning"),
            RunState::Streaming => write!(f, "streaming"),
            RunState::Parsing => write!(f, "parsing"),
            RunState::Completed => write!(f, "completed"),
            RunState::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Shared view of one run's state. Terminal states are final.
#[derive(Debug, Clone)]
struct StateCell(Arc<Mutex<RunState>>);

impl StateCell {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(RunState::Idle)))
    }

    fn get(&self) -> RunState {
        self.0.lock().clone()
    }

    fn advance(&self, next: RunState) {
        let mut state = self.0.lock();
        if state.is_terminal() {
            return;
        }
        debug!(from = %*state, to = %next, "run state");
        *state = next;
    }

    /// Record the outcome of a run and pass it through.
    fn finish<T>(&self, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => self.advance(RunState::Completed),
            Err(e) => self.advance(RunState::Failed(e.to_string())),
        }
        result
    }
}

// ============================================================================
// ScannerBuilder
// ============================================================================

/// Collects options for a [`Scanner`].
#[derive(Debug, Default)]
pub struct ScannerBuilder {
    pub(crate) config: ScanConfiguration,
    pub(crate) runner: RunnerSettings,
    pending: Vec<ScanOption>,
}

impl ScannerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an option. Options are applied in order by [`build`](Self::build).
    pub fn option(mut self, option: ScanOption) -> Self {
        self.pending.push(option);
        self
    }

    pub fn options<I>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = ScanOption>,
    {
        self.pending.extend(options);
        self
    }

    /// Configuration as built by the options applied so far.
    pub fn configuration(&self) -> &ScanConfiguration {
        &self.config
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.runner
    }

    /// Apply the queued options, validate, then locate and check the binary.
    ///
    /// Configuration errors are reported before the binary is looked at.
    pub async fn build(mut self) -> Result<Scanner> {
        for option in std::mem::take(&mut self.pending) {
            option.apply(&mut self)?;
        }
        self.config.validate()?;

        let tool = tool::resolve(self.runner.binary.as_deref()).await?;
        debug!(
            binary = %tool.path.display(),
            version = %tool.version,
            args = ?self.config.args(),
            "scanner ready"
        );

        Ok(Scanner {
            inner: Arc::new(Inner {
                runner: ProcessRunner::new(tool.path.clone(), self.runner),
                config: self.config,
                tool,
            }),
        })
    }
}

// ============================================================================
// Scanner
// ============================================================================

/// A validated scan configuration bound to a checked binary.
///
/// Cheap to clone; clones share the configuration. Every run is independent.
#[derive(Debug, Clone)]
pub struct Scanner {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: ScanConfiguration,
    runner: ProcessRunner,
    tool: ToolInfo,
}

impl Scanner {
    /// Build a scanner from `options`.
    ///
    /// Fails with `InvalidConfiguration`, `ToolNotFound` or
    /// `UnsupportedVersion`.
    pub async fn new<I>(options: I) -> Result<Self>
    where
        I: IntoIterator<Item = ScanOption>,
    {
        ScannerBuilder::new().options(options).build().await
    }

    /// [`Scanner::new`] for callers without an async runtime.
    pub fn new_blocking<I>(options: I) -> Result<Self>
    where
        I: IntoIterator<Item = ScanOption>,
    {
        let options: Vec<ScanOption> = options.into_iter().collect();
        block_on(Self::new(options))
    }

    pub fn builder() -> ScannerBuilder {
        ScannerBuilder::new()
    }

    pub fn configuration(&self) -> &ScanConfiguration {
        &self.inner.config
    }

    pub fn tool(&self) -> &ToolInfo {
        &self.inner.tool
    }

    /// Arguments passed to the binary on each run.
    pub fn args(&self) -> Vec<String> {
        self.inner.config.args()
    }

    /// Run one scan to completion.
    ///
    /// Cancelling `cancel` at any point terminates the process and returns
    /// [`Error::Cancelled`]. No retries.
    pub async fn run(&self, cancel: &CancelToken) -> Result<ScanResult> {
        let id = Uuid::new_v4();
        execute(&self.inner.runner, &self.inner.config, cancel.clone(), StateCell::new())
            .instrument(debug_span!("scan", %id))
            .await
    }

    /// Run one scan on a background task.
    ///
    /// Must be called within a tokio runtime. Errors surface from
    /// [`ScanTask::result`].
    pub fn start(&self, cancel: CancelToken) -> ScanTask {
        let id = Uuid::new_v4();
        let state = StateCell::new();
        let inner = self.inner.clone();
        let task_cancel = cancel.clone();
        let task_state = state.clone();

        let handle = tokio::spawn(
            async move { execute(&inner.runner, &inner.config, task_cancel, task_state).await }
                .instrument(debug_span!("scan", %id)),
        );

        ScanTask {
            id,
            cancel,
            state,
            handle,
        }
    }

    /// [`Scanner::run`] on a private single-threaded runtime.
    ///
    /// Fails if called from inside an async runtime.
    pub fn run_blocking(&self) -> Result<ScanResult> {
        block_on(self.run(&CancelToken::new()))
    }

    /// List interfaces and routes with the same binary and runtime settings.
    pub async fn interface_list(&self, cancel: &CancelToken) -> Result<ScanResult> {
        let config = ScanConfiguration {
            output: OutputFormat::InterfaceList,
            ..ScanConfiguration::default()
        };
        let id = Uuid::new_v4();
        execute(&self.inner.runner, &config, cancel.clone(), StateCell::new())
            .instrument(debug_span!("iflist", %id))
            .await
    }
}

/// A scan running on a background task.
#[derive(Debug)]
pub struct ScanTask {
    id: Uuid,
    cancel: CancelToken,
    state: StateCell,
    handle: JoinHandle<Result<ScanResult>>,
}

impl ScanTask {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> RunState {
        self.state.get()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Request cancellation; [`result`](Self::result) then yields `Cancelled`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn result(self) -> Result<ScanResult> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(Error::CommandFailed(format!("scan task failed: {}", e))),
        }
    }
}

// ============================================================================
// Run pipeline
// ============================================================================

async fn execute(
    runner: &ProcessRunner,
    config: &ScanConfiguration,
    cancel: CancelToken,
    state: StateCell,
) -> Result<ScanResult> {
    let result = pipeline(runner, config, cancel, &state).await;
    if let Err(e) = &result {
        warn!(error = %e, "scan failed");
    }
    state.finish(result)
}

async fn pipeline(
    runner: &ProcessRunner,
    config: &ScanConfiguration,
    cancel: CancelToken,
    state: &StateCell,
) -> Result<ScanResult> {
    state.advance(RunState::Configuring);
    let args = config.args();
    let mut command_line = Vec::with_capacity(args.len() + 1);
    command_line.push(runner.binary().to_string_lossy().into_owned());
    command_line.extend(args.iter().cloned());

    state.advance(RunState::Spawning);
    let started_at = unix_now();
    let mut handle = runner.spawn(&args, cancel)?;
    let stdout = handle
        .take_stdout()
        .ok_or_else(|| Error::CommandFailed("stdout already taken".to_string()))?;

    state.advance(RunState::Streaming);
    let (parsed, outcome) = tokio::join!(parser::parse(config.output, stdout), handle.wait());

    state.advance(RunState::Parsing);
    // Cancellation and timeout first, then the process, then the parser.
    let outcome = outcome?;
    let parsed = parsed?;

    let metadata = ScanMetadata {
        command_line,
        started_at,
        finished_at: unix_now(),
        exit_code: outcome.exit_code,
        run: None,
    };
    let result = parsed.into_result(metadata);
    debug!(
        hosts = result.hosts.len(),
        interfaces = result.interfaces.len(),
        elapsed = ?outcome.elapsed,
        "scan complete"
    );
    Ok(result)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

fn block_on<F, T>(future: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(Error::CommandFailed(
            "blocking call made from inside an async runtime".to_string(),
        ));
    }
    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::CommandFailed(format!("Failed to create runtime: {}", e)))?;
    runtime.block_on(future)
}
