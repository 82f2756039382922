//! Bounded concurrent dispatch of one command across many contexts
//!
//! Every context gets its own tokio task up front. A semaphore limits how many
//! of them are past the gate at once, which is what keeps credential helpers
//! such as kubelogin from being hit by dozens of logins at the same moment.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::console::{Console, OutputSink};
use super::error::ExecError;
use super::reporter::{self, Trigger};
use super::runner::{CommandSpec, TaskOutput, TaskRunner};
use super::status::{StatusBoard, StatusSnapshot};
use crate::filter::Pattern;
use crate::guard::{self, GuardError};

/// Contexts processed at once when no limit is configured.
pub const DEFAULT_PARALLEL: usize = 3;

/// Per-batch execution settings.
#[derive(Debug, Clone, Default)]
pub struct BatchConfig {
    /// Maximum concurrent contexts; `None` or 0 means [`DEFAULT_PARALLEL`]
    pub parallel: Option<usize>,
    /// Per-context timeout; `None` or zero disables it
    pub timeout: Option<Duration>,
    /// Allow write operations
    pub force: bool,
    /// Output line filter
    pub grep: Option<String>,
}

impl BatchConfig {
    pub fn concurrency_limit(&self) -> usize {
        match self.parallel {
            Some(n) if n > 0 => n,
            _ => DEFAULT_PARALLEL,
        }
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        self.timeout.filter(|t| !t.is_zero())
    }

    fn line_filter(&self) -> Option<Pattern> {
        self.grep
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(Pattern::parse_line)
    }
}

/// One unit of work: the same command for every target.
#[derive(Debug, Clone)]
pub struct Batch {
    targets: Vec<String>,
    command: CommandSpec,
    config: BatchConfig,
}

impl Batch {
    /// Duplicate targets are dropped, keeping the first occurrence.
    pub fn new(targets: Vec<String>, command: CommandSpec, config: BatchConfig) -> Self {
        let mut seen = HashSet::new();
        let targets = targets
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect();

        Self {
            targets,
            command,
            config,
        }
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn command(&self) -> &CommandSpec {
        &self.command
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }
}

/// How a finished batch went, per outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub cancelled: usize,
    /// Board state after the last task finished
    pub snapshot: StatusSnapshot,
}

impl BatchSummary {
    fn record(&mut self, output: &TaskOutput) {
        match &output.error {
            None => self.succeeded += 1,
            Some(ExecError::Timeout(_)) => self.timed_out += 1,
            Some(ExecError::Cancelled) => self.cancelled += 1,
            Some(_) => self.failed += 1,
        }
    }
}

/// Shared by all worker tasks of a batch, to avoid long parameter lists
struct UnitContext<R> {
    runner: Arc<R>,
    gate: Arc<Semaphore>,
    console: Console,
    command: CommandSpec,
    timeout: Option<Duration>,
    filter: Option<Pattern>,
    cancel: CancellationToken,
}

/// Runs batches through a [`TaskRunner`].
pub struct Dispatcher<R> {
    runner: Arc<R>,
}

impl<R: TaskRunner> Dispatcher<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner: Arc::new(runner),
        }
    }

    /// Run `batch` to completion.
    ///
    /// Fails only when the write guard vetoes the command, in which case
    /// nothing is launched. Individual context failures are printed in their
    /// blocks and counted in the summary. Cancelling `cancel` terminates every
    /// running process and skips contexts still waiting for a slot.
    pub async fn run(
        &self,
        batch: Batch,
        sink: Box<dyn OutputSink>,
        trigger: Trigger,
        cancel: CancellationToken,
    ) -> Result<BatchSummary, GuardError> {
        let Batch {
            targets,
            command,
            config,
        } = batch;

        guard::check(command.args(), config.force)?;

        let limit = config.concurrency_limit();
        let console = Console::new(StatusBoard::new(targets.iter().cloned()), sink);

        let stop_reporter = CancellationToken::new();
        let reporter = reporter::spawn(console.clone(), trigger, stop_reporter.clone());

        tracing::debug!(
            contexts = targets.len(),
            parallel = limit,
            timeout = ?config.task_timeout(),
            "dispatching batch"
        );

        let ctx = Arc::new(UnitContext {
            runner: self.runner.clone(),
            gate: Arc::new(Semaphore::new(limit)),
            console: console.clone(),
            timeout: config.task_timeout(),
            filter: config.line_filter(),
            command,
            cancel,
        });

        let mut handles = Vec::with_capacity(targets.len());
        for target in targets {
            let ctx = ctx.clone();
            let name = target.clone();
            let handle = tokio::spawn(async move { run_unit(ctx, target).await });
            handles.push((name, handle));
        }

        let mut summary = BatchSummary {
            total: handles.len(),
            ..Default::default()
        };

        for (target, handle) in handles {
            let output = match handle.await {
                Ok(output) => output,
                Err(e) => {
                    tracing::error!(context = %target, "task panicked: {e}");
                    let output = TaskOutput::failed(ExecError::Panicked(e.to_string()));
                    console.complete(&target, &output, None);
                    output
                }
            };
            summary.record(&output);
        }

        stop_reporter.cancel();
        if let Err(e) = reporter.await {
            tracing::warn!("progress reporter ended abnormally: {e}");
        }

        summary.snapshot = console.snapshot();
        tracing::info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            timed_out = summary.timed_out,
            cancelled = summary.cancelled,
            "batch finished"
        );

        Ok(summary)
    }
}

async fn run_unit<R: TaskRunner>(ctx: Arc<UnitContext<R>>, target: String) -> TaskOutput {
    let permit = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => None,
        permit = ctx.gate.clone().acquire_owned() => permit.ok(),
    };

    let Some(_permit) = permit else {
        tracing::debug!(context = %target, "cancelled before start");
        let output = TaskOutput::failed(ExecError::Cancelled);
        ctx.console.complete(&target, &output, ctx.filter.as_ref());
        return output;
    };

    ctx.console.mark_running(&target);
    tracing::debug!(context = %target, "running");

    let task_cancel = ctx.cancel.child_token();
    let run = ctx.runner.run(&target, &ctx.command, task_cancel.clone());

    let output = match ctx.timeout {
        None => run.await,
        Some(limit) => {
            tokio::pin!(run);
            // Polling the runner first means an exit that is already observable
            // when the timer fires still counts as an exit. Once the timer
            // branch is taken the kill has been issued, so the task is a timeout.
            tokio::select! {
                biased;
                output = &mut run => output,
                _ = tokio::time::sleep(limit) => {
                    tracing::debug!(context = %target, "timed out after {limit:?}");
                    task_cancel.cancel();
                    let mut output = run.await;
                    output.error = Some(ExecError::Timeout(limit));
                    output
                }
            }
        }
    };

    ctx.console.complete(&target, &output, ctx.filter.as_ref());
    tracing::debug!(context = %target, ok = output.is_success(), "completed");
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::console::BufferSink;
    use crate::exec::runner::{CONTEXT_PLACEHOLDER, Invocation, ProcessRunner};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[derive(Default)]
    struct Stats {
        active: AtomicUsize,
        peak: AtomicUsize,
        launched: AtomicUsize,
    }

    #[derive(Clone)]
    struct FakeRunner {
        stats: Arc<Stats>,
        delay: Duration,
        slow: Option<(String, Duration)>,
        failing: Option<String>,
    }

    impl FakeRunner {
        fn new(delay: Duration) -> Self {
            Self {
                stats: Arc::new(Stats::default()),
                delay,
                slow: None,
                failing: None,
            }
        }
    }

    impl TaskRunner for FakeRunner {
        async fn run(&self, target: &str, _command: &CommandSpec, cancel: CancellationToken) -> TaskOutput {
            self.stats.launched.fetch_add(1, Ordering::SeqCst);
            let now = self.stats.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.stats.peak.fetch_max(now, Ordering::SeqCst);

            let delay = match &self.slow {
                Some((name, delay)) if name == target => *delay,
                _ => self.delay,
            };
            let finished = tokio::select! {
                _ = tokio::time::sleep(delay) => true,
                _ = cancel.cancelled() => false,
            };
            self.stats.active.fetch_sub(1, Ordering::SeqCst);

            if !finished {
                return TaskOutput {
                    lines: vec![format!("{target} partial")],
                    error: Some(ExecError::Cancelled),
                };
            }
            if self.failing.as_deref() == Some(target) {
                return TaskOutput {
                    lines: vec!["boom".to_string()],
                    error: Some(ExecError::NonZeroExit { code: 1 }),
                };
            }
            TaskOutput {
                lines: vec![format!("hello from {target}"), format!("NAME {target}-pod Running")],
                error: None,
            }
        }
    }

    fn targets(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("ctx-{i:02}")).collect()
    }

    fn get_pods() -> CommandSpec {
        CommandSpec::new(vec!["get".to_string(), "pods".to_string()])
    }

    async fn run_batch<R: TaskRunner>(
        runner: R,
        batch: Batch,
    ) -> (Result<BatchSummary, GuardError>, BufferSink) {
        let sink = BufferSink::default();
        let result = Dispatcher::new(runner)
            .run(batch, Box::new(sink.clone()), Trigger::none(), CancellationToken::new())
            .await;
        (result, sink)
    }

    #[test]
    fn test_concurrency_limit_defaults() {
        assert_eq!(BatchConfig::default().concurrency_limit(), DEFAULT_PARALLEL);
        let zero = BatchConfig {
            parallel: Some(0),
            ..Default::default()
        };
        assert_eq!(zero.concurrency_limit(), DEFAULT_PARALLEL);
        let five = BatchConfig {
            parallel: Some(5),
            ..Default::default()
        };
        assert_eq!(five.concurrency_limit(), 5);
    }

    #[test]
    fn test_zero_timeout_means_none() {
        let config = BatchConfig {
            timeout: Some(Duration::ZERO),
            ..Default::default()
        };
        assert_eq!(config.task_timeout(), None);
    }

    #[test]
    fn test_batch_drops_duplicate_targets() {
        let batch = Batch::new(
            vec!["b".to_string(), "a".to_string(), "b".to_string()],
            get_pods(),
            BatchConfig::default(),
        );
        assert_eq!(batch.targets(), ["b".to_string(), "a".to_string()]);
    }

    #[tokio::test]
    async fn test_never_more_than_limit_running() {
        let runner = FakeRunner::new(Duration::from_millis(30));
        let stats = runner.stats.clone();
        let config = BatchConfig {
            parallel: Some(3),
            ..Default::default()
        };

        let (result, _) = run_batch(runner, Batch::new(targets(12), get_pods(), config)).await;
        let summary = result.unwrap();

        assert_eq!(summary.succeeded, 12);
        assert_eq!(stats.launched.load(Ordering::SeqCst), 12);
        let peak = stats.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency {peak} exceeded limit");
        assert!(peak >= 1);
    }

    #[tokio::test]
    async fn test_every_target_completed_with_one_block() {
        let runner = FakeRunner::new(Duration::from_millis(5));
        let (result, sink) =
            run_batch(runner, Batch::new(targets(7), get_pods(), BatchConfig::default())).await;
        let summary = result.unwrap();

        assert_eq!(summary.total, 7);
        assert_eq!(summary.snapshot.completed, 7);
        assert_eq!(summary.snapshot.queued, 0);
        assert_eq!(summary.snapshot.running, 0);

        let out = sink.out.contents();
        for target in targets(7) {
            assert_eq!(out.matches(&format!("Context: {target}\n")).count(), 1);
            assert!(out.contains(&format!("Context: {target}\n  hello from {target}\n")));
        }
    }

    #[tokio::test]
    async fn test_write_guard_vetoes_whole_batch() {
        let runner = FakeRunner::new(Duration::from_millis(1));
        let stats = runner.stats.clone();
        let delete = CommandSpec::new(vec!["delete".to_string(), "pod".to_string(), "web-0".to_string()]);

        let (result, sink) =
            run_batch(runner, Batch::new(targets(3), delete.clone(), BatchConfig::default())).await;

        assert!(matches!(result, Err(GuardError::WriteWithoutForce { .. })));
        assert_eq!(stats.launched.load(Ordering::SeqCst), 0);
        assert!(sink.out.contents().is_empty());

        let runner = FakeRunner::new(Duration::from_millis(1));
        let stats = runner.stats.clone();
        let forced = BatchConfig {
            force: true,
            ..Default::default()
        };
        let (result, _) = run_batch(runner, Batch::new(targets(3), delete, forced)).await;

        assert_eq!(result.unwrap().succeeded, 3);
        assert_eq!(stats.launched.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_task_failure_does_not_fail_batch() {
        let mut runner = FakeRunner::new(Duration::from_millis(5));
        runner.failing = Some("ctx-01".to_string());

        let (result, sink) =
            run_batch(runner, Batch::new(targets(3), get_pods(), BatchConfig::default())).await;
        let summary = result.unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.succeeded, 2);
        assert!(sink.out.contents().contains("Context: ctx-01\n  boom\n"));
        assert_eq!(sink.err.contents(), "  Error: exit status 1\n");
    }

    #[tokio::test]
    async fn test_timeout_only_affects_slow_task() {
        let mut runner = FakeRunner::new(Duration::from_millis(10));
        runner.slow = Some(("ctx-00".to_string(), Duration::from_secs(10)));
        let config = BatchConfig {
            timeout: Some(Duration::from_millis(200)),
            ..Default::default()
        };

        let started = Instant::now();
        let (result, sink) = run_batch(runner, Batch::new(targets(3), get_pods(), config)).await;
        let summary = result.unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(summary.timed_out, 1);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.snapshot.completed, 3);
        assert_eq!(sink.err.contents(), "  Timeout after 200ms\n");
        assert!(sink.out.contents().contains("Context: ctx-00\n  ctx-00 partial\n"));
    }

    #[tokio::test]
    async fn test_grep_filters_printed_lines() {
        let runner = FakeRunner::new(Duration::from_millis(1));
        let config = BatchConfig {
            grep: Some("Pending|Running".to_string()),
            ..Default::default()
        };

        let (result, sink) = run_batch(runner, Batch::new(targets(2), get_pods(), config)).await;
        result.unwrap();

        let out = sink.out.contents();
        assert!(out.contains("Context: ctx-00\n  NAME ctx-00-pod Running\n"));
        assert!(!out.contains("hello from"));
    }

    #[tokio::test]
    async fn test_outer_cancellation_stops_everything() {
        let runner = FakeRunner::new(Duration::from_secs(10));
        let stats = runner.stats.clone();
        let config = BatchConfig {
            parallel: Some(1),
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let sink = BufferSink::default();
        let started = Instant::now();
        let summary = Dispatcher::new(runner)
            .run(
                Batch::new(targets(3), get_pods(), config),
                Box::new(sink.clone()),
                Trigger::none(),
                cancel,
            )
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(summary.cancelled, 3);
        assert_eq!(summary.snapshot.completed, 3);
        // only the first context ever got a slot
        assert_eq!(stats.launched.load(Ordering::SeqCst), 1);
        assert_eq!(sink.out.contents().matches("Context: ").count(), 3);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let runner = FakeRunner::new(Duration::from_millis(1));
        let (result, sink) =
            run_batch(runner, Batch::new(Vec::new(), get_pods(), BatchConfig::default())).await;
        let summary = result.unwrap();
        assert_eq!(summary.total, 0);
        assert!(sink.out.contents().is_empty());
    }

    #[tokio::test]
    async fn test_real_process_timeout() {
        let script = "case \"$0\" in slow) exec sleep 10 ;; *) echo ok-$0 ;; esac";
        let runner = ProcessRunner::new(Invocation::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            script.to_string(),
            CONTEXT_PLACEHOLDER.to_string(),
        ]));
        let config = BatchConfig {
            timeout: Some(Duration::from_secs(1)),
            ..Default::default()
        };
        let names = vec!["slow".to_string(), "fast-a".to_string(), "fast-b".to_string()];

        let started = Instant::now();
        let (result, sink) =
            run_batch(runner, Batch::new(names, CommandSpec::default(), config)).await;
        let summary = result.unwrap();

        assert!(started.elapsed() < Duration::from_secs(8));
        assert_eq!(summary.timed_out, 1);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.snapshot.completed, 3);

        let out = sink.out.contents();
        assert!(out.contains("Context: fast-a\n  ok-fast-a\n"));
        assert!(out.contains("Context: fast-b\n  ok-fast-b\n"));
        assert!(out.contains("Context: slow\n"));
        assert_eq!(sink.err.contents(), "  Timeout after 1s\n");
    }

    #[tokio::test]
    async fn test_timeout_with_leaked_pipe_returns_promptly() {
        // sh exits at once, but the background sleep holds stdout open
        let runner = ProcessRunner::new(Invocation::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            "sleep 8 & echo hi".to_string(),
        ]));
        let config = BatchConfig {
            timeout: Some(Duration::from_millis(500)),
            ..Default::default()
        };

        let started = Instant::now();
        let (result, sink) = run_batch(
            runner,
            Batch::new(vec!["dev".to_string()], CommandSpec::default(), config),
        )
        .await;
        let summary = result.unwrap();

        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(summary.timed_out, 1);
        assert_eq!(summary.snapshot.completed, 1);
        assert!(sink.out.contents().contains("Context: dev\n  hi\n"));
        assert_eq!(sink.err.contents(), "  Timeout after 500ms\n");
    }

    #[tokio::test]
    async fn test_progress_report_during_batch() {
        let runner = FakeRunner::new(Duration::from_millis(300));
        let config = BatchConfig {
            parallel: Some(2),
            ..Default::default()
        };
        let (handle, trigger) = Trigger::channel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            handle.fire();
        });

        let sink = BufferSink::default();
        let summary = tokio::time::timeout(
            Duration::from_secs(5),
            Dispatcher::new(runner).run(
                Batch::new(targets(4), get_pods(), config),
                Box::new(sink.clone()),
                trigger,
                CancellationToken::new(),
            ),
        )
        .await
        .expect("batch should not deadlock")
        .unwrap();

        assert_eq!(summary.succeeded, 4);
        let out = sink.out.contents();
        assert!(out.contains("--- Progress Status ---"));
        assert!(out.contains("Total: 4, "));
        assert!(out.contains("Currently running:"));
        for target in targets(4) {
            assert_eq!(out.matches(&format!("Context: {target}\n")).count(), 1);
        }
    }
}
