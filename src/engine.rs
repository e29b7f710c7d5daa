//! Engine entry points and the builder that configures them.
//!
//! An [`Engine`] is a scheduler plus resolved defaults. It owns no threads
//! and no global state; cloning it is cheap and every clone posts to the
//! same scheduler.
//!
//! ```ignore
//! let engine = EngineBuilder::new()
//!     .scheduler(Arc::new(InlineScheduler::new()))
//!     .default_cutoff(512)
//!     .build()?;
//! let handle = engine.spawn(Task::new("answer", |_| Ok(42)));
//! assert_eq!(handle.get()?, 42);
//! ```

use crate::algorithms::Params;
use crate::cancel::InterruptState;
use crate::config::{apply_env_overrides, EngineConfig};
use crate::cx::Cx;
use crate::error::Result;
use crate::scheduler::{InlineScheduler, Priority, QueueIndex, Scheduler, ThreadScheduler};
use crate::task::{Handle, Promise, ResultSink, Task};
use crate::types::Outcome;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// How a top-level tree is started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpawnOptions {
    /// Deadline measured from the spawn call.
    pub timeout: Option<Duration>,
    /// Attach interrupt state even without a timeout.
    pub interruptible: bool,
    /// Priority override for the root task.
    pub priority: Option<Priority>,
    /// Queue the root is posted to.
    pub queue: QueueIndex,
}

impl SpawnOptions {
    /// Options for a tree with a deadline.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::default()
        }
    }

    /// Options for a tree that can be interrupted through its handle.
    #[must_use]
    pub fn interruptible() -> Self {
        Self {
            interruptible: true,
            ..Self::default()
        }
    }

    fn interrupt_state(&self) -> Option<InterruptState> {
        match self.timeout {
            Some(timeout) => Some(InterruptState::with_timeout(timeout)),
            None if self.interruptible => Some(InterruptState::new()),
            None => None,
        }
    }
}

/// Entry point for running task trees on a scheduler.
#[derive(Clone)]
pub struct Engine {
    scheduler: Arc<dyn Scheduler>,
    config: EngineConfig,
}

impl Engine {
    /// An engine over `scheduler` with default configuration.
    ///
    /// Environment variables are not consulted; use [`EngineBuilder`] for
    /// that.
    #[must_use]
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            scheduler,
            config: EngineConfig::default(),
        }
    }

    /// An engine that runs every job on the calling thread.
    #[must_use]
    pub fn inline() -> Self {
        Self::new(Arc::new(InlineScheduler::new()))
    }

    /// Starts a builder.
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// The resolved configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The scheduler jobs are posted to.
    #[must_use]
    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    /// A fresh context for one tree: engine defaults, new counters, no
    /// interrupt state.
    #[must_use]
    pub fn cx(&self) -> Cx {
        Cx::new(Arc::clone(&self.scheduler))
            .with_priority(self.config.default_priority)
            .with_poll_interval(self.config.poll_interval)
    }

    /// Algorithm parameters seeded from the engine defaults.
    #[must_use]
    pub fn params(&self, name: impl Into<String>) -> Params {
        Params::from_config(&self.config).named(name)
    }

    /// Starts `task` as the root of a new tree.
    pub fn spawn<T: Send + 'static>(&self, task: Task<T>) -> Handle<T> {
        self.spawn_with(task, SpawnOptions::default())
    }

    /// Starts `task` with a deadline.
    ///
    /// When the deadline passes, pending joins fire with the results they
    /// hold and the handle reports whatever reached the root, or a timeout
    /// cancellation.
    pub fn spawn_with_timeout<T: Send + 'static>(&self, task: Task<T>, timeout: Duration) -> Handle<T> {
        self.spawn_with(task, SpawnOptions::with_timeout(timeout))
    }

    /// Starts `task` with explicit options.
    pub fn spawn_with<T: Send + 'static>(&self, task: Task<T>, options: SpawnOptions) -> Handle<T> {
        let mut cx = self.cx().with_queue(options.queue);
        if let Some(state) = options.interrupt_state() {
            cx = cx.with_interrupt(state);
        }
        let task = match options.priority {
            Some(priority) => task.with_priority(priority),
            None => task,
        };
        crate::tracing_compat::debug!(
            task = %task.name(),
            timeout_ms = ?options.timeout.map(|t| t.as_millis()),
            "spawning tree"
        );
        cx.spawn(task)
    }

    /// Posts `body` through the scheduler's interruptible submission.
    ///
    /// The returned state is the one the scheduler created. Interrupting it
    /// before the job starts keeps the body from running; either way the
    /// handle reports a cancellation as soon as the interrupt lands.
    ///
    /// # Errors
    ///
    /// Returns the scheduler's rejection if the job could not be posted.
    pub fn interruptible_post<T, F>(
        &self,
        name: &str,
        queue: QueueIndex,
        body: F,
    ) -> Result<(Handle<T>, InterruptState)>
    where
        T: Send + 'static,
        F: FnOnce(&Cx) -> Result<T> + Send + 'static,
    {
        let promise = Arc::new(Promise::new());
        let job_promise = Arc::clone(&promise);
        let base = self.cx().with_queue(queue);
        let job_cx = base.clone();
        let task_name: Arc<str> = Arc::from(name);
        let job_name = Arc::clone(&task_name);

        let state = self.scheduler.interruptible_post(
            Box::new(move |state: &InterruptState| {
                let cx = job_cx.with_interrupt(state.clone());
                let mut task = Task::new(job_name, body);
                task.set_result_sink(ResultSink::promise(job_promise));
                task.run(&cx);
            }),
            name,
            queue,
        )?;

        let listener_promise = Arc::clone(&promise);
        state.add_listener(move |reason: &crate::types::CancelReason| {
            listener_promise.fulfill(Outcome::Cancelled(reason.clone()));
        });

        crate::cancel::deadline::watch(&state);
        let cx = base.with_interrupt(state.clone());
        Ok((Handle::detached(task_name, promise, &cx), state))
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builder for an [`Engine`].
///
/// Resolution order: setters on this builder, then `SPLITJOIN_*`
/// environment variables, then the config file (feature `config-file`),
/// then [`EngineConfig::default`].
pub struct EngineBuilder {
    base: EngineConfig,
    scheduler: Option<Arc<dyn Scheduler>>,
    default_cutoff: Option<usize>,
    default_priority: Option<Priority>,
    poll_interval: Option<Duration>,
    thread_name_prefix: Option<String>,
    read_env: bool,
    #[cfg(feature = "config-file")]
    config_file: Option<std::path::PathBuf>,
}

impl EngineBuilder {
    /// Creates a builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: EngineConfig::default(),
            scheduler: None,
            default_cutoff: None,
            default_priority: None,
            poll_interval: None,
            thread_name_prefix: None,
            read_env: true,
            #[cfg(feature = "config-file")]
            config_file: None,
        }
    }

    /// Replaces the base configuration that file and environment values
    /// are layered onto.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.base = config;
        self
    }

    /// Sets the scheduler. Defaults to a [`ThreadScheduler`] named after
    /// the configured thread prefix.
    #[must_use]
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Sets the default cutoff.
    #[must_use]
    pub fn default_cutoff(mut self, cutoff: usize) -> Self {
        self.default_cutoff = Some(cutoff);
        self
    }

    /// Sets the default priority.
    #[must_use]
    pub fn default_priority(mut self, priority: Priority) -> Self {
        self.default_priority = Some(priority);
        self
    }

    /// Sets the wait slice used by blocking handles.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Sets the thread name prefix of the default scheduler.
    #[must_use]
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = Some(prefix.into());
        self
    }

    /// Enables or disables `SPLITJOIN_*` environment overrides.
    #[must_use]
    pub fn with_env(mut self, enabled: bool) -> Self {
        self.read_env = enabled;
        self
    }

    /// Loads a TOML config file during [`build`](Self::build).
    #[cfg(feature = "config-file")]
    #[must_use]
    pub fn config_file(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Resolves the configuration and builds the engine.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidConfig`](crate::error::ErrorKind::InvalidConfig)
    /// if a file or environment value cannot be parsed or the result is out
    /// of range.
    pub fn build(self) -> Result<Engine> {
        let mut config = self.base;

        #[cfg(feature = "config-file")]
        if let Some(path) = &self.config_file {
            let parsed = crate::config::parse_toml_file(path)?;
            crate::config::apply_toml_config(&mut config, &parsed)?;
        }

        if self.read_env {
            apply_env_overrides(&mut config)?;
        }

        if let Some(cutoff) = self.default_cutoff {
            config.default_cutoff = cutoff;
        }
        if let Some(priority) = self.default_priority {
            config.default_priority = priority;
        }
        if let Some(interval) = self.poll_interval {
            config.poll_interval = interval;
        }
        if let Some(prefix) = self.thread_name_prefix {
            config.thread_name_prefix = prefix;
        }
        config.validate()?;

        let scheduler = self
            .scheduler
            .unwrap_or_else(|| Arc::new(ThreadScheduler::new(config.thread_name_prefix.clone())));
        crate::tracing_compat::debug!(
            cutoff = config.default_cutoff,
            priority = %config.default_priority,
            "engine built"
        );
        Ok(Engine { scheduler, config })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("base", &self.base)
            .field("has_scheduler", &self.scheduler.is_some())
            .field("default_cutoff", &self.default_cutoff)
            .field("read_env", &self.read_env)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ENV_DEFAULT_CUTOFF;
    use crate::error::ErrorKind;
    use crate::test_utils::{env_lock, init_test_logging, ManualScheduler};
    use crate::types::CancelKind;

    #[test]
    fn setters_beat_environment() {
        let _guard = env_lock();
        std::env::set_var(ENV_DEFAULT_CUTOFF, "77");
        let from_env = EngineBuilder::new()
            .scheduler(Arc::new(InlineScheduler::new()))
            .build();
        let from_setter = EngineBuilder::new()
            .scheduler(Arc::new(InlineScheduler::new()))
            .default_cutoff(5)
            .build();
        let ignored = EngineBuilder::new()
            .scheduler(Arc::new(InlineScheduler::new()))
            .with_env(false)
            .build();
        std::env::remove_var(ENV_DEFAULT_CUTOFF);

        assert_eq!(from_env.unwrap().config().default_cutoff, 77);
        assert_eq!(from_setter.unwrap().config().default_cutoff, 5);
        assert_eq!(ignored.unwrap().config().default_cutoff, 2048);
    }

    #[test]
    fn zero_cutoff_fails_build() {
        let err = EngineBuilder::new()
            .with_env(false)
            .default_cutoff(0)
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }

    #[test]
    fn params_follow_engine_defaults() {
        let engine = EngineBuilder::new()
            .with_env(false)
            .scheduler(Arc::new(InlineScheduler::new()))
            .default_cutoff(16)
            .default_priority(Priority::High)
            .build()
            .unwrap();
        let params = engine.params("sort");
        assert_eq!(params.cutoff(), 16);
        assert_eq!(params.priority(), Priority::High);
        assert_eq!(params.name(), "sort");
    }

    #[test]
    fn spawn_runs_tree() {
        init_test_logging();
        let engine = Engine::inline();
        let handle = engine.spawn(Task::new("answer", |_| Ok(42)));
        assert!(handle.interrupt_state().is_none());
        assert_eq!(handle.get().unwrap(), 42);
    }

    #[test]
    fn spawn_with_timeout_attaches_deadline() {
        let engine = Engine::inline();
        let handle = engine.spawn_with_timeout(Task::new("quick", |_| Ok(1)), Duration::from_secs(60));
        assert!(handle.interrupt_state().unwrap().timeout().is_some());
        assert_eq!(handle.get().unwrap(), 1);
    }

    #[test]
    fn expired_tree_reports_timeout() {
        let engine = Engine::inline();
        let handle = engine.spawn_with_timeout(
            Task::new("late", |_| -> Result<u8> { panic!("must not run") }),
            Duration::ZERO,
        );
        match handle.join() {
            Outcome::Cancelled(reason) => assert_eq!(reason.kind, CancelKind::Timeout),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn interruptible_post_runs_body() {
        let engine = Engine::inline();
        let (handle, state) = engine
            .interruptible_post("lookup", QueueIndex::Any, |cx: &Cx| {
                cx.checkpoint()?;
                Ok("ran")
            })
            .unwrap();
        assert!(!state.is_interrupted());
        assert_eq!(handle.get().unwrap(), "ran");
    }

    #[test]
    fn interrupt_before_start_skips_body() {
        let scheduler = Arc::new(ManualScheduler::new());
        let engine = Engine::new(scheduler.clone());
        let (handle, state) = engine
            .interruptible_post("queued", QueueIndex::Any, |_| -> Result<u8> {
                panic!("must not run")
            })
            .unwrap();
        assert!(state.interrupt());
        assert!(handle.is_ready());
        assert_eq!(scheduler.drain(), 1);
        assert_eq!(handle.get().unwrap_err().kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn interruptible_post_surfaces_rejection() {
        let scheduler = Arc::new(ManualScheduler::new());
        scheduler.reject_posts(true);
        let engine = Engine::new(scheduler);
        let err = engine
            .interruptible_post("refused", QueueIndex::Any, |_| Ok(()))
            .map(|_| ())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchedulerRejected);
    }
}
