use derive_builder::Builder;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::stdio::{KeeperStdErr, KeeperStdOut};

/// Environment variable injected into the child to point at the host
/// application's home directory.
pub const ENV_HOME: &str = "PROCKEEPER_HOME";

/// Environment variable injected into the child to point at the host
/// application's configuration directory.
pub const ENV_CONF: &str = "PROCKEEPER_CONF";

/// Bounded-wait budget in whole seconds for non-blocking runs. Zero means
/// the child's liveness is checked immediately after start.
pub const ENV_START_WAIT: &str = "PROCKEEPER_START_WAIT";

/// Per-run supervision policy. Built once, read-only once handed to `run`.
#[derive(Clone, Default, Builder)]
#[builder(setter(into, strip_option), default)]
pub struct Behavior {
    /// Child shares the supervisor's standard streams; nothing is captured.
    pub inherit_io: bool,
    /// Wait indefinitely for child exit instead of the bounded wait.
    pub blocking: bool,
    /// Append child stdout/stderr to the user log file instead of capturing.
    pub redirect_to_user_log: bool,
    /// Persist the child's pid to the pid file after a successful start.
    pub store_pid: bool,
    /// Inject home/conf environment variables unless the caller already
    /// defined them.
    pub home_and_conf_as_env: bool,
    /// Couple the child's lifetime to the host's shutdown sequence.
    pub shutdown_hook: bool,
    /// Alternate sink for captured stdout (default: the keeper's own).
    pub output_consumer: Option<KeeperStdOut>,
    /// Alternate sink for captured stderr (default: the keeper's own).
    pub error_consumer: Option<KeeperStdErr>,
}

impl Behavior {
    pub fn builder() -> BehaviorBuilder {
        BehaviorBuilder::default()
    }
}

/// Resolved paths and settings handed to the keeper by the host application.
///
/// The environment snapshot backs `env_var`/`env_int` lookups and defaults
/// to the host process environment at build time, so the keeper reasons
/// about the same variables the child will inherit.
#[derive(Debug, Clone, Builder)]
#[builder(setter(into, strip_option))]
pub struct KeeperContext {
    pub home: PathBuf,
    pub conf_dir: PathBuf,
    pub pid_file: PathBuf,
    pub user_log_file: PathBuf,
    #[builder(default)]
    pub verbose: bool,
    #[builder(default = "std::env::vars().collect()")]
    #[builder(setter(custom))]
    pub env: HashMap<String, String>,
}

impl KeeperContext {
    pub fn builder() -> KeeperContextBuilder {
        KeeperContextBuilder::default()
    }

    pub fn env_var(&self, name: &str) -> Option<&str> {
        self.env.get(name).map(String::as_str)
    }

    /// Integer environment lookup, falling back to `default` when the
    /// variable is absent or not a number.
    pub fn env_int(&self, name: &str, default: u64) -> u64 {
        self.env_var(name)
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Bounded-wait budget for non-blocking runs, in whole seconds.
    pub fn start_wait(&self) -> u64 {
        self.env_int(ENV_START_WAIT, 0)
    }
}

impl KeeperContextBuilder {
    /// Override or add one environment entry on top of the captured
    /// snapshot.
    pub fn env<T: ToString>(&mut self, key: T, value: T) -> &mut Self {
        let env = self
            .env
            .get_or_insert_with(|| std::env::vars().collect());
        env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn env_multi<T: ToString, I: IntoIterator<Item = (T, T)>>(&mut self, iter: I) -> &mut Self {
        let env = self
            .env
            .get_or_insert_with(|| std::env::vars().collect());
        for (key, value) in iter {
            env.insert(key.to_string(), value.to_string());
        }
        self
    }
}
