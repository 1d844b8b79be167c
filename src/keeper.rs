use anyhow::Context;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use sysinfo::System;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::time::{Duration, timeout};
use tracing::{debug, info};

use crate::config::{Behavior, ENV_CONF, ENV_HOME, KeeperContext};
use crate::error::KeeperError;
use crate::process;
use crate::shutdown::ShutdownCoordinator;
use crate::stdio::{KeeperStdErr, KeeperStdOut};

mod pidfile;

/// Supervises one child process per `run` call and keeps the pid-file
/// record that lets a later host invocation rediscover it.
pub struct ProcessKeeper {
    ctx: KeeperContext,
    out: KeeperStdOut,
    err: KeeperStdErr,
    shutdown: Arc<ShutdownCoordinator>,
    system: Mutex<System>,
}

impl ProcessKeeper {
    /// Create a keeper whose informational output goes to the host's
    /// standard streams.
    pub fn new(ctx: KeeperContext) -> Self {
        Self::with_sinks(ctx, KeeperStdOut::stdout(), KeeperStdErr::stderr())
    }

    /// Create a keeper with caller-supplied output sinks.
    pub fn with_sinks(ctx: KeeperContext, out: KeeperStdOut, err: KeeperStdErr) -> Self {
        Self {
            ctx,
            out,
            err,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            system: Mutex::new(System::new()),
        }
    }

    /// The coordinator the host should trigger on its way out; couplings
    /// installed by `run` register against it.
    pub fn shutdown(&self) -> Arc<ShutdownCoordinator> {
        self.shutdown.clone()
    }

    pub fn context(&self) -> &KeeperContext {
        &self.ctx
    }

    /// Start `command` under `behavior`, wait according to its policy and
    /// return the child's pid.
    ///
    /// A bounded wait that expires while the child is healthy is success:
    /// the pid of the still-running child is returned. A child that exits
    /// nonzero surfaces as [`KeeperError::ProcessExit`] only after its
    /// captured output has been forwarded to the configured sinks.
    pub async fn run(&self, command: &[String], behavior: &Behavior) -> Result<u32, KeeperError> {
        let mut cmd = self.build_command(command, behavior)?;

        if self.ctx.verbose {
            self.out
                .print(&format!("Executing command line: {}\n", command.join(" ")))
                .await;
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn {}", command.join(" ")))?;
        let pid = child
            .id()
            .context("child exited before its pid could be read")?;
        info!("Spawned process {} (pid {})", command[0], pid);

        match self.supervise(&mut child, pid, behavior).await {
            Err(err) if !matches!(err, KeeperError::ProcessExit(_)) => {
                // Best-effort reclaim of a child that may still be running.
                if matches!(child.try_wait(), Ok(None)) {
                    let _ = child.start_kill();
                }
                Err(err)
            }
            verdict => verdict,
        }
    }

    fn build_command(
        &self,
        command: &[String],
        behavior: &Behavior,
    ) -> Result<Command, KeeperError> {
        let (program, args) = command
            .split_first()
            .context("cannot launch an empty command line")?;

        let mut cmd = Command::new(program);
        cmd.args(args);

        if behavior.inherit_io {
            cmd.stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit());
        } else if behavior.redirect_to_user_log {
            let log = self.open_user_log()?;
            let log_err = log.try_clone().map_err(|source| KeeperError::UserLog {
                path: self.ctx.user_log_file.clone(),
                source,
            })?;
            cmd.stdin(Stdio::null())
                .stdout(Stdio::from(log))
                .stderr(Stdio::from(log_err));
        } else {
            cmd.stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
        }

        if behavior.home_and_conf_as_env {
            self.put_if_absent(&mut cmd, ENV_HOME, &self.ctx.home);
            self.put_if_absent(&mut cmd, ENV_CONF, &self.ctx.conf_dir);
        }

        Ok(cmd)
    }

    /// Caller-supplied environment always wins; the context path is only a
    /// fallback for children that would otherwise not know the directory.
    fn put_if_absent(&self, cmd: &mut Command, name: &str, path: &Path) {
        match self.ctx.env_var(name) {
            Some(value) => {
                cmd.env(name, value);
            }
            None => {
                cmd.env(name, path.as_os_str());
            }
        }
    }

    /// Open the user log for appending, creating it and its parent
    /// directories if absent. Existing content is never truncated.
    fn open_user_log(&self) -> Result<std::fs::File, KeeperError> {
        let path = &self.ctx.user_log_file;
        let map = |source: std::io::Error| KeeperError::UserLog {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(map)?;
        }
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(map)
    }

    async fn supervise(
        &self,
        child: &mut Child,
        pid: u32,
        behavior: &Behavior,
    ) -> Result<u32, KeeperError> {
        // The coupling installs first: a failure anywhere later in this
        // protocol must still leave the child tied to host shutdown.
        if behavior.shutdown_hook {
            self.install_termination_coupling(pid);
        }
        if behavior.store_pid {
            self.store_pid(pid)?;
        }

        let status = if behavior.blocking {
            Some(child.wait().await.context("failed waiting for child exit")?)
        } else {
            self.bounded_wait(child).await?
        };

        let Some(status) = status else {
            debug!("Process {} still running after wait, detaching", pid);
            return Ok(pid);
        };

        if !behavior.inherit_io {
            self.forward_output(child, behavior).await?;
        }

        if !status.success() {
            return Err(KeeperError::ProcessExit(exit_code(&status)));
        }
        Ok(pid)
    }

    /// Wait up to the context's start-wait budget, then report the exit
    /// status if the child is gone. `None` means it is still running.
    async fn bounded_wait(&self, child: &mut Child) -> Result<Option<ExitStatus>, KeeperError> {
        let wait = self.ctx.start_wait();
        if wait > 0 {
            if let Ok(status) = timeout(Duration::from_secs(wait), child.wait()).await {
                return Ok(Some(status.context("failed waiting for child exit")?));
            }
        }
        let status = child
            .try_wait()
            .context("failed to check child status after wait")?;
        Ok(status)
    }

    /// Drain whatever the child wrote to its captured streams and forward
    /// it, stdout before stderr, so a failing child's output reaches the
    /// caller before any verdict on its exit code.
    async fn forward_output(
        &self,
        child: &mut Child,
        behavior: &Behavior,
    ) -> Result<(), KeeperError> {
        let out = behavior
            .output_consumer
            .clone()
            .unwrap_or_else(|| self.out.clone());
        let err = behavior
            .error_consumer
            .clone()
            .unwrap_or_else(|| self.err.clone());

        if let Some(mut stdout) = child.stdout.take() {
            let mut buf = Vec::new();
            stdout
                .read_to_end(&mut buf)
                .await
                .context("failed draining child stdout")?;
            out.write_all(&buf).await;
        }
        if let Some(mut stderr) = child.stderr.take() {
            let mut buf = Vec::new();
            stderr
                .read_to_end(&mut buf)
                .await
                .context("failed draining child stderr")?;
            err.write_all(&buf).await;
        }
        Ok(())
    }

    /// Tie the child's lifetime to host shutdown: once the coordinator
    /// fires, terminate the child if it is still alive and poll until it is
    /// confirmed dead, or until the host aborts the wait.
    fn install_termination_coupling(&self, pid: u32) {
        self.shutdown.register(move |abort| async move {
            if !process::is_alive(pid) {
                return;
            }
            info!("Host shutdown: terminating supervised process {}", pid);
            process::terminate(pid);
            while process::is_alive(pid) {
                tokio::select! {
                    _ = abort.cancelled() => {
                        info!("Gave up waiting for process {} to terminate", pid);
                        break;
                    }
                    _ = tokio::time::sleep(process::POLL_INTERVAL) => {}
                }
            }
        });
    }
}

#[cfg(unix)]
fn exit_code(status: &ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(1)
}

#[cfg(not(unix))]
fn exit_code(status: &ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}
