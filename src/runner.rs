use std::{
    io::{self, Read},
    ops::{Deref, DerefMut},
    path::PathBuf,
    process::{Child, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

use crossbeam::channel::{self, RecvTimeoutError, Sender};

use crate::{
    config::{Configuration, SweepConfig},
    error::ErrorKind,
};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs one trial and hands back the simulator's textual output.
pub trait Simulator: Send + Sync {
    fn run(&self, configuration: &Configuration) -> Result<String, ErrorKind>;
}

/// Invokes the external simulator as a child process per trial.
#[derive(Debug, Clone)]
pub struct ProcessSimulator {
    program: PathBuf,
    prefix_args: Vec<String>,
    cache_size_kb: usize,
    trace_file: PathBuf,
    timeout: Duration,
}

impl ProcessSimulator {
    pub fn new(
        program: impl Into<PathBuf>,
        cache_size_kb: usize,
        trace_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            prefix_args: Vec::new(),
            cache_size_kb,
            trace_file: trace_file.into(),
            timeout: Duration::from_secs(300),
        }
    }

    #[must_use]
    pub fn from_config(config: &SweepConfig) -> Self {
        Self::new(&config.simulator, config.cache_size_kb, &config.trace_file)
            .with_prefix_args(config.simulator_args.clone())
            .with_timeout(config.timeout)
    }

    /// Arguments placed before the simulator options, e.g. a script for an interpreter.
    #[must_use]
    pub fn with_prefix_args(mut self, args: Vec<String>) -> Self {
        self.prefix_args = args;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn command(&self, configuration: &Configuration) -> Command {
        let mut cmd = Command::new(&self.program);
        // Own process group, so helpers the simulator forks die with it.
        #[cfg(unix)]
        std::os::unix::process::CommandExt::process_group(&mut cmd, 0);
        cmd.args(&self.prefix_args)
            .arg("-s")
            .arg(self.cache_size_kb.to_string())
            .arg("-b")
            .arg(configuration.block_size.to_string())
            .arg("-a")
            .arg(configuration.associativity.to_string())
            .arg("-p")
            .arg(configuration.policy.as_arg())
            .arg("-t")
            .arg(&self.trace_file);
        cmd
    }

    fn describe(&self) -> String {
        self.program.display().to_string()
    }
}

/// Owns a running child and reaps it on every exit path.
struct ChildGuard(Child);

impl ChildGuard {
    /// Kills the child's whole process group, including orphaned helpers
    /// still holding the output pipes.
    fn kill_group(&mut self) {
        #[cfg(unix)]
        {
            let pgid = self.0.id() as libc::pid_t;
            // SAFETY: plain syscall, a stale group id only yields ESRCH.
            if unsafe { libc::kill(-pgid, libc::SIGKILL) } == 0 {
                return;
            }
        }
        if let Err(err) = self.0.kill() {
            log::debug!("failed to kill simulator pid {}: {err}", self.0.id());
        }
    }
}

impl Deref for ChildGuard {
    type Target = Child;
    fn deref(&self) -> &Child {
        &self.0
    }
}

impl DerefMut for ChildGuard {
    fn deref_mut(&mut self) -> &mut Child {
        &mut self.0
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Ok(None) = self.0.try_wait() {
            self.kill_group();
        }
        if let Err(err) = self.0.wait() {
            log::warn!("failed to reap simulator pid {}: {err}", self.0.id());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

type Captured = (Stream, io::Result<Vec<u8>>);

fn drain(stream: Stream, pipe: Option<impl Read + Send + 'static>, tx: &Sender<Captured>) {
    let Some(mut pipe) = pipe else {
        return;
    };
    let tx = tx.clone();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let result = pipe.read_to_end(&mut buf).map(|_| buf);
        // The receiver is gone once the trial timed out.
        let _ = tx.send((stream, result));
    });
}

impl ProcessSimulator {
    fn timed_out(&self, configuration: &Configuration, child: &mut ChildGuard) -> ErrorKind {
        log::warn!(
            "{configuration}: killing simulator pid {} after {:?}",
            child.id(),
            self.timeout
        );
        child.kill_group();
        ErrorKind::Timeout(self.timeout)
    }
}

impl Simulator for ProcessSimulator {
    fn run(&self, configuration: &Configuration) -> Result<String, ErrorKind> {
        let mut cmd = self.command(configuration);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        log::debug!("{configuration}: {cmd:?}");

        let child = cmd
            .spawn()
            .map_err(|err| ErrorKind::LaunchFailure(format!("{}: {err}", self.describe())))?;
        let mut child = ChildGuard(child);

        // Pipes are drained concurrently so a chatty simulator cannot block on a full pipe.
        let (tx, rx) = channel::bounded::<Captured>(2);
        drain(Stream::Stdout, child.stdout.take(), &tx);
        drain(Stream::Stderr, child.stderr.take(), &tx);
        drop(tx);

        // One deadline covers the process and anything keeping its pipes open.
        let deadline = Instant::now() + self.timeout;
        let status: ExitStatus = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(self.timed_out(configuration, &mut child));
                    }
                    thread::sleep(POLL_INTERVAL.min(deadline - now));
                }
                Err(err) => {
                    return Err(ErrorKind::LaunchFailure(format!(
                        "waiting on {}: {err}",
                        self.describe()
                    )));
                }
            }
        };

        let mut stdout = Ok(Vec::new());
        let mut stderr = Vec::new();
        loop {
            match rx.recv_deadline(deadline) {
                Ok((Stream::Stdout, captured)) => stdout = captured,
                Ok((Stream::Stderr, captured)) => stderr = captured.unwrap_or_default(),
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(self.timed_out(configuration, &mut child));
                }
            }
        }
        drop(child);
        let stderr = String::from_utf8_lossy(&stderr);

        match stdout {
            Ok(stdout) if status.success() || !stdout.is_empty() => {
                if !status.success() {
                    log::warn!("{configuration}: simulator exited with {status}");
                }
                Ok(String::from_utf8_lossy(&stdout).into_owned())
            }
            Ok(_) => Err(ErrorKind::LaunchFailure(format!(
                "{} exited with {status}: {}",
                self.describe(),
                stderr.trim()
            ))),
            Err(err) => Err(ErrorKind::LaunchFailure(format!(
                "reading output of {}: {err}",
                self.describe()
            ))),
        }
    }
}
