//! Bounded shell command execution for spin-down actuation.
//!
//! Commands run through `sh -c` with extra environment bindings and a hard
//! timeout. Actuation executes on the scheduler's loop thread, so the
//! timeout is what keeps a stalled command from wedging every other timer
//! indefinitely.

use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Hard limit on command duration.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(5 * 60);

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Distinguishable command failures.
#[derive(Debug)]
pub enum ShellError {
    /// The command did not finish in time; holds whatever output it
    /// produced before being killed.
    Timeout { output: String },
    /// Non-zero exit. `code` is `None` when the command died to a signal.
    ExitCode { code: Option<i32>, output: String },
    /// The command could not be spawned or waited on at all.
    Io(std::io::Error),
}

impl fmt::Display for ShellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { .. } => write!(f, "command timed out"),
            Self::ExitCode { code: Some(code), .. } => {
                write!(f, "command failed with exit code {code}")
            }
            Self::ExitCode { code: None, .. } => write!(f, "command killed by signal"),
            Self::Io(error) => write!(f, "command could not be run: {error}"),
        }
    }
}

impl std::error::Error for ShellError {}

/// Run `command` through `sh -c` with [`COMMAND_TIMEOUT`].
pub fn run(command: &str, env: &HashMap<String, String>) -> Result<(), ShellError> {
    run_with_timeout(command, env, COMMAND_TIMEOUT)
}

/// Run `command` through `sh -c`, with `env` added to the inherited
/// environment, capturing combined stdout/stderr.
pub fn run_with_timeout(
    command: &str,
    env: &HashMap<String, String>,
    timeout: Duration,
) -> Result<(), ShellError> {
    let mut shell = Command::new("sh");
    shell
        .arg("-c")
        .arg(command)
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // Run the command in its own process group so the timeout can take
        // down grandchildren that would otherwise keep the pipes open.
        shell.process_group(0);
    }
    let mut child = shell.spawn().map_err(ShellError::Io)?;

    // Drain pipes on helper threads so a chatty command cannot deadlock on a
    // full pipe while we wait for it.
    let stdout_reader = spawn_reader(child.stdout.take());
    let stderr_reader = spawn_reader(child.stderr.take());

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                let output = join_output(stdout_reader, stderr_reader);
                if status.success() {
                    return Ok(());
                }
                return Err(ShellError::ExitCode {
                    code: status.code(),
                    output,
                });
            }
            Ok(None) => {
                if Instant::now() >= deadline {
                    kill(&mut child);
                    return Err(ShellError::Timeout {
                        output: join_output(stdout_reader, stderr_reader),
                    });
                }
                std::thread::sleep(WAIT_POLL_INTERVAL);
            }
            Err(error) => {
                kill(&mut child);
                let _ = join_output(stdout_reader, stderr_reader);
                return Err(ShellError::Io(error));
            }
        }
    }
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut output = String::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_string(&mut output);
        }
        output
    })
}

fn join_output(stdout: JoinHandle<String>, stderr: JoinHandle<String>) -> String {
    let mut output = stdout.join().unwrap_or_default();
    output.push_str(&stderr.join().unwrap_or_default());
    output
}

#[cfg(unix)]
fn kill(child: &mut Child) {
    // SAFETY: plain syscall; a negative pid signals the whole process group.
    unsafe {
        libc::kill(-(child.id() as i32), libc::SIGKILL);
    }
    let _ = child.wait();
}

#[cfg(not(unix))]
fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
