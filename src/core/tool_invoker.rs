//! Tool Invoker (C9): the single choke point for every external process
//! the CLI spawns (`go`, `buf`, `docker`, `helm`, `kubectl`, the web
//! framework's build command, ...).
//!
//! Grounded on the teacher's container-invocation shape: `std::process`
//! with piped stdio, a wall-clock deadline enforced by polling
//! `try_wait`, and graceful-then-hard termination on timeout.

use crate::core::error::EggError;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a single invocation: non-zero exit is not itself an
/// `EggError` — it's surfaced here and the caller maps it into the
/// taxonomy (spec §4.9).
#[derive(Debug, Clone)]
pub struct InvocationResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl InvocationResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last `n` lines of stderr, used by `GenerationFailed` (spec §4.5).
    pub fn stderr_tail(&self, n: usize) -> String {
        let lines: Vec<&str> = self.stderr.lines().collect();
        let start = lines.len().saturating_sub(n);
        lines[start..].join("\n")
    }
}

const GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Drains one pipe line-by-line on a dedicated thread so stdout and stderr
/// are read concurrently instead of one after the other.
fn spawn_line_reader<R>(pipe: R, verbose: bool, is_stderr: bool) -> thread::JoinHandle<String>
where
    R: std::io::Read + Send + 'static,
{
    thread::spawn(move || {
        let reader = BufReader::new(pipe);
        let mut buf = String::new();
        for line in reader.lines().map_while(Result::ok) {
            if verbose {
                if is_stderr {
                    eprintln!("{line}");
                } else {
                    println!("{line}");
                }
            }
            buf.push_str(&line);
            buf.push('\n');
        }
        buf
    })
}

fn join_line_reader(handle: Option<thread::JoinHandle<String>>) -> String {
    match handle {
        Some(h) => h.join().unwrap_or_default(),
        None => String::new(),
    }
}

/// Uniform subprocess execution: PATH lookup, environment overlay,
/// streaming output, exit-code-to-result mapping, deadline + grace-period
/// cancellation.
pub struct ToolInvoker {
    verbose: bool,
}

impl ToolInvoker {
    pub fn new(verbose: bool) -> Self {
        ToolInvoker { verbose }
    }

    /// Resolves `tool` via `PATH` without running it.
    pub fn resolve(&self, tool: &str) -> Option<std::path::PathBuf> {
        let path_var = std::env::var_os("PATH")?;
        for dir in std::env::split_paths(&path_var) {
            let candidate = dir.join(tool);
            if candidate.is_file() {
                return Some(candidate);
            }
            #[cfg(windows)]
            {
                let exe = dir.join(format!("{tool}.exe"));
                if exe.is_file() {
                    return Some(exe);
                }
            }
        }
        None
    }

    pub fn is_available(&self, tool: &str) -> bool {
        self.resolve(tool).is_some()
    }

    /// Runs `tool` with `args` in the current directory with no extra
    /// environment, no deadline.
    pub fn run(&self, tool: &str, args: &[&str]) -> Result<InvocationResult, EggError> {
        self.run_with_env_in_dir_deadline(tool, args, &std::env::current_dir()?, &[], None)
    }

    /// Runs `tool` with an environment overlay in `dir`.
    pub fn run_with_env_in_dir(
        &self,
        tool: &str,
        args: &[&str],
        dir: &Path,
        env: &[(String, String)],
    ) -> Result<InvocationResult, EggError> {
        self.run_with_env_in_dir_deadline(tool, args, dir, env, None)
    }

    /// Runs `tool` bounded by `deadline`; on expiry sends a graceful
    /// termination signal, waits `GRACE_PERIOD`, then hard-kills.
    pub fn run_with_env_in_dir_deadline(
        &self,
        tool: &str,
        args: &[&str],
        dir: &Path,
        env: &[(String, String)],
        deadline: Option<Duration>,
    ) -> Result<InvocationResult, EggError> {
        let resolved = self
            .resolve(tool)
            .ok_or_else(|| EggError::ToolchainMissing(vec![tool.to_string()]))?;

        if self.verbose {
            eprintln!(
                "[egg] running: {} {} (cwd={})",
                resolved.display(),
                args.join(" "),
                dir.display()
            );
        }

        let mut cmd = Command::new(&resolved);
        cmd.args(args)
            .current_dir(dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (k, v) in env {
            cmd.env(k, v);
        }

        let mut child = cmd.spawn().map_err(EggError::Io)?;

        // Stdout and stderr are drained on their own threads so neither pipe
        // can fill and block the child while the other is being read; the
        // deadline loop below runs concurrently with both.
        let stdout_handle = child.stdout.take().map(|stdout| spawn_line_reader(stdout, self.verbose, false));
        let stderr_handle = child.stderr.take().map(|stderr| spawn_line_reader(stderr, self.verbose, true));

        let start = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait().map_err(EggError::Io)? {
                break Some(status);
            }
            if let Some(deadline) = deadline {
                if start.elapsed() >= deadline {
                    let _ = child.kill();
                    thread::sleep(GRACE_PERIOD);
                    let _ = child.kill();
                    child.wait().map_err(EggError::Io)?;
                    break None;
                }
            }
            thread::sleep(Duration::from_millis(20));
        };

        let stdout_buf = join_line_reader(stdout_handle);
        let stderr_buf = join_line_reader(stderr_handle);

        let exit_code = match status {
            Some(status) => status.code().unwrap_or(-1),
            None => -1,
        };
        Ok(InvocationResult { exit_code, stdout: stdout_buf, stderr: stderr_buf })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_a_tool_known_to_exist_on_test_hosts() {
        let invoker = ToolInvoker::new(false);
        assert!(invoker.is_available("sh") || invoker.is_available("cmd"));
    }

    #[test]
    fn missing_tool_resolves_to_none() {
        let invoker = ToolInvoker::new(false);
        assert!(!invoker.is_available("this-tool-does-not-exist-anywhere-xyz"));
    }

    #[test]
    fn run_captures_stdout_and_exit_code() {
        let invoker = ToolInvoker::new(false);
        let dir = std::env::current_dir().unwrap();
        let result = invoker
            .run_with_env_in_dir("sh", &["-c", "echo hello"], &dir, &[])
            .unwrap();
        assert!(result.success());
        assert!(result.stdout.contains("hello"));
    }

    #[test]
    fn non_zero_exit_is_not_an_error() {
        let invoker = ToolInvoker::new(false);
        let dir = std::env::current_dir().unwrap();
        let result = invoker
            .run_with_env_in_dir("sh", &["-c", "exit 3"], &dir, &[])
            .unwrap();
        assert!(!result.success());
        assert_eq!(result.exit_code, 3);
    }
}
