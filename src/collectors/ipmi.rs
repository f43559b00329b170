use crate::config::Config;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tokio::time;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum SubprocessError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("failed to wait for {program}: {source}")]
    Wait {
        program: String,
        source: std::io::Error,
    },
    #[error("{program} did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },
    #[error("{program} command failed ({status}): {output}")]
    Failed {
        program: String,
        status: ExitStatus,
        output: String,
    },
}

/// Runs the configured diagnostic command and returns its captured text,
/// stderr first so tool warnings end up ahead of the report table.
pub async fn capture(cfg: &Config) -> Result<String, SubprocessError> {
    run_captured(&cfg.command, &cfg.args, cfg.timeout()).await
}

async fn run_captured(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<String, SubprocessError> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    bind_to_parent(&mut cmd);

    let start = Instant::now();
    let child = cmd.spawn().map_err(|source| SubprocessError::Spawn {
        program: program.to_string(),
        source,
    })?;

    // On timeout the wait future is dropped along with the child, which kills it.
    let output = match time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => {
            return Err(SubprocessError::Wait {
                program: program.to_string(),
                source,
            })
        }
        Err(_elapsed) => {
            warn!(program, timeout_ms = timeout.as_millis() as u64, "diagnostic command timeout");
            return Err(SubprocessError::Timeout {
                program: program.to_string(),
                timeout,
            });
        }
    };

    let mut text = String::from_utf8_lossy(&output.stderr).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stdout));

    debug!(
        program,
        status = %output.status,
        bytes = text.len(),
        latency_ms = start.elapsed().as_millis() as u64,
        "diagnostic command finished"
    );

    if !output.status.success() {
        return Err(SubprocessError::Failed {
            program: program.to_string(),
            status: output.status,
            output: text.trim().to_string(),
        });
    }

    Ok(text)
}

#[cfg(target_os = "linux")]
fn bind_to_parent(cmd: &mut Command) {
    // SAFETY: prctl is async-signal-safe and touches no parent state.
    unsafe {
        cmd.pre_exec(|| {
            if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL as libc::c_ulong) == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(not(target_os = "linux"))]
fn bind_to_parent(_cmd: &mut Command) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str, timeout_ms: u64) -> Config {
        Config {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            timeout_ms,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn captures_stderr_before_stdout() {
        let cfg = shell(
            "echo 'ID,Name,Type,State,Reading,Units,Event'; echo 'warning: sdr cache' >&2",
            5_000,
        );
        let text = capture(&cfg).await.expect("command succeeds");

        assert_eq!(
            text,
            "warning: sdr cache\nID,Name,Type,State,Reading,Units,Event\n"
        );
    }

    #[tokio::test]
    async fn non_zero_exit_is_failure() {
        let cfg = shell("echo 'could not connect' >&2; exit 1", 5_000);
        let err = capture(&cfg).await.expect_err("exit 1 must fail");

        match err {
            SubprocessError::Failed { status, output, .. } => {
                assert_eq!(status.code(), Some(1));
                assert_eq!(output, "could not connect");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let cfg = Config {
            command: "/nonexistent/ipmimonitoring".to_string(),
            ..Config::default()
        };
        let err = capture(&cfg).await.expect_err("program does not exist");
        assert!(matches!(err, SubprocessError::Spawn { .. }));
    }

    #[tokio::test]
    async fn stalled_command_times_out() {
        let cfg = shell("sleep 10", 200);
        let start = Instant::now();
        let err = capture(&cfg).await.expect_err("sleep must be cut short");

        assert!(matches!(err, SubprocessError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
