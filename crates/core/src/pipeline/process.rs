use std::fs;
use std::io::{self, PipeReader, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::warn;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// How long to keep reading output after the process has ended.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// An external program invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new() }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Split a configured flag string on whitespace and append the pieces.
    pub fn flags(self, flags: &str) -> Self {
        self.args(flags.split_whitespace())
    }
}

impl std::fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.program)?;
        for a in &self.args {
            write!(f, " {a}")?;
        }
        Ok(())
    }
}

/// How a phase's external process ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PhaseOutcome {
    Succeeded,
    /// Non-zero exit; `None` when the process was ended by a signal.
    Failed { exit_code: Option<i32> },
    TimedOut { limit_ms: u64 },
    SpawnFailed { message: String },
}

impl PhaseOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PhaseOutcome::Succeeded)
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            PhaseOutcome::Succeeded => Some(0),
            PhaseOutcome::Failed { exit_code } => *exit_code,
            PhaseOutcome::TimedOut { .. } | PhaseOutcome::SpawnFailed { .. } => None,
        }
    }
}

/// Combined stdout/stderr of a finished (or killed) process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub outcome: PhaseOutcome,
    pub output: String,
}

/// Run `command` in `cwd`, killing it (and everything it forked) once `limit` elapses.
///
/// stdout and stderr share one pipe so the output keeps its interleaving. A
/// reader thread stores the first `max_output` bytes and discards the rest,
/// so a chatty child neither blocks nor grows memory or disk use. The stored
/// bytes are also written to `capture`.
pub fn run_with_deadline(
    command: &ToolCommand,
    cwd: &Path,
    capture: &Path,
    limit: Duration,
    max_output: usize,
) -> ProcessOutput {
    let (mut child, reader) = match spawn_piped(command, cwd) {
        Ok(spawned) => spawned,
        Err(e) => {
            let message = format!("failed to spawn {}: {e}", command.program);
            warn!(%message, "phase process did not start");
            return ProcessOutput { outcome: PhaseOutcome::SpawnFailed { message: message.clone() }, output: message };
        }
    };

    let sink = Arc::new(Mutex::new(CappedBuffer::new(max_output)));
    let drain = {
        let sink = Arc::clone(&sink);
        thread::spawn(move || drain_into(reader, &sink))
    };

    let start = Instant::now();
    let outcome = loop {
        match child.try_wait() {
            Ok(Some(status)) if status.success() => break PhaseOutcome::Succeeded,
            Ok(Some(status)) => break PhaseOutcome::Failed { exit_code: status.code() },
            Ok(None) => {
                if start.elapsed() >= limit {
                    kill_tree(&mut child);
                    let _ = child.wait();
                    warn!(program = %command.program, limit_ms = limit.as_millis() as u64, "killed after deadline");
                    break PhaseOutcome::TimedOut { limit_ms: limit.as_millis() as u64 };
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                kill_tree(&mut child);
                let _ = child.wait();
                break PhaseOutcome::SpawnFailed { message: format!("failed to wait for {}: {e}", command.program) };
            }
        }
    };
    // Background children of a finished process would otherwise keep the pipe open.
    kill_group(&child);

    let drain_started = Instant::now();
    while !drain.is_finished() && drain_started.elapsed() < DRAIN_GRACE {
        thread::sleep(POLL_INTERVAL);
    }
    if !drain.is_finished() {
        warn!(program = %command.program, "output pipe still open after exit; detaching reader");
    }

    let captured = std::mem::take(&mut *sink.lock().unwrap_or_else(PoisonError::into_inner));
    if let Err(e) = fs::write(capture, &captured.data) {
        warn!(path = %capture.display(), error = %e, "failed to write capture file");
    }
    ProcessOutput { outcome, output: captured.into_text() }
}

fn spawn_piped(command: &ToolCommand, cwd: &Path) -> io::Result<(Child, PipeReader)> {
    let (reader, writer) = io::pipe()?;
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(writer.try_clone()?)
        .stderr(writer);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    let child = cmd.spawn()?;
    // `cmd` holds the write ends; the reader sees EOF only once they are closed.
    drop(cmd);
    Ok((child, reader))
}

fn drain_into(mut reader: PipeReader, sink: &Mutex<CappedBuffer>) {
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => sink.lock().unwrap_or_else(PoisonError::into_inner).push(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(error = %e, "failed to read process output");
                break;
            }
        }
    }
}

/// First `max` bytes of a stream plus the total length seen.
#[derive(Debug, Default)]
struct CappedBuffer {
    data: Vec<u8>,
    total: u64,
    max: usize,
}

impl CappedBuffer {
    fn new(max: usize) -> Self {
        Self { data: Vec::new(), total: 0, max }
    }

    fn push(&mut self, chunk: &[u8]) {
        self.total += chunk.len() as u64;
        let room = self.max.saturating_sub(self.data.len());
        self.data.extend_from_slice(&chunk[..room.min(chunk.len())]);
    }

    fn into_text(self) -> String {
        let mut text = String::from_utf8_lossy(&self.data).into_owned();
        if self.total > self.max as u64 {
            if !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&format!("[output truncated after {} of {} bytes]\n", self.max, self.total));
        }
        text
    }
}

fn kill_tree(child: &mut Child) {
    kill_group(child);
    let _ = child.kill();
}

/// SIGKILL the process group led by `child`.
#[cfg(unix)]
fn kill_group(child: &Child) {
    let Ok(pgid) = libc::pid_t::try_from(child.id()) else { return };
    // SAFETY: killpg takes plain integers; a group that is already gone yields ESRCH.
    unsafe {
        libc::killpg(pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_child: &Child) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> ToolCommand {
        ToolCommand::new("sh").arg("-c").arg(script)
    }

    #[test]
    fn display_joins_program_and_args() {
        let cmd = ToolCommand::new("gcc").arg("-c").flags("  -Wall   -O2 ");
        assert_eq!(cmd.to_string(), "gcc -c -Wall -O2");
    }

    #[test]
    fn captures_stdout_and_stderr_together() {
        let dir = tempfile::tempdir().unwrap();
        let out = run_with_deadline(
            &sh("echo out; echo err 1>&2"),
            dir.path(),
            &dir.path().join("log"),
            Duration::from_secs(10),
            1024,
        );
        assert_eq!(out.outcome, PhaseOutcome::Succeeded);
        assert!(out.output.contains("out"));
        assert!(out.output.contains("err"));
    }

    #[test]
    fn nonzero_exit_is_a_failure_with_code() {
        let dir = tempfile::tempdir().unwrap();
        let out =
            run_with_deadline(&sh("exit 3"), dir.path(), &dir.path().join("log"), Duration::from_secs(10), 1024);
        assert_eq!(out.outcome, PhaseOutcome::Failed { exit_code: Some(3) });
        assert_eq!(out.outcome.exit_code(), Some(3));
    }

    #[test]
    fn hanging_process_is_killed_at_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let started = Instant::now();
        let out = run_with_deadline(
            &sh("sleep 30"),
            dir.path(),
            &dir.path().join("log"),
            Duration::from_millis(200),
            1024,
        );
        assert_eq!(out.outcome, PhaseOutcome::TimedOut { limit_ms: 200 });
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn missing_program_is_reported_not_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let out = run_with_deadline(
            &ToolCommand::new("definitely-not-a-real-compiler"),
            dir.path(),
            &dir.path().join("log"),
            Duration::from_secs(1),
            1024,
        );
        assert!(matches!(out.outcome, PhaseOutcome::SpawnFailed { .. }));
        assert!(out.output.contains("definitely-not-a-real-compiler"));
    }

    #[test]
    fn long_output_is_truncated_with_marker() {
        let dir = tempfile::tempdir().unwrap();
        let out = run_with_deadline(
            &sh("i=0; while [ $i -lt 200 ]; do echo 0123456789; i=$((i+1)); done"),
            dir.path(),
            &dir.path().join("log"),
            Duration::from_secs(10),
            64,
        );
        assert!(out.output.contains("[output truncated after 64 of 2200 bytes]"));
        assert_eq!(fs::metadata(dir.path().join("log")).unwrap().len(), 64);
    }

    #[test]
    fn endless_output_is_bounded_in_memory_and_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("log");
        let out = run_with_deadline(&ToolCommand::new("yes"), dir.path(), &log, Duration::from_secs(1), 64);

        assert_eq!(out.outcome, PhaseOutcome::TimedOut { limit_ms: 1000 });
        assert!(out.output.starts_with("y\ny\n"));
        assert!(out.output.contains("[output truncated after 64 of "));
        assert!(out.output.len() < 200, "stored {} bytes", out.output.len());
        assert_eq!(fs::metadata(&log).unwrap().len(), 64);
    }

    #[test]
    fn forked_children_die_with_the_process() {
        let dir = tempfile::tempdir().unwrap();
        let out = run_with_deadline(
            &sh("(while true; do echo x >> bg.txt; sleep 0.02; done) & sleep 30"),
            dir.path(),
            &dir.path().join("log"),
            Duration::from_millis(300),
            1024,
        );
        assert_eq!(out.outcome, PhaseOutcome::TimedOut { limit_ms: 300 });

        let bg = dir.path().join("bg.txt");
        let size = || fs::metadata(&bg).map(|m| m.len()).unwrap_or(0);
        let before = size();
        thread::sleep(Duration::from_millis(300));
        assert_eq!(size(), before, "background writer still running");
    }

    #[test]
    fn capped_buffer_counts_what_it_drops() {
        let mut buf = CappedBuffer::new(4);
        buf.push(b"abc");
        buf.push(b"defg");
        assert_eq!(buf.data, b"abcd");
        assert_eq!(buf.total, 7);
        assert_eq!(buf.into_text(), "abcd\n[output truncated after 4 of 7 bytes]\n");
    }
}
