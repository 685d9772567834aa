//! Spawns a child process and exposes a line-oriented, deadline-bounded read/write contract.
//! Grounded on `monitors::play::player::PlayerBuilder::build_engine`'s spawn pattern
//! (`Command::new(path).args(...).stdout(Stdio::piped()).stdin(Stdio::piped())
//! .stderr(File::create(...)?).spawn()?`) and its `EnginePlayer::drop` teardown. The
//! `read_until` deadline is implemented with a dedicated reader thread forwarding lines over a
//! `crossbeam_channel`, so `recv_timeout` against a remaining-deadline budget gives non-blocking
//! reads without needing raw `select`/`poll` on the child's stdout fd.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver};

use crate::error::Res;

/// The pipe's lifecycle state. Once `Broken`, only `terminate()` remains valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeState {
    Running,
    Broken,
    Terminated,
}

/// Result of a `read_until` call: either the sentinel line was seen, or the deadline elapsed
/// first. Either way the lines actually read so far are returned (spec.md §4.1: "returns partial
/// lines read so far" on timeout).
pub struct ReadResult {
    pub lines: Vec<String>,
    pub timed_out: bool,
}

pub struct ProcessPipe {
    child: Child,
    stdin: ChildStdin,
    rx: Receiver<String>,
    state: PipeState,
    /// How long `terminate()` waits for a graceful exit before forcing a kill. spec.md keeps the
    /// teacher's 5s UGI-spec grace window as a *default*, made configurable (SPEC_FULL.md §9):
    /// a tournament runs orders of magnitude more shutdowns than a single GUI match.
    grace: Duration,
}

impl ProcessPipe {
    pub fn start(command: &Path, args: &[String], cwd: Option<&Path>, stderr_log: &Path, grace: Duration) -> Res<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args);
        if let Some(cwd) = cwd {
            cmd.current_dir(cwd);
        }
        let stderr = File::create(stderr_log)?;
        let mut child = cmd
            .stdout(Stdio::piped())
            .stdin(Stdio::piped())
            .stderr(stderr)
            .spawn()
            .map_err(|e| anyhow::anyhow!("failed to start '{}': {e}", command.display()))?;

        let stdin = child.stdin.take().expect("stdin was piped");
        let stdout = child.stdout.take().expect("stdout was piped");

        // Unbounded in spirit, bounded in practice: a reader that gets far ahead of the consumer
        // would mean the engine is spamming output nobody reads, which is already a protocol bug.
        let (tx, rx) = bounded(4096);
        thread::Builder::new()
            .name("engine stdout reader".to_string())
            .spawn(move || {
                let mut reader = BufReader::new(stdout);
                let mut line = String::new();
                loop {
                    line.clear();
                    match reader.read_line(&mut line) {
                        Ok(0) => break,
                        Ok(_) => {
                            let trimmed = line.trim_end_matches(['\r', '\n']).to_string();
                            if tx.send(trimmed).is_err() {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
            })
            .expect("failed to spawn reader thread");

        Ok(Self { child, stdin, rx, state: PipeState::Running, grace })
    }

    pub fn state(&self) -> PipeState {
        self.state
    }

    pub fn write(&mut self, line: &str) -> Res<()> {
        if self.state != PipeState::Running {
            anyhow::bail!("write on a non-running pipe");
        }
        let res = (|| -> std::io::Result<()> {
            self.stdin.write_all(line.as_bytes())?;
            if !line.ends_with('\n') {
                self.stdin.write_all(b"\n")?;
            }
            self.stdin.flush()
        })();
        if let Err(e) = res {
            self.state = PipeState::Broken;
            anyhow::bail!("write failed: {e}");
        }
        Ok(())
    }

    /// Reads lines until one whose whitespace-tokenized first word equals `sentinel_prefix`, or
    /// until `timeout_ms` elapses (0 means wait indefinitely). The deadline is monotonic from
    /// call entry, as required by spec.md §4.1.
    pub fn read_until(&mut self, sentinel_prefix: &str, timeout_ms: u64) -> ReadResult {
        let deadline = if timeout_ms == 0 { None } else { Some(Instant::now() + Duration::from_millis(timeout_ms)) };
        let mut lines = Vec::new();
        loop {
            let remaining = match deadline {
                None => None,
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return ReadResult { lines, timed_out: true };
                    }
                    Some(d - now)
                }
            };
            let recv = match remaining {
                None => self.rx.recv().map_err(|_| crossbeam_channel::RecvTimeoutError::Disconnected),
                Some(budget) => self.rx.recv_timeout(budget),
            };
            match recv {
                Ok(line) => {
                    let is_sentinel = line.split_whitespace().next() == Some(sentinel_prefix);
                    lines.push(line);
                    if is_sentinel {
                        return ReadResult { lines, timed_out: false };
                    }
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                    return ReadResult { lines, timed_out: true };
                }
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    self.state = PipeState::Broken;
                    return ReadResult { lines, timed_out: false };
                }
            }
        }
    }

    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Best-effort graceful shutdown, then a forced kill. Idempotent, per spec.md §4.1.
    /// Grounded on `monitors::play::player::EnginePlayer::drop`'s sleep-poll loop, with the
    /// grace window shortened and made configurable (see `grace` above).
    pub fn terminate(&mut self) {
        if self.state == PipeState::Terminated {
            return;
        }
        let start = Instant::now();
        while start.elapsed() < self.grace {
            if let Ok(Some(_)) = self.child.try_wait() {
                self.state = PipeState::Terminated;
                return;
            }
            thread::sleep(Duration::from_millis(20));
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
        self.state = PipeState::Terminated;
    }
}

impl Drop for ProcessPipe {
    fn drop(&mut self) {
        self.terminate();
    }
}

pub fn default_stderr_path(engine_name: &str) -> PathBuf {
    PathBuf::from(format!("{engine_name}_stderr.log"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_until_times_out_with_partial_lines() {
        // A 'cat'-like process that never prints our sentinel: read_until must give up at the
        // deadline and return whatever arrived, not block forever.
        let mut pipe = ProcessPipe::start(
            Path::new("/bin/sh"),
            &["-c".to_string(), "echo info one; sleep 5".to_string()],
            None,
            Path::new("/tmp/tourney_test_stderr.log"),
            Duration::from_millis(50),
        )
        .expect("spawn /bin/sh");
        let result = pipe.read_until("bestmove", 200);
        assert!(result.timed_out);
        assert_eq!(result.lines, vec!["info one".to_string()]);
        pipe.terminate();
    }
}
