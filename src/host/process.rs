//! Child processes with a timeout and bounded output.

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

const OUTPUT_LIMIT_BYTES: usize = 64 * 1024;
/// How long to wait for output readers once the child itself is gone. A
/// background grandchild can hold the pipes open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub command: String,
    /// `None` when the child was killed by a signal (including our timeout).
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ProcessOutcome {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

pub trait ProcessRunner: Send + Sync {
    fn run(&self, command: &str, cwd: &Path, timeout: Duration) -> Result<ProcessOutcome>;
}

/// Runs commands through `sh -c`, each in its own process group so a
/// timeout takes down everything the command started.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShellRunner;

impl ProcessRunner for ShellRunner {
    #[instrument(skip(self), fields(timeout_secs = timeout.as_secs()))]
    fn run(&self, command: &str, cwd: &Path, timeout: Duration) -> Result<ProcessOutcome> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        debug!("spawning child process");
        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                error!(err = %e, "failed to spawn command");
                return Err(e).context("spawn command");
            }
        };

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("stdout was not piped"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("stderr was not piped"))?;
        let stdout_reader = OutputReader::spawn("stdout", stdout)?;
        let stderr_reader = OutputReader::spawn("stderr", stderr)?;

        let mut timed_out = false;
        let status = match child.wait_timeout(timeout).context("wait for command")? {
            Some(status) => status,
            None => {
                warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
                timed_out = true;
                kill_tree(&mut child).context("kill command")?;
                child.wait().context("wait command after kill")?
            }
        };

        let stdout = stdout_reader.finish(DRAIN_GRACE);
        let stderr = stderr_reader.finish(DRAIN_GRACE);

        debug!(exit_code = ?status.code(), timed_out, "command finished");
        Ok(ProcessOutcome {
            command: command.to_string(),
            exit_code: status.code(),
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            timed_out,
        })
    }
}

/// Kill the child's whole process group, falling back to the child alone.
fn kill_tree(child: &mut Child) -> Result<()> {
    #[cfg(unix)]
    {
        let group = format!("-{}", child.id());
        match Command::new("kill")
            .args(["-KILL", "--", &group])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(status) if status.success() => return Ok(()),
            Ok(status) => warn!(?status, "killing process group failed"),
            Err(e) => warn!(error = %e, "could not run kill"),
        }
    }
    match child.kill() {
        Ok(()) => Ok(()),
        // Already exited between the timeout and the kill.
        Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// A pipe drained on its own thread into a shared buffer, so whatever
/// arrived can be collected even if the pipe never closes.
struct OutputReader {
    name: &'static str,
    buf: Arc<Mutex<Vec<u8>>>,
    done: Receiver<Result<()>>,
}

impl OutputReader {
    fn spawn<R: Read + Send + 'static>(name: &'static str, reader: R) -> Result<Self> {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let (tx, done) = mpsc::channel();
        let sink = Arc::clone(&buf);
        thread::Builder::new()
            .name(format!("{name}-reader"))
            .spawn(move || {
                let _ = tx.send(read_limited(reader, OUTPUT_LIMIT_BYTES, &sink));
            })
            .with_context(|| format!("spawn {name} reader"))?;
        Ok(Self { name, buf, done })
    }

    /// Wait up to `grace` for EOF, then take what has been read. A reader
    /// still blocked on an open pipe is left behind.
    fn finish(self, grace: Duration) -> Vec<u8> {
        match self.done.recv_timeout(grace) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(stream = self.name, error = %e, "reading output failed"),
            Err(_) => warn!(stream = self.name, "output still open after exit, detaching reader"),
        }
        let mut buf = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *buf)
    }
}

/// Drain `reader` into `sink`, keeping at most `limit` bytes.
fn read_limited<R: Read>(mut reader: R, limit: usize, sink: &Mutex<Vec<u8>>) -> Result<()> {
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            return Ok(());
        }
        let mut buf = sink.lock().unwrap_or_else(PoisonError::into_inner);
        let room = limit.saturating_sub(buf.len());
        buf.extend_from_slice(&chunk[..n.min(room)]);
    }
}
