//! Engine child-process plumbing.

use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::player::{EngineId, IoEvent};

/// How long to wait for a quitting engine before killing it.
const EXIT_GRACE: Duration = Duration::from_secs(2);

/// A spawned engine process with its stdout pumped onto the match event
/// channel.
///
/// The child is started with an explicit working directory — the
/// process-wide current directory is never touched. A reader thread forwards
/// each stdout line as an [`IoEvent::Line`] tagged with the engine's id and
/// sends a final [`IoEvent::Eof`] when the stream closes.
pub struct EngineProcess {
    child: Child,
    stdin: ChildStdin,
    reader: Option<JoinHandle<()>>,
}

impl EngineProcess {
    /// Spawns `command` with `args` in `cwd` and starts the reader thread.
    ///
    /// # Arguments
    ///
    /// * `command` - The engine executable to run.
    /// * `args` - Extra command-line arguments for the engine.
    /// * `cwd` - Working directory for the child process.
    /// * `id` - The engine's id, attached to every forwarded event.
    /// * `tx` - Sending half of the match event channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned, typically
    /// because the executable does not exist or lacks permissions.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use std::path::Path;
    /// use std::sync::mpsc;
    /// use engine_duel::player::EngineId;
    /// use engine_duel::process::EngineProcess;
    ///
    /// let (tx, _rx) = mpsc::channel();
    /// let proc = EngineProcess::spawn("stockfish", &[], Path::new("/tmp"), EngineId(0), tx)?;
    /// # Ok::<(), std::io::Error>(())
    /// ```
    pub fn spawn(
        command: &str,
        args: &[String],
        cwd: &Path,
        id: EngineId,
        tx: Sender<(EngineId, IoEvent)>,
    ) -> io::Result<Self> {
        let mut child = Command::new(command)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let stdin = child.stdin.take().expect("stdin was piped");
        let stdout = BufReader::new(child.stdout.take().expect("stdout was piped"));

        let reader = thread::spawn(move || {
            for line in stdout.lines() {
                let Ok(line) = line else { break };
                if tx.send((id, IoEvent::Line(line))).is_err() {
                    return;
                }
            }
            let _ = tx.send((id, IoEvent::Eof));
        });

        Ok(Self {
            child,
            stdin,
            reader: Some(reader),
        })
    }

    /// Writes one protocol line to the engine's stdin.
    ///
    /// # Arguments
    ///
    /// * `line` - The command to send, without a trailing newline.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to or flushing the engine's stdin
    /// fails, usually because the process already exited.
    pub fn send(&mut self, line: &str) -> io::Result<()> {
        debug!(line, "-> engine");
        writeln!(self.stdin, "{line}")?;
        self.stdin.flush()
    }

    /// Waits for the process to exit, killing it after a grace period.
    pub fn shutdown(&mut self) {
        let deadline = Instant::now() + EXIT_GRACE;
        loop {
            match self.child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) if Instant::now() < deadline => {
                    thread::sleep(Duration::from_millis(50));
                }
                _ => {
                    let _ = self.child.kill();
                    let _ = self.child.wait();
                    break;
                }
            }
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn spawn_failure_is_an_error() {
        let (tx, _rx) = mpsc::channel();
        let result = EngineProcess::spawn(
            "/nonexistent/engine",
            &[],
            Path::new("/tmp"),
            EngineId(0),
            tx,
        );
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn lines_arrive_tagged_and_eof_follows() {
        let (tx, rx) = mpsc::channel();
        let mut proc = EngineProcess::spawn(
            "echo",
            &["hello".to_string()],
            Path::new("/tmp"),
            EngineId(7),
            tx,
        )
        .unwrap();

        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            (EngineId(7), IoEvent::Line("hello".to_string()))
        );
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            (EngineId(7), IoEvent::Eof)
        );
        proc.shutdown();
    }
}
