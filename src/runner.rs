use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Shared cancellation flag for a whole matrix run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Captured result of a finished child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `None` when the child was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("executable not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to spawn {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    /// `output` holds whatever the child wrote before waiting failed.
    #[error("failed while waiting for {}: {source}", .program.display())]
    Wait {
        program: PathBuf,
        #[source]
        source: io::Error,
        output: ProcessOutput,
    },

    /// `output` holds whatever the child wrote before it was killed.
    #[error("cancelled")]
    Cancelled { output: ProcessOutput },
}

impl RunError {
    /// Streams captured before the failure, if the child ever ran.
    pub fn partial_output(&self) -> Option<&ProcessOutput> {
        match self {
            RunError::Wait { output, .. } | RunError::Cancelled { output } => Some(output),
            _ => None,
        }
    }
}

/// Seam between the cell executor and the operating system.
///
/// A non-zero exit status is not an error at this level: the caller gets the
/// captured streams back and decides what the status means for the cell.
pub trait ProcessRunner: Send + Sync {
    fn run(&self, program: &Path, args: &[String]) -> Result<ProcessOutput, RunError>;
}

/// Runs real child processes, killing them when the token is cancelled.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    cancel: CancelToken,
}

impl SystemRunner {
    pub fn new(cancel: CancelToken) -> Self {
        Self { cancel }
    }
}

impl ProcessRunner for SystemRunner {
    fn run(&self, program: &Path, args: &[String]) -> Result<ProcessOutput, RunError> {
        if self.cancel.is_cancelled() {
            return Err(RunError::Cancelled {
                output: ProcessOutput::default(),
            });
        }

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| match source.kind() {
                io::ErrorKind::NotFound => RunError::NotFound(program.to_path_buf()),
                _ => RunError::Spawn {
                    program: program.to_path_buf(),
                    source,
                },
            })?;

        // Both pipes are drained concurrently so a chatty child never blocks
        // on a full stderr buffer while we wait on stdout.
        let stdout = Capture::drain(child.stdout.take());
        let stderr = Capture::drain(child.stderr.take());

        // Grandchildren may still hold the pipes open after a kill, so the
        // failure paths take a snapshot instead of joining the drain threads.
        let partial = |code| ProcessOutput {
            code,
            stdout: stdout.snapshot(),
            stderr: stderr.snapshot(),
        };

        let status = match wait_or_cancel(&mut child, &self.cancel) {
            Ok(Some(status)) => status,
            Ok(None) => {
                return Err(RunError::Cancelled {
                    output: partial(None),
                })
            }
            Err(source) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(RunError::Wait {
                    program: program.to_path_buf(),
                    source,
                    output: partial(None),
                });
            }
        };

        Ok(ProcessOutput {
            code: status.code(),
            stdout: stdout.finish(),
            stderr: stderr.finish(),
        })
    }
}

fn wait_or_cancel(
    child: &mut Child,
    cancel: &CancelToken,
) -> io::Result<Option<std::process::ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if cancel.is_cancelled() {
            child.kill()?;
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// One child pipe, read on its own thread into a shared buffer.
struct Capture {
    buf: Arc<Mutex<Vec<u8>>>,
    handle: Option<JoinHandle<()>>,
}

impl Capture {
    fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Self {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let handle = pipe.map(|mut reader| {
            let buf = Arc::clone(&buf);
            thread::spawn(move || {
                let mut chunk = [0u8; 8192];
                loop {
                    match reader.read(&mut chunk) {
                        Ok(0) => break,
                        Ok(n) => lock(&buf).extend_from_slice(&chunk[..n]),
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(_) => break,
                    }
                }
            })
        });
        Self { buf, handle }
    }

    /// What has been read so far.
    fn snapshot(&self) -> String {
        String::from_utf8_lossy(&lock(&self.buf)).into_owned()
    }

    /// Waits for EOF, then returns everything.
    fn finish(mut self) -> String {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.snapshot()
    }
}

fn lock(buf: &Mutex<Vec<u8>>) -> std::sync::MutexGuard<'_, Vec<u8>> {
    buf.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
