// src/interrupt.rs
//! Ctrl-C handling for the binary.
//!
//! The first SIGINT only raises a flag, so the driver can stop and run every
//! entered stage's `exit` hook. A second one exits at once.

use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Exit status for a run stopped by an interrupt (128 + SIGINT)
pub const EXIT_INTERRUPTED: i32 = 130;

const CHUNK_SIZE: usize = 64 * 1024;
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Install the process-wide SIGINT handler and return the flag it raises.
pub fn install_handler() -> anyhow::Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    ctrlc::set_handler(move || {
        if handler_flag.swap(true, Ordering::SeqCst) {
            std::process::exit(EXIT_INTERRUPTED);
        }
    })?;
    Ok(flag)
}

/// Input that gives up when the interrupt flag is raised, even while the
/// underlying stream is blocked (a terminal or an idle pipe).
///
/// The stream is read on its own thread and handed over in chunks through a
/// bounded channel.
pub struct InterruptibleReader {
    chunks: Receiver<io::Result<Vec<u8>>>,
    pending: Vec<u8>,
    pos: usize,
    flag: Arc<AtomicBool>,
}

impl InterruptibleReader {
    pub fn spawn<R: Read + Send + 'static>(mut inner: R, flag: Arc<AtomicBool>) -> Self {
        let (sender, chunks) = mpsc::sync_channel(4);
        thread::spawn(move || loop {
            let mut buf = vec![0; CHUNK_SIZE];
            match inner.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    buf.truncate(n);
                    if sender.send(Ok(buf)).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    let _ = sender.send(Err(e));
                    break;
                }
            }
        });

        InterruptibleReader {
            chunks,
            pending: Vec::new(),
            pos: 0,
            flag,
        }
    }
}

impl Read for InterruptibleReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos == self.pending.len() {
            if self.flag.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::Other, "interrupted"));
            }
            match self.chunks.recv_timeout(POLL_INTERVAL) {
                Ok(Ok(chunk)) => {
                    self.pending = chunk;
                    self.pos = 0;
                }
                Ok(Err(e)) => return Err(e),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }

        let available = &self.pending[self.pos..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pos += n;
        Ok(n)
    }
}
