//! Bounded in-process byte pipe
//!
//! Connects a producer thread to a consumer reading through `std::io::Read`.
//! The producer either closes the pipe normally (the reader sees EOF) or
//! closes it with an error, which the reader observes on its next `read`.
//! Dropping the reader makes further writes fail, so an abandoned producer
//! stops instead of blocking forever.

use std::io::{self, Read, Write};

use crossbeam::channel::{self, Receiver, Sender};

use crate::error::LocatorError;

/// Chunks in flight before the producer blocks
const PIPE_CAPACITY: usize = 16;

type Chunk = std::result::Result<Vec<u8>, LocatorError>;

/// Create a connected reader/writer pair
pub fn pipe() -> (PipeReader, PipeWriter) {
    let (sender, receiver) = channel::bounded(PIPE_CAPACITY);
    (
        PipeReader {
            receiver,
            current: Vec::new(),
            position: 0,
            finished: false,
        },
        PipeWriter {
            sender: Some(sender),
        },
    )
}

/// Reading end of a [`pipe`]
pub struct PipeReader {
    receiver: Receiver<Chunk>,
    current: Vec<u8>,
    position: usize,
    finished: bool,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while self.position >= self.current.len() {
            if self.finished {
                return Ok(0);
            }
            match self.receiver.recv() {
                Ok(Ok(chunk)) => {
                    self.current = chunk;
                    self.position = 0;
                }
                Ok(Err(e)) => {
                    self.finished = true;
                    return Err(e.into_io());
                }
                // All writers gone without an error: clean EOF
                Err(_) => {
                    self.finished = true;
                    return Ok(0);
                }
            }
        }

        let available = &self.current[self.position..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.position += n;
        Ok(n)
    }
}

/// Writing end of a [`pipe`]
pub struct PipeWriter {
    sender: Option<Sender<Chunk>>,
}

impl PipeWriter {
    /// Close the pipe; the reader sees EOF after draining buffered chunks
    pub fn close(mut self) {
        self.sender.take();
    }

    /// Close the pipe with an error delivered to the reader
    pub fn close_with_error(mut self, error: LocatorError) {
        if let Some(sender) = self.sender.take() {
            // Reader already gone: nobody left to tell
            let _ = sender.send(Err(error));
        }
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"))?;
        sender
            .send(Ok(buf.to_vec()))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader dropped"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            if std::thread::panicking() {
                let _ = sender.send(Err(LocatorError::transport("pipe producer panicked")));
            }
        }
    }
}
