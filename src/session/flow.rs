//! Flow controller
//!
//! Bounded FIFO between the producer and the upstream socket. Audio keeps
//! arriving in real time whether or not the server is reachable, so the
//! queue never pushes back: when it is full the oldest chunk is evicted to
//! make room. Listeners hear what is happening now rather than a backlog.
//!
//! ```text
//!   enqueue ──► [ c4 | c5 | c6 | c7 ] ──► in flight (c3) ──► socket
//!                 ▲ evicted first          resent whole after a write error
//! ```

use std::collections::VecDeque;
use std::io;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Result of one drain step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainProgress {
    /// Nothing to write
    Idle,
    /// Part of the in-flight chunk was written
    Partial(usize),
    /// The in-flight chunk finished; carries the bytes written by this step
    Complete(usize),
}

impl DrainProgress {
    /// Bytes written by this step
    pub fn bytes(&self) -> usize {
        match self {
            DrainProgress::Idle => 0,
            DrainProgress::Partial(n) | DrainProgress::Complete(n) => *n,
        }
    }
}

#[derive(Debug)]
struct InFlight {
    chunk: Bytes,
    written: usize,
}

/// Bounded drop-oldest chunk queue
#[derive(Debug)]
pub struct FlowController {
    queue: VecDeque<Bytes>,
    capacity: usize,
    max_bytes: Option<usize>,
    queued_bytes: usize,
    in_flight: Option<InFlight>,
    evictions: u64,
    chunks_written: u64,
    bytes_written: u64,
}

impl FlowController {
    /// Queue holding at most `capacity` chunks
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity,
            max_bytes: None,
            queued_bytes: 0,
            in_flight: None,
            evictions: 0,
            chunks_written: 0,
            bytes_written: 0,
        }
    }

    /// Also cap the total queued bytes
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    /// Append a chunk, evicting the oldest entries if the queue is full.
    ///
    /// Never blocks. Returns how many chunks were dropped to admit this one;
    /// a chunk larger than the byte cap is itself dropped and counted.
    pub fn enqueue(&mut self, chunk: Bytes) -> usize {
        if chunk.is_empty() {
            return 0;
        }

        if let Some(max_bytes) = self.max_bytes {
            if chunk.len() > max_bytes {
                self.evictions += 1;
                return 1;
            }
        }

        let mut evicted = 0;
        while self.is_over_limit(chunk.len()) {
            let Some(oldest) = self.queue.pop_front() else {
                break;
            };
            self.queued_bytes -= oldest.len();
            self.evictions += 1;
            evicted += 1;
        }

        self.queued_bytes += chunk.len();
        self.queue.push_back(chunk);
        evicted
    }

    fn is_over_limit(&self, incoming: usize) -> bool {
        if self.queue.len() >= self.capacity {
            return true;
        }
        match self.max_bytes {
            Some(max_bytes) => self.queued_bytes + incoming > max_bytes,
            None => false,
        }
    }

    /// Write once toward the socket.
    ///
    /// Takes the next chunk when nothing is in flight. Cancel safe: a
    /// cancelled step writes nothing and keeps the chunk. On error the
    /// in-flight chunk is kept and will be resent from its first byte.
    pub async fn drain_step<W>(&mut self, writer: &mut W) -> io::Result<DrainProgress>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        if self.in_flight.is_none() {
            let Some(chunk) = self.queue.pop_front() else {
                return Ok(DrainProgress::Idle);
            };
            self.queued_bytes -= chunk.len();
            self.in_flight = Some(InFlight { chunk, written: 0 });
        }

        let Some(flight) = self.in_flight.as_mut() else {
            return Ok(DrainProgress::Idle);
        };

        match writer.write(&flight.chunk[flight.written..]).await {
            Ok(0) => {
                flight.written = 0;
                Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "upstream accepted no bytes",
                ))
            }
            Ok(n) => {
                flight.written += n;
                self.bytes_written += n as u64;
                if flight.written == flight.chunk.len() {
                    self.in_flight = None;
                    self.chunks_written += 1;
                    Ok(DrainProgress::Complete(n))
                } else {
                    Ok(DrainProgress::Partial(n))
                }
            }
            Err(e) => {
                flight.written = 0;
                Err(e)
            }
        }
    }

    /// Write everything queued, in order, then flush
    pub async fn drain<W>(&mut self, writer: &mut W) -> io::Result<usize>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut total = 0;
        loop {
            match self.drain_step(writer).await? {
                DrainProgress::Idle => break,
                progress => total += progress.bytes(),
            }
        }
        writer.flush().await?;
        Ok(total)
    }

    /// Restart the in-flight chunk from its first byte.
    ///
    /// Called when the socket it was going to is replaced.
    pub fn rewind(&mut self) {
        if let Some(flight) = self.in_flight.as_mut() {
            flight.written = 0;
        }
    }

    /// Whether a drain step would write anything
    pub fn has_pending(&self) -> bool {
        self.in_flight.is_some() || !self.queue.is_empty()
    }

    /// Queued chunks, excluding the one in flight
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes held in the queue
    pub fn queued_bytes(&self) -> usize {
        self.queued_bytes
    }

    /// Chunks dropped because the queue was full
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Chunks fully written to a socket
    pub fn chunks_written(&self) -> u64 {
        self.chunks_written
    }

    /// Bytes written to sockets, counting resends
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Queued chunks, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Bytes> {
        self.queue.iter()
    }
}
