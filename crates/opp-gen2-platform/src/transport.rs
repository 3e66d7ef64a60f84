//! Transport adaptor for one chain.
//!
//! Any byte stream works as a chain transport: a serial port in production,
//! an in-memory duplex in tests. The read half is wrapped in a buffered
//! [`ChainReader`]; the write half is owned by a single writer task fed
//! through [`ChainWriter`], so writes to one chain are never interleaved.

use std::time::Duration;

use opp_gen2_protocol::hex_dump;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

use crate::error::{PlatformError, PlatformResult};

/// Byte stream a chain can run over.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

const READ_CHUNK: usize = 256;

/// Buffered reader over a chain's read half.
pub struct ChainReader<R> {
    chain: String,
    inner: R,
    buffer: Vec<u8>,
    timeout: Duration,
}

impl<R: AsyncRead + Unpin> ChainReader<R> {
    pub fn new(chain: &str, inner: R, timeout: Duration) -> Self {
        Self {
            chain: chain.to_string(),
            inner,
            buffer: Vec::new(),
            timeout,
        }
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    async fn fill(&mut self) -> PlatformResult<usize> {
        let mut chunk = [0u8; READ_CHUNK];
        let n = self.inner.read(&mut chunk).await?;
        if n == 0 {
            return Err(PlatformError::ChainClosed(self.chain.clone()));
        }
        let received = chunk.get(..n).unwrap_or_default();
        trace!(chain = %self.chain, bytes = %hex_dump(received), "read");
        self.buffer.extend_from_slice(received);
        Ok(n)
    }

    async fn fill_timed(&mut self, step: &'static str) -> PlatformResult<usize> {
        let timeout = self.timeout;
        match tokio::time::timeout(timeout, self.fill()).await {
            Ok(result) => result,
            Err(_elapsed) => Err(PlatformError::Timeout {
                chain: self.chain.clone(),
                step,
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// Reads exactly `n` bytes.
    pub async fn read_exact(&mut self, n: usize, step: &'static str) -> PlatformResult<Vec<u8>> {
        while self.buffer.len() < n {
            self.fill_timed(step).await?;
        }
        Ok(self.buffer.drain(..n).collect())
    }

    pub async fn read_byte(&mut self, step: &'static str) -> PlatformResult<u8> {
        if self.buffer.is_empty() {
            self.fill_timed(step).await?;
        }
        let byte = self
            .buffer
            .first()
            .copied()
            .ok_or_else(|| PlatformError::ChainClosed(self.chain.clone()))?;
        self.buffer.drain(..1);
        Ok(byte)
    }

    /// Reads up to and including the first `separator` byte.
    pub async fn read_until(&mut self, separator: u8, step: &'static str) -> PlatformResult<Vec<u8>> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|&b| b == separator) {
                return Ok(self.buffer.drain(..=pos).collect());
            }
            self.fill_timed(step).await?;
        }
    }

    /// Returns whatever arrives within `wait`, at most `max` bytes. An empty
    /// result means the line stayed quiet.
    pub async fn read_within(&mut self, wait: Duration, max: usize) -> PlatformResult<Vec<u8>> {
        if self.buffer.is_empty() {
            match tokio::time::timeout(wait, self.fill()).await {
                Ok(result) => {
                    result?;
                }
                Err(_elapsed) => return Ok(Vec::new()),
            }
        }
        let n = self.buffer.len().min(max);
        Ok(self.buffer.drain(..n).collect())
    }

    /// Waits for the next chunk without a deadline.
    pub async fn read_chunk(&mut self) -> PlatformResult<Vec<u8>> {
        if self.buffer.is_empty() {
            self.fill().await?;
        }
        Ok(std::mem::take(&mut self.buffer))
    }

    /// Waits for the next chunk, failing after the response timeout.
    pub async fn read_chunk_timed(&mut self, step: &'static str) -> PlatformResult<Vec<u8>> {
        if self.buffer.is_empty() {
            self.fill_timed(step).await?;
        }
        Ok(std::mem::take(&mut self.buffer))
    }

    /// Hands back bytes buffered but not yet consumed.
    pub fn take_buffered(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }
}

struct Outbound {
    bytes: Vec<u8>,
    drained: Option<oneshot::Sender<std::io::Result<()>>>,
}

/// Handle to a chain's writer task. Cheap to clone.
#[derive(Clone)]
pub struct ChainWriter {
    chain: String,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ChainWriter {
    /// Spawns the writer task for `writer`.
    pub fn spawn<W>(chain: &str, writer: W) -> (Self, JoinHandle<()>)
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(write_loop(chain.to_string(), writer, rx));
        (
            Self {
                chain: chain.to_string(),
                tx,
            },
            task,
        )
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    /// Queues `bytes` for transmission.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer task has stopped.
    pub fn send(&self, bytes: Vec<u8>) -> PlatformResult<()> {
        debug!(chain = %self.chain, msg = %hex_dump(&bytes), "send");
        self.tx
            .send(Outbound {
                bytes,
                drained: None,
            })
            .map_err(|_closed| PlatformError::ChainClosed(self.chain.clone()))
    }

    /// Waits until everything queued so far has been written and flushed.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer task has stopped or the write failed.
    pub async fn drain(&self) -> PlatformResult<()> {
        self.enqueue_with_ack(Vec::new()).await
    }

    /// Queues `bytes` and waits until they have been written and flushed.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer task has stopped or the write failed.
    pub async fn send_and_drain(&self, bytes: Vec<u8>) -> PlatformResult<()> {
        debug!(chain = %self.chain, msg = %hex_dump(&bytes), "send");
        self.enqueue_with_ack(bytes).await
    }

    async fn enqueue_with_ack(&self, bytes: Vec<u8>) -> PlatformResult<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(Outbound {
                bytes,
                drained: Some(ack_tx),
            })
            .map_err(|_closed| PlatformError::ChainClosed(self.chain.clone()))?;
        match ack_rx.await {
            Ok(result) => result.map_err(PlatformError::from),
            Err(_dropped) => Err(PlatformError::ChainClosed(self.chain.clone())),
        }
    }
}

async fn write_loop<W>(chain: String, mut writer: W, mut rx: mpsc::UnboundedReceiver<Outbound>)
where
    W: AsyncWrite + Send + Unpin,
{
    while let Some(outbound) = rx.recv().await {
        let result = if outbound.bytes.is_empty() {
            writer.flush().await
        } else {
            match writer.write_all(&outbound.bytes).await {
                Ok(()) => writer.flush().await,
                Err(err) => Err(err),
            }
        };
        match outbound.drained {
            Some(ack) => {
                if ack.send(result).is_err() {
                    trace!(chain = %chain, "drain waiter went away");
                }
            }
            None => {
                if let Err(err) = result {
                    error!(chain = %chain, %err, "write failed");
                }
            }
        }
    }
    debug!(chain = %chain, "writer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_until_and_exact() -> PlatformResult<()> {
        let mock = tokio_test::io::Builder::new()
            .read(&[0xF0, 0x20])
            .read(&[0x21, 0xFF, 0x01, 0x02])
            .build();
        let mut reader = ChainReader::new("c", mock, Duration::from_secs(1));
        assert_eq!(reader.read_until(0xFF, "inventory").await?, vec![0xF0, 0x20, 0x21, 0xFF]);
        assert_eq!(reader.read_exact(2, "tail").await?, vec![0x01, 0x02]);
        Ok(())
    }

    #[tokio::test]
    async fn test_closed_stream() {
        let mock = tokio_test::io::Builder::new().build();
        let mut reader = ChainReader::new("c", mock, Duration::from_secs(1));
        assert!(matches!(
            reader.read_chunk().await,
            Err(PlatformError::ChainClosed(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout() {
        let (_board, host) = tokio::io::duplex(64);
        let mut reader = ChainReader::new("c", host, Duration::from_millis(50));
        assert!(matches!(
            reader.read_exact(1, "probe").await,
            Err(PlatformError::Timeout {
                step: "probe",
                timeout_ms: 50,
                ..
            })
        ));
        assert!(reader.read_within(Duration::from_millis(5), 30).await.is_ok_and(|b| b.is_empty()));
    }

    #[tokio::test]
    async fn test_writer_preserves_order_and_acks() -> Result<(), Box<dyn std::error::Error>> {
        let mock = tokio_test::io::Builder::new()
            .write(&[0x01, 0x02])
            .write(&[0x03])
            .build();
        let (writer, task) = ChainWriter::spawn("c", mock);
        writer.send(vec![0x01, 0x02])?;
        writer.send_and_drain(vec![0x03]).await?;
        writer.drain().await?;
        drop(writer);
        task.await?;
        Ok(())
    }
}
