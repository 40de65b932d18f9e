//! Row-chunk delivery pipeline.
//!
//! Row sources run on their own tasks and push fixed-size chunks of rows into
//! a bounded channel. A single [`ChunkEnumerator`] on the evaluation side
//! flattens the chunks back into one ordered stream of rows.
//!
//! ```text
//! RowSource --(producer task)--> [chunk][chunk][chunk] --> ChunkEnumerator --> rows
//!                                 bounded, order-preserving
//! ```
//!
//! The channel applies backpressure: a producer waits while the buffer is
//! full. Cancellation is cooperative. The producer stops before its next
//! chunk, but chunks already queued are still handed to the consumer.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::schema::{EntityResolver, RowOrigin, RowSource, SourceError};

/// Chunking and buffering parameters for row delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Maximum number of rows per chunk.
    pub chunk_size: usize,
    /// Maximum number of chunks buffered between producer and consumer.
    pub channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            channel_capacity: 8,
        }
    }
}

type ChunkResult<T> = Result<Vec<T>, SourceError>;

/// Creates a bounded chunk channel holding at most `capacity` chunks.
///
/// A capacity of zero is raised to one.
pub fn chunk_channel<T: Send>(capacity: usize) -> (ChunkSender<T>, ChunkEnumerator<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        ChunkSender { tx },
        ChunkEnumerator {
            rx,
            current: Vec::new().into_iter(),
        },
    )
}

/// Producer side of a chunk channel.
#[derive(Debug)]
pub struct ChunkSender<T> {
    tx: mpsc::Sender<ChunkResult<T>>,
}

impl<T> Clone for ChunkSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

/// The consumer has gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("chunk channel closed")]
pub struct ChannelClosed;

impl<T: Send> ChunkSender<T> {
    /// Sends a chunk, waiting while the channel is full.
    pub async fn send(&self, chunk: Vec<T>) -> Result<(), ChannelClosed> {
        self.tx.send(Ok(chunk)).await.map_err(|_| ChannelClosed)
    }

    /// Sends a terminal error. The consumer sees it after every chunk sent
    /// before it.
    pub async fn fail(&self, error: SourceError) -> Result<(), ChannelClosed> {
        self.tx.send(Err(error)).await.map_err(|_| ChannelClosed)
    }

    /// Returns true once the consumer has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side of a chunk channel: yields individual items in chunk order.
#[derive(Debug)]
pub struct ChunkEnumerator<T> {
    rx: mpsc::Receiver<ChunkResult<T>>,
    current: std::vec::IntoIter<T>,
}

impl<T: Send> ChunkEnumerator<T> {
    /// Returns the next item, or `None` once every producer is gone and all
    /// buffered chunks are drained. Empty chunks are skipped.
    pub async fn next(&mut self) -> Result<Option<T>, SourceError> {
        loop {
            if let Some(item) = self.current.next() {
                return Ok(Some(item));
            }
            match self.rx.recv().await {
                Some(Ok(chunk)) => self.current = chunk.into_iter(),
                Some(Err(e)) => return Err(e),
                None => return Ok(None),
            }
        }
    }

    /// Converts the enumerator into a [`Stream`] of items.
    pub fn into_stream(self) -> impl Stream<Item = Result<T, SourceError>> + Send
    where
        T: 'static,
    {
        futures_util::stream::unfold(Some(self), |state| async move {
            let mut this = state?;
            match this.next().await {
                Ok(Some(item)) => Some((Ok(item), Some(this))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

/// Starts a producer task draining `source` into a new chunk channel.
///
/// Every row is wrapped in an [`EntityResolver`] sharing `names` and tagged
/// with `source_id` and its ordinal. The producer checks `cancel` before each
/// chunk and stops early once it is raised or the consumer is dropped.
pub fn spawn_source(
    mut source: Box<dyn RowSource>,
    names: Arc<HashMap<String, usize>>,
    source_id: usize,
    alias: String,
    config: PipelineConfig,
    cancel: CancellationToken,
) -> ChunkEnumerator<EntityResolver> {
    let (tx, rx) = chunk_channel(config.channel_capacity);
    let chunk_size = config.chunk_size.max(1);

    tokio::spawn(async move {
        let mut row_index = 0usize;
        let mut chunks_sent = 0usize;
        loop {
            if cancel.is_cancelled() {
                debug!(alias = %alias, chunks_sent, "row source cancelled");
                return;
            }

            let mut chunk = Vec::with_capacity(chunk_size);
            let mut exhausted = false;
            while chunk.len() < chunk_size {
                match source.next_row() {
                    Ok(Some(values)) => {
                        let origin = RowOrigin {
                            source_id,
                            row_index,
                        };
                        row_index += 1;
                        chunk.push(EntityResolver::new(origin, values, Arc::clone(&names)));
                    }
                    Ok(None) => {
                        exhausted = true;
                        break;
                    }
                    Err(e) => {
                        debug!(alias = %alias, error = %e, "row source failed");
                        if !chunk.is_empty() && tx.send(chunk).await.is_err() {
                            return;
                        }
                        let _ = tx.fail(e).await;
                        return;
                    }
                }
            }

            if !chunk.is_empty() {
                trace!(alias = %alias, rows = chunk.len(), "chunk produced");
                if tx.send(chunk).await.is_err() {
                    debug!(alias = %alias, chunks_sent, "consumer dropped");
                    return;
                }
                chunks_sent += 1;
            }
            if exhausted {
                debug!(alias = %alias, chunks_sent, rows = row_index, "row source drained");
                return;
            }
        }
    });

    rx
}
