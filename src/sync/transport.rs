//! Request body access for the importers
//!
//! Importers pull a body one chunk at a time through [`ChunkSource`], which
//! keeps them independent of the HTTP framework.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use std::convert::Infallible;
use std::fmt::Display;
use std::vec;

use crate::core::error::{Result, SyncError};

/// A request body delivered in chunks
#[async_trait]
pub trait ChunkSource: Send {
    /// Length the client declared for the body, if any
    fn content_length(&self) -> Option<u64>;

    /// The next chunk, or `None` once the body is exhausted
    async fn next_chunk(&mut self) -> Result<Option<Bytes>>;
}

/// Adapts a stream of byte chunks (an axum body, for instance) to [`ChunkSource`]
pub struct BodyChunks<S> {
    stream: S,
    content_length: Option<u64>,
}

impl<S> BodyChunks<S> {
    pub fn new(stream: S, content_length: Option<u64>) -> Self {
        Self {
            stream,
            content_length,
        }
    }
}

/// In-memory chunk list, used by tests and local callers
pub type MemoryChunks =
    BodyChunks<stream::Iter<vec::IntoIter<std::result::Result<Bytes, Infallible>>>>;

impl MemoryChunks {
    /// Body made of `chunks`, declaring their total length
    pub fn from_chunks(chunks: Vec<Bytes>) -> Self {
        let total = chunks.iter().map(|c| c.len() as u64).sum();
        let items: Vec<_> = chunks.into_iter().map(Ok).collect();
        BodyChunks::new(stream::iter(items), Some(total))
    }

    pub fn from_bytes(body: impl Into<Bytes>) -> Self {
        Self::from_chunks(vec![body.into()])
    }
}

#[async_trait]
impl<S, E> ChunkSource for BodyChunks<S>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin + Send,
    E: Display + Send,
{
    fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        match self.stream.next().await {
            Some(Ok(chunk)) => Ok(Some(chunk)),
            Some(Err(e)) => Err(SyncError::transfer(format!("body read failed: {}", e))),
            None => Ok(None),
        }
    }
}
