//! Caller-owned consumers of streamed rows.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{Result, TaplineError};
use crate::row::Row;

/// Accepts rows one at a time. `send` may wait, which stalls the producer.
#[async_trait]
pub trait RowSink: Send {
    async fn send(&mut self, row: Row) -> Result<()>;
}

#[async_trait]
impl RowSink for mpsc::Sender<Row> {
    async fn send(&mut self, row: Row) -> Result<()> {
        mpsc::Sender::send(self, row)
            .await
            .map_err(|_| TaplineError::Sink("row receiver dropped".to_string()))
    }
}

#[async_trait]
impl RowSink for Vec<Row> {
    async fn send(&mut self, row: Row) -> Result<()> {
        self.push(row);
        Ok(())
    }
}
