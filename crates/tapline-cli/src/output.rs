//! Rendering of results on stdout.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tapline_core::{Row, RowSink, TaplineError};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// One JSON object per row. Payloads are shown as (lossy) UTF-8 text, nil as
/// `null`; keys come out sorted.
pub fn row_to_json(row: &Row) -> BTreeMap<String, Value> {
    row.iter()
        .map(|(column, value)| {
            let value = match value {
                Some(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
                None => Value::Null,
            };
            (column.clone(), value)
        })
        .collect()
}

/// Writes each row as a JSON line as soon as it arrives.
pub struct JsonLinesSink<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn finish(mut self) -> std::io::Result<W> {
        self.writer.flush().await?;
        Ok(self.writer)
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> RowSink for JsonLinesSink<W> {
    async fn send(&mut self, row: Row) -> tapline_core::Result<()> {
        let mut line = serde_json::to_vec(&row_to_json(&row))?;
        line.push(b'\n');
        self.writer
            .write_all(&line)
            .await
            .map_err(|e| TaplineError::Sink(format!("failed to write row: {}", e)))
    }
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
