//! JSON-lines export sink.
//!
//! One object per completion:
//! `{"key":…,"attempts":…,"ok":true,"status":200,"data":…}` or
//! `{"key":…,"attempts":…,"ok":false,"error":{"kind":…,"message":…}}`.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

use crate::dispatch::{Completion, CorrelationKey};
use crate::sink::{ResultSink, SinkError};

/// Writes completions as newline-delimited JSON.
pub struct JsonLinesSink<W: AsyncWrite + Unpin + Send> {
    writer: BufWriter<W>,
    written: usize,
}

impl<W: AsyncWrite + Unpin + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            written: 0,
        }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

/// Render one completion as a JSON value.
pub fn completion_to_json<K: Serialize>(completion: &Completion<K>) -> Result<Value, SinkError> {
    let key = serde_json::to_value(&completion.key)?;
    let value = match &completion.outcome {
        Ok(payload) => {
            let data = serde_json::from_slice::<Value>(&payload.body)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&payload.body).into_owned()));
            json!({
                "key": key,
                "attempts": completion.attempts,
                "ok": true,
                "status": payload.status,
                "latency_ms": payload.latency.as_millis() as u64,
                "data": data,
            })
        }
        Err(err) => json!({
            "key": key,
            "attempts": completion.attempts,
            "ok": false,
            "error": { "kind": err.kind(), "message": err.to_string() },
        }),
    };
    Ok(value)
}

#[async_trait]
impl<K, W> ResultSink<K> for JsonLinesSink<W>
where
    K: CorrelationKey + Serialize,
    W: AsyncWrite + Unpin + Send,
{
    async fn accept(&mut self, completion: Completion<K>) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(&completion_to_json(&completion)?)?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.written += 1;
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), SinkError> {
        self.writer.flush().await?;
        Ok(())
    }
}
