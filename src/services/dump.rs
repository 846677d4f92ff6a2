//! Streams a live database dump as newline-delimited JSON records.
//!
//! The remote dump protocol is driven through the `DumpSource` boundary;
//! the production implementation speaks WebSocket to the database service.

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// One line of the `db.json` stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DumpRecord {
    Request {
        method: String,
        parameters: Vec<serde_json::Value>,
    },
    /// Protocol checkpoint marker.
    Sync,
}

/// Line-oriented sink for dump records. `write` suspends until the
/// underlying writer accepts the bytes, so at most one record is in
/// flight and nothing queues up behind a slow consumer.
pub struct DumpSink<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin + Send> DumpSink<W> {
    fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn write(&mut self, record: &DumpRecord) -> anyhow::Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        Ok(())
    }

    async fn close(mut self) -> anyhow::Result<()> {
        self.writer.flush().await?;
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// A dump session against the database service. Implementations push
/// every operation the protocol yields into the sink, in order, and
/// return once the session is complete.
pub trait DumpSource: Send {
    fn dump<W>(
        &mut self,
        sink: &mut DumpSink<W>,
    ) -> impl Future<Output = anyhow::Result<()>> + Send
    where
        W: AsyncWrite + Unpin + Send;
}

/// Drives a full dump session into `writer`, then closes the sink to
/// mark end-of-stream. Any session failure is fatal for the caller.
pub async fn stream_dump<S, W>(mut source: S, writer: W) -> anyhow::Result<()>
where
    S: DumpSource,
    W: AsyncWrite + Unpin + Send,
{
    let mut sink = DumpSink::new(writer);
    source.dump(&mut sink).await.context("dump session failed")?;
    sink.close().await
}

/// Frames the database service sends during a dump session.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum DumpFrame {
    Op {
        method: String,
        #[serde(default)]
        args: Vec<serde_json::Value>,
    },
    Sync,
    Done,
}

/// Production dump source speaking the database's WebSocket dump protocol.
pub struct WsDumpSource {
    url: String,
    db: String,
}

impl WsDumpSource {
    pub fn new(url: String, db: String) -> Self {
        Self { url, db }
    }
}

impl DumpSource for WsDumpSource {
    fn dump<W>(
        &mut self,
        sink: &mut DumpSink<W>,
    ) -> impl Future<Output = anyhow::Result<()>> + Send
    where
        W: AsyncWrite + Unpin + Send,
    {
        async move {
            let (mut ws, _) = connect_async(self.url.as_str())
                .await
                .with_context(|| format!("failed to connect to {}", self.url))?;

            let request = serde_json::json!({
                "type": "dump",
                "db": self.db,
                "structure": true,
            });
            ws.send(Message::Text(request.to_string())).await?;

            while let Some(message) = ws.next().await {
                match message? {
                    Message::Text(text) => {
                        let frame: DumpFrame = serde_json::from_str(&text)
                            .with_context(|| format!("unexpected dump frame: {text}"))?;
                        match frame {
                            DumpFrame::Op { method, args } => {
                                sink.write(&DumpRecord::Request {
                                    method,
                                    parameters: args,
                                })
                                .await?
                            }
                            DumpFrame::Sync => sink.write(&DumpRecord::Sync).await?,
                            DumpFrame::Done => break,
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Ok(())
        }
    }
}
