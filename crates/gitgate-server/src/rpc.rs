//! Bridges HTTP bodies to the blocking object engine.
//!
//! The request body is read through a synchronous adapter on a blocking
//! thread and the engine's output is forwarded chunk by chunk, so neither
//! side is ever held in memory whole.

use axum::body::Body;
use bytes::Bytes;
use flate2::read::GzDecoder;
use futures::{stream, StreamExt, TryStreamExt};
use gitgate_git::{GitError, ObjectEngine, PktLineWriter, Service};
use gitgate_storage::Repository;
use std::io::{self, BufWriter, Read, Write};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::io::{StreamReader, SyncIoBridge};

use crate::error::ApiError;

/// Size of the response chunks handed to the HTTP layer.
const OUTPUT_CHUNK: usize = 64 * 1024;

/// Chunks buffered between the engine and a slow client.
const CHANNEL_DEPTH: usize = 16;

/// Transfer encoding of an RPC request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyEncoding {
    /// Passed to the engine byte for byte.
    Identity,
    /// Gzip-decompressed on the way to the engine.
    Gzip,
}

impl BodyEncoding {
    /// Picks the encoding from a `Content-Encoding` value. Only an exact,
    /// lowercase `gzip` selects decompression.
    pub fn from_header(value: Option<&str>) -> Self {
        match value {
            Some("gzip") => BodyEncoding::Gzip,
            _ => BodyEncoding::Identity,
        }
    }
}

/// `Write` end of the response channel.
struct ChannelWriter {
    tx: mpsc::Sender<io::Result<Bytes>>,
}

impl ChannelWriter {
    fn send(&self, item: io::Result<Bytes>) -> io::Result<()> {
        self.tx
            .blocking_send(item)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client went away"))
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.send(Ok(Bytes::copy_from_slice(buf)))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Runs `service` for `repo` with `body` as input and returns the response body.
///
/// Failures before the engine writes anything are returned as errors. Once
/// output has started the response is committed, and a later failure aborts
/// the body stream instead.
pub async fn serve_rpc(
    engine: Arc<dyn ObjectEngine>,
    repo: Repository,
    service: Service,
    encoding: BodyEncoding,
    body: Body,
) -> Result<Body, ApiError> {
    let stream = body.into_data_stream().map_err(io::Error::other);
    let reader = SyncIoBridge::new(StreamReader::new(stream));
    let (tx, mut rx) = mpsc::channel(CHANNEL_DEPTH);

    let task = tokio::task::spawn_blocking(move || {
        let mut input: Box<dyn Read + Send> = match encoding {
            BodyEncoding::Gzip => Box::new(GzDecoder::new(reader)),
            BodyEncoding::Identity => Box::new(reader),
        };
        let mut output = BufWriter::with_capacity(OUTPUT_CHUNK, ChannelWriter { tx });

        let result = engine
            .serve(service, &repo, &mut input, &mut output)
            .and_then(|()| output.flush().map_err(GitError::from));

        if let Err(e) = &result {
            tracing::error!(repo = %repo.name, service = %service, error = %e, "Engine failed");
            // Ends the response stream with an error if it is already flowing.
            let _ = output.get_ref().send(Err(io::Error::other(e.to_string())));
        }
        result
    });

    match rx.recv().await {
        Some(Ok(first)) => {
            let rest = stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            });
            let chunks = stream::once(async move { Ok::<_, io::Error>(first) }).chain(rest);
            Ok(Body::from_stream(chunks))
        }
        Some(Err(e)) => {
            task.await??;
            Err(ApiError::Transport(e.to_string()))
        }
        None => {
            task.await??;
            Ok(Body::empty())
        }
    }
}

/// Builds a smart HTTP ref advertisement: the `# service=` header line, a
/// flush, then the engine's ref listing.
pub fn advertisement(
    engine: &dyn ObjectEngine,
    repo: &Repository,
    service: Service,
) -> Result<Vec<u8>, GitError> {
    let mut writer = PktLineWriter::new(Vec::new());
    writer.write_fmt(format_args!("# service={}\n", service.command_name()))?;
    writer.flush_pkt()?;

    let mut output = writer.into_inner();
    engine.advertise(repo, service, &mut output)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_is_exact_match() {
        assert_eq!(BodyEncoding::from_header(Some("gzip")), BodyEncoding::Gzip);
        assert_eq!(BodyEncoding::from_header(Some("GZIP")), BodyEncoding::Identity);
        assert_eq!(BodyEncoding::from_header(Some("x-gzip")), BodyEncoding::Identity);
        assert_eq!(BodyEncoding::from_header(None), BodyEncoding::Identity);
    }

    #[test]
    fn test_channel_writer_reports_closed_receiver() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut writer = ChannelWriter { tx };
        let err = writer.write(b"data").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(writer.write(b"").unwrap(), 0);
    }
}
