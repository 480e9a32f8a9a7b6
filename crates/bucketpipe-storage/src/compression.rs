//! Streaming gzip for object writers.

use crate::traits::{ObjectWriter, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;

/// Compresses chunks on the way into an inner writer.
///
/// Compressed output is drained after every chunk, so memory stays bounded
/// by the encoder window plus one chunk.
pub struct GzipWriter {
    encoder: GzEncoder<Vec<u8>>,
    inner: Box<dyn ObjectWriter>,
}

impl GzipWriter {
    pub fn new(inner: Box<dyn ObjectWriter>) -> Self {
        Self {
            encoder: GzEncoder::new(Vec::new(), Compression::default()),
            inner,
        }
    }

    fn take_output(&mut self) -> Option<Bytes> {
        let out = std::mem::take(self.encoder.get_mut());
        (!out.is_empty()).then(|| Bytes::from(out))
    }
}

#[async_trait]
impl ObjectWriter for GzipWriter {
    async fn write_chunk(&mut self, chunk: Bytes) -> StorageResult<()> {
        self.encoder.write_all(&chunk)?;
        if let Some(out) = self.take_output() {
            self.inner.write_chunk(out).await?;
        }
        Ok(())
    }

    async fn finish(self: Box<Self>) -> StorageResult<()> {
        let GzipWriter { encoder, mut inner } = *self;
        let tail = encoder.finish()?;
        if !tail.is_empty() {
            inner.write_chunk(Bytes::from(tail)).await?;
        }
        inner.finish().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use std::sync::{Arc, Mutex};

    struct Capture(Arc<Mutex<Vec<u8>>>);

    #[async_trait]
    impl ObjectWriter for Capture {
        async fn write_chunk(&mut self, chunk: Bytes) -> StorageResult<()> {
            self.0.lock().unwrap().extend_from_slice(&chunk);
            Ok(())
        }

        async fn finish(self: Box<Self>) -> StorageResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_gzip_output_decompresses_to_input() {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let mut writer: Box<dyn ObjectWriter> =
            Box::new(GzipWriter::new(Box::new(Capture(sink.clone()))));

        let chunks: Vec<Bytes> = (0..50)
            .map(|i| Bytes::from(format!("line {} of the streamed upload\n", i)))
            .collect();
        let expected: Vec<u8> = chunks.iter().flat_map(|c| c.to_vec()).collect();

        for chunk in chunks {
            writer.write_chunk(chunk).await.unwrap();
        }
        writer.finish().await.unwrap();

        let compressed = sink.lock().unwrap().clone();
        assert!(compressed.len() < expected.len());

        let mut decoded = Vec::new();
        GzDecoder::new(&compressed[..])
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, expected);
    }

    #[tokio::test]
    async fn test_gzip_empty_input_is_valid_stream() {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let writer: Box<dyn ObjectWriter> =
            Box::new(GzipWriter::new(Box::new(Capture(sink.clone()))));
        writer.finish().await.unwrap();

        let compressed = sink.lock().unwrap().clone();
        let mut decoded = Vec::new();
        GzDecoder::new(&compressed[..])
            .read_to_end(&mut decoded)
            .unwrap();
        assert!(decoded.is_empty());
    }
}
