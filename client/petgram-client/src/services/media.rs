//! Selected media and the compression step before upload

use crate::domain::MediaType;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

/// One picked photo or video, held in memory until publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub content_type: String,
}

impl MediaFile {
    pub fn new(bytes: Vec<u8>, file_name: &str, content_type: &str) -> Self {
        Self {
            bytes,
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
        }
    }

    pub fn media_type(&self) -> MediaType {
        MediaType::from_content_type(&self.content_type)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Error, Debug)]
#[error("compression failed: {0}")]
pub struct CompressError(pub String);

/// Shrinks media before it is uploaded
#[async_trait]
pub trait MediaCompressor: Send + Sync {
    async fn compress(&self, media: &MediaFile) -> Result<MediaFile, CompressError>;
}

/// Leaves media untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCompressor;

#[async_trait]
impl MediaCompressor for PassthroughCompressor {
    async fn compress(&self, media: &MediaFile) -> Result<MediaFile, CompressError> {
        Ok(media.clone())
    }
}

/// Compress `media`, keeping the original bytes when compression fails
pub async fn prepare_media(compressor: &dyn MediaCompressor, media: MediaFile) -> MediaFile {
    match compressor.compress(&media).await {
        Ok(compressed) => {
            debug!(
                file_name = %media.file_name,
                original = media.len(),
                compressed = compressed.len(),
                "Media compressed"
            );
            compressed
        }
        Err(e) => {
            warn!(file_name = %media.file_name, error = %e, "Compression failed, uploading original");
            media
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;

    mock! {
        pub Compressor {}

        #[async_trait]
        impl MediaCompressor for Compressor {
            async fn compress(&self, media: &MediaFile) -> Result<MediaFile, CompressError>;
        }
    }

    fn photo() -> MediaFile {
        MediaFile::new(vec![0u8; 64], "biscuit.jpg", "image/jpeg")
    }

    #[tokio::test]
    async fn test_compressed_media_is_used() {
        let mut compressor = MockCompressor::new();
        compressor
            .expect_compress()
            .times(1)
            .returning(|m| Ok(MediaFile::new(vec![1u8; 8], &m.file_name, &m.content_type)));

        let prepared = prepare_media(&compressor, photo()).await;
        assert_eq!(prepared.len(), 8);
        assert_eq!(prepared.file_name, "biscuit.jpg");
    }

    #[tokio::test]
    async fn test_failed_compression_keeps_original() {
        let mut compressor = MockCompressor::new();
        compressor
            .expect_compress()
            .returning(|_| Err(CompressError("codec unavailable".to_string())));

        let prepared = prepare_media(&compressor, photo()).await;
        assert_eq!(prepared, photo());
    }

    #[test]
    fn test_media_type_follows_content_type() {
        let clip = MediaFile::new(vec![], "zoomies.mov", "video/quicktime");
        assert_eq!(clip.media_type(), MediaType::Video);
        assert_eq!(photo().media_type(), MediaType::Image);
    }
}
