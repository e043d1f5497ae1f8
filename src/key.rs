//! Content-addressed storage keys

use mime::Mime;
use std::fmt;

use crate::digest::digest;

pub const WEBP_EXTENSION: &str = "webp";
pub const FALLBACK_EXTENSION: &str = "bin";

/// `<md5-hex>.<extension>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn content_hash(&self) -> &str {
        self.0.split_once('.').map_or(self.0.as_str(), |(hash, _)| hash)
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extension and media type the object is stored under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectFormat {
    pub extension: String,
    pub mime: Mime,
}

impl ObjectFormat {
    pub fn webp() -> Self {
        Self {
            extension: WEBP_EXTENSION.to_string(),
            mime: image_webp(),
        }
    }

    /// Keeps the source's suffix and media type when webp is off
    pub fn passthrough(name: &str, content_type: Option<&Mime>) -> Self {
        let extension = name
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty())
            .unwrap_or(FALLBACK_EXTENSION);

        Self {
            extension: extension.to_string(),
            mime: content_type
                .cloned()
                .unwrap_or(mime::APPLICATION_OCTET_STREAM),
        }
    }
}

/// `image/webp` has no constant in the mime crate
fn image_webp() -> Mime {
    "image/webp"
        .parse()
        .unwrap_or(mime::APPLICATION_OCTET_STREAM)
}

/// Key for the bytes that will actually be uploaded
pub fn derive_key(final_bytes: &[u8], extension: &str) -> StorageKey {
    StorageKey(format!("{}.{}", digest(final_bytes), extension))
}
