use base64::{engine::general_purpose::STANDARD, Engine};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use super::{ImageStore, MediaError, UPLOADS_PREFIX};

/// Accepted image types: (mime, extension).
const IMAGE_TYPES: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];

/// Content-addressed image files under `{data_dir}/uploads`.
pub struct DiskImageStore {
    dir: PathBuf,
    max_bytes: usize,
}

impl DiskImageStore {
    pub fn new(data_dir: &str, max_bytes: usize) -> Self {
        Self {
            dir: Path::new(data_dir).join("uploads"),
            max_bytes,
        }
    }
}

/// Split an optional data URL into (mime, base64 body).
/// Bare base64 is sniffed from its magic bytes after decoding.
fn split_data_url(encoded: &str) -> (Option<&str>, &str) {
    match encoded
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(";base64,"))
    {
        Some((mime, body)) => (Some(mime), body),
        None => (None, encoded),
    }
}

fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF8") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

fn extension_for(mime: &str) -> Option<&'static str> {
    IMAGE_TYPES.iter().find(|(m, _)| *m == mime).map(|(_, ext)| *ext)
}

fn mime_for_name(name: &str) -> Option<&'static str> {
    let ext = name.rsplit_once('.')?.1;
    IMAGE_TYPES.iter().find(|(_, e)| *e == ext).map(|(m, _)| *m)
}

/// `<64 hex>.<ext>` only; anything else could escape the uploads dir.
fn is_valid_name(name: &str) -> bool {
    match name.split_once('.') {
        Some((hash, ext)) => {
            hash.len() == 64
                && hash.bytes().all(|b| b.is_ascii_hexdigit())
                && extension_for_ext(ext)
        }
        None => false,
    }
}

fn extension_for_ext(ext: &str) -> bool {
    IMAGE_TYPES.iter().any(|(_, e)| *e == ext)
}

impl ImageStore for DiskImageStore {
    fn put(&self, encoded: &str) -> Result<String, MediaError> {
        let (declared_mime, body) = split_data_url(encoded.trim());

        // Cheap pre-check before decoding: base64 expands by 4/3.
        if body.len() / 4 * 3 > self.max_bytes + 3 {
            return Err(MediaError::TooLarge {
                size: body.len() / 4 * 3,
                limit: self.max_bytes,
            });
        }

        let bytes = STANDARD
            .decode(body)
            .map_err(|_| MediaError::InvalidEncoding)?;
        if bytes.len() > self.max_bytes {
            return Err(MediaError::TooLarge {
                size: bytes.len(),
                limit: self.max_bytes,
            });
        }

        let mime = match declared_mime {
            Some(m) => m.to_string(),
            None => sniff_mime(&bytes)
                .ok_or_else(|| MediaError::UnsupportedType("unknown".to_string()))?
                .to_string(),
        };
        let ext = extension_for(&mime).ok_or(MediaError::UnsupportedType(mime))?;

        let name = format!("{}.{}", hex::encode(Sha256::digest(&bytes)), ext);
        let path = self.dir.join(&name);

        if !path.exists() {
            std::fs::create_dir_all(&self.dir)?;
            std::fs::write(&path, &bytes)?;
            tracing::debug!("Stored image {} ({} bytes)", name, bytes.len());
        }

        Ok(format!("{}{}", UPLOADS_PREFIX, name))
    }

    fn get(&self, name: &str) -> Result<Option<(Vec<u8>, &'static str)>, MediaError> {
        if !is_valid_name(name) {
            return Err(MediaError::InvalidName);
        }
        let mime = mime_for_name(name).ok_or(MediaError::InvalidName)?;

        match std::fs::read(self.dir.join(name)) {
            Ok(bytes) => Ok(Some((bytes, mime))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
