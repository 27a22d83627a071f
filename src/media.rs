use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

const MAX_IMAGE_BYTES: usize = 2 * 1024 * 1024;

/// Reads an image file and returns it as a `data:` URL suitable for the logo or a player photo.
pub fn image_data_url(path: &Path) -> Result<String> {
    let mime = mime_for(path).ok_or_else(|| anyhow!("unsupported image type: {}", path.display()))?;
    let bytes = fs::read(path).with_context(|| format!("read image {}", path.display()))?;
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(anyhow!(
            "image is {} KiB, limit is {} KiB",
            bytes.len() / 1024,
            MAX_IMAGE_BYTES / 1024
        ));
    }
    Ok(encode_data_url(mime, &bytes))
}

pub fn encode_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", BASE64.encode(bytes))
}

fn mime_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_data_url() {
        assert_eq!(encode_data_url("image/png", b"hi"), "data:image/png;base64,aGk=");
    }

    #[test]
    fn rejects_unknown_extension() {
        assert!(image_data_url(Path::new("logo.bmp")).is_err());
    }
}
