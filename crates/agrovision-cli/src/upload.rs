//! Upload validation
//!
//! Checks applied to every image before it reaches the engine.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Accepted image extensions, compared case-insensitively
pub const ALLOWED_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "gif", "bmp", "tif", "tiff"];

/// Largest accepted upload (16 MiB)
pub const MAX_UPLOAD_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("unsupported file type '{extension}' (allowed: {allowed})")]
    UnsupportedExtension { extension: String, allowed: String },

    #[error("file is {size} bytes; limit is {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    #[error("cannot read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// True when the file name carries an accepted image extension
pub fn allowed_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Validate and read one upload
pub fn read_upload(path: &Path) -> Result<Vec<u8>, UploadError> {
    if !allowed_file(path) {
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_default();
        return Err(UploadError::UnsupportedExtension {
            extension,
            allowed: ALLOWED_EXTENSIONS.join(", "),
        });
    }

    let unreadable = |source| UploadError::Unreadable {
        path: path.to_path_buf(),
        source,
    };

    let size = std::fs::metadata(path).map_err(unreadable)?.len();
    if size > MAX_UPLOAD_BYTES {
        return Err(UploadError::TooLarge {
            size,
            limit: MAX_UPLOAD_BYTES,
        });
    }

    std::fs::read(path).map_err(unreadable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_extensions() {
        assert!(allowed_file(Path::new("leaf.png")));
        assert!(allowed_file(Path::new("leaf.JPEG")));
        assert!(allowed_file(Path::new("scans/leaf.tif")));
        assert!(!allowed_file(Path::new("leaf.webp")));
        assert!(!allowed_file(Path::new("leaf")));
        assert!(!allowed_file(Path::new("png")));
    }

    #[test]
    fn test_rejects_extension_before_reading() {
        let err = read_upload(Path::new("/nonexistent/leaf.txt")).unwrap_err();
        assert!(matches!(err, UploadError::UnsupportedExtension { .. }));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_upload(&dir.path().join("missing.jpg")).unwrap_err();
        assert!(matches!(err, UploadError::Unreadable { .. }));
    }

    #[test]
    fn test_size_limit() {
        let dir = tempfile::tempdir().unwrap();

        let at_limit = dir.path().join("ok.png");
        let file = std::fs::File::create(&at_limit).unwrap();
        file.set_len(MAX_UPLOAD_BYTES).unwrap();
        assert_eq!(read_upload(&at_limit).unwrap().len() as u64, MAX_UPLOAD_BYTES);

        let over = dir.path().join("big.png");
        let file = std::fs::File::create(&over).unwrap();
        file.set_len(MAX_UPLOAD_BYTES + 1).unwrap();
        assert!(matches!(
            read_upload(&over),
            Err(UploadError::TooLarge { size, .. }) if size == MAX_UPLOAD_BYTES + 1
        ));
    }
}
