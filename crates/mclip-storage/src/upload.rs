//! Upload policy for client-direct video uploads.
//!
//! Uploads are restricted to a fixed set of video containers and a maximum
//! byte size, and every issued key lives under `uploads/{user_id}/`.

use uuid::Uuid;

use crate::error::{StorageError, StorageResult};

/// Default maximum upload size (2 GiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Allowed `(extension, content-type)` pairs.
const ALLOWED_CONTAINERS: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("m4v", "video/x-m4v"),
    ("m4v", "video/mp4"),
    ("mov", "video/quicktime"),
    ("webm", "video/webm"),
    ("mkv", "video/x-matroska"),
];

/// Validated upload destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    /// Object key under the user's upload prefix
    pub key: String,
    pub content_type: String,
    pub size_bytes: u64,
}

/// Upload allow-list and size limit.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub max_bytes: u64,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl UploadPolicy {
    pub fn from_env() -> Self {
        Self {
            max_bytes: std::env::var("UPLOAD_MAX_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
        }
    }

    /// Validate an upload request and derive its scoped key.
    pub fn validate(
        &self,
        user_id: &str,
        filename: &str,
        content_type: &str,
        size_bytes: u64,
    ) -> StorageResult<UploadTarget> {
        if user_id.is_empty() || user_id.contains('/') || user_id.contains("..") {
            return Err(StorageError::rejected("Invalid user id"));
        }
        if size_bytes == 0 {
            return Err(StorageError::rejected("File is empty"));
        }
        if size_bytes > self.max_bytes {
            return Err(StorageError::rejected(format!(
                "File too large: {} bytes exceeds limit of {} bytes",
                size_bytes, self.max_bytes
            )));
        }

        let ext = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .ok_or_else(|| StorageError::rejected("File has no extension"))?;

        let content_type = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if !ALLOWED_CONTAINERS.iter().any(|(e, _)| *e == ext) {
            return Err(StorageError::rejected(format!("Extension .{} is not allowed", ext)));
        }
        if !ALLOWED_CONTAINERS
            .iter()
            .any(|(e, ct)| *e == ext && *ct == content_type)
        {
            return Err(StorageError::rejected(format!(
                "Content type {} does not match .{}",
                content_type, ext
            )));
        }

        Ok(UploadTarget {
            key: format!("uploads/{}/{}.{}", user_id, Uuid::new_v4(), ext),
            content_type,
            size_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_upload_is_scoped_to_user() {
        let target = UploadPolicy::default()
            .validate("user-1", "Launch Video.MP4", "video/mp4", 1024)
            .unwrap();
        assert!(target.key.starts_with("uploads/user-1/"));
        assert!(target.key.ends_with(".mp4"));
        assert_eq!(target.content_type, "video/mp4");
    }

    #[test]
    fn test_content_type_parameters_ignored() {
        let target = UploadPolicy::default()
            .validate("u", "a.webm", "video/webm; codecs=vp9", 10)
            .unwrap();
        assert_eq!(target.content_type, "video/webm");
    }

    #[test]
    fn test_rejects_disallowed_extension() {
        let err = UploadPolicy::default()
            .validate("u", "payload.exe", "application/octet-stream", 10)
            .unwrap_err();
        assert!(matches!(err, StorageError::UploadRejected(_)));
    }

    #[test]
    fn test_rejects_mismatched_content_type() {
        assert!(UploadPolicy::default()
            .validate("u", "clip.mov", "video/mp4", 10)
            .is_err());
    }

    #[test]
    fn test_rejects_size_limits() {
        let policy = UploadPolicy { max_bytes: 100 };
        assert!(policy.validate("u", "a.mp4", "video/mp4", 0).is_err());
        assert!(policy.validate("u", "a.mp4", "video/mp4", 101).is_err());
        assert!(policy.validate("u", "a.mp4", "video/mp4", 100).is_ok());
    }

    #[test]
    fn test_rejects_path_like_user_ids() {
        let policy = UploadPolicy::default();
        assert!(policy.validate("../other", "a.mp4", "video/mp4", 1).is_err());
        assert!(policy.validate("a/b", "a.mp4", "video/mp4", 1).is_err());
        assert!(policy.validate("", "a.mp4", "video/mp4", 1).is_err());
    }

    #[test]
    fn test_rejects_missing_extension() {
        assert!(UploadPolicy::default()
            .validate("u", "video", "video/mp4", 1)
            .is_err());
    }
}
