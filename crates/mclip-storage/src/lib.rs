//! Cloudflare R2 storage client.
//!
//! This crate provides:
//! - Byte upload/download to R2
//! - Public URLs for persisted clips and thumbnails
//! - Presigned PUT URLs for client-direct uploads
//! - Upload policy validation (allowed containers, size limit)

pub mod client;
pub mod error;
pub mod upload;

pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use upload::{UploadPolicy, UploadTarget};
