//! Shared data models for the MomentClip pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, their generation context and status machine
//! - Clips and their status machine
//! - Transcript segments and analyzer moments
//! - Webhook continuations carried through callback URLs
//! - Guarded job and clip patches
//! - User notifications

pub mod clip;
pub mod continuation;
pub mod job;
pub mod job_status;
pub mod moment;
pub mod notification;
pub mod patch;
pub mod timestamp;
pub mod transcript;

// Re-export common types
pub use clip::{Clip, ClipId, ClipStatus};
pub use continuation::{Continuation, ContinuationError, PipelineStep};
pub use job::{AnalysisSnapshot, GenerationContext, Job, JobId};
pub use job_status::{JobStatus, progress};
pub use moment::{Moment, MomentScores, MomentType};
pub use notification::{Notification, NotificationType};
pub use patch::{ClipGuard, ClipPatch, JobPatch};
pub use transcript::TranscriptSegment;
