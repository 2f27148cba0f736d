//! Media engine boundary
//!
//! Microphone/camera acquisition, device selection and DTMF tone synthesis are
//! owned by an external media engine. The orchestrator only drives acquisition
//! and release, scoped to a call's `Active` phase: a stream is acquired on the
//! transition into `Active` and released on every transition out of it, so no
//! device handle outlives the phase it was acquired for.

use async_trait::async_trait;

use crate::error::ClientResult;

/// Opaque handle to an acquired media stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MediaStreamHandle(pub u64);

/// Constraints for a media stream acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    /// Capture audio
    pub audio: bool,
    /// Capture video
    pub video: bool,
}

impl MediaConstraints {
    /// Constraints for a voice-only call
    pub fn audio_only() -> Self {
        Self { audio: true, video: false }
    }

    /// Constraints for a voice + video call
    pub fn audio_video() -> Self {
        Self { audio: true, video: true }
    }

    /// Constraints matching a call's video flag
    pub fn for_call(video: bool) -> Self {
        if video {
            Self::audio_video()
        } else {
            Self::audio_only()
        }
    }
}

/// External engine owning capture devices and media streams
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Whether the engine can currently serve acquisitions
    ///
    /// Consulted by admission control; a not-ready engine denies new calls.
    fn is_ready(&self) -> bool;

    /// Acquire a capture stream matching the constraints
    async fn acquire(&self, constraints: MediaConstraints) -> ClientResult<MediaStreamHandle>;

    /// Release a previously acquired stream
    async fn release(&self, handle: MediaStreamHandle);

    /// Release every stream held by this engine
    async fn close_all(&self);
}
