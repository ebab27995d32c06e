//! Media streams and tracks
//!
//! A [`MediaStream`] is a bundle of [`MediaTrack`] handles. Video tracks carry
//! a `watch` receiver of frames; audio tracks are passed through untouched.

use crate::frame::VideoFrame;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

static NEXT_MEDIA_ID: AtomicU64 = AtomicU64::new(1);

fn next_media_id() -> u64 {
    NEXT_MEDIA_ID.fetch_add(1, Ordering::Relaxed)
}

/// Receiver side of a video track
pub type FrameReceiver = watch::Receiver<Option<VideoFrame>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

/// A handle to one track.
///
/// Cloning the handle shares the track; [`MediaTrack::clone_track`] creates an
/// independent track that can be stopped separately.
#[derive(Debug, Clone)]
pub struct MediaTrack {
    id: u64,
    kind: TrackKind,
    label: Arc<str>,
    ended: CancellationToken,
    frames: Option<FrameReceiver>,
}

impl MediaTrack {
    pub fn audio(label: &str) -> Self {
        Self {
            id: next_media_id(),
            kind: TrackKind::Audio,
            label: label.into(),
            ended: CancellationToken::new(),
            frames: None,
        }
    }

    pub fn video(label: &str, frames: FrameReceiver) -> Self {
        Self {
            id: next_media_id(),
            kind: TrackKind::Video,
            label: label.into(),
            ended: CancellationToken::new(),
            frames: Some(frames),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Frame receiver for video tracks
    pub fn frames(&self) -> Option<FrameReceiver> {
        self.frames.clone()
    }

    /// Create a new track with the same content and its own lifetime
    pub fn clone_track(&self) -> Self {
        Self {
            id: next_media_id(),
            kind: self.kind,
            label: Arc::clone(&self.label),
            ended: CancellationToken::new(),
            frames: self.frames.clone(),
        }
    }

    pub fn stop(&self) {
        if !self.ended.is_cancelled() {
            log::debug!("Stopping {} track {} ({})", self.kind.name(), self.id, self.label);
            self.ended.cancel();
        }
    }

    pub fn is_live(&self) -> bool {
        !self.ended.is_cancelled()
    }

    /// Resolves once the track is stopped
    pub async fn ended(&self) {
        self.ended.cancelled().await
    }
}

/// An ordered set of tracks
#[derive(Debug, Clone)]
pub struct MediaStream {
    id: u64,
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: next_media_id(),
            tracks,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn add_track(&mut self, track: MediaTrack) {
        self.tracks.push(track);
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(|t| t.kind == TrackKind::Video)
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(|t| t.kind == TrackKind::Audio)
    }

    /// Frames of the first live video track
    pub fn video_frames(&self) -> Option<FrameReceiver> {
        self.video_tracks()
            .find(|t| t.is_live())
            .and_then(MediaTrack::frames)
    }

    /// True while at least one track is live
    pub fn is_active(&self) -> bool {
        self.tracks.iter().any(MediaTrack::is_live)
    }

    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}
