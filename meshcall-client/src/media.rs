use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    fn codec(self) -> RTCRtpCodecCapability {
        match self {
            TrackKind::Audio => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                ..Default::default()
            },
            TrackKind::Video => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90000,
                ..Default::default()
            },
        }
    }
}

/// A captured local track. Muting keeps the track attached to every
/// connection and only stops samples from flowing.
pub struct MediaTrack {
    id: String,
    kind: TrackKind,
    enabled: AtomicBool,
    stopped: AtomicBool,
    rtc: Arc<TrackLocalStaticSample>,
}

impl MediaTrack {
    pub fn new(kind: TrackKind, id: impl Into<String>, stream_id: impl Into<String>) -> Self {
        let id = id.into();
        let rtc = Arc::new(TrackLocalStaticSample::new(
            kind.codec(),
            id.clone(),
            stream_id.into(),
        ));
        Self {
            id,
            kind,
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
            rtc,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    /// Handle attached to each peer connection.
    pub fn rtc_track(&self) -> Arc<TrackLocalStaticSample> {
        self.rtc.clone()
    }

    /// Pushes one encoded sample to every connection carrying this track.
    /// Returns `false` when the sample was dropped because the track is
    /// muted or stopped.
    pub async fn write_sample(&self, data: Bytes, duration: Duration) -> anyhow::Result<bool> {
        if self.is_stopped() || !self.is_enabled() {
            return Ok(false);
        }
        self.rtc
            .write_sample(&Sample {
                data,
                duration,
                ..Default::default()
            })
            .await?;
        Ok(true)
    }
}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("enabled", &self.is_enabled())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

struct LocalMediaInner {
    stream_id: String,
    tracks: Vec<Arc<MediaTrack>>,
}

/// The local capture, shared by every peer link of a session.
#[derive(Clone)]
pub struct LocalMedia {
    inner: Arc<LocalMediaInner>,
}

impl LocalMedia {
    pub fn new(stream_id: impl Into<String>, tracks: Vec<MediaTrack>) -> Self {
        Self {
            inner: Arc::new(LocalMediaInner {
                stream_id: stream_id.into(),
                tracks: tracks.into_iter().map(Arc::new).collect(),
            }),
        }
    }

    /// One microphone track and one camera track.
    pub fn audio_video(stream_id: impl Into<String>) -> Self {
        let stream_id = stream_id.into();
        let audio = MediaTrack::new(TrackKind::Audio, format!("{stream_id}-audio"), &stream_id);
        let video = MediaTrack::new(TrackKind::Video, format!("{stream_id}-video"), &stream_id);
        Self::new(stream_id, vec![audio, video])
    }

    pub fn stream_id(&self) -> &str {
        &self.inner.stream_id
    }

    pub fn tracks(&self) -> &[Arc<MediaTrack>] {
        &self.inner.tracks
    }

    fn of_kind(&self, kind: TrackKind) -> impl Iterator<Item = &Arc<MediaTrack>> {
        self.inner.tracks.iter().filter(move |t| t.kind() == kind)
    }

    pub fn set_video_enabled(&self, enabled: bool) {
        self.of_kind(TrackKind::Video)
            .for_each(|t| t.set_enabled(enabled));
    }

    pub fn set_audio_enabled(&self, enabled: bool) {
        self.of_kind(TrackKind::Audio)
            .for_each(|t| t.set_enabled(enabled));
    }

    /// A capture without a camera reports video as off.
    pub fn is_video_enabled(&self) -> bool {
        self.of_kind(TrackKind::Video)
            .next()
            .is_some_and(|t| t.is_enabled())
    }

    pub fn is_audio_enabled(&self) -> bool {
        self.of_kind(TrackKind::Audio)
            .next()
            .is_some_and(|t| t.is_enabled())
    }

    /// Releases the capture devices. Idempotent.
    pub fn stop(&self) {
        self.inner.tracks.iter().for_each(|t| t.stop());
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.tracks.iter().all(|t| t.is_stopped())
    }
}

impl fmt::Debug for LocalMedia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalMedia")
            .field("stream_id", &self.inner.stream_id)
            .field("tracks", &self.inner.tracks)
            .finish()
    }
}

/// Capture-device acquisition.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Fails with `ClientError::MediaAccess` when devices are unavailable or
    /// permission is denied.
    async fn acquire(&self) -> Result<LocalMedia>;
}

/// Media received from a remote participant.
#[derive(Clone)]
pub struct RemoteTrack {
    pub id: String,
    pub stream_id: String,
    pub kind: TrackKind,
    source: Option<Arc<TrackRemote>>,
}

impl RemoteTrack {
    pub fn new(id: impl Into<String>, stream_id: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: id.into(),
            stream_id: stream_id.into(),
            kind,
            source: None,
        }
    }

    pub fn from_rtc(track: Arc<TrackRemote>) -> Self {
        let kind = match track.kind() {
            RTPCodecType::Audio => TrackKind::Audio,
            _ => TrackKind::Video,
        };
        Self {
            id: track.id(),
            stream_id: track.stream_id(),
            kind,
            source: Some(track),
        }
    }

    /// The underlying RTP reader, when the track came from a real connection.
    pub fn rtp_source(&self) -> Option<Arc<TrackRemote>> {
        self.source.clone()
    }
}

impl fmt::Debug for RemoteTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTrack")
            .field("id", &self.id)
            .field("stream_id", &self.stream_id)
            .field("kind", &self.kind)
            .finish()
    }
}
