// Playback controller
// Owns the context, the decoded session and the progress poll loop

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::buffer::DecodedTrack;
use super::context::{AudioContext, GainStage, SourceNode};
use super::decoder::{extension_hint, AudioDecoder};
use super::events::{EventNotifier, EventSubscription};
use super::waveform::WaveformCanvas;
use crate::error::{PlayerError, Result};
use crate::fetch::TrackFetcher;

/// Slack allowed between the clock and the track length when detecting the end
const END_TOLERANCE: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TransportState {
    Playing,
    Paused,
}

#[derive(Debug, Clone)]
pub struct PlayerOptions {
    pub poll_interval: Duration,
    pub volume: f32,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            volume: 1.0,
        }
    }
}

/// The currently loaded track
struct PlaybackSession {
    url: String,
    track: Arc<DecodedTrack>,
    source: Option<SourceNode>,
    gain: GainStage,
    /// Context time at which offset zero would have played
    anchor: f64,
    ended: bool,
}

impl PlaybackSession {
    fn duration(&self) -> f64 {
        self.track.duration()
    }

    fn offset(&self, now: f64) -> f64 {
        if self.ended {
            return self.duration();
        }
        (now - self.anchor).clamp(0.0, self.duration())
    }

    fn stop_source(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.stop();
        }
    }
}

struct Core {
    session: Option<PlaybackSession>,
    transport: TransportState,
    volume: f32,
    poller: Option<JoinHandle<()>>,
    /// Bumped whenever the poll loop is cancelled; a loop holding an older value is stale
    run: u64,
}

impl Core {
    fn stop_interval_if_active(&mut self) {
        self.run += 1;
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }
}

struct Inner {
    context: Arc<dyn AudioContext>,
    notifier: EventNotifier,
    poll_interval: Duration,
    runtime: Handle,
    core: Mutex<Core>,
}

/// Audio playback controller
///
/// One track at a time: switching or seeking always tears down the previous
/// source before the next one starts. Progress is reported through
/// [`PlayerEvent`](super::events::PlayerEvent)s from a fixed-interval poll loop
/// that only runs while playing.
pub struct Player {
    inner: Arc<Inner>,
    fetcher: Arc<dyn TrackFetcher>,
    load_ticket: AtomicU64,
}

impl Player {
    /// Must be called from within a tokio runtime
    pub fn new(
        context: Arc<dyn AudioContext>,
        fetcher: Arc<dyn TrackFetcher>,
        options: PlayerOptions,
    ) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| PlayerError::Output(format!("Player needs a tokio runtime: {}", e)))?;

        Ok(Self {
            inner: Arc::new(Inner {
                context,
                notifier: EventNotifier::new(),
                poll_interval: options.poll_interval,
                runtime,
                core: Mutex::new(Core {
                    session: None,
                    transport: TransportState::Paused,
                    volume: sanitize_volume(options.volume),
                    poller: None,
                    run: 0,
                }),
            }),
            fetcher,
            load_ticket: AtomicU64::new(0),
        })
    }

    pub fn subscribe(&self) -> EventSubscription {
        self.inner.notifier.subscribe()
    }

    /// Load `url` and start playing it at `start_fraction` of its length
    ///
    /// Returns the track duration in seconds. The current session is stopped
    /// straight away; if loading fails it stays loaded but paused. When another
    /// call starts before this one finishes decoding, this one returns
    /// [`PlayerError::Superseded`] and changes nothing.
    pub async fn switch_track(&self, url: &str, start_fraction: f64) -> Result<f64> {
        let ticket = self.load_ticket.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Loading {}", url);

        {
            let mut core = self.inner.core.lock();
            core.stop_interval_if_active();
            if let Some(session) = core.session.as_mut() {
                session.stop_source();
                self.inner.context.suspend();
                core.transport = TransportState::Paused;
            }
        }

        let bytes = self
            .fetcher
            .fetch(url)
            .await
            .map_err(|e| PlayerError::from_fetch(url, e))?;

        let context = self.inner.context.clone();
        let hint = extension_hint(url);
        let track = tokio::task::spawn_blocking(move || {
            let decoded = AudioDecoder::from_bytes(bytes, hint.as_deref())?.decode_all()?;
            context.prepare(decoded)
        })
        .await
        .map_err(|e| PlayerError::track_load(url, format!("Decode task failed: {}", e)))?
        .map_err(|e| PlayerError::track_load(url, e))?;

        let mut core = self.inner.core.lock();
        if self.load_ticket.load(Ordering::SeqCst) != ticket {
            debug!("Discarding {}, a newer track was requested", url);
            return Err(PlayerError::Superseded(url.to_string()));
        }

        core.stop_interval_if_active();
        if let Some(mut old) = core.session.take() {
            old.stop_source();
        }

        let track = Arc::new(track);
        let duration = track.duration();
        let gain = GainStage::new(core.volume);
        core.session = Some(PlaybackSession {
            url: url.to_string(),
            track,
            source: None,
            gain,
            anchor: 0.0,
            ended: false,
        });

        self.inner.context.resume();
        core.transport = TransportState::Playing;
        Self::start_playback(&self.inner, &mut core, start_fraction)?;

        info!("Playing {} ({:.1}s)", url, duration);
        Ok(duration)
    }

    /// Restart the loaded track at `fraction` of its length
    pub fn play_from_timestamp(&self, fraction: f64) -> Result<()> {
        let mut core = self.inner.core.lock();
        Self::start_playback(&self.inner, &mut core, fraction)
    }

    pub fn pause(&self) -> Result<()> {
        let mut core = self.inner.core.lock();
        if core.session.is_none() {
            return Err(PlayerError::NotReady);
        }

        core.stop_interval_if_active();
        self.inner.context.suspend();
        if core.transport != TransportState::Paused {
            debug!("Paused");
        }
        core.transport = TransportState::Paused;
        Ok(())
    }

    /// Resume after [`pause`](Self::pause); a session that already ended stays paused
    pub fn unpause(&self) -> Result<()> {
        let mut core = self.inner.core.lock();
        let (ended, resume_at) = match core.session.as_ref() {
            Some(session) => {
                // A source torn down by a failed switch has to be recreated
                let resume_at = session.source.is_none().then(|| {
                    let offset = session.offset(self.inner.context.current_time());
                    if session.duration() > 0.0 {
                        offset / session.duration()
                    } else {
                        0.0
                    }
                });
                (session.ended, resume_at)
            }
            None => return Err(PlayerError::NotReady),
        };

        if ended {
            debug!("Ignoring unpause, session already ended");
            return Ok(());
        }
        if core.transport == TransportState::Playing && core.poller.is_some() {
            return Ok(());
        }

        self.inner.context.resume();
        core.transport = TransportState::Playing;
        match resume_at {
            Some(fraction) => Self::start_playback(&self.inner, &mut core, fraction)?,
            None => {
                core.stop_interval_if_active();
                Self::start_interval(&self.inner, &mut core);
            }
        }
        debug!("Resumed");
        Ok(())
    }

    /// Takes effect on the live gain stage if a session exists, otherwise on the next one
    pub fn set_volume(&self, volume: f32) {
        let volume = sanitize_volume(volume);
        let mut core = self.inner.core.lock();
        core.volume = volume;
        if let Some(session) = core.session.as_ref() {
            session.gain.set(volume);
        }
    }

    pub fn volume(&self) -> f32 {
        self.inner.core.lock().volume
    }

    /// Gain factor currently applied to the live session
    pub fn live_gain(&self) -> Option<f32> {
        self.inner
            .core
            .lock()
            .session
            .as_ref()
            .map(|session| session.gain.get())
    }

    /// Seconds into the current track
    pub fn offset(&self) -> Result<f64> {
        let core = self.inner.core.lock();
        let session = core.session.as_ref().ok_or(PlayerError::NotReady)?;
        Ok(session.offset(self.inner.context.current_time()))
    }

    pub fn duration(&self) -> Result<f64> {
        let core = self.inner.core.lock();
        let session = core.session.as_ref().ok_or(PlayerError::NotReady)?;
        Ok(session.duration())
    }

    /// None until a track has been loaded
    pub fn transport(&self) -> Option<TransportState> {
        let core = self.inner.core.lock();
        core.session.as_ref().map(|_| core.transport)
    }

    pub fn current_url(&self) -> Option<String> {
        let core = self.inner.core.lock();
        core.session.as_ref().map(|session| session.url.clone())
    }

    pub fn has_ended(&self) -> bool {
        let core = self.inner.core.lock();
        core.session.as_ref().map(|s| s.ended).unwrap_or(false)
    }

    /// Draw the first channel of the loaded track
    pub fn render_waveform(&self, canvas: &mut WaveformCanvas) -> Result<()> {
        let track = {
            let core = self.inner.core.lock();
            core.session
                .as_ref()
                .ok_or(PlayerError::NotReady)?
                .track
                .clone()
        };
        canvas.render(&track.first_channel());
        Ok(())
    }

    fn start_playback(inner: &Arc<Inner>, core: &mut Core, fraction: f64) -> Result<()> {
        core.stop_interval_if_active();
        let session = core.session.as_mut().ok_or(PlayerError::NotReady)?;
        session.stop_source();

        let offset = fraction_to_offset(fraction, session.duration());
        let source = inner
            .context
            .start_source(session.track.clone(), offset, session.gain.clone())
            .map_err(PlayerError::Output)?;

        session.anchor = inner.context.current_time() - offset;
        session.ended = false;
        session.source = Some(source);
        debug!("Source started at {:.2}s", offset);

        if core.transport == TransportState::Playing {
            Self::start_interval(inner, core);
        }
        Ok(())
    }

    fn start_interval(inner: &Arc<Inner>, core: &mut Core) {
        let Some(session) = core.session.as_ref() else {
            return;
        };
        let completion = session.source.as_ref().map(|source| source.completion());
        let run = core.run;
        let weak = Arc::downgrade(inner);
        let period = inner.poll_interval;

        core.poller = Some(
            inner
                .runtime
                .spawn(poll_loop(weak, run, completion, period)),
        );
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        let mut core = self.inner.core.lock();
        core.stop_interval_if_active();
        if let Some(mut session) = core.session.take() {
            session.stop_source();
        }
    }
}

/// Emit progress every `period` and detect the natural end of the session
async fn poll_loop(
    inner: Weak<Inner>,
    run: u64,
    mut completion: Option<watch::Receiver<bool>>,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut completion_seen = false;

    loop {
        let mut source_done = false;
        let mut source_gone = false;

        match completion.as_mut() {
            Some(rx) => {
                tokio::select! {
                    _ = ticker.tick() => {}
                    result = async { rx.wait_for(|done| *done).await.map(|_| ()) } => {
                        match result {
                            Ok(()) => source_done = true,
                            Err(_) => source_gone = true,
                        }
                    }
                }
            }
            None => {
                ticker.tick().await;
            }
        }

        if source_done || source_gone {
            completion = None;
        }
        completion_seen |= source_done;

        let Some(shared) = inner.upgrade() else {
            return;
        };
        if !report_progress(&shared, run, source_done, completion_seen) {
            return;
        }
    }
}

/// Publish one tick; returns false once the loop should stop
fn report_progress(inner: &Inner, run: u64, source_done: bool, completion_seen: bool) -> bool {
    let mut core = inner.core.lock();
    if core.run != run {
        return false;
    }
    let Some(session) = core.session.as_mut() else {
        return false;
    };

    let duration = session.duration();
    let offset = session.offset(inner.context.current_time());

    if completion_seen && offset + END_TOLERANCE >= duration {
        session.ended = true;
        inner.notifier.timestamp_change(duration, duration);
        inner.notifier.ended();
        info!("Playback of {} ended", session.url);

        inner.context.suspend();
        core.transport = TransportState::Paused;
        core.run += 1;
        // This task is the poller; dropping the handle just detaches it
        core.poller = None;
        return false;
    }

    if source_done {
        debug!(
            "Source reported completion early at {:.3}s of {:.3}s",
            offset, duration
        );
    }
    inner.notifier.timestamp_change(offset, duration);
    true
}

fn fraction_to_offset(fraction: f64, duration: f64) -> f64 {
    if !fraction.is_finite() {
        return 0.0;
    }
    fraction.clamp(0.0, 1.0) * duration
}

fn sanitize_volume(volume: f32) -> f32 {
    if volume.is_finite() {
        volume.max(0.0)
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction_to_offset() {
        assert_eq!(fraction_to_offset(0.5, 10.0), 5.0);
        assert_eq!(fraction_to_offset(-1.0, 10.0), 0.0);
        assert_eq!(fraction_to_offset(2.0, 10.0), 10.0);
        assert_eq!(fraction_to_offset(f64::NAN, 10.0), 0.0);
    }

    #[test]
    fn test_sanitize_volume() {
        assert_eq!(sanitize_volume(0.3), 0.3);
        assert_eq!(sanitize_volume(-0.5), 0.0);
        // No upper clamp
        assert_eq!(sanitize_volume(1.5), 1.5);
        assert_eq!(sanitize_volume(f32::NAN), 1.0);
    }

    #[test]
    fn test_session_offset_is_clamped() {
        let session = PlaybackSession {
            url: "x".to_string(),
            track: Arc::new(DecodedTrack::new(vec![0.0; 100], 10, 1)),
            source: None,
            gain: GainStage::default(),
            anchor: 5.0,
            ended: false,
        };
        assert_eq!(session.offset(3.0), 0.0);
        assert_eq!(session.offset(8.0), 3.0);
        assert_eq!(session.offset(100.0), 10.0);
    }
}
