mod common;

use common::*;
use podsloth_lib::audio::{PlayerEvent, TransportState, WaveformCanvas};
use podsloth_lib::PlayerError;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

#[tokio::test(start_paused = true)]
async fn test_switch_track_reports_duration_and_progress() {
    let player = silent_player(fixtures());
    let mut events = player.subscribe();

    let duration = player.switch_track(TEN_SECONDS, 0.0).await.unwrap();
    assert!(approx(duration, 10.0, 1e-6));
    assert_eq!(player.transport(), Some(TransportState::Playing));
    assert_eq!(player.current_url().as_deref(), Some(TEN_SECONDS));

    sleep(Duration::from_millis(5100)).await;

    let received = drain(&mut events);
    let offsets = offsets(&received);
    let last = *offsets.last().unwrap();
    assert!((4.8..=5.2).contains(&last), "last offset {}", last);
    // Immediate tick on start, then every 200ms
    assert!(approx(offsets[0], 0.0, 1e-6));
    assert!(offsets.len() >= 25 && offsets.len() <= 27, "{} ticks", offsets.len());
    assert_eq!(ended_count(&received), 0);

    for event in &received {
        if let PlayerEvent::TimestampChange { duration, .. } = event {
            assert!(approx(*duration, 10.0, 1e-6));
        }
    }

    assert!(approx(player.offset().unwrap(), 5.1, 1e-3));
}

#[tokio::test(start_paused = true)]
async fn test_natural_end_emits_single_ended_after_final_tick() {
    let player = silent_player(fixtures());
    let mut events = player.subscribe();

    player.switch_track(TEN_SECONDS, 0.0).await.unwrap();
    sleep(Duration::from_secs(11)).await;

    let received = drain(&mut events);
    assert_eq!(ended_count(&received), 1);
    assert_eq!(received.last(), Some(&PlayerEvent::Ended));

    match received[received.len() - 2] {
        PlayerEvent::TimestampChange { offset, duration } => {
            assert!(approx(offset, duration, 1e-6));
        }
        PlayerEvent::Ended => panic!("two ended events in a row"),
    }

    // Nothing is emitted once the session ended
    sleep(Duration::from_secs(2)).await;
    assert!(drain(&mut events).is_empty());

    assert!(player.has_ended());
    assert_eq!(player.transport(), Some(TransportState::Paused));
    assert!(approx(player.offset().unwrap(), 10.0, 1e-6));

    // Unpausing an ended session changes nothing
    player.unpause().unwrap();
    sleep(Duration::from_secs(1)).await;
    assert!(drain(&mut events).is_empty());
    assert_eq!(player.transport(), Some(TransportState::Paused));
}

#[tokio::test(start_paused = true)]
async fn test_pause_freezes_offset_and_unpause_continues() {
    let player = silent_player(fixtures());
    let mut events = player.subscribe();

    player.switch_track(TEN_SECONDS, 0.0).await.unwrap();
    sleep(Duration::from_secs(2)).await;

    player.pause().unwrap();
    let paused_at = player.offset().unwrap();
    assert!(approx(paused_at, 2.0, 1e-3));
    drain(&mut events);

    sleep(Duration::from_secs(3)).await;
    assert!(approx(player.offset().unwrap(), paused_at, 1e-9));
    assert!(drain(&mut events).is_empty());

    // Pausing twice is harmless
    player.pause().unwrap();

    player.unpause().unwrap();
    assert_eq!(player.transport(), Some(TransportState::Playing));
    sleep(Duration::from_secs(1)).await;
    assert!(approx(player.offset().unwrap(), paused_at + 1.0, 1e-3));

    let offsets = offsets(&drain(&mut events));
    assert!(approx(offsets[0], paused_at, 1e-3));
}

#[tokio::test(start_paused = true)]
async fn test_rapid_controls_never_duplicate_ticks() {
    let player = silent_player(fixtures());
    let mut events = player.subscribe();

    player.switch_track(TEN_SECONDS, 0.0).await.unwrap();
    player.pause().unwrap();
    player.unpause().unwrap();
    player.pause().unwrap();
    player.unpause().unwrap();
    player.unpause().unwrap();
    player.play_from_timestamp(0.5).unwrap();

    sleep(Duration::from_millis(1100)).await;

    let offsets = offsets(&drain(&mut events));
    assert!(approx(offsets[0], 5.0, 1e-3));
    assert!(offsets.len() >= 6 && offsets.len() <= 7, "{:?}", offsets);
    for pair in offsets.windows(2) {
        assert!(pair[1] > pair[0], "duplicate or stale tick in {:?}", offsets);
    }
}

#[tokio::test(start_paused = true)]
async fn test_seek_while_paused_stays_paused() {
    let player = silent_player(fixtures());
    let mut events = player.subscribe();

    player.switch_track(TEN_SECONDS, 0.0).await.unwrap();
    sleep(Duration::from_secs(1)).await;
    player.pause().unwrap();
    drain(&mut events);

    player.play_from_timestamp(0.25).unwrap();
    sleep(Duration::from_secs(1)).await;

    assert_eq!(player.transport(), Some(TransportState::Paused));
    assert!(approx(player.offset().unwrap(), 2.5, 1e-6));
    assert!(drain(&mut events).is_empty());

    player.unpause().unwrap();
    sleep(Duration::from_millis(500)).await;
    assert!(approx(player.offset().unwrap(), 3.0, 1e-3));
}

#[tokio::test(start_paused = true)]
async fn test_start_fraction_is_clamped() {
    let player = silent_player(fixtures());

    player.switch_track(TEN_SECONDS, 0.3).await.unwrap();
    assert!(approx(player.offset().unwrap(), 3.0, 1e-3));

    player.play_from_timestamp(7.0).unwrap();
    assert!(approx(player.offset().unwrap(), 10.0, 1e-3));

    player.play_from_timestamp(-2.0).unwrap();
    assert!(approx(player.offset().unwrap(), 0.0, 1e-3));
}

#[tokio::test(start_paused = true)]
async fn test_controls_before_load_are_not_ready() {
    let player = silent_player(fixtures());

    assert!(matches!(player.pause(), Err(PlayerError::NotReady)));
    assert!(matches!(player.unpause(), Err(PlayerError::NotReady)));
    assert!(matches!(player.play_from_timestamp(0.5), Err(PlayerError::NotReady)));
    assert!(matches!(player.offset(), Err(PlayerError::NotReady)));
    assert!(matches!(player.duration(), Err(PlayerError::NotReady)));
    assert!(player.transport().is_none());

    let mut canvas = WaveformCanvas::new(10, 10);
    assert!(matches!(
        player.render_waveform(&mut canvas),
        Err(PlayerError::NotReady)
    ));

    // Volume is always available
    player.set_volume(0.4);
    assert_eq!(player.volume(), 0.4);
    assert!(player.live_gain().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_failed_load_keeps_previous_session_paused() {
    let player = silent_player(fixtures());
    let mut events = player.subscribe();

    player.switch_track(TEN_SECONDS, 0.0).await.unwrap();
    sleep(Duration::from_secs(2)).await;

    let err = player.switch_track(GARBAGE, 0.0).await.unwrap_err();
    assert!(matches!(err, PlayerError::TrackLoad { ref url, .. } if url == GARBAGE));

    let err = player
        .switch_track("https://cdn.example.com/missing.mp3", 0.0)
        .await
        .unwrap_err();
    assert!(matches!(err, PlayerError::TrackLoad { .. }));

    assert_eq!(player.current_url().as_deref(), Some(TEN_SECONDS));
    assert_eq!(player.transport(), Some(TransportState::Paused));
    let stopped_at = player.offset().unwrap();
    assert!(approx(stopped_at, 2.0, 1e-3));

    drain(&mut events);
    sleep(Duration::from_secs(1)).await;
    assert!(drain(&mut events).is_empty());
    assert!(approx(player.offset().unwrap(), stopped_at, 1e-9));

    // Resuming recreates the stopped source where it left off
    player.unpause().unwrap();
    sleep(Duration::from_secs(1)).await;
    assert!(approx(player.offset().unwrap(), stopped_at + 1.0, 1e-3));

    sleep(Duration::from_secs(8)).await;
    assert_eq!(ended_count(&drain(&mut events)), 1);
}

#[tokio::test(start_paused = true)]
async fn test_newer_switch_supersedes_older() {
    let player = silent_player(fixtures());

    let (first, second) = tokio::join!(
        player.switch_track(TEN_SECONDS, 0.0),
        player.switch_track(TWO_SECONDS, 0.0)
    );

    assert!(matches!(first, Err(PlayerError::Superseded(ref url)) if url == TEN_SECONDS));
    assert!(approx(second.unwrap(), 2.0, 1e-6));
    assert_eq!(player.current_url().as_deref(), Some(TWO_SECONDS));
    assert!(approx(player.duration().unwrap(), 2.0, 1e-6));
}

#[tokio::test(start_paused = true)]
async fn test_switching_replaces_session_without_stale_events() {
    let player = silent_player(fixtures());
    let mut events = player.subscribe();

    player.switch_track(TWO_SECONDS, 0.0).await.unwrap();
    sleep(Duration::from_millis(1500)).await;

    player.switch_track(TEN_SECONDS, 0.0).await.unwrap();
    drain(&mut events);

    // The first track would have ended here
    sleep(Duration::from_secs(1)).await;
    let received = drain(&mut events);
    assert_eq!(ended_count(&received), 0);
    for event in &received {
        if let PlayerEvent::TimestampChange { duration, .. } = event {
            assert!(approx(*duration, 10.0, 1e-6));
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_volume_follows_live_session() {
    let player = silent_player(fixtures());

    player.set_volume(0.3);
    player.switch_track(TEN_SECONDS, 0.0).await.unwrap();
    assert_eq!(player.live_gain(), Some(0.3));

    player.set_volume(0.7);
    assert_eq!(player.volume(), 0.7);
    assert_eq!(player.live_gain(), Some(0.7));

    player.set_volume(-1.0);
    assert_eq!(player.volume(), 0.0);

    player.set_volume(1.5);
    assert_eq!(player.live_gain(), Some(1.5));

    // Seeking keeps the gain
    player.play_from_timestamp(0.5).unwrap();
    assert_eq!(player.live_gain(), Some(1.5));
}

#[tokio::test(start_paused = true)]
async fn test_render_waveform_of_session() {
    let player = silent_player(fixtures());
    player.switch_track(TEN_SECONDS, 0.0).await.unwrap();

    let mut canvas = WaveformCanvas::new(100, 40);
    player.render_waveform(&mut canvas).unwrap();

    let image = canvas.image();
    assert_eq!(image.dimensions(), (100, 40));
    let painted = image.pixels().filter(|pixel| pixel[3] != 0).count();
    assert!(painted > 0);
    // A steady tone paints every column through the centre row
    assert!((0..100).all(|x| image.get_pixel(x, 20)[3] != 0));
}

#[tokio::test(start_paused = true)]
async fn test_early_completion_waits_for_the_clock() {
    let player = player_with(Arc::new(EarlyCompletionContext::new()), fixtures());
    let mut events = player.subscribe();

    player.switch_track(TWO_SECONDS, 0.0).await.unwrap();

    sleep(Duration::from_secs(1)).await;
    let received = drain(&mut events);
    assert_eq!(ended_count(&received), 0);
    assert!(!player.has_ended());
    assert_eq!(player.transport(), Some(TransportState::Playing));
    // Ticks keep coming after the early signal
    assert!(offsets(&received).len() >= 5);

    sleep(Duration::from_millis(1500)).await;
    let received = drain(&mut events);
    assert_eq!(ended_count(&received), 1);
    assert_eq!(received.last(), Some(&PlayerEvent::Ended));
    match received[received.len() - 2] {
        PlayerEvent::TimestampChange { offset, duration } => {
            assert!(approx(offset, 2.0, 1e-6));
            assert!(approx(duration, 2.0, 1e-6));
        }
        PlayerEvent::Ended => panic!("two ended events in a row"),
    }
    assert!(player.has_ended());
}
