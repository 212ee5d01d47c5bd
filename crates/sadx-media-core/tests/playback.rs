//! End-to-end playback through the controller with a scripted container.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use sadx_media_core::clock::ManualTime;
use sadx_media_core::metrics::PlaybackEvent;
use sadx_media_core::session::SessionState;
use sadx_media_core::synthetic::{SyntheticContainer, SyntheticOpener};
use sadx_media_core::{PlaybackController, PlayerConfig};

const WIDTH: u32 = 16;
const HEIGHT: u32 = 9;

fn two_frame_player() -> (PlaybackController<SyntheticOpener>, ManualTime) {
    let container = SyntheticContainer::new(WIDTH, HEIGHT)
        .video_frame(0.0, 0x11)
        .video_frame(0.5, 0x22);
    let time = ManualTime::new();
    let player = PlaybackController::new(SyntheticOpener::new(container), PlayerConfig::default())
        .with_time_source(Arc::new(time.clone()));
    (player, time)
}

#[test]
fn two_frames_are_each_presented_once() {
    let (mut player, time) = two_frame_player();
    player.open("synthetic.sfd", false).unwrap();
    assert_eq!(player.width(), WIDTH);
    assert_eq!(player.height(), HEIGHT);
    player.play();

    let mut buffer = vec![0u8; (WIDTH * HEIGHT * 4) as usize];
    let mut seen = Vec::new();
    let mut polls = 0;
    let deadline = Instant::now() + Duration::from_secs(10);

    while !player.finished() && Instant::now() < deadline {
        time.advance(Duration::from_millis(10));
        thread::sleep(Duration::from_millis(2));
        polls += 1;
        if player.try_get_frame(&mut buffer) {
            assert!(buffer.iter().all(|&b| b == buffer[0]));
            seen.push(buffer[0]);
        }
    }
    assert!(player.finished(), "playback did not finish");

    // Polling after the end never yields another frame
    for _ in 0..20 {
        time.advance(Duration::from_millis(10));
        if player.try_get_frame(&mut buffer) {
            seen.push(buffer[0]);
        }
    }

    assert_eq!(seen, vec![0x11, 0x22]);
    assert!(polls > 2);

    let metrics = player.metrics().unwrap();
    assert_eq!(metrics.frames_presented, 2);
    assert_eq!(metrics.decode_errors, 0);

    let events: Vec<_> = player.events().unwrap().try_iter().collect();
    assert_eq!(events.last(), Some(&PlaybackEvent::Finished));

    player.close();
    assert_eq!(player.state(), SessionState::Idle);
    assert!(!player.try_get_frame(&mut buffer));
}

#[test]
fn second_frame_waits_for_its_timestamp() {
    let (mut player, time) = two_frame_player();
    player.open("synthetic.sfd", false).unwrap();
    player.play();

    let mut buffer = vec![0u8; (WIDTH * HEIGHT * 4) as usize];
    let deadline = Instant::now() + Duration::from_secs(10);
    while !player.try_get_frame(&mut buffer) && Instant::now() < deadline {
        time.advance(Duration::from_millis(10));
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(buffer[0], 0x11);

    // Pause: time passes but the clock stands still
    player.pause();
    thread::sleep(Duration::from_millis(20));
    time.advance(Duration::from_secs(5));
    thread::sleep(Duration::from_millis(50));
    assert!(!player.try_get_frame(&mut buffer));
    assert!(!player.finished());
}

#[test]
fn close_without_play_joins_promptly() {
    let (mut player, _time) = two_frame_player();
    player.open("synthetic.sfd", false).unwrap();

    let started = Instant::now();
    player.close();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(player.width(), 0);
}

#[test]
fn reopen_replaces_session() {
    let (mut player, _time) = two_frame_player();
    player.open("first.sfd", false).unwrap();
    player.play();
    player.open("second.sfd", false).unwrap();

    // Fresh session starts paused
    assert!(!player.is_playing());
    assert_eq!(player.state(), SessionState::Running);
}
