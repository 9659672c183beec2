//! Relay server with real WebSocket clients

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;

use ws_audio_api::audio::FakeHost;
use ws_audio_api::network::relay::{self, RelayState};
use ws_audio_api::network::{Channel, WsChannel};
use ws_audio_api::protocol::{Message, MessageKind};
use ws_audio_api::{AudioConfig, Player, Streamer};

async fn start_relay() -> (String, Arc<RelayState>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = RelayState::new();
    tokio::spawn(relay::serve(listener, state.clone()));
    (format!("ws://{}/ws", addr), state)
}

async fn wait_for_peers(state: &RelayState, count: usize) {
    for _ in 0..100 {
        if state.peer_count() == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} peers, have {}", count, state.peer_count());
}

#[tokio::test]
async fn test_speak_is_relayed_as_get_speak() {
    let (url, state) = start_relay().await;
    let a = WsChannel::connect(&url).await.unwrap();
    let b = WsChannel::connect(&url).await.unwrap();
    wait_for_peers(&state, 2).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    b.on(
        MessageKind::GetSpeak,
        Arc::new(move |message: &Message| {
            let _ = tx.send(message.clone());
        }),
    );
    let (echo_tx, mut echo_rx) = mpsc::unbounded_channel();
    a.on(
        MessageKind::GetSpeak,
        Arc::new(move |message: &Message| {
            let _ = echo_tx.send(message.clone());
        }),
    );

    a.emit(Message::speak(vec![1u8, 2, 3, 250])).unwrap();

    let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for getSpeak")
        .unwrap();
    assert_eq!(received, Message::get_speak(vec![1u8, 2, 3, 250]));

    // The sender does not hear itself
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(echo_rx.try_recv().is_err());
    assert_eq!(state.stats().packets_forwarded, 1);
}

#[tokio::test]
async fn test_disconnect_signal_keeps_socket_open() {
    let (url, state) = start_relay().await;
    let a = WsChannel::connect(&url).await.unwrap();
    wait_for_peers(&state, 1).await;

    a.disconnect();
    for _ in 0..100 {
        if state.stats().sessions_ended == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(state.stats().sessions_ended, 1);
    assert!(a.is_connected());
    assert_eq!(state.peer_count(), 1);

    a.close();
    assert!(!a.is_connected());
    assert!(matches!(
        a.emit(Message::speak(vec![1u8])),
        Err(ws_audio_api::error::TransportError::NotReady)
    ));
    wait_for_peers(&state, 0).await;

    // Signals after close go nowhere and change nothing
    a.disconnect();
    a.close();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(state.stats().sessions_ended, 1);
}

#[tokio::test]
async fn test_streamer_to_player_through_relay() {
    let (url, state) = start_relay().await;
    let speaker_side = Arc::new(WsChannel::connect(&url).await.unwrap());
    let listener_side = Arc::new(WsChannel::connect(&url).await.unwrap());
    wait_for_peers(&state, 2).await;

    let mic = Arc::new(FakeHost::new(24000));
    let speakers = Arc::new(FakeHost::new(24000));
    let mut streamer = Streamer::new(AudioConfig::default(), mic.clone(), speaker_side).unwrap();
    let mut player = Player::new(AudioConfig::default(), speakers.clone(), listener_side).unwrap();
    player.start().unwrap();
    streamer.start().unwrap();

    let block: Vec<f32> = (0..4096).map(|i| (i as f32 * 0.06).sin() * 0.4).collect();
    mic.push_capture(&block);
    assert_eq!(streamer.stats().packets_sent, 8);

    for _ in 0..200 {
        if player.queued_samples() == Some(8 * 480) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(player.queued_samples(), Some(8 * 480));
    assert_eq!(player.stats().unwrap().packets_decoded, 8);
}
