mod common;

use common::{fake_streamlabs, TOKEN};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use streamkey::config::Config;
use streamkey::error::Error;
use streamkey::session::{ChannelObserver, SessionController, SessionEvent, SessionState};
use streamkey::settings::Settings;

struct Harness {
    controller: SessionController,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    state: common::Shared,
    dir: tempfile::TempDir,
}

async fn harness(can_be_live: bool, config: Config) -> Harness {
    let (base, state) = fake_streamlabs(can_be_live).await;
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings {
        api_base: base,
        ..Settings::default()
    };
    let (tx, events) = mpsc::unbounded_channel();
    let controller = SessionController::new(
        settings,
        config,
        dir.path().join("config.json"),
        Arc::new(ChannelObserver::new(tx)),
    );
    Harness {
        controller,
        events,
        state,
        dir,
    }
}

fn drain(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test]
async fn full_broadcast_lifecycle() {
    let mut h = harness(true, Config::default()).await;
    assert_eq!(h.controller.state(), SessionState::NoToken);

    h.controller.set_token(TOKEN).unwrap();
    assert_eq!(h.controller.state(), SessionState::TokenLoaded);

    let info = h.controller.refresh_account().await.unwrap();
    assert!(info.can_be_live);
    assert_eq!(h.controller.state(), SessionState::AccountReady { can_go_live: true });

    h.controller.set_title("Speedrun");
    let session = h.controller.start_stream().await.unwrap();
    assert_eq!(h.controller.state(), SessionState::Live);
    assert_eq!(h.controller.session(), Some(&session));

    let again = h.controller.start_stream().await;
    assert!(matches!(again, Err(Error::InvalidState(_))));

    h.controller.end_stream().await.unwrap();
    assert_eq!(h.controller.state(), SessionState::AccountReady { can_go_live: true });
    assert!(h.controller.session().is_none());
    assert!(matches!(h.controller.end_stream().await, Err(Error::NoActiveSession)));

    let events = drain(&mut h.events);
    assert!(matches!(events[0], SessionEvent::TokenReady));
    assert!(matches!(events[1], SessionEvent::AccountInfo(_)));
    assert!(matches!(events[2], SessionEvent::SessionStarted(_)));
    assert!(matches!(events[3], SessionEvent::SessionEnded));
    assert_eq!(events.len(), 4);
}

#[tokio::test]
async fn account_without_live_access_cannot_start() {
    let mut h = harness(false, Config::default()).await;
    h.controller.set_token(TOKEN).unwrap();
    h.controller.refresh_account().await.unwrap();
    assert_eq!(h.controller.state(), SessionState::AccountReady { can_go_live: false });

    assert!(h.controller.start_stream().await.is_err());
    assert_eq!(h.controller.state(), SessionState::AccountReady { can_go_live: false });
    assert!(h.state.lock().unwrap().start_bodies.is_empty());
}

#[tokio::test]
async fn failed_start_leaves_state_unchanged() {
    let mut h = harness(true, Config::default()).await;
    h.state.lock().unwrap().fail_start = true;
    h.controller.set_token(TOKEN).unwrap();
    h.controller.refresh_account().await.unwrap();

    assert!(matches!(h.controller.start_stream().await, Err(Error::MalformedResponse(_))));
    assert_eq!(h.controller.state(), SessionState::AccountReady { can_go_live: true });
    assert!(h.controller.session().is_none());
}

#[tokio::test]
async fn failed_refresh_keeps_token_loaded() {
    let mut h = harness(true, Config::default()).await;
    h.controller.set_token("badbadbad").unwrap();

    let err = h.controller.refresh_account().await.unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(h.controller.state(), SessionState::TokenLoaded);
}

#[tokio::test]
async fn refresh_resolves_saved_game_and_saves_config() {
    let mut config = Config::default();
    config.token = TOKEN.to_string();
    config.game = "Minecraft".to_string();
    config.title = "Build".to_string();

    let mut h = harness(true, config).await;
    assert_eq!(h.controller.state(), SessionState::TokenLoaded);

    h.controller.refresh_account().await.unwrap();
    assert_eq!(h.controller.game_mask_id(), "m1");

    let saved = Config::load(&h.dir.path().join("config.json")).await;
    assert_eq!(saved.token, TOKEN);
    assert_eq!(saved.game, "Minecraft");

    h.controller.start_stream().await.unwrap();
    let body = h.state.lock().unwrap().start_bodies[0].clone();
    assert!(body.contains("m1"));
}

#[tokio::test]
async fn unknown_game_has_no_category() {
    let mut config = Config::default();
    config.token = TOKEN.to_string();
    config.game = "Minecra".to_string();

    let mut h = harness(true, config).await;
    h.controller.refresh_account().await.unwrap();
    assert_eq!(h.controller.game_mask_id(), "");
}

#[tokio::test]
async fn only_the_newest_search_is_current() {
    let mut h = harness(true, Config::default()).await;
    h.controller.set_token(TOKEN).unwrap();
    drain(&mut h.events);

    let first = h.controller.spawn_search("Mine").unwrap();
    let second = h.controller.spawn_search("Minecraft").unwrap();
    assert!(second > first);
    assert!(!h.controller.is_current(first));
    assert!(h.controller.is_current(second));

    let mut delivered = Vec::new();
    while delivered.len() < 2 {
        let event = tokio::time::timeout(Duration::from_secs(5), h.events.recv())
            .await
            .unwrap()
            .unwrap();
        if let SessionEvent::Suggestions { ticket, result } = event {
            delivered.push((ticket, result.unwrap()));
        }
    }

    let current: Vec<_> = delivered
        .iter()
        .filter(|(ticket, _)| h.controller.is_current(*ticket))
        .collect();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].0, second);
    assert_eq!(current[0].1.last().unwrap().full_name, "Other");
}

#[tokio::test]
async fn token_cannot_change_while_live() {
    let mut h = harness(true, Config::default()).await;
    h.controller.set_token(TOKEN).unwrap();
    h.controller.refresh_account().await.unwrap();
    h.controller.start_stream().await.unwrap();

    assert!(h.controller.set_token("other").is_err());
    assert_eq!(h.controller.state(), SessionState::Live);
}
