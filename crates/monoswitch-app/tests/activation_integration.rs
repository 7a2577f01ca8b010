//! Integration tests for the activation pipeline.
//!
//! These tests exercise the application layer of monoswitch-app end-to-end:
//! `ActivationService` + `HotkeyService` + `DisplayConfigurator` over mock
//! infrastructure.

use std::sync::Arc;
use std::time::Duration;

use monoswitch_app::application::activation::ActivationService;
use monoswitch_app::application::apply_profile::DisplayConfigurator;
use monoswitch_app::application::cancel::cancel_pair;
use monoswitch_app::application::hotkey_service::HotkeyService;
use monoswitch_app::application::snapshot::take_snapshot;
use monoswitch_app::infrastructure::display_api::mock::{FakeDisplay, FakeDisplayApi};
use monoswitch_app::infrastructure::display_api::DisplayApi;
use monoswitch_app::infrastructure::hotkey::mock::MockHotkeyBackend;
use monoswitch_app::infrastructure::hotkey::HotkeyBackend;
use monoswitch_core::{DisplaySetting, KeyCombination, Profile};

fn three_display_api() -> Arc<FakeDisplayApi> {
    Arc::new(FakeDisplayApi::new(vec![
        FakeDisplay::at(0, 0).primary(),
        FakeDisplay::at(1920, 0),
        FakeDisplay::at(1920, 1080).hdr(true, false),
    ]))
}

fn make_primary_profile(id: u32, display_id: u32, hotkey: Option<&str>) -> Profile {
    Profile {
        id,
        name: format!("profile-{id}"),
        hot_key: hotkey.map(|s| KeyCombination::parse(s).unwrap()),
        display_settings: vec![DisplaySetting {
            display_id,
            primary: Some(true),
            enable_hdr: None,
            refresh_rate_hz: None,
        }],
    }
}

#[tokio::test]
async fn test_direct_activation_rebases_the_desktop() {
    // Arrange – displays at (0,0), (1920,0), (1920,1080)
    let api = three_display_api();
    let configurator = Arc::new(DisplayConfigurator::new(api.clone() as Arc<dyn DisplayApi>));
    let service = ActivationService::new(vec![make_primary_profile(1, 2, None)], configurator);
    let (_handle, signal) = cancel_pair();

    // Act – make the display at (1920,1080) primary
    assert!(service.activate_profile(1, &signal).await);

    // Assert – the whole desktop is re-based around the new origin
    let snapshot = take_snapshot(api.as_ref()).expect("snapshot");
    assert_eq!(snapshot.primary().unwrap().display_id, 2);
    assert_eq!(snapshot.find(2).unwrap().geometry.x, 0);
    assert_eq!(snapshot.find(2).unwrap().geometry.y, 0);
    assert_eq!(snapshot.find(0).unwrap().geometry.x, -1920);
    assert_eq!(snapshot.find(0).unwrap().geometry.y, -1080);
    assert_eq!(snapshot.find(1).unwrap().geometry.x, 0);
    assert_eq!(snapshot.find(1).unwrap().geometry.y, -1080);
    assert!(snapshot.has_single_primary());
}

#[tokio::test]
async fn test_repeated_activation_issues_no_further_mutations() {
    let api = three_display_api();
    let configurator = Arc::new(DisplayConfigurator::new(api.clone() as Arc<dyn DisplayApi>));
    let service = ActivationService::new(vec![make_primary_profile(1, 1, None)], configurator);
    let (_handle, signal) = cancel_pair();

    assert!(service.activate_profile(1, &signal).await);
    let stage_calls = api.stage_call_count();
    let commits = api.commit_count();

    assert!(service.activate_profile(1, &signal).await);

    assert_eq!(api.stage_call_count(), stage_calls);
    assert_eq!(api.commit_count(), commits);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_hotkey_press_drives_a_full_activation() {
    // Arrange – a profile bound to Ctrl+Alt+2 that moves primary to display 2
    let api = three_display_api();
    let configurator = Arc::new(DisplayConfigurator::new(api.clone() as Arc<dyn DisplayApi>));
    let backend = Arc::new(MockHotkeyBackend::new());
    let hotkeys = Arc::new(
        HotkeyService::new(backend.clone() as Arc<dyn HotkeyBackend>).expect("hotkey service"),
    );
    let service = Arc::new(ActivationService::new(
        vec![
            make_primary_profile(1, 1, Some("Ctrl+Alt+1")),
            make_primary_profile(2, 2, Some("Ctrl+Alt+2")),
        ],
        configurator,
    ));
    let (handle, signal) = cancel_pair();

    let looper = {
        let service = Arc::clone(&service);
        let hotkeys = Arc::clone(&hotkeys);
        let signal = signal.clone();
        tokio::spawn(async move { service.run_hotkey_loop(&hotkeys, &signal).await })
    };

    // Wait until the loop registered both hotkeys.
    tokio::time::timeout(Duration::from_secs(2), async {
        while backend.register_count() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("hotkeys must register");

    // Act – press the combination registered for profile 2
    let registration_id = backend
        .registered()
        .iter()
        .find(|(_, combo)| *combo == KeyCombination::parse("Ctrl+Alt+2").unwrap())
        .map(|(id, _)| *id)
        .expect("profile 2 hotkey registered");
    backend.inject_press(registration_id);

    // Assert – the activation lands
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let snapshot = take_snapshot(api.as_ref()).expect("snapshot");
            if snapshot.primary().map(|r| r.display_id) == Some(2) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("hotkey press must activate the profile");

    // Cancelling the signal ends the loop.
    handle.cancel();
    tokio::time::timeout(Duration::from_secs(2), looper)
        .await
        .expect("loop must exit on cancel")
        .expect("loop task must not panic");
}

#[tokio::test]
async fn test_unusable_hotkey_does_not_block_the_others() {
    let api = three_display_api();
    let configurator = Arc::new(DisplayConfigurator::new(api.clone() as Arc<dyn DisplayApi>));
    let backend = Arc::new(MockHotkeyBackend::new());
    // Another application owns Ctrl+Alt+1.
    backend.reject_combination(KeyCombination::parse("Ctrl+Alt+1").unwrap());
    let hotkeys = Arc::new(
        HotkeyService::new(backend.clone() as Arc<dyn HotkeyBackend>).expect("hotkey service"),
    );
    let service = Arc::new(ActivationService::new(
        vec![
            make_primary_profile(1, 1, Some("Ctrl+Alt+1")),
            make_primary_profile(2, 2, Some("Ctrl+Alt+2")),
        ],
        configurator,
    ));
    let (handle, signal) = cancel_pair();

    let looper = {
        let service = Arc::clone(&service);
        let hotkeys = Arc::clone(&hotkeys);
        let signal = signal.clone();
        tokio::spawn(async move { service.run_hotkey_loop(&hotkeys, &signal).await })
    };

    tokio::time::timeout(Duration::from_secs(2), async {
        while backend.register_count() < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("the second hotkey must still register");

    assert_eq!(backend.register_count(), 1);
    assert_eq!(
        backend.registered()[0].1,
        KeyCombination::parse("Ctrl+Alt+2").unwrap()
    );

    handle.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(2), looper).await;
}

#[tokio::test]
async fn test_revert_restores_arrangement_end_to_end() {
    let api = three_display_api();
    let configurator = Arc::new(DisplayConfigurator::new(api.clone() as Arc<dyn DisplayApi>));
    let service = ActivationService::new(vec![make_primary_profile(1, 2, None)], configurator);
    let (_handle, signal) = cancel_pair();

    assert!(service.activate_profile(1, &signal).await);
    assert_eq!(
        take_snapshot(api.as_ref()).unwrap().primary().unwrap().display_id,
        2
    );

    assert!(service.revert_last(&signal).await);

    let snapshot = take_snapshot(api.as_ref()).expect("snapshot");
    assert_eq!(snapshot.primary().unwrap().display_id, 0);
    assert_eq!(snapshot.find(1).unwrap().geometry.x, 1920);
    assert_eq!(snapshot.find(2).unwrap().geometry.x, 1920);
    assert_eq!(snapshot.find(2).unwrap().geometry.y, 1080);
}
