use super::*;
use crate::config::CameraConfig;
use std::sync::Arc;

fn manager_with(device: MockMediaDevice) -> (CaptureSessionManager, Arc<MockMediaDevice>) {
    let device = Arc::new(device);
    let manager = CaptureSessionManager::new(
        Arc::clone(&device) as Arc<dyn MediaDevice>,
        CameraConfig::default(),
    );
    (manager, device)
}

#[tokio::test]
async fn test_initial_state_is_idle() {
    let (manager, _) = manager_with(MockMediaDevice::new());
    assert_eq!(manager.state(), SessionState::Idle);
    assert!(!manager.is_active());
}

#[tokio::test]
async fn test_start_reaches_active_with_one_stream() {
    let (mut manager, device) = manager_with(MockMediaDevice::new());

    manager.start(None, CaptureMode::Image).await.unwrap();
    assert_eq!(manager.state(), SessionState::Active);
    assert_eq!(device.open_stream_count(), 1);
}

#[tokio::test]
async fn test_restart_releases_previous_stream_first() {
    let (mut manager, device) = manager_with(MockMediaDevice::new());

    manager.start(None, CaptureMode::Image).await.unwrap();
    manager.start(Some("mock-front"), CaptureMode::Image).await.unwrap();

    // Never two concurrent streams
    assert_eq!(device.open_stream_count(), 1);
    assert!(manager.is_active());
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let (mut manager, device) = manager_with(MockMediaDevice::new());

    manager.start(None, CaptureMode::Image).await.unwrap();
    manager.stop();
    assert_eq!(manager.state(), SessionState::Idle);
    assert_eq!(device.open_stream_count(), 0);

    manager.stop();
    assert_eq!(manager.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_permission_denied_leaves_no_half_open_stream() {
    let (mut manager, device) = manager_with(MockMediaDevice::failing(MockFailure::PermissionDenied));

    let result = manager.start(None, CaptureMode::Image).await;
    assert!(result.is_err());
    assert_eq!(manager.state(), SessionState::Error);
    assert_eq!(device.open_stream_count(), 0);

    // Teardown still returns to Idle
    manager.stop();
    assert_eq!(manager.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_missing_device_is_an_error() {
    let (mut manager, _) = manager_with(MockMediaDevice::new());
    let result = manager.start(Some("no-such-camera"), CaptureMode::Image).await;
    assert!(result.is_err());
    assert_eq!(manager.state(), SessionState::Error);
}

#[tokio::test]
async fn test_switch_device_swaps_stream() {
    let (mut manager, device) = manager_with(MockMediaDevice::new());

    manager.start(Some("mock-back"), CaptureMode::Image).await.unwrap();
    manager.switch_device("mock-front").await.unwrap();

    assert_eq!(device.open_stream_count(), 1);
    assert!(manager.is_active());
}

#[tokio::test]
async fn test_mode_switch_without_audio_change_keeps_stream() {
    let (mut manager, device) = manager_with(MockMediaDevice::new());
    manager.start(None, CaptureMode::Image).await.unwrap();

    let counter = device.open_stream_counter();
    let before = counter.load(std::sync::atomic::Ordering::Relaxed);

    manager.switch_mode(CaptureMode::Barcode).await.unwrap();
    assert_eq!(manager.mode(), CaptureMode::Barcode);
    assert_eq!(counter.load(std::sync::atomic::Ordering::Relaxed), before);
    assert!(!manager.has_audio());
}

#[tokio::test]
async fn test_mode_switch_to_video_restarts_with_audio() {
    let (mut manager, device) = manager_with(MockMediaDevice::new());
    manager.start(None, CaptureMode::Image).await.unwrap();
    assert!(!manager.has_audio());

    manager.switch_mode(CaptureMode::Video).await.unwrap();
    assert_eq!(manager.mode(), CaptureMode::Video);
    assert!(manager.has_audio());
    assert_eq!(device.open_stream_count(), 1);

    manager.switch_mode(CaptureMode::Image).await.unwrap();
    assert!(!manager.has_audio());
    assert_eq!(device.open_stream_count(), 1);
}

#[tokio::test]
async fn test_grab_frame_requires_active_stream() {
    let (mut manager, _) = manager_with(MockMediaDevice::new());
    assert!(manager.grab_frame().await.is_err());

    manager.start(None, CaptureMode::Image).await.unwrap();
    let frame = manager.grab_frame().await.unwrap();
    assert!(!frame.is_empty());
    assert_eq!(frame.width, CameraConfig::default().resolution.0);
}

#[tokio::test]
async fn test_drop_releases_stream() {
    let (mut manager, device) = manager_with(MockMediaDevice::new());
    manager.start(None, CaptureMode::Image).await.unwrap();
    assert_eq!(device.open_stream_count(), 1);

    drop(manager);
    assert_eq!(device.open_stream_count(), 0);
}
