use super::*;
use crate::error::CameraError;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

fn manager_for(camera: &Arc<SimulatedCamera>) -> Arc<CameraResourceManager> {
    Arc::new(CameraResourceManager::new(
        Arc::clone(camera) as Arc<dyn CameraPlatform>
    ))
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    timeout(Duration::from_secs(2), async {
        while !condition() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached within timeout");
}

#[tokio::test]
async fn test_acquire_reads_zoom_capability() {
    let camera = Arc::new(SimulatedCamera::default());
    let manager = manager_for(&camera);

    let handle = manager.acquire(FacingMode::Environment, 1.0).await.unwrap();
    let capability = handle.capability();
    assert!(capability.supported);
    assert_eq!(capability.max, 3.0);
    assert_eq!(manager.live_handles(), 1);

    let request = camera.stats().last_request().unwrap();
    assert_eq!(request.facing_mode, FacingMode::Environment);
    assert_eq!(request.zoom_ideal, 1.0);

    manager.release(handle);
    assert_eq!(manager.live_handles(), 0);
}

#[tokio::test]
async fn test_acquire_without_zoom_support() {
    let camera = Arc::new(SimulatedCamera::without_zoom());
    let manager = manager_for(&camera);

    let handle = manager.acquire(FacingMode::Environment, 1.0).await.unwrap();
    assert!(!handle.capability().supported);
    manager.release(handle);
}

#[tokio::test]
async fn test_release_stops_every_track() {
    let camera = Arc::new(SimulatedCamera::default());
    let stats = camera.stats();
    let manager = manager_for(&camera);

    let mut handle = manager.acquire(FacingMode::Environment, 1.0).await.unwrap();
    handle.bind("scanner-video");
    assert_eq!(handle.binding(), Some("scanner-video"));
    let track = handle.track().unwrap();
    assert!(track.capture_frame().is_some());

    manager.release(handle);
    assert!(!track.is_live());
    assert!(track.capture_frame().is_none());
    assert_eq!(stats.tracks_stopped(), stats.tracks_started());
    assert_eq!(stats.active_tracks(), 0);
}

#[tokio::test]
async fn test_dropped_handle_still_frees_camera() {
    let camera = Arc::new(SimulatedCamera::default());
    let stats = camera.stats();
    let manager = manager_for(&camera);

    {
        let _handle = manager.acquire(FacingMode::Environment, 1.0).await.unwrap();
    }
    assert_eq!(stats.active_tracks(), 0);
    assert_eq!(manager.live_handles(), 0);
}

#[tokio::test]
async fn test_permission_denied_surfaces() {
    let camera = Arc::new(SimulatedCamera::denying_permission());
    let manager = manager_for(&camera);

    let result = manager.acquire(FacingMode::Environment, 1.0).await;
    assert!(matches!(result, Err(CameraError::PermissionDenied { .. })));
    assert_eq!(manager.live_handles(), 0);
}

#[tokio::test]
async fn test_slot_holds_single_handle() {
    let camera = Arc::new(SimulatedCamera::default());
    let manager = manager_for(&camera);
    let slot = CameraSlot::new(Arc::clone(&manager), CancellationToken::new());

    let acquired = slot
        .acquire(FacingMode::Environment, 1.0, "scanner-video")
        .await
        .unwrap();
    assert!(acquired.capability.supported);
    assert!(slot.is_held());

    let second = slot
        .acquire(FacingMode::Environment, 1.0, "scanner-video")
        .await;
    assert!(matches!(second, Err(CameraError::AlreadyAcquired)));
    assert_eq!(manager.live_handles(), 1);

    assert!(slot.release());
    assert!(!slot.release());
    assert_eq!(manager.live_handles(), 0);
}

#[tokio::test]
async fn test_slot_releases_late_acquisition_after_cancel() {
    let camera = Arc::new(SimulatedCamera::default());
    let stats = camera.stats();
    let manager = manager_for(&camera);
    let token = CancellationToken::new();
    let slot = CameraSlot::new(Arc::clone(&manager), token.clone());

    camera.close_gate();
    let pending = {
        let slot = slot.clone();
        tokio::spawn(async move {
            slot.acquire(FacingMode::Environment, 1.0, "scanner-video")
                .await
        })
    };
    wait_until(|| stats.requests() == 1).await;

    token.cancel();
    camera.open_gate();

    let outcome = pending.await.unwrap();
    assert!(matches!(outcome, Err(CameraError::Abandoned)));
    wait_until(|| stats.tracks_stopped() == 1).await;
    assert_eq!(stats.tracks_started(), 1);
    assert_eq!(stats.frames_captured(), 0);
    assert!(!slot.is_held());
    assert_eq!(manager.live_handles(), 0);
}

#[tokio::test]
async fn test_zoom_rejection_is_reported() {
    let camera = Arc::new(SimulatedCamera::new(SimulatedCameraOptions {
        reject_zoom: true,
        ..SimulatedCameraOptions::default()
    }));
    let manager = manager_for(&camera);

    let handle = manager.acquire(FacingMode::Environment, 1.0).await.unwrap();
    let track = handle.track().unwrap();
    assert!(track.apply_zoom(1.5).await.is_err());
    assert_eq!(camera.stats().zoom_rejections(), 1);
    manager.release(handle);
}
