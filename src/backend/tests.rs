use super::*;
use crate::camera::{CameraPlatform, CameraResourceManager, SimulatedCamera};
use crate::config::ScanbenchConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const CODE: &str = "4006381333931";

fn cadence() -> Duration {
    Duration::from_millis(5)
}

fn camera_slot() -> (Arc<SimulatedCamera>, CameraSlot, CancellationToken) {
    let camera = Arc::new(SimulatedCamera::default());
    let manager = Arc::new(CameraResourceManager::new(
        Arc::clone(&camera) as Arc<dyn CameraPlatform>
    ));
    let token = CancellationToken::new();
    (camera, CameraSlot::new(manager, token.clone()), token)
}

async fn next_report(rx: &mut mpsc::UnboundedReceiver<EngineReport>) -> EngineReport {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no engine report within timeout")
        .expect("report channel closed")
}

fn callback_adapter(kind: BackendKind, suite: &EngineSuite) -> Box<dyn CallbackAdapter> {
    match suite.adapter(kind, &ScanbenchConfig::default()) {
        BackendAdapter::Callback(adapter) => adapter,
        BackendAdapter::Polling(_) => panic!("{} should be callback driven", kind),
    }
}

#[test]
fn test_backend_labels_and_keys() {
    let labels: Vec<_> = BackendKind::ALL.iter().map(|kind| kind.label()).collect();
    assert_eq!(
        labels,
        vec!["Native", "ZXing", "Quagga", "Quagga2", "HTML5-QRCode"]
    );
    assert_eq!(BackendKind::Html5Qrcode.key(), "html5qrcode");
    assert_eq!(BackendKind::Zxing.to_string(), "ZXing");
}

#[test]
fn test_camera_modes() {
    let suite = EngineSuite::scripted(DecodeScript::new(cadence()));
    let config = ScanbenchConfig::default();
    let modes: Vec<_> = BackendKind::ALL
        .iter()
        .map(|kind| suite.adapter(*kind, &config).camera_mode())
        .collect();
    assert_eq!(
        modes,
        vec![
            CameraMode::SessionStream,
            CameraMode::SessionStream,
            CameraMode::EngineManaged,
            CameraMode::EngineManaged,
            CameraMode::EngineManaged,
        ]
    );
}

#[tokio::test]
async fn test_callbacks_drop_reports_after_cancel() {
    let live = CancellationToken::new();
    let (callbacks, mut rx) = DetectionCallbacks::new(live.clone());

    callbacks.on_miss();
    live.cancel();
    callbacks.on_detect(CODE);
    drop(callbacks);

    assert_eq!(rx.recv().await, Some(EngineReport::Miss));
    assert_eq!(rx.recv().await, None);
}

#[tokio::test]
async fn test_native_unsupported() {
    let script = DecodeScript::new(cadence()).without_native_detector();
    let suite = EngineSuite::scripted(script);
    let adapter = suite.adapter(BackendKind::Native, &ScanbenchConfig::default());

    match adapter.check_support() {
        Err(BackendError::Unsupported { backend, .. }) => assert_eq!(backend, BackendKind::Native),
        other => panic!("expected unsupported, got {:?}", other),
    }
}

#[tokio::test]
async fn test_native_detects_from_frames() {
    let script = DecodeScript::new(cadence()).with_misses(2).with_decode(CODE);
    let suite = EngineSuite::scripted(script.clone());
    let (_camera, slot, _token) = camera_slot();
    let acquired = slot
        .acquire(FacingMode::Environment, 1.0, BackendKind::Native.element_id())
        .await
        .unwrap();
    let track = slot.track().unwrap();

    let mut adapter = NativeAdapter::new(suite.native.clone());
    let target = ScanTarget {
        element_id: BackendKind::Native.element_id().to_string(),
        source: TargetSource::Stream(acquired.stream),
    };
    adapter.start(&target).await.unwrap();
    assert_eq!(script.live_instances(), 1);

    let mut decoded = None;
    for _ in 0..3 {
        let frame = track.capture_frame().unwrap();
        decoded = adapter.detect(&frame).await;
    }
    assert_eq!(decoded.as_deref(), Some(CODE));

    adapter.stop().await;
    adapter.stop().await;
    assert_eq!(script.live_instances(), 0);
    slot.release();
}

#[tokio::test]
async fn test_native_detect_errors_are_misses() {
    let script = DecodeScript::new(cadence()).with_failure("InvalidStateError");
    let suite = EngineSuite::scripted(script);
    let (_camera, slot, _token) = camera_slot();
    let acquired = slot
        .acquire(FacingMode::Environment, 1.0, "native-video")
        .await
        .unwrap();

    let mut adapter = NativeAdapter::new(suite.native.clone());
    let target = ScanTarget {
        element_id: "native-video".to_string(),
        source: TargetSource::Stream(acquired.stream),
    };
    adapter.start(&target).await.unwrap();
    let frame = slot.track().unwrap().capture_frame().unwrap();
    assert_eq!(adapter.detect(&frame).await, None);
    adapter.stop().await;
    slot.release();
}

#[tokio::test]
async fn test_zxing_reports_misses_then_hit() {
    let script = DecodeScript::new(cadence())
        .with_misses(1)
        .with_failure("checksum mismatch")
        .with_decode(CODE);
    let suite = EngineSuite::scripted(script.clone());
    let (_camera, slot, _token) = camera_slot();
    let acquired = slot
        .acquire(FacingMode::Environment, 1.0, "zxing-video")
        .await
        .unwrap();

    let live = CancellationToken::new();
    let (callbacks, mut rx) = DetectionCallbacks::new(live.clone());
    let mut adapter = callback_adapter(BackendKind::Zxing, &suite);
    adapter
        .start(
            ScanTarget {
                element_id: "zxing-video".to_string(),
                source: TargetSource::Stream(acquired.stream),
            },
            callbacks,
        )
        .await
        .unwrap();

    assert_eq!(next_report(&mut rx).await, EngineReport::Miss);
    assert_eq!(
        next_report(&mut rx).await,
        EngineReport::Error("checksum mismatch".to_string())
    );
    assert_eq!(
        next_report(&mut rx).await,
        EngineReport::Decoded(CODE.to_string())
    );

    live.cancel();
    adapter.stop().await;
    assert_eq!(script.engine_stops(), 1);
    assert_eq!(script.live_instances(), 0);
    slot.release();
}

#[tokio::test]
async fn test_zxing_requires_stream() {
    let suite = EngineSuite::scripted(DecodeScript::new(cadence()));
    let (_camera, slot, _token) = camera_slot();
    let (callbacks, _rx) = DetectionCallbacks::new(CancellationToken::new());
    let mut adapter = callback_adapter(BackendKind::Zxing, &suite);

    let result = adapter
        .start(
            ScanTarget {
                element_id: "zxing-video".to_string(),
                source: TargetSource::Camera {
                    slot,
                    facing_mode: FacingMode::Environment,
                    desired_zoom: 1.0,
                },
            },
            callbacks,
        )
        .await;
    assert!(matches!(result, Err(ScanbenchError::Backend(BackendError::Init { .. }))));
}

#[tokio::test]
async fn test_quagga_acquires_through_slot() {
    let script = DecodeScript::new(cadence()).with_misses(1).with_decode(CODE);
    let suite = EngineSuite::scripted(script.clone());
    let (camera, slot, _token) = camera_slot();
    let (callbacks, mut rx) = DetectionCallbacks::new(CancellationToken::new());
    let mut adapter = callback_adapter(BackendKind::Quagga2, &suite);
    assert_eq!(adapter.kind(), BackendKind::Quagga2);

    adapter
        .start(
            ScanTarget {
                element_id: "quagga2-container".to_string(),
                source: TargetSource::Camera {
                    slot: slot.clone(),
                    facing_mode: FacingMode::Environment,
                    desired_zoom: 1.0,
                },
            },
            callbacks,
        )
        .await
        .unwrap();
    assert!(slot.is_held());
    assert_eq!(camera.stats().requests(), 1);

    assert_eq!(next_report(&mut rx).await, EngineReport::Miss);
    assert_eq!(
        next_report(&mut rx).await,
        EngineReport::Decoded(CODE.to_string())
    );

    adapter.stop().await;
    assert_eq!(script.live_instances(), 0);
    assert!(slot.release());
    assert_eq!(camera.stats().active_tracks(), 0);
}

#[test]
fn test_quagga_init_config() {
    let suite = EngineSuite::scripted(DecodeScript::new(cadence()));
    let adapter = QuaggaAdapter::new(
        BackendKind::Quagga,
        suite.quagga.clone(),
        ScanbenchConfig::default().quagga,
    );
    let init = adapter.init_config("quagga-container", FacingMode::Environment);

    assert_eq!(init.readers, vec!["ean_reader", "ean_8_reader"]);
    assert_eq!(init.input_stream.kind, "LiveStream");
    assert_eq!(init.input_stream.target, "quagga-container");
    assert_eq!(init.input_stream.area, ScanArea::inset(10));
    assert_eq!(init.locator.patch_size, "medium");
    assert!(init.locator.half_sample);
    assert!(init.locate);
}

#[tokio::test]
async fn test_quagga_init_failure_still_releases_engine() {
    let script = DecodeScript::new(cadence()).failing_init("target not found");
    let suite = EngineSuite::scripted(script.clone());
    let (_camera, slot, _token) = camera_slot();
    let (callbacks, _rx) = DetectionCallbacks::new(CancellationToken::new());
    let mut adapter = callback_adapter(BackendKind::Quagga, &suite);

    let result = adapter
        .start(
            ScanTarget {
                element_id: "quagga-container".to_string(),
                source: TargetSource::Camera {
                    slot: slot.clone(),
                    facing_mode: FacingMode::Environment,
                    desired_zoom: 1.0,
                },
            },
            callbacks,
        )
        .await;
    match result {
        Err(ScanbenchError::Backend(error)) => {
            assert_eq!(
                crate::error::UserMessage::user_message(&error),
                "Quagga init error: target not found"
            );
        }
        other => panic!("expected init error, got {:?}", other.err()),
    }
    assert_eq!(script.live_instances(), 1);

    adapter.stop().await;
    assert_eq!(script.live_instances(), 0);
    slot.release();
}

#[tokio::test]
async fn test_html5qrcode_classifies_errors() {
    let script = DecodeScript::new(cadence())
        .with_misses(1)
        .with_failure("Camera streaming not supported")
        .with_decode(CODE);
    let suite = EngineSuite::scripted(script.clone());
    let (_camera, slot, _token) = camera_slot();
    let (callbacks, mut rx) = DetectionCallbacks::new(CancellationToken::new());
    let mut adapter = callback_adapter(BackendKind::Html5Qrcode, &suite);

    adapter
        .start(
            ScanTarget {
                element_id: "html5-qrcode-reader".to_string(),
                source: TargetSource::Camera {
                    slot: slot.clone(),
                    facing_mode: FacingMode::Environment,
                    desired_zoom: 1.0,
                },
            },
            callbacks,
        )
        .await
        .unwrap();

    assert_eq!(next_report(&mut rx).await, EngineReport::Miss);
    assert!(matches!(next_report(&mut rx).await, EngineReport::Error(_)));
    assert_eq!(
        next_report(&mut rx).await,
        EngineReport::Decoded(CODE.to_string())
    );

    adapter.stop().await;
    assert_eq!(script.engine_stops(), 1);
    assert_eq!(script.live_instances(), 0);
    slot.release();
}

#[tokio::test]
async fn test_stop_before_start_is_safe() {
    let script = DecodeScript::new(cadence());
    let suite = EngineSuite::scripted(script.clone());
    let config = ScanbenchConfig::default();

    for kind in BackendKind::ALL {
        let mut adapter = suite.adapter(kind, &config);
        adapter.stop().await;
        adapter.stop().await;
    }
    assert_eq!(script.instances_created(), 0);
    assert_eq!(script.engine_stops(), 0);
}
