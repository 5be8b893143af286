//! Request handling through the dispatcher against the virtual controller

use megg::server::{AppState, Dispatcher};
use megg::{Config, VirtualBehavior, VirtualDevice, VirtualPortOpener};
use megg_communication::Budget;
use megg_core::{DelayRange, ObserverId, ObserverReceiver};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const PORT: &str = "VIRTUAL0";

fn fast_config() -> Config {
    let mut config = Config::default();
    config.serial.link.port = Some(PORT.to_string());
    config.serial.link.fallback_ports.clear();
    config.serial.link.settle_ms = 0;
    config.serial.link.probe_timeout_ms = 200;
    config.serial.link.command_settle_ms = 0;
    config.serial.link.read_timeout_ms = 50;
    config.protocol.calibration = Budget::new(500, 200);
    config.protocol.cycle = Budget::new(500, 200);
    config.process.getting_ready_delay = DelayRange::fixed(0.0);
    config.process.load_eggs_delay = DelayRange::fixed(0.0);
    config.process.ready_to_process_delay = DelayRange::fixed(0.0);
    config.process.egg_processing_rate = 1000.0;
    config
}

struct Harness {
    dispatcher: Dispatcher,
    observer: ObserverId,
    rx: ObserverReceiver,
}

impl Harness {
    async fn new(device: &VirtualDevice, connect: bool) -> Self {
        let opener = Arc::new(VirtualPortOpener::new(device.clone(), PORT));
        let (state, _bridge) = AppState::build(fast_config(), opener);
        if connect {
            state.engine().connect().await.unwrap();
        }
        let (observer, rx) = state.broadcaster().register();
        Self {
            dispatcher: Dispatcher::new(state),
            observer,
            rx,
        }
    }

    fn state(&self) -> &AppState {
        self.dispatcher.state()
    }

    async fn send(&self, frame: Value) {
        self.dispatcher
            .handle(self.observer, &frame.to_string())
            .await;
    }

    async fn next(&mut self) -> Value {
        let text = tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("observer channel closed");
        serde_json::from_str(&text).unwrap()
    }

    /// Next frame of the given type, skipping unrelated traffic
    async fn next_of(&mut self, kind: &str) -> Value {
        loop {
            let frame = self.next().await;
            if frame["type"] == kind {
                return frame;
            }
        }
    }

    async fn quiet(&mut self) -> bool {
        tokio::time::timeout(Duration::from_millis(200), self.rx.recv())
            .await
            .is_err()
    }
}

#[tokio::test]
async fn test_greeting_sends_welcome_then_status() {
    let mut h = Harness::new(&VirtualDevice::new(), false).await;
    h.dispatcher.greet(h.observer);

    let welcome = h.next().await;
    assert_eq!(welcome["type"], "connection");
    assert_eq!(welcome["message"], "Connected to MEGG IoT Backend API");
    assert_eq!(welcome["server_info"]["api_type"], "WebSocket API");

    let status = h.next().await;
    assert_eq!(status["type"], "system_status");
    assert_eq!(status["arduino"]["connected"], false);
    assert_eq!(status["server"]["connected_clients"], 1);
}

#[tokio::test]
async fn test_ping_gets_pong() {
    let mut h = Harness::new(&VirtualDevice::new(), false).await;
    h.send(json!({"type": "ping"})).await;

    let pong = h.next().await;
    assert_eq!(pong["type"], "pong");
    assert!(pong["timestamp"].is_string());
}

#[tokio::test]
async fn test_unknown_type_gets_exact_error() {
    let mut h = Harness::new(&VirtualDevice::new(), false).await;
    h.send(json!({"type": "frobnicate"})).await;

    assert_eq!(
        h.next().await,
        json!({"type": "error", "message": "Unknown message type: frobnicate"})
    );
    assert!(h.quiet().await);
}

#[tokio::test]
async fn test_invalid_json_gets_error() {
    let mut h = Harness::new(&VirtualDevice::new(), false).await;
    h.dispatcher.handle(h.observer, "{not json").await;

    assert_eq!(
        h.next().await,
        json!({"type": "error", "message": "Invalid JSON format"})
    );
}

#[tokio::test]
async fn test_calibration_while_disconnected_fails_once() {
    let mut h = Harness::new(&VirtualDevice::new(), false).await;
    h.send(json!({"type": "calibration_request", "component": "HX711"}))
        .await;

    let result = h.next().await;
    assert_eq!(result["type"], "calibration_result");
    assert_eq!(result["component"], "HX711");
    assert_eq!(result["success"], false);
    assert_eq!(
        result["message"],
        "Arduino not connected - cannot calibrate HX711. Please check Arduino connection."
    );
    assert!(h.quiet().await);
}

#[tokio::test]
async fn test_calibration_with_bad_weight_is_rejected() {
    let device = VirtualDevice::new();
    let mut h = Harness::new(&device, true).await;
    h.send(json!({"type": "calibration_request", "component": "hx711", "weight": "heavy"}))
        .await;

    let result = h.next_of("calibration_result").await;
    assert_eq!(result["component"], "HX711");
    assert_eq!(result["success"], false);
    assert!(!device.received().iter().any(|l| l.starts_with("CALIBRATE")));
}

#[tokio::test]
async fn test_calibration_streams_progress_then_result() {
    let device = VirtualDevice::new();
    let mut h = Harness::new(&device, true).await;
    h.send(json!({"type": "calibration_request", "component": "HX711", "weight": 50}))
        .await;

    let first = h.next_of("calibration_progress").await;
    assert_eq!(first["component"], "HX711");
    assert_eq!(first["status"], "started");

    let result = h.next_of("calibration_result").await;
    assert_eq!(result["success"], true);
    assert_eq!(result["status"], "completed");
    assert!(device.received().contains(&"CALIBRATE_HX711 50".to_string()));
}

#[tokio::test]
async fn test_hardware_error_is_reported() {
    let device = VirtualDevice::with_behavior(VirtualBehavior {
        failing_components: ["SG90".to_string()].into_iter().collect(),
        ..Default::default()
    });
    let mut h = Harness::new(&device, true).await;
    h.send(json!({"type": "calibration_request", "component": "SG90"}))
        .await;

    let result = h.next_of("calibration_result").await;
    assert_eq!(result["success"], false);
    assert_eq!(
        result["message"],
        "ERROR:SG90 calibration failed - no response from hardware"
    );
}

#[tokio::test]
async fn test_start_batch_requires_ready_components() {
    let mut h = Harness::new(&VirtualDevice::new(), false).await;
    h.send(json!({"type": "work_process", "action": "start_batch", "egg_count": 3}))
        .await;

    let reply = h.next().await;
    assert_eq!(reply["type"], "work_process_response");
    assert_eq!(reply["action"], "start_batch");
    assert_eq!(reply["success"], false);
    assert_eq!(
        reply["message"],
        "Cannot start processing. Check component readiness or current status."
    );
    assert_eq!(reply["status"], "idle");
}

#[tokio::test]
async fn test_invalid_egg_count_is_rejected() {
    let mut h = Harness::new(&VirtualDevice::new(), false).await;
    h.send(json!({"type": "work_process", "action": "start_batch", "egg_count": -4}))
        .await;

    let reply = h.next().await;
    assert_eq!(reply["success"], false);
    assert!(reply["message"].as_str().unwrap().contains("egg_count"));
}

#[tokio::test]
async fn test_unknown_action() {
    let mut h = Harness::new(&VirtualDevice::new(), false).await;
    h.send(json!({"type": "work_process", "action": "dance"}))
        .await;

    let reply = h.next().await;
    assert_eq!(reply["success"], false);
    assert_eq!(reply["message"], "Unknown work process action: dance");
}

#[tokio::test]
async fn test_full_batch_after_calibration() {
    let device = VirtualDevice::new();
    let mut h = Harness::new(&device, true).await;

    for component in ["UNO", "HX711", "NEMA23", "SG90", "MG996R"] {
        h.send(json!({"type": "calibration_request", "component": component}))
            .await;
        let result = h.next_of("calibration_result").await;
        assert_eq!(result["component"], component);
        assert_eq!(result["success"], true);
    }
    assert!(h.state().components().all_ready());

    h.send(json!({
        "type": "work_process",
        "action": "start_batch",
        "batch_id": "B-42",
        "egg_count": 3
    }))
    .await;
    let reply = h.next_of("work_process_response").await;
    assert_eq!(reply["success"], true);
    assert_eq!(reply["message"], "Batch B-42 started successfully");
    assert_eq!(reply["batch"]["id"], "B-42");

    let mut eggs = 0;
    loop {
        let frame = h.next().await;
        match frame["type"].as_str() {
            Some("egg_result") => eggs += 1,
            Some("process_update") if frame["status"] == "completed" => {
                assert_eq!(frame["stats"]["totalProcessed"], 3);
                break;
            }
            _ => {}
        }
    }
    assert_eq!(eggs, 3);

    h.send(json!({"type": "work_process", "action": "get_status"}))
        .await;
    let status = h.next_of("work_process_status").await;
    assert_eq!(status["is_processing"], false);

    h.send(json!({"type": "work_process", "action": "reset_process"}))
        .await;
    let reply = h.next_of("work_process_response").await;
    assert_eq!(reply["message"], "Process reset successfully");
}

#[tokio::test]
async fn test_set_configuration() {
    let mut h = Harness::new(&VirtualDevice::new(), false).await;
    h.send(json!({
        "type": "set_configuration",
        "accountId": "acc-7",
        "configurations": {"small": [40, 50]}
    }))
    .await;

    let reply = h.next().await;
    assert_eq!(reply["type"], "configuration_result");
    assert_eq!(reply["success"], true);
    assert_eq!(reply["accountId"], "acc-7");
    assert_eq!(reply["message"], "Configuration saved");
    assert_eq!(
        h.state().configuration("acc-7"),
        Some(json!({"small": [40, 50]}))
    );

    h.send(json!({"type": "set_configuration", "configurations": {}}))
        .await;
    let reply = h.next().await;
    assert_eq!(reply["success"], false);
}

#[tokio::test]
async fn test_send_command_and_sorting() {
    let device = VirtualDevice::new();
    let mut h = Harness::new(&device, true).await;

    h.send(json!({"type": "send_command", "command": "HOME"}))
        .await;
    let result = h.next_of("command_result").await;
    assert_eq!(result["command"], "HOME");
    assert_eq!(result["success"], true);

    h.send(json!({"type": "start_sorting", "ranges": ["40-50", "50-60"]}))
        .await;
    let ack = h.next_of("sorting_ack").await;
    assert_eq!(ack["action"], "start_sorting");
    let result = h.next_of("sorting_result").await;
    assert_eq!(result["success"], true);
    assert!(device
        .received()
        .contains(&"START 40-50 50-60".to_string()));

    h.send(json!({"type": "stop_sorting"})).await;
    let result = h.next_of("sorting_stop_result").await;
    assert_eq!(result["success"], true);
}

#[tokio::test]
async fn test_egg_count_accepts_numeric_text() {
    let mut h = Harness::new(&VirtualDevice::new(), false).await;
    for count in [json!("5"), json!(5.0)] {
        h.send(json!({"type": "work_process", "action": "start_batch", "egg_count": count}))
            .await;
        let reply = h.next().await;
        assert_eq!(reply["type"], "work_process_response");
        assert_eq!(
            reply["message"],
            "Cannot start processing. Check component readiness or current status."
        );
    }

    h.send(json!({"type": "work_process", "action": "start_batch", "egg_count": "abc"}))
        .await;
    let reply = h.next().await;
    assert_eq!(reply["type"], "work_process_response");
    assert_eq!(reply["success"], false);
    assert!(reply["message"].as_str().unwrap().contains("egg_count"));
}

#[tokio::test]
async fn test_stop_sorting_interrupts_running_cycle() {
    let device = VirtualDevice::with_behavior(VirtualBehavior {
        run_until_stop: true,
        ..Default::default()
    });
    let mut h = Harness::new(&device, true).await;

    h.send(json!({"type": "start_sorting", "ranges": ["40-50"]}))
        .await;
    let result = h.next_of("sorting_result").await;
    assert_eq!(result["success"], true);

    let started = std::time::Instant::now();
    h.send(json!({"type": "stop_sorting"})).await;
    let result = h.next_of("sorting_stop_result").await;
    assert_eq!(result["success"], true);
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(device.received().last().map(String::as_str), Some("STOP"));
}

#[tokio::test]
async fn test_device_error_is_prefixed_in_command_result() {
    let device = VirtualDevice::with_behavior(VirtualBehavior {
        failing_components: ["SG90".to_string()].into_iter().collect(),
        ..Default::default()
    });
    let mut h = Harness::new(&device, true).await;
    h.send(json!({"type": "send_command", "command": "CALIBRATE_SG90"}))
        .await;

    let result = h.next_of("command_result").await;
    assert_eq!(result["success"], false);
    assert_eq!(
        result["message"],
        "Device error: ERROR:SG90 calibration failed - no response from hardware"
    );
}
