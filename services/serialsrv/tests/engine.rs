//! Serial command engine against an in-memory device

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::sync::Arc;
use std::time::Duration;

use bridge_config::{AxisSettings, AxisTable, BridgeSettings};
use errors::BridgeError;
use serialsrv::engine::MotionProgress;
use serialsrv::modbus::{ModbusCommand, ModbusFunction, RegisterType};
use serialsrv::transport::{MockDevice, MockTransport};
use serialsrv::{AxisDefinition, Command, ResponseCode, SendMode, SerialEngine};

// ============================================================================
// Helpers
// ============================================================================

fn settings(queue_max_len: usize) -> BridgeSettings {
    let mut x = AxisSettings::new('X', 400);
    x.speed = 300;
    x.rapid_speed = 900;
    x.max_speed = 1000;
    x.position_notify_period = 100;
    x.min_distance_to_move = 0.5;

    let mut y = AxisSettings::new('Y', 400);
    y.speed = 200;

    let mut settings = BridgeSettings::default();
    settings.engine.read_timeout_ms = 2000;
    settings.engine.command_timeout_ms = 2000;
    settings.engine.queue_max_len = queue_max_len;
    settings.axes = AxisTable::from_axes(vec![x, y]).unwrap();
    settings
}

async fn open(settings: BridgeSettings) -> (SerialEngine, MockDevice) {
    let engine = SerialEngine::new(settings).unwrap();
    let (transport, device) = MockTransport::pair();
    engine.open(transport).await.unwrap();
    (engine, device)
}

/// Let the reader task pick up what the device just sent
async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}

/// Nothing reaches the device within a short window
async fn assert_nothing_written(device: &mut MockDevice) {
    assert!(
        tokio::time::timeout(Duration::from_millis(50), device.read_line())
            .await
            .is_err(),
        "unexpected request on the wire"
    );
}

// ============================================================================
// Exchange
// ============================================================================

#[tokio::test]
async fn test_chunked_response_is_reassembled() {
    let (engine, mut device) = open(settings(0)).await;

    let (response, ()) = tokio::join!(
        engine.send(Command::text("GETPOS;X;"), SendMode::wait()),
        async {
            assert_eq!(device.read_line().await.unwrap(), "GETPOS;X;");
            device.send(b"CURPOS").await.unwrap();
            settle().await;
            device.send(b"=400\n").await.unwrap();
        }
    );

    let response = response.unwrap();
    assert_eq!(response.code, ResponseCode::Ok);
    assert_eq!(response.text(), "CURPOS=400");
}

#[tokio::test]
async fn test_second_request_while_in_flight_is_busy() {
    let (engine, mut device) = open(settings(0)).await;
    let engine = Arc::new(engine);

    let first = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.send(Command::text("STOP;X;"), SendMode::wait()).await })
    };
    assert_eq!(device.read_line().await.unwrap(), "STOP;X;");

    let second = engine
        .send(Command::text("GETPOS;X;"), SendMode::wait())
        .await
        .unwrap();
    assert_eq!(second.code, ResponseCode::Busy);

    device.send_line("OK").await.unwrap();
    let first = first.await.unwrap().unwrap();
    assert!(first.is_ok());
    assert_eq!(first.text(), "OK");
}

#[tokio::test]
async fn test_timeout_and_late_response_discarded() {
    let mut settings = settings(0);
    settings.engine.read_timeout_ms = 100;
    let (engine, mut device) = open(settings).await;

    let response = engine
        .send(Command::text("GETPOS;X;"), SendMode::wait())
        .await
        .unwrap();
    assert_eq!(response.code, ResponseCode::Timeout);

    // The answer arrives after the caller gave up
    assert_eq!(device.read_line().await.unwrap(), "GETPOS;X;");
    device.send_line("CURPOS=123").await.unwrap();
    settle().await;

    let (response, ()) = tokio::join!(
        engine.send(Command::text("STOP;X;"), SendMode::wait_for(Duration::from_secs(2))),
        async {
            assert_eq!(device.read_line().await.unwrap(), "STOP;X;");
            device.send_line("OK").await.unwrap();
        }
    );
    assert_eq!(response.unwrap().text(), "OK");

    let stats = engine.stats();
    assert_eq!(stats.timeouts, 1);
    assert_eq!(stats.discarded, 1);
    assert_eq!(stats.responses, 1);
}

#[tokio::test]
async fn test_no_wait_returns_after_write() {
    let (engine, mut device) = open(settings(0)).await;

    let response = engine
        .send(Command::text("SETJS;false;"), SendMode::NoWait)
        .await
        .unwrap();
    assert!(response.is_ok());
    assert_eq!(response.text(), "OK");
    assert_eq!(device.read_line().await.unwrap(), "SETJS;false;");

    device.send_line("OK").await.unwrap();
    settle().await;
    assert_eq!(engine.stats().discarded, 1);
}

#[tokio::test]
async fn test_closed_engine_rejects_before_io() {
    let engine = SerialEngine::new(settings(0)).unwrap();
    assert!(matches!(
        engine.send(Command::text("STOP;X;"), SendMode::wait()).await,
        Err(BridgeError::PortNotOpen)
    ));
    assert!(matches!(
        engine.move_axis('X', 1.0, 0, SendMode::wait()).await,
        Err(BridgeError::PortNotOpen)
    ));

    let (engine, _device) = open(settings(0)).await;
    engine.close().await;
    assert!(!engine.is_open());
    assert!(matches!(
        engine.get_position('X').await,
        Err(BridgeError::PortNotOpen)
    ));
}

#[tokio::test]
async fn test_device_disconnect_closes_engine() {
    let (engine, device) = open(settings(0)).await;
    drop(device);
    settle().await;
    assert!(!engine.is_open());
}

// ============================================================================
// Queue
// ============================================================================

#[tokio::test]
async fn test_queue_overflow_and_drain() {
    let (engine, mut device) = open(settings(2)).await;
    engine.set_queued_mode(true).unwrap();

    let first = engine.send(Command::text("A;"), SendMode::wait()).await.unwrap();
    let second = engine.send(Command::text("B;"), SendMode::NoWait).await.unwrap();
    let third = engine.send(Command::text("C;"), SendMode::wait()).await.unwrap();
    assert_eq!(first.code, ResponseCode::Queued);
    assert_eq!(second.code, ResponseCode::Queued);
    assert_eq!(third.code, ResponseCode::QueueOverflow);
    assert_eq!(engine.queue_len(), 2);

    // Strict submission order
    assert_eq!(device.read_line().await.unwrap(), "A;");
    device.send_line("OK").await.unwrap();
    assert_eq!(device.read_line().await.unwrap(), "B;");
    device.send_line("OK").await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), engine.wait_for_queue_drain())
        .await
        .unwrap();
    assert_eq!(engine.queue_len(), 0);

    // Already drained: returns immediately
    tokio::time::timeout(Duration::from_millis(50), engine.wait_for_queue_drain())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_queue_waits_for_port_held_by_direct_command() {
    let (engine, mut device) = open(settings(4)).await;
    let engine = Arc::new(engine);

    let direct = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.send(Command::text("STOP;X;"), SendMode::wait()).await })
    };
    assert_eq!(device.read_line().await.unwrap(), "STOP;X;");

    engine.set_queued_mode(true).unwrap();
    let queued = engine.send(Command::text("A;"), SendMode::wait()).await.unwrap();
    assert_eq!(queued.code, ResponseCode::Queued);

    // The worker keeps the entry while the port is held
    assert_nothing_written(&mut device).await;
    assert_eq!(engine.queue_len(), 1);

    device.send_line("OK").await.unwrap();
    assert!(direct.await.unwrap().unwrap().is_ok());

    assert_eq!(device.read_line().await.unwrap(), "A;");
    device.send_line("OK").await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), engine.wait_for_queue_drain())
        .await
        .unwrap();
    assert_eq!(engine.queue_len(), 0);
    assert_eq!(engine.stats().requests, 2);
}

#[tokio::test]
async fn test_queued_move_tracks_position() {
    let (engine, mut device) = open(settings(4)).await;
    engine.set_queued_mode(true).unwrap();

    let response = engine
        .move_axis('X', 10.0, 0, SendMode::NoWait)
        .await
        .unwrap();
    assert_eq!(response.code, ResponseCode::Queued);

    assert_eq!(device.read_line().await.unwrap(), "MOVE;4000;300;X;");
    device.send_line("CURPOS=800").await.unwrap();
    settle().await;
    assert_eq!(engine.moving_position(), MotionProgress::Position(2.0));

    device.send_line("OK").await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), engine.wait_for_queue_drain())
        .await
        .unwrap();
    settle().await;
    assert_eq!(engine.moving_position(), MotionProgress::Ended);
    assert_eq!(engine.axis('X').unwrap().current_position, 10.0);
}

#[tokio::test]
async fn test_queued_mode_requires_queue() {
    let (engine, _device) = open(settings(0)).await;
    assert!(matches!(
        engine.set_queued_mode(true),
        Err(BridgeError::InvalidConfig { .. })
    ));
    assert!(!engine.is_queued_mode());

    // No queue: nothing to wait for
    tokio::time::timeout(Duration::from_millis(50), engine.wait_for_queue_drain())
        .await
        .unwrap();
}

// ============================================================================
// Moves
// ============================================================================

#[tokio::test]
async fn test_move_out_of_range_rejected_before_io() {
    let (engine, mut device) = open(settings(0)).await;

    let err = engine
        .move_axis('X', 100.0, 0, SendMode::wait())
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::OutOfRange { axis: 'X', .. }));

    assert_nothing_written(&mut device).await;
    assert_eq!(engine.stats().requests, 0);
}

#[tokio::test]
async fn test_short_moves_are_noops() {
    let (engine, mut device) = open(settings(0)).await;

    // Below X's minimum distance
    let response = engine
        .move_axis('X', 0.2, 0, SendMode::wait())
        .await
        .unwrap();
    assert!(response.is_ok());

    // Rounds to zero steps on Y
    let response = engine
        .move_axis('Y', 0.001, 0, SendMode::wait())
        .await
        .unwrap();
    assert!(response.is_ok());

    assert_nothing_written(&mut device).await;
    assert_eq!(engine.stats().requests, 0);
}

#[tokio::test]
async fn test_move_needs_a_way_to_observe_completion() {
    let (engine, _device) = open(settings(0)).await;

    // Y has no position notifications
    assert!(matches!(
        engine.move_axis('Y', 5.0, 0, SendMode::NoWait).await,
        Err(BridgeError::InvalidMoveMode('Y'))
    ));
    assert!(matches!(
        engine.move_axis('Q', 5.0, 0, SendMode::wait()).await,
        Err(BridgeError::AxisNotFound('Q'))
    ));
}

#[tokio::test]
async fn test_move_wait_tracks_position() {
    let (engine, mut device) = open(settings(0)).await;

    let (response, ()) = tokio::join!(
        engine.move_axis('x', 10.0, 0, SendMode::wait()),
        async {
            assert_eq!(device.read_line().await.unwrap(), "MOVE;4000;300;X;");
            device.send_line("CURPOS=800").await.unwrap();
            settle().await;
            assert_eq!(engine.moving_position(), MotionProgress::Position(2.0));
            device.send_line("CURPOS=3990").await.unwrap();
            settle().await;
            assert_eq!(engine.moving_position(), MotionProgress::Position(9.975));
            device.send_line("OK").await.unwrap();
        }
    );

    let response = response.unwrap();
    assert!(response.is_ok());
    assert_eq!(response.text(), "OK");
    assert_eq!(engine.axis('X').unwrap().current_position, 10.0);
    assert_eq!(engine.moving_position(), MotionProgress::Ended);
}

#[tokio::test]
async fn test_move_no_wait_follows_notifications() {
    let (engine, mut device) = open(settings(0)).await;

    let response = engine
        .move_axis('X', -5.0, 600, SendMode::NoWait)
        .await
        .unwrap();
    assert!(response.is_ok());
    assert_eq!(device.read_line().await.unwrap(), "MOVE;-2000;600;X;");
    assert_eq!(engine.moving_position(), MotionProgress::Position(0.0));

    device.send_line("CURPOS=-400").await.unwrap();
    settle().await;
    assert_eq!(engine.moving_position(), MotionProgress::Position(-1.0));

    device.send_line("OK").await.unwrap();
    settle().await;
    assert_eq!(engine.moving_position(), MotionProgress::Ended);
    assert_eq!(engine.axis('X').unwrap().current_position, -5.0);
}

#[tokio::test]
async fn test_move_error_keeps_last_reported_position() {
    let (engine, mut device) = open(settings(0)).await;

    let (response, ()) = tokio::join!(
        engine.move_axis('X', 10.0, 0, SendMode::wait()),
        async {
            device.read_line().await.unwrap();
            device.send_line("CURPOS=400").await.unwrap();
            settle().await;
            device.send_line("ERROR;endstop").await.unwrap();
        }
    );

    let response = response.unwrap();
    assert_eq!(response.code, ResponseCode::Error);
    assert_eq!(engine.axis('X').unwrap().current_position, 1.0);
    assert_eq!(engine.moving_position(), MotionProgress::Ended);
}

#[tokio::test]
async fn test_stop_abandons_outstanding_move() {
    let (engine, mut device) = open(settings(0)).await;

    engine
        .move_axis('X', 10.0, 0, SendMode::NoWait)
        .await
        .unwrap();
    device.read_line().await.unwrap();

    let (response, ()) = tokio::join!(engine.stop('x'), async {
        assert_eq!(device.read_line().await.unwrap(), "STOP;X;");
        device.send_line("OK").await.unwrap();
    });
    assert!(response.unwrap().is_ok());

    // The stop's OK must not be taken as reaching the destination
    assert_eq!(engine.moving_position(), MotionProgress::Ended);
    assert_eq!(engine.axis('X').unwrap().current_position, 0.0);
}

// ============================================================================
// Axis commands
// ============================================================================

#[tokio::test]
async fn test_get_position() {
    let (engine, mut device) = open(settings(0)).await;

    let (position, ()) = tokio::join!(engine.get_position('X'), async {
        assert_eq!(device.read_line().await.unwrap(), "GETPOS;X;");
        device.send_line("CURPOS=800").await.unwrap();
    });
    assert_eq!(position.unwrap(), 2.0);

    let (position, ()) = tokio::join!(engine.get_position('X'), async {
        device.read_line().await.unwrap();
        device.send_line("NOSIGNAL").await.unwrap();
    });
    assert!(matches!(position, Err(BridgeError::MalformedResponse(_))));

    assert!(matches!(
        engine.get_position('Q').await,
        Err(BridgeError::AxisNotFound('Q'))
    ));
}

#[tokio::test]
async fn test_define_axis_keeps_limits_on_overwrite() {
    let (engine, mut device) = open(settings(0)).await;

    let definition = AxisDefinition {
        letter: 'a',
        steps_per_mm: 100,
        inverse: false,
        speed: 200,
        rapid_speed: 400,
        position: 1.5,
        min_value: -5.0,
        max_value: 5.0,
        notify_period: 0,
    };

    let (response, ()) = tokio::join!(engine.define_axis(definition.clone()), async {
        assert_eq!(
            device.read_line().await.unwrap(),
            "SETAXIS;A;100;false;200;150;0;-5;5;"
        );
        device.send_line("OK").await.unwrap();
    });
    assert!(response.unwrap().is_ok());

    let redefinition = AxisDefinition {
        inverse: true,
        min_value: -100.0,
        max_value: 100.0,
        position: 0.0,
        ..definition
    };
    let (response, ()) = tokio::join!(engine.define_axis(redefinition), async {
        assert_eq!(
            device.read_line().await.unwrap(),
            "SETAXIS;A;100;true;200;0;0;-5;5;"
        );
        device.send_line("OK").await.unwrap();
    });
    assert!(response.unwrap().is_ok());

    let axis = engine.axis('A').unwrap();
    assert_eq!((axis.axis_min_value, axis.axis_max_value), (-5.0, 5.0));
    // Indices follow letter order
    assert_eq!(axis.index, 0);
    assert_eq!(engine.axis('X').unwrap().index, 1);
}

#[tokio::test]
async fn test_define_axis_clamps_speed_to_ceiling() {
    let (engine, mut device) = open(settings(0)).await;

    let definition = AxisDefinition {
        letter: 'X',
        steps_per_mm: 400,
        inverse: false,
        speed: 1500,
        rapid_speed: 2000,
        position: 0.0,
        min_value: 0.0,
        max_value: 0.0,
        notify_period: 100,
    };
    let (response, ()) = tokio::join!(engine.define_axis(definition), async {
        assert_eq!(
            device.read_line().await.unwrap(),
            "SETAXIS;X;400;false;1000;0;100;-20;40;"
        );
        device.send_line("OK").await.unwrap();
    });
    assert!(response.unwrap().is_ok());
    assert_eq!(engine.axis('X').unwrap().rapid_speed, 1000);
}

#[tokio::test]
async fn test_joystick_commands() {
    let mut settings = settings(0);
    settings.enable_joystick = true;
    settings.joystick_command = "SETJS;true;X;A0;A1;".to_string();
    let (engine, mut device) = open(settings).await;

    let (response, ()) = tokio::join!(engine.joystick('y', true), async {
        assert_eq!(device.read_line().await.unwrap(), "SETJS;true;Y;A0;A1;");
        device.send_line("OK").await.unwrap();
    });
    assert!(response.unwrap().is_ok());

    let (response, ()) = tokio::join!(engine.joystick('Q', false), async {
        assert_eq!(device.read_line().await.unwrap(), "SETJS;false;");
        device.send_line("OK").await.unwrap();
    });
    assert!(response.unwrap().is_ok());

    assert!(matches!(
        engine.joystick('Q', true).await,
        Err(BridgeError::AxisNotFound('Q'))
    ));
}

// ============================================================================
// Modbus
// ============================================================================

#[tokio::test]
async fn test_send_modbus_read_and_write() {
    let (engine, mut device) = open(settings(0)).await;

    let read = ModbusCommand::build(1, RegisterType::Holding, ModbusFunction::ReadValue, 0, 2)
        .unwrap();
    let (values, ()) = tokio::join!(engine.send_modbus(read), async {
        assert_eq!(device.read_bytes(8).await.unwrap(), read.as_bytes());
        // RTU frame without a line terminator
        device
            .send(&[0x01, 0x03, 0x04, 0x00, 0x01, 0x00, 0x02, 0x2A, 0x32])
            .await
            .unwrap();
    });
    assert_eq!(values.unwrap(), vec![1, 2]);

    let write = ModbusCommand::build(1, RegisterType::Holding, ModbusFunction::SetValue, 0, 20000)
        .unwrap();
    let (values, ()) = tokio::join!(engine.send_modbus(write), async {
        let request = device.read_bytes(8).await.unwrap();
        device.send(&request).await.unwrap();
    });
    assert_eq!(values.unwrap(), vec![0]);
}

#[tokio::test]
async fn test_send_modbus_short_response_fails_closed() {
    let (engine, mut device) = open(settings(0)).await;

    let read = ModbusCommand::build(1, RegisterType::Input, ModbusFunction::ReadValue, 0, 2)
        .unwrap();
    let (values, ()) = tokio::join!(engine.send_modbus(read), async {
        device.read_bytes(8).await.unwrap();
        // Advertises 4 data bytes, line ends after 2
        device.send(&[0x01, 0x04, 0x04, 0x00, 0x01, b'\n']).await.unwrap();
    });
    assert!(matches!(values, Err(BridgeError::MalformedResponse(_))));
}
