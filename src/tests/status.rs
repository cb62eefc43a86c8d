use crate::config::Config;
use crate::error::ProtocolError;
use crate::status::{reconcile, CanonicalStatus, SocketState, StatusDialect, WifiState};
use crate::tests::mock::{initialized_adapter, MockSerial};

#[test]
fn test_reconcile_all_combinations() {
    let cases = [
        (None, SocketState::Open, CanonicalStatus::SocketOpen),
        (None, SocketState::Closed, CanonicalStatus::SocketClosed),
        (Some(WifiState::NotStarted), SocketState::Open, CanonicalStatus::SocketOpen),
        (Some(WifiState::NotStarted), SocketState::Closed, CanonicalStatus::InProgress),
        (Some(WifiState::ConnectedNoIp), SocketState::Open, CanonicalStatus::NotConnected),
        (Some(WifiState::ConnectedNoIp), SocketState::Closed, CanonicalStatus::NotConnected),
        (Some(WifiState::Connected), SocketState::Open, CanonicalStatus::SocketOpen),
        (Some(WifiState::Connected), SocketState::Closed, CanonicalStatus::ApConnected),
        (Some(WifiState::Connecting), SocketState::Open, CanonicalStatus::SocketOpen),
        (Some(WifiState::Connecting), SocketState::Closed, CanonicalStatus::NotConnected),
        (Some(WifiState::Disconnected), SocketState::Open, CanonicalStatus::NotConnected),
        (Some(WifiState::Disconnected), SocketState::Closed, CanonicalStatus::NotConnected),
        (Some(WifiState::Other(7)), SocketState::Open, CanonicalStatus::SocketOpen),
        (Some(WifiState::Other(7)), SocketState::Closed, CanonicalStatus::SocketClosed),
    ];

    for (wifi, socket, expected) in cases {
        assert_eq!(expected, reconcile(wifi, socket), "{:?} / {:?}", wifi, socket);

        // Deterministic
        assert_eq!(reconcile(wifi, socket), reconcile(wifi, socket));
    }
}

#[test]
fn test_wifi_state_codes() {
    assert_eq!(WifiState::NotStarted, WifiState::from(0));
    assert_eq!(WifiState::ConnectedNoIp, WifiState::from(1));
    assert_eq!(WifiState::Connected, WifiState::from(2));
    assert_eq!(WifiState::Connecting, WifiState::from(3));
    assert_eq!(WifiState::Disconnected, WifiState::from(4));
    assert_eq!(WifiState::Other(5), WifiState::from(5));
}

#[test]
fn test_canonical_status_codes() {
    for code in 1..=5 {
        assert_eq!(Some(code as u8), CanonicalStatus::from_code(code).code());
    }

    assert_eq!(CanonicalStatus::Unknown, CanonicalStatus::from_code(0));
    assert_eq!(CanonicalStatus::Unknown, CanonicalStatus::from_code(6));
    assert_eq!(None, CanonicalStatus::Unknown.code());

    assert!(CanonicalStatus::ApConnected.is_connected());
    assert!(CanonicalStatus::SocketOpen.is_connected());
    assert!(CanonicalStatus::SocketClosed.is_connected());
    assert!(!CanonicalStatus::InProgress.is_connected());
    assert!(!CanonicalStatus::NotConnected.is_connected());
    assert!(!CanonicalStatus::Unknown.is_connected());
}

#[test]
fn test_modern_status_socket_open() {
    let mut serial = MockSerial::new();
    serial.add_response(b"AT+CWSTATE?\r\n", b"+CWSTATE:2,\"test_wifi\"\r\n\r\nOK\r\n");
    serial.add_response(
        b"AT+CIPSTATE?\r\n",
        b"+CIPSTATE:0,\"TCP\",\"10.0.0.1\",21,54321,0\r\n\r\nOK\r\n",
    );

    let mut adapter = initialized_adapter(serial);
    assert_eq!(CanonicalStatus::SocketOpen, adapter.canonical_status().unwrap());
}

#[test]
fn test_modern_status_ap_connected() {
    let mut serial = MockSerial::new();
    serial.add_response(b"AT+CWSTATE?\r\n", b"+CWSTATE:2,\"test_wifi\"\r\n\r\nOK\r\n");
    serial.add_ok_response(b"AT+CIPSTATE?\r\n");

    let mut adapter = initialized_adapter(serial);
    assert_eq!(CanonicalStatus::ApConnected, adapter.canonical_status().unwrap());
}

#[test]
fn test_modern_status_disconnected_overrides_socket() {
    let mut serial = MockSerial::new();
    serial.add_response(b"AT+CWSTATE?\r\n", b"+CWSTATE:4,\"test_wifi\"\r\n\r\nOK\r\n");
    serial.add_response(
        b"AT+CIPSTATE?\r\n",
        b"+CIPSTATE:0,\"TCP\",\"10.0.0.1\",21,54321,0\r\n\r\nOK\r\n",
    );

    let mut adapter = initialized_adapter(serial);
    assert_eq!(CanonicalStatus::NotConnected, adapter.canonical_status().unwrap());
}

#[test]
fn test_status_wifi_without_state_line() {
    let mut serial = MockSerial::new();
    serial.add_ok_response(b"AT+CWSTATE?\r\n");

    let mut adapter = initialized_adapter(serial);
    assert_eq!(None, adapter.status_wifi().unwrap());
}

#[test]
fn test_status_wifi_without_ssid() {
    let mut serial = MockSerial::new();
    serial.add_response(b"AT+CWSTATE?\r\n", b"+CWSTATE:3\r\n\r\nOK\r\n");

    let mut adapter = initialized_adapter(serial);
    assert_eq!(Some(WifiState::Connecting), adapter.status_wifi().unwrap());
}

#[test]
fn test_legacy_status_socket_open() {
    let mut serial = MockSerial::new();
    serial.add_response(
        b"AT+CIPSTATUS\r\n",
        b"STATUS:3\r\n+CIPSTATUS:0,\"TCP\",\"10.0.0.1\",21,54321,0\r\n\r\nOK\r\n",
    );

    let mut adapter = initialized_adapter(serial);
    adapter.dialect = StatusDialect::Legacy;

    assert_eq!(CanonicalStatus::SocketOpen, adapter.canonical_status().unwrap());
    adapter.serial.assert_all_cmds_sent();
}

#[test]
fn test_legacy_status_not_connected() {
    let mut serial = MockSerial::new();
    serial.add_response(b"AT+CIPSTATUS\r\n", b"STATUS:5\r\n\r\nOK\r\n");

    let mut adapter = initialized_adapter(serial);
    adapter.dialect = StatusDialect::Legacy;

    assert_eq!(CanonicalStatus::NotConnected, adapter.canonical_status().unwrap());
}

#[test]
fn test_legacy_status_missing_line() {
    let mut serial = MockSerial::new();
    serial.add_ok_response(b"AT+CIPSTATUS\r\n");

    let mut adapter = initialized_adapter(serial);
    assert_eq!(CanonicalStatus::Unknown, adapter.legacy_status().unwrap());
}

#[test]
fn test_status_error_propagated() {
    let mut serial = MockSerial::new();
    for _ in 0..3 {
        serial.add_error_response(b"AT+CWSTATE?\r\n");
    }

    let mut adapter = initialized_adapter(serial);
    assert_eq!(ProtocolError::FirmwareError, adapter.canonical_status().unwrap_err());
}

#[test]
fn test_is_connected() {
    let mut serial = MockSerial::new();
    serial.add_ok_response(b"ATE0\r\n");
    serial.add_response(b"AT+CWSTATE?\r\n", b"+CWSTATE:2,\"test_wifi\"\r\n\r\nOK\r\n");
    serial.add_ok_response(b"AT+CIPSTATE?\r\n");

    let mut adapter = initialized_adapter(serial);
    assert!(adapter.is_connected());
}

#[test]
fn test_is_connected_in_progress() {
    let mut serial = MockSerial::new();
    serial.add_ok_response(b"ATE0\r\n");
    serial.add_response(b"AT+CWSTATE?\r\n", b"+CWSTATE:0,\"\"\r\n\r\nOK\r\n");
    serial.add_ok_response(b"AT+CIPSTATE?\r\n");

    let mut adapter = initialized_adapter(serial);
    assert!(!adapter.is_connected());
}

#[test]
fn test_is_connected_on_failure() {
    let mut serial = MockSerial::new();
    serial.add_ok_response(b"ATE0\r\n");
    serial.add_response(b"AT+CIPSTATUS\r\n", b"\r\nbusy p...\r\n\r\nERROR\r\n");
    serial.add_error_response(b"AT+CIPSTATUS\r\n");
    serial.add_error_response(b"AT+CIPSTATUS\r\n");

    let mut adapter = initialized_adapter(serial);
    adapter.config = Config::default().legacy_status(true);
    adapter.dialect = StatusDialect::Legacy;

    assert!(!adapter.is_connected());
    adapter.serial.assert_all_cmds_sent();
}

#[test]
fn test_status_with_interleaved_frame() {
    let mut serial = MockSerial::new();
    serial.add_response(
        b"AT+CWSTATE?\r\n",
        b"+IPD,6:\r\nOK\r\n+CWSTATE:2,\"test_wifi\"\r\n\r\nOK\r\n",
    );

    let mut adapter = initialized_adapter(serial);

    assert_eq!(Some(WifiState::Connected), adapter.status_wifi().unwrap());
    assert_eq!(b"\r\nOK\r\n", adapter.pending.as_slice());
}
