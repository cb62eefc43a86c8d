use crate::adapter::Adapter;
use crate::config::Config;
use crate::error::ProtocolError;
use crate::tests::mock::{initialized_adapter, MockSerial, MockTimer, PollTimer};
use alloc::string::ToString;
use embedded_io::ErrorKind;

#[test]
fn test_send_command_success() {
    let mut serial = MockSerial::new();
    serial.add_response(b"AT+CWMODE?\r\n", b"+CWMODE:1\r\n\r\nOK\r\n");

    let mut adapter = initialized_adapter(serial);
    let response = adapter.send_command("AT+CWMODE?", 1_000, 3).unwrap();

    assert_eq!(b"+CWMODE:1\r\n\r\nOK\r\n", response.as_bytes());
    assert_eq!(Some(b"1".as_slice()), response.find_prefixed(b"+CWMODE:"));

    let commands = adapter.serial.get_commands_as_strings();
    assert_eq!(1, commands.len());
    assert_eq!("AT+CWMODE?\r\n".to_string(), commands[0]);
}

#[test]
fn test_send_command_retry_after_timeout() {
    let mut serial = MockSerial::new();
    serial.add_no_response(b"AT\r\n");
    serial.add_ok_response(b"AT\r\n");

    let mut adapter = initialized_adapter(serial);
    adapter.send_command("AT", 1_000, 3).unwrap();

    assert_eq!(2, adapter.serial.get_commands_as_strings().len());
    adapter.serial.assert_all_cmds_sent();
}

#[test]
fn test_send_command_error_response() {
    let mut serial = MockSerial::new();
    serial.add_error_response(b"AT\r\n");
    serial.add_error_response(b"AT\r\n");
    serial.add_error_response(b"AT\r\n");

    let mut adapter = initialized_adapter(serial);
    let error = adapter.send_command("AT", 1_000, 3).unwrap_err();

    assert_eq!(ProtocolError::FirmwareError, error);
    assert!(error.is_acknowledgement());
    assert_eq!(3, adapter.serial.get_commands_as_strings().len());
}

#[test]
fn test_send_command_no_acknowledgement() {
    let mut serial = MockSerial::new();
    serial.add_no_response(b"AT\r\n");
    serial.add_no_response(b"AT\r\n");

    let mut adapter = initialized_adapter(serial);
    let error = adapter.send_command("AT", 1_000, 2).unwrap_err();

    assert_eq!(ProtocolError::NoAcknowledgement, error);
    adapter.serial.assert_all_cmds_sent();
}

#[test]
fn test_send_command_last_attempt_decides_error() {
    let mut serial = MockSerial::new();
    serial.add_error_response(b"AT\r\n");
    serial.add_no_response(b"AT\r\n");

    let mut adapter = initialized_adapter(serial);
    let error = adapter.send_command("AT", 1_000, 2).unwrap_err();

    assert_eq!(ProtocolError::NoAcknowledgement, error);
}

#[test]
fn test_send_command_zero_retries_attempts_once() {
    let mut serial = MockSerial::new();
    serial.add_ok_response(b"AT\r\n");

    let mut adapter = initialized_adapter(serial);
    adapter.send_command("AT", 1_000, 0).unwrap();

    assert_eq!(1, adapter.serial.get_commands_as_strings().len());
}

#[test]
fn test_send_command_stops_at_terminator() {
    let mut serial = MockSerial::new();
    serial.add_response(b"AT+CIPSEND=4\r\n", b"\r\nOK\r\n>");

    let mut adapter = initialized_adapter(serial);
    adapter.send_command("AT+CIPSEND=4", 1_000, 1).unwrap();

    // Prompt is left for the send logic
    assert_eq!(1, adapter.serial.unread());
}

#[test]
fn test_send_command_serial_error() {
    let mut serial = MockSerial::new();
    serial.read_error = true;

    let mut adapter = initialized_adapter(serial);
    let error = adapter.send_command("AT", 1_000, 3).unwrap_err();

    assert_eq!(ProtocolError::Serial(ErrorKind::BrokenPipe), error);
    assert!(!error.is_acknowledgement());
}

#[test]
fn test_send_command_timer_duration() {
    let mut serial = MockSerial::new();
    serial.add_no_response(b"AT\r\n");

    let mut timer = MockTimer::new();
    timer
        .expect_start()
        .times(1)
        .withf(|duration| *duration == MockTimer::duration_ms(1_500))
        .returning(|_| Ok(()));
    timer.expect_wait().times(1).returning(|| Ok(()));

    let mut adapter: Adapter<_, _, 1_000_000> = Adapter::new(serial, timer, Config::default());
    let error = adapter.send_command("AT", 1_500, 1).unwrap_err();

    assert_eq!(ProtocolError::NoAcknowledgement, error);
}

#[test]
fn test_send_command_response_before_deadline() {
    let mut serial = MockSerial::new();
    serial.add_ok_response(b"AT\r\n");

    let mut timer = MockTimer::new();
    timer.expect_start().times(1).returning(|_| Ok(()));
    timer.expect_wait().returning(|| Err(nb::Error::WouldBlock));

    let mut adapter: Adapter<_, _, 1_000_000> = Adapter::new(serial, timer, Config::default());
    adapter.send_command("AT", 5_000, 1).unwrap();
}

#[test]
fn test_send_command_timeout_while_streaming() {
    let mut serial = MockSerial::new();
    serial.add_no_response(b"AT\r\n");
    serial.add_incoming(&[b'x'; 50_000]);

    let mut adapter: Adapter<_, _, 1_000_000> = Adapter::new(serial, PollTimer::new(3), Config::default());
    let error = adapter.send_command("AT", 1, 1).unwrap_err();

    assert_eq!(ProtocolError::NoAcknowledgement, error);
    assert!(adapter.serial.unread() > 49_000);
}

#[test]
fn test_send_command_moves_frame_to_receive_buffer() {
    let mut serial = MockSerial::new();
    serial.add_response(b"AT\r\n", b"\r\n+IPD,6:\r\nOK\r\n\r\nOK\r\n");

    let mut adapter = initialized_adapter(serial);
    let response = adapter.send_command("AT", 1_000, 1).unwrap();

    // Payload looks like a terminator, but must not complete the response
    assert_eq!(b"\r\n\r\nOK\r\n", response.as_bytes());
    assert_eq!(b"\r\nOK\r\n", adapter.pending.as_slice());
    assert!(adapter.frames.is_idle());
    assert_eq!(0, adapter.serial.unread());
}

#[test]
fn test_send_command_timer_start_error() {
    let mut serial = MockSerial::new();
    serial.add_ok_response(b"AT\r\n");

    let mut timer = MockTimer::new();
    timer.expect_start().times(1).returning(|_| Err(1));

    let mut adapter: Adapter<_, _, 1_000_000> = Adapter::new(serial, timer, Config::default());
    let error = adapter.send_command("AT", 1_000, 3).unwrap_err();

    assert_eq!(ProtocolError::TimerError, error);
}

#[test]
fn test_send_command_timer_wait_error() {
    let mut serial = MockSerial::new();
    serial.add_no_response(b"AT\r\n");

    let mut timer = MockTimer::new();
    timer.expect_start().times(1).returning(|_| Ok(()));
    timer.expect_wait().times(1).returning(|| Err(nb::Error::Other(1)));

    let mut adapter: Adapter<_, _, 1_000_000> = Adapter::new(serial, timer, Config::default());
    let error = adapter.send_command("AT", 1_000, 3).unwrap_err();

    assert_eq!(ProtocolError::TimerError, error);
}

#[test]
fn test_default_command_timeout_used() {
    let mut serial = MockSerial::new();
    serial.add_ok_response(b"AT+CIPCLOSE\r\n");

    let mut adapter = initialized_adapter(serial);
    adapter.config = Config::default().command_timeout_ms(2_500);
    adapter.socket_disconnect().unwrap();

    assert_eq!(vec![MockTimer::duration_ms(2_500)], adapter.timer.durations);
}

#[test]
fn test_set_echo() {
    let mut serial = MockSerial::new();
    serial.add_ok_response(b"ATE1\r\n");
    serial.add_ok_response(b"ATE0\r\n");

    let mut adapter = initialized_adapter(serial);
    adapter.set_echo(true).unwrap();
    adapter.set_echo(false).unwrap();

    adapter.serial.assert_all_cmds_sent();
}

#[test]
fn test_release() {
    let mut serial = MockSerial::new();
    serial.add_ok_response(b"AT\r\n");

    let mut adapter = initialized_adapter(serial);
    adapter.send_command("AT", 1_000, 1).unwrap();

    let (serial, _timer, flow_control, reset_pin) = adapter.release();
    assert_eq!(1, serial.get_commands_as_strings().len());
    assert!(flow_control.is_some());
    assert!(reset_pin.is_none());
}
