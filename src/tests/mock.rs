use crate::adapter::{Adapter, SerialPort};
use crate::config::Config;
use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::convert::Infallible;
use embedded_hal::digital::{ErrorType as PinErrorType, OutputPin};
use embedded_io::{ErrorKind, ErrorType, Read, ReadReady, Write};
use fugit::{TimerDurationU32, TimerInstantU32};
use fugit_timer::Timer as FugitTimer;
use mockall::mock;

pub type AdapterType = Adapter<MockSerial, PollTimer, 1_000_000, MockPin, MockPin>;

/// Timer polls until a PollTimer elapses. Every read byte costs one poll.
pub const POLL_BUDGET: usize = 4_096;

/// Creates an adapter, which is already initialized for the modern status commands
pub fn initialized_adapter(serial: MockSerial) -> AdapterType {
    let mut adapter = Adapter::with_pins(serial, PollTimer::new(POLL_BUDGET), Config::default(), Some(MockPin::new()), None);
    adapter.initialized = true;
    adapter
}

/// Expected command and the response the mocked module sends back
pub struct MockedExchange {
    /// Command (incl. terminator) or raw payload which triggers the response
    pub command: &'static [u8],

    /// Bytes sent by the module once the command was received
    pub response: Vec<u8>,
}

/// Scripted serial port. Responses are just emitted after the expected command was written.
pub struct MockSerial {
    /// Bytes written since the last trigger or line end
    current: Vec<u8>,

    /// Written commands and payloads
    sent: Vec<Vec<u8>>,

    /// Scripted exchanges in expected order
    exchanges: VecDeque<MockedExchange>,

    /// Bytes ready to be read by the adapter
    rx: VecDeque<u8>,

    /// Baud rate changes of the host side
    pub baud_rates: Vec<u32>,

    /// Simulates a failing read_ready() call
    pub read_error: bool,
}

impl MockSerial {
    pub fn new() -> Self {
        Self {
            current: vec![],
            sent: vec![],
            exchanges: VecDeque::new(),
            rx: VecDeque::new(),
            baud_rates: vec![],
            read_error: false,
        }
    }

    /// Adds a mocked command/response pair
    pub fn add_response(&mut self, command: &'static [u8], response: &[u8]) {
        self.exchanges.push_back(MockedExchange {
            command,
            response: response.to_vec(),
        });
    }

    /// Adds a response followed by an endless looking stream of noise bytes
    pub fn add_streaming_response(&mut self, command: &'static [u8], response: &[u8], noise: usize) {
        let mut data = response.to_vec();
        data.resize(response.len() + noise, b'x');

        self.exchanges.push_back(MockedExchange { command, response: data });
    }

    /// Simulates a plain OK response
    pub fn add_ok_response(&mut self, command: &'static [u8]) {
        self.add_response(command, b"\r\nOK\r\n");
    }

    /// Simulates a general error response
    pub fn add_error_response(&mut self, command: &'static [u8]) {
        self.add_response(command, b"\r\nERROR\r\n");
    }

    /// Simulates a command the module does not answer at all
    pub fn add_no_response(&mut self, command: &'static [u8]) {
        self.add_response(command, b"");
    }

    /// Adds bytes which are emitted without any preceding command, e.g. socket data
    pub fn add_incoming(&mut self, data: &[u8]) {
        self.rx.extend(data.iter().copied());
    }

    /// Returns a copy of the sent commands and payloads
    pub fn get_commands_as_strings(&self) -> Vec<String> {
        self.sent
            .iter()
            .map(|command| String::from_utf8(command.clone()).unwrap())
            .collect()
    }

    /// Asserts that all scripted commands have been sent
    pub fn assert_all_cmds_sent(&self) {
        assert!(
            self.exchanges.is_empty(),
            "Not all commands sent, next expected: {:?}",
            String::from_utf8_lossy(self.exchanges.front().unwrap().command)
        );
    }

    /// Number of bytes not read by the adapter
    pub fn unread(&self) -> usize {
        self.rx.len()
    }

    fn process(&mut self) {
        if let Some(exchange) = self.exchanges.front() {
            if self.current.ends_with(exchange.command) {
                assert_eq!(
                    String::from_utf8_lossy(exchange.command),
                    String::from_utf8_lossy(&self.current),
                    "Unexpected command"
                );

                let exchange = self.exchanges.pop_front().unwrap();
                self.rx.extend(exchange.response.iter().copied());
                self.sent.push(core::mem::take(&mut self.current));
                return;
            }
        }

        if self.current.ends_with(b"\r\n") {
            self.sent.push(core::mem::take(&mut self.current));
        }
    }
}

impl ErrorType for MockSerial {
    type Error = ErrorKind;
}

impl Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut length = 0;

        while length < buf.len() {
            match self.rx.pop_front() {
                None => break,
                Some(byte) => buf[length] = byte,
            }
            length += 1;
        }

        Ok(length)
    }
}

impl ReadReady for MockSerial {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        if self.read_error {
            return Err(ErrorKind::BrokenPipe);
        }

        Ok(!self.rx.is_empty())
    }
}

impl Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        for byte in buf {
            self.current.push(*byte);
            self.process();
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl SerialPort for MockSerial {
    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), Self::Error> {
        self.baud_rates.push(baud_rate);
        Ok(())
    }
}

/// Timer elapsing after the given number of polls
pub struct PollTimer {
    polls: usize,
    remaining: usize,

    /// Durations passed to start()
    pub durations: Vec<TimerDurationU32<1_000_000>>,
}

impl PollTimer {
    pub fn new(polls: usize) -> Self {
        Self {
            polls,
            remaining: polls,
            durations: vec![],
        }
    }
}

impl FugitTimer<1_000_000> for PollTimer {
    type Error = u32;

    fn now(&mut self) -> TimerInstantU32<1000000> {
        TimerInstantU32::from_ticks(0)
    }

    fn start(&mut self, duration: TimerDurationU32<1000000>) -> Result<(), u32> {
        self.durations.push(duration);
        self.remaining = self.polls;
        Ok(())
    }

    fn cancel(&mut self) -> Result<(), u32> {
        Ok(())
    }

    fn wait(&mut self) -> nb::Result<(), u32> {
        if self.remaining == 0 {
            return Ok(());
        }

        self.remaining -= 1;
        Err(nb::Error::WouldBlock)
    }
}

mock! {
    pub Timer{}

    impl FugitTimer<1_000_000> for Timer {
        type Error = u32;

        fn now(&mut self) -> TimerInstantU32<1000000>;
        fn start(&mut self, duration: TimerDurationU32<1000000>) -> Result<(), u32>;
        fn cancel(&mut self) -> Result<(), u32>;
        fn wait(&mut self) -> nb::Result<(), u32>;
    }
}

impl MockTimer {
    /// Short hand helper for returning a milliseconds duration
    pub fn duration_ms(duration: u32) -> TimerDurationU32<1_000_000> {
        TimerDurationU32::millis(duration)
    }
}

/// Pin recording all levels. true => high
pub struct MockPin {
    pub levels: Vec<bool>,
}

impl MockPin {
    pub fn new() -> Self {
        Self { levels: vec![] }
    }

    /// True if the last set level is low, which allows the module to send
    pub fn flow_allowed(&self) -> bool {
        self.levels.last() == Some(&false)
    }
}

impl PinErrorType for MockPin {
    type Error = Infallible;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.levels.push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.levels.push(true);
        Ok(())
    }
}
