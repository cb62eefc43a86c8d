//! # Command/response engine
//!
//! The [Adapter] owns the serial port and drives exactly one command, socket operation or receive
//! pass at a time. Completion of commands is detected purely by the `OK`/`ERROR` terminators, so
//! every wait is bounded by the timer.
//!
//! ## Example
//!
//! ````
//! # use esp_at_control::example::{ExampleSerial, ExampleTimer};
//! use esp_at_control::adapter::Adapter;
//! use esp_at_control::config::Config;
//!
//! let mut adapter: Adapter<_, _, 1_000_000> = Adapter::new(ExampleSerial::default(), ExampleTimer::default(), Config::default());
//!
//! adapter.begin().unwrap();
//! assert!(adapter.is_initialized());
//! assert_eq!("AT version:2.2.0.0(s-b097cdf - ESP32C3 - Jul 2 2021 11:43:35)", adapter.version().unwrap());
//!
//! let response = adapter.send_command("AT", 1_000, 1).unwrap();
//! assert_eq!(b"\r\nOK\r\n", response.as_bytes());
//! ````
use crate::commands::Command;
use crate::config::Config;
use crate::error::ProtocolError;
use crate::frame::{FrameParser, FRAME_MARKER};
use crate::responses::{CommandOutcome, Response, CRLF, ERROR_TERMINATOR, OK_TERMINATOR};
use crate::stack::ConnectionType;
use crate::status::StatusDialect;
use alloc::string::String;
use alloc::vec::Vec;
use core::convert::Infallible;
use embedded_hal::digital::{ErrorType as PinErrorType, OutputPin};
use embedded_io::{Error as IoError, Read, ReadReady, Write};
use fugit::TimerDurationU32;
use fugit_timer::Timer;
use log::{debug, info, warn};

/// Number of attempts of the initialization sequence
const INIT_ATTEMPTS: usize = 3;

/// Max. time waiting for `ready` after a reset
const READY_TIMEOUT_MS: u32 = 5_000;

/// Settle time after switching the baud rate
const BAUD_RATE_SETTLE_MS: u32 = 250;

/// Duration the reset line is pulled low
const RESET_PULSE_MS: u32 = 100;

/// Marker of the firmware version line in the `AT+GMR` response
const VERSION_MARKER: &[u8] = b"AT version:";

/// Serial link to the ESP-AT module
///
/// Reads are only issued if [ReadReady::read_ready] signals pending data, so the port is polled
/// instead of blocking.
pub trait SerialPort: Read + Write + ReadReady {
    /// Reconfigures the host side baud rate
    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), Self::Error>;
}

/// Placeholder for an unused flow control or reset pin
#[derive(Copy, Clone, Debug, Default)]
pub struct NoPin;

impl PinErrorType for NoPin {
    type Error = Infallible;
}

impl OutputPin for NoPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Central client for the ESP-AT module
///
/// F: Optional RTS pin used for hardware flow control. Low => module may send.
///
/// R: Optional reset pin of the module. Low => reset.
pub struct Adapter<S: SerialPort, T: Timer<TIMER_HZ>, const TIMER_HZ: u32, F: OutputPin = NoPin, R: OutputPin = NoPin>
{
    /// Serial link to the module
    pub(crate) serial: S,

    /// Timer used for timeout measurement and delays
    pub(crate) timer: T,

    /// Static settings
    pub(crate) config: Config,

    /// Flow control (RTS) line
    pub(crate) flow_control: Option<F>,

    /// Reset line
    pub(crate) reset_pin: Option<R>,

    /// Currently configured baud rate
    pub(crate) baud_rate: u32,

    /// Logs all commands and responses if true
    pub(crate) debug: bool,

    /// True once the initialization sequence completed
    pub(crate) initialized: bool,

    /// Cached `AT version:` line
    pub(crate) version: Option<String>,

    /// All lines ever received by `AT+GMR`
    pub(crate) version_strings: Vec<String>,

    /// Status command set supported by the firmware
    pub(crate) dialect: StatusDialect,

    /// Type of the current socket connection
    pub(crate) connection_type: Option<ConnectionType>,

    /// Receive framing state incl. payload scratch buffer
    pub(crate) frames: FrameParser,

    /// Received socket data not yet consumed by TcpClientStack::receive()
    pub(crate) pending: Vec<u8>,

    /// True if the single socket was handed out by TcpClientStack::socket()
    pub(crate) socket_taken: bool,
}

impl<S: SerialPort, T: Timer<TIMER_HZ>, const TIMER_HZ: u32> Adapter<S, T, TIMER_HZ> {
    /// Creates a new adapter without flow control and reset line
    ///
    /// No communication happens here, so nothing can fail. Call [Adapter::begin] for syncing with the module.
    pub fn new(serial: S, timer: T, config: Config) -> Self {
        Self::with_pins(serial, timer, config, None, None)
    }
}

impl<S: SerialPort, T: Timer<TIMER_HZ>, const TIMER_HZ: u32, F: OutputPin, R: OutputPin> Adapter<S, T, TIMER_HZ, F, R> {
    /// Creates a new adapter with optional flow control (RTS) and reset line
    pub fn with_pins(mut serial: S, timer: T, config: Config, flow_control: Option<F>, reset_pin: Option<R>) -> Self {
        // Port may already run at the default rate, nothing to do on failure here
        let _ = serial.set_baud_rate(config.default_baud_rate);

        let mut reset_pin = reset_pin;
        if let Some(pin) = reset_pin.as_mut() {
            let _ = pin.set_high();
        }

        Self {
            serial,
            timer,
            baud_rate: config.default_baud_rate,
            debug: config.debug,
            dialect: StatusDialect::from_legacy_flag(config.legacy_status),
            config,
            flow_control,
            reset_pin,
            initialized: false,
            version: None,
            version_strings: Vec::new(),
            connection_type: None,
            frames: FrameParser::new(),
            pending: Vec::new(),
            socket_taken: false,
        }
    }

    /// Syncs with the module: disables echo, switches to the run baud rate, caches the firmware
    /// version and probes the supported status commands.
    ///
    /// The sequence is attempted up to three times. If all attempts fail because of missing
    /// acknowledgements, the adapter just stays uninitialized and the next dependent operation
    /// triggers the sequence again. Other errors (serial, timer, pins) are returned.
    pub fn begin(&mut self) -> Result<(), ProtocolError> {
        for attempt in 0..INIT_ATTEMPTS {
            match self.initialize() {
                Ok(()) => {
                    self.initialized = true;
                    info!("ESP-AT module initialized (status dialect: {:?})", self.dialect);
                    return Ok(());
                }
                Err(error) if error.is_acknowledgement() => {
                    warn!("Initialization attempt {} failed: {}", attempt + 1, error);
                }
                Err(error) => return Err(error),
            }
        }

        Ok(())
    }

    /// Runs [Adapter::begin] if not initialized yet
    pub(crate) fn ensure_initialized(&mut self) -> Result<(), ProtocolError> {
        if self.initialized {
            return Ok(());
        }

        self.begin()
    }

    fn initialize(&mut self) -> Result<(), ProtocolError> {
        self.set_echo(false)?;
        self.set_baud_rate(self.config.run_baud_rate)?;
        self.get_version()?;

        match self.execute(Command::wifi_state_probe()?) {
            Ok(_) => {}
            Err(error) if error.is_acknowledgement() => {
                // ESP8285 and older firmware have no CWSTATE, just CIPSTATUS
                self.dialect = StatusDialect::Legacy;
                if self.debug {
                    debug!("No CWSTATE support, using CIPSTATUS");
                }
            }
            Err(error) => return Err(error),
        }

        Ok(())
    }

    /// Returns true if the initialization sequence completed
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Enables/disables the echo of commands
    pub fn set_echo(&mut self, enabled: bool) -> Result<(), ProtocolError> {
        self.execute(Command::echo(enabled)?)?;
        Ok(())
    }

    /// Switches module and serial port to the given baud rate. Nothing happens if the rate is already active.
    pub fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), ProtocolError> {
        if self.baud_rate == baud_rate {
            return Ok(());
        }

        let flow_control = self.flow_control.is_some();
        self.execute(Command::uart_config(baud_rate, flow_control)?)?;

        self.serial
            .set_baud_rate(baud_rate)
            .map_err(|e| ProtocolError::Serial(e.kind()))?;
        self.baud_rate = baud_rate;

        self.delay_ms(BAUD_RATE_SETTLE_MS)?;
        self.drain_input(BAUD_RATE_SETTLE_MS)?;
        self.execute(Command::attention()?)?;
        Ok(())
    }

    /// Currently configured baud rate
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Requests the firmware version information and caches the `AT version:` line
    pub fn get_version(&mut self) -> Result<Option<&str>, ProtocolError> {
        let response = self.execute(Command::version()?)?;
        self.version = None;

        let lines = response
            .lines()
            .filter(|line| !line.is_empty() && *line != b"OK".as_slice());

        for line in lines {
            let line = String::from_utf8_lossy(line).into_owned();

            if crate::responses::contains(line.as_bytes(), VERSION_MARKER) {
                self.version = Some(line.clone());
            }

            self.version_strings.push(line);
        }

        Ok(self.version.as_deref())
    }

    /// Cached firmware version line, e.g. `AT version:2.2.0.0(...)`
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// All lines received as version information so far
    pub fn version_strings(&self) -> &[String] {
        &self.version_strings
    }

    /// Restarts the module by command and waits for the `ready` message
    pub fn soft_reset(&mut self) -> Result<(), ProtocolError> {
        self.initialized = false;
        self.connection_type = None;
        self.write_command("AT+RST")?;
        self.wait_ready()
    }

    /// Pulses the reset line and waits for the `ready` message. Requires a reset pin.
    pub fn hard_reset(&mut self) -> Result<(), ProtocolError> {
        let pin = match self.reset_pin.as_mut() {
            None => return Err(ProtocolError::Unsupported),
            Some(pin) => pin,
        };

        self.initialized = false;
        self.connection_type = None;

        pin.set_low().map_err(|_| ProtocolError::PinError)?;
        self.delay_ms(RESET_PULSE_MS)?;
        if let Some(pin) = self.reset_pin.as_mut() {
            pin.set_high().map_err(|_| ProtocolError::PinError)?;
        }

        // Module starts at the default rate again
        if self.baud_rate != self.config.default_baud_rate {
            self.serial
                .set_baud_rate(self.config.default_baud_rate)
                .map_err(|e| ProtocolError::Serial(e.kind()))?;
            self.baud_rate = self.config.default_baud_rate;
        }

        self.wait_ready()
    }

    /// Waits until the `ready` line is received
    fn wait_ready(&mut self) -> Result<(), ProtocolError> {
        match self.read_until(READY_TIMEOUT_MS, b"ready\r\n", ERROR_TERMINATOR)? {
            CommandOutcome::Success(_) => {
                self.frames.reset();
                Ok(())
            }
            CommandOutcome::Failure(_) => Err(ProtocolError::FirmwareError),
            CommandOutcome::Timeout(_) => Err(ProtocolError::ReadyTimeout),
        }
    }

    /// Sends the given command and reads until `OK` or `ERROR`. The command is attempted up to
    /// `retries` times.
    ///
    /// Returns [ProtocolError::FirmwareError] if the last attempt got `ERROR` and
    /// [ProtocolError::NoAcknowledgement] if it timed out.
    pub fn send_command(&mut self, command: &str, timeout_ms: u32, retries: usize) -> Result<Response, ProtocolError> {
        let mut error = ProtocolError::NoAcknowledgement;

        for attempt in 0..retries.max(1) {
            if attempt > 0 {
                warn!("Retrying {} (attempt {})", command, attempt + 1);
            }

            self.write_command(command)?;

            match self.read_until(timeout_ms, OK_TERMINATOR, ERROR_TERMINATOR)? {
                CommandOutcome::Success(data) => return Ok(Response::new(data)),
                CommandOutcome::Failure(_) => error = ProtocolError::FirmwareError,
                CommandOutcome::Timeout(_) => error = ProtocolError::NoAcknowledgement,
            }
        }

        Err(error)
    }

    /// Sends a command using its own or the default timeout and attempt count
    pub(crate) fn execute(&mut self, command: Command) -> Result<Response, ProtocolError> {
        let timeout = command.timeout_ms.unwrap_or(self.config.command_timeout_ms);
        let attempts = command.attempts.unwrap_or(self.config.command_retries);
        self.send_command(command.text.as_str(), timeout, attempts)
    }

    /// Writes the command followed by the line terminator
    pub(crate) fn write_command(&mut self, command: &str) -> Result<(), ProtocolError> {
        if self.debug {
            debug!("---> {}", command);
        }

        self.write_raw(command.as_bytes())?;
        self.write_raw(CRLF)
    }

    /// Writes the given bytes without any interpretation
    pub(crate) fn write_raw(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        self.serial.write_all(data).map_err(|e| ProtocolError::Serial(e.kind()))?;
        self.serial.flush().map_err(|e| ProtocolError::Serial(e.kind()))
    }

    /// Reads byte by byte until the accumulated data ends with one of the terminators or the timeout elapses.
    ///
    /// Reading single bytes guarantees that nothing behind the terminator (e.g. a send prompt or
    /// socket data) gets consumed. Socket frames arriving in between are moved to the receive buffer.
    /// The deadline is checked after every byte, so a module streaming endlessly cannot stall the call.
    pub(crate) fn read_until(
        &mut self,
        timeout_ms: u32,
        success: &[u8],
        failure: &[u8],
    ) -> Result<CommandOutcome, ProtocolError> {
        let mut response = Vec::new();
        self.start_timer(timeout_ms)?;

        loop {
            if let Some(byte) = self.read_byte()? {
                if !self.capture_frame_byte(&mut response, byte) {
                    response.push(byte);

                    if response.ends_with(success) {
                        self.log_response(&response);
                        return Ok(CommandOutcome::Success(response));
                    }

                    if response.ends_with(failure) {
                        self.log_response(&response);
                        return Ok(CommandOutcome::Failure(response));
                    }
                }
            }

            if self.timer_elapsed()? {
                self.log_response(&response);
                return Ok(CommandOutcome::Timeout(response));
            }
        }
    }

    /// Passes a response byte to the frame parser. Returns true if the byte belongs to a socket
    /// frame, whose payload is then appended to the receive buffer instead of the response.
    fn capture_frame_byte(&mut self, response: &mut Vec<u8>, byte: u8) -> bool {
        let draining = self.frames.is_draining();

        let frame = match self.frames.feed(byte) {
            Ok(frame) => frame,
            Err(error) => {
                warn!("Dropping malformed frame header within response: {}", error);
                return false;
            }
        };

        // Header just completed, strip it from the response
        if !draining && (frame.is_some() || self.frames.is_draining()) {
            if let Some(start) = response.windows(FRAME_MARKER.len()).rposition(|window| window == FRAME_MARKER) {
                response.truncate(start);
            }
        }

        if let Some(frame) = frame {
            self.pending.extend_from_slice(&frame);
            return true;
        }

        draining || self.frames.is_draining()
    }

    /// Reads a single byte if available
    pub(crate) fn read_byte(&mut self) -> Result<Option<u8>, ProtocolError> {
        if !self.serial.read_ready().map_err(|e| ProtocolError::Serial(e.kind()))? {
            return Ok(None);
        }

        let mut buffer = [0x0; 1];
        let length = self.serial.read(&mut buffer).map_err(|e| ProtocolError::Serial(e.kind()))?;

        if length == 0 {
            return Ok(None);
        }

        Ok(Some(buffer[0]))
    }

    /// Discards pending input for at most `timeout_ms`
    fn drain_input(&mut self, timeout_ms: u32) -> Result<(), ProtocolError> {
        let mut buffer = [0x0; 32];
        self.start_timer(timeout_ms)?;

        while self.serial.read_ready().map_err(|e| ProtocolError::Serial(e.kind()))? {
            let length = self.serial.read(&mut buffer).map_err(|e| ProtocolError::Serial(e.kind()))?;

            if length == 0 || self.timer_elapsed()? {
                break;
            }
        }

        self.frames.reset();
        Ok(())
    }

    fn log_response(&self, response: &[u8]) {
        if self.debug {
            debug!("<--- {:?}", String::from_utf8_lossy(response));
        }
    }

    /// Sets the flow control line. `allow` => module may send data.
    pub(crate) fn set_flow(&mut self, allow: bool) -> Result<(), ProtocolError> {
        let pin = match self.flow_control.as_mut() {
            None => return Ok(()),
            Some(pin) => pin,
        };

        if allow {
            pin.set_low().map_err(|_| ProtocolError::PinError)
        } else {
            pin.set_high().map_err(|_| ProtocolError::PinError)
        }
    }

    pub(crate) fn start_timer(&mut self, timeout_ms: u32) -> Result<(), ProtocolError> {
        self.timer
            .start(TimerDurationU32::millis(timeout_ms))
            .map_err(|_| ProtocolError::TimerError)
    }

    /// Returns true if the running timer has elapsed
    pub(crate) fn timer_elapsed(&mut self) -> Result<bool, ProtocolError> {
        match self.timer.wait() {
            Ok(_) => Ok(true),
            Err(nb::Error::WouldBlock) => Ok(false),
            Err(nb::Error::Other(_)) => Err(ProtocolError::TimerError),
        }
    }

    /// Blocks for the given duration
    pub(crate) fn delay_ms(&mut self, duration_ms: u32) -> Result<(), ProtocolError> {
        self.start_timer(duration_ms)?;
        nb::block!(self.timer.wait()).map_err(|_| ProtocolError::TimerError)
    }

    /// Enables/disables logging of all commands and responses
    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    /// Static settings of this adapter
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Releases serial port, timer and pins
    pub fn release(self) -> (S, T, Option<F>, Option<R>) {
        (self.serial, self.timer, self.flow_control, self.reset_pin)
    }
}
