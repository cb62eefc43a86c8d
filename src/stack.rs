//! # Socket data plane
//!
//! The firmware runs in single connection mode, so just one TCP, TLS or UDP socket may be open
//! at a time. Incoming data is framed by `+IPD,<len>:` markers, s. [FrameParser](crate::frame::FrameParser).
//!
//! Besides the direct `socket_*` methods, [TcpClientStack] and [Dns] of [embedded_nal] are implemented.
//!
//! ## Example
//!
//! ````
//! # use esp_at_control::example::{ExampleSerial, ExampleTimer};
//! use esp_at_control::adapter::Adapter;
//! use esp_at_control::config::Config;
//! use esp_at_control::stack::ConnectionType;
//!
//! let mut adapter: Adapter<_, _, 1_000_000> = Adapter::new(ExampleSerial::default(), ExampleTimer::default(), Config::default());
//!
//! // Creating a TCP connection
//! assert!(adapter.socket_connect(Some(ConnectionType::Tcp), "10.0.0.1", 21).unwrap());
//!
//! // Sending some data
//! adapter.socket_send(b"hallo!").unwrap();
//!
//! // Receiving some data
//! let data = adapter.socket_receive(1_000).unwrap();
//! assert_eq!(b"nice to see you!", data.as_slice());
//!
//! // Closing socket
//! adapter.socket_disconnect().unwrap();
//! ````
use crate::adapter::{Adapter, SerialPort};
use crate::commands::Command;
use crate::error::ProtocolError;
use crate::responses::{CommandOutcome, ERROR_TERMINATOR, SEND_OK_TERMINATOR};
use crate::status::CanonicalStatus;
use alloc::string::ToString;
use alloc::vec::Vec;
use embedded_hal::digital::OutputPin;
use core::net::{IpAddr, SocketAddr};
use embedded_io::Error as IoError;
use embedded_nal::{AddrType, Dns, TcpClientStack};
use fugit_timer::Timer;
use log::{debug, warn};

/// Max. payload length of a single `AT+CIPSEND`
pub const MAX_SEND_CHUNK: usize = 2048;

/// Prompt signaling readiness for the announced payload
const SEND_PROMPT: u8 = b'>';

/// Confirmation line of an established connection
const CONNECT_LINE: &[u8] = b"CONNECT";

/// Transport of a socket connection
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectionType {
    Tcp,
    Udp,
    /// SSL/TLS over TCP
    Tls,
}

impl ConnectionType {
    /// Firmware name of the connection type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
            Self::Tls => "SSL",
        }
    }

    /// Derives the connection type from well-known ports (80, 443, 1883)
    pub fn from_port(port: u16) -> Option<Self> {
        match port {
            80 => Some(Self::Tcp),
            443 => Some(Self::Tls),
            1883 => Some(Self::Tcp),
            _ => None,
        }
    }
}

/// Handle of the single socket returned by [TcpClientStack::socket]
#[derive(Debug)]
pub struct Socket {
    _private: (),
}

impl<S: SerialPort, T: Timer<TIMER_HZ>, const TIMER_HZ: u32, F: OutputPin, R: OutputPin> Adapter<S, T, TIMER_HZ, F, R> {
    /// Opens a socket connection to the given host (IP or hostname).
    ///
    /// If no connection type is given, the type set by [Adapter::set_connection_type] is used, or
    /// the type gets derived from well-known ports. An open socket gets disconnected first, UDP
    /// sockets are always reset.
    ///
    /// Returns false if the firmware did not confirm the connection.
    pub fn socket_connect(
        &mut self,
        connection_type: Option<ConnectionType>,
        host: &str,
        port: u16,
    ) -> Result<bool, ProtocolError> {
        let connection_type = connection_type
            .or(self.connection_type)
            .or_else(|| ConnectionType::from_port(port))
            .ok_or(ProtocolError::MissingConnectionType)?;

        self.ensure_initialized()?;

        // UDP bindings are stateless on firmware side and need to be reset
        if connection_type == ConnectionType::Udp {
            self.socket_disconnect()?;
        }

        self.await_connectable()?;

        let command = Command::connect(
            connection_type,
            host,
            port,
            self.config.keepalive,
            self.config.udp_local_port,
            self.config.connect_timeout_ms,
        )?;
        let response = self.execute(command)?;

        if !response.lines().any(|line| line == CONNECT_LINE) {
            warn!("Connection to {}:{} not confirmed", host, port);
            return Ok(false);
        }

        // UDP has no open/closed state
        if connection_type != ConnectionType::Udp && self.canonical_status()? != CanonicalStatus::SocketOpen {
            return Ok(false);
        }

        debug!("{} connection to {}:{} established", connection_type.as_str(), host, port);
        self.connection_type = Some(connection_type);
        self.frames.reset();
        self.pending.clear();
        Ok(true)
    }

    /// Polls the status until a new socket may be opened. Open sockets get disconnected.
    fn await_connectable(&mut self) -> Result<(), ProtocolError> {
        for _ in 0..self.config.status_poll_attempts {
            match self.canonical_status()? {
                CanonicalStatus::ApConnected | CanonicalStatus::SocketClosed => return Ok(()),
                CanonicalStatus::SocketOpen => self.socket_disconnect()?,
                _ => self.delay_ms(self.config.status_poll_delay_ms)?,
            }
        }

        Err(ProtocolError::NotConnected)
    }

    /// Sends the given data. Payloads larger than [MAX_SEND_CHUNK] get split into multiple transmissions.
    pub fn socket_send(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        for chunk in data.chunks(MAX_SEND_CHUNK) {
            self.send_chunk(chunk)?;
        }

        Ok(())
    }

    /// Announces, transmits and (for TCP/TLS) confirms a single chunk
    fn send_chunk(&mut self, chunk: &[u8]) -> Result<(), ProtocolError> {
        self.execute(Command::prepare_transmission(chunk.len())?)?;

        let result = self.await_send_prompt();
        self.set_flow(true)?;
        result?;

        self.write_raw(chunk)?;

        // No transmission confirmation for UDP
        if self.connection_type == Some(ConnectionType::Udp) {
            return Ok(());
        }

        match self.read_until(self.config.send_timeout_ms, SEND_OK_TERMINATOR, ERROR_TERMINATOR)? {
            CommandOutcome::Success(_) => Ok(()),
            CommandOutcome::Failure(_) => Err(ProtocolError::FirmwareError),
            CommandOutcome::Timeout(_) => Err(ProtocolError::NoAcknowledgement),
        }
    }

    /// Polls byte by byte for the `>` prompt. Flow is stopped while reading and allowed while idle.
    fn await_send_prompt(&mut self) -> Result<(), ProtocolError> {
        self.start_timer(self.config.send_prompt_timeout_ms)?;

        loop {
            if self.serial.read_ready().map_err(|e| ProtocolError::Serial(e.kind()))? {
                self.set_flow(false)?;

                if self.read_byte()? == Some(SEND_PROMPT) {
                    return Ok(());
                }
            } else {
                self.set_flow(true)?;
            }

            if self.timer_elapsed()? {
                return Err(ProtocolError::NoSendPrompt);
            }
        }
    }

    /// Receives socket data for up to `timeout_ms`.
    ///
    /// Frames are collected until a frame completed and no further data is pending, or until the
    /// timeout elapsed. Payloads of all completed frames get concatenated in arrival order. Frames
    /// which arrived while waiting for command responses (e.g. `SEND OK` or status queries) come
    /// first. The result may be empty.
    pub fn socket_receive(&mut self, timeout_ms: u32) -> Result<Vec<u8>, ProtocolError> {
        let result = self.receive_frames(timeout_ms);
        self.set_flow(true)?;

        match result {
            Ok(data) => {
                let mut received = core::mem::take(&mut self.pending);
                received.extend_from_slice(&data);
                Ok(received)
            }
            Err(error) => {
                self.frames.reset();
                Err(error)
            }
        }
    }

    fn receive_frames(&mut self, timeout_ms: u32) -> Result<Vec<u8>, ProtocolError> {
        let mut data = Vec::new();
        let mut completed = !self.pending.is_empty();
        let mut chunk = [0x0; 64];

        self.start_timer(timeout_ms)?;

        loop {
            if self.serial.read_ready().map_err(|e| ProtocolError::Serial(e.kind()))? {
                self.set_flow(false)?;

                // Never read past the current frame boundary
                let wanted = self.frames.wanted().min(chunk.len());
                let length = self
                    .serial
                    .read(&mut chunk[..wanted])
                    .map_err(|e| ProtocolError::Serial(e.kind()))?;

                for byte in &chunk[..length] {
                    if let Some(frame) = self.frames.feed(*byte)? {
                        data.extend_from_slice(&frame);
                        completed = true;
                    }
                }
            } else {
                self.set_flow(true)?;

                if completed && self.frames.is_idle() {
                    return Ok(data);
                }
            }

            if self.timer_elapsed()? {
                if !self.frames.is_idle() {
                    warn!("Receive timeout with partial frame, dropping it");
                    self.frames.reset();
                }

                return Ok(data);
            }
        }
    }

    /// Closes the current socket. A failing close command (no open socket) is ignored.
    pub fn socket_disconnect(&mut self) -> Result<(), ProtocolError> {
        self.connection_type = None;
        self.pending.clear();

        match self.execute(Command::close_socket()?) {
            Ok(_) => Ok(()),
            Err(error) if error.is_acknowledgement() => {
                debug!("No socket to close");
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    /// Type of the current connection, or the type preset for the next connect
    pub fn connection_type(&self) -> Option<ConnectionType> {
        self.connection_type
    }

    /// Presets the connection type used by `socket_connect()` if none is given
    pub fn set_connection_type(&mut self, connection_type: Option<ConnectionType>) {
        self.connection_type = connection_type;
    }
}

impl<S: SerialPort, T: Timer<TIMER_HZ>, const TIMER_HZ: u32, F: OutputPin, R: OutputPin> TcpClientStack
    for Adapter<S, T, TIMER_HZ, F, R>
{
    type TcpSocket = Socket;
    type Error = ProtocolError;

    /// Returns the single socket. Fails with [ProtocolError::Unsupported] while the socket is in use.
    fn socket(&mut self) -> Result<Self::TcpSocket, Self::Error> {
        if self.socket_taken {
            return Err(ProtocolError::Unsupported);
        }

        self.socket_taken = true;
        Ok(Socket { _private: () })
    }

    /// Opens a TCP connection to the given IPv4 or IPv6 address
    fn connect(&mut self, _socket: &mut Socket, remote: SocketAddr) -> nb::Result<(), Self::Error> {
        let host = remote.ip().to_string();

        if !self.socket_connect(Some(ConnectionType::Tcp), host.as_str(), remote.port())? {
            return Err(nb::Error::Other(ProtocolError::NotConnected));
        }

        Ok(())
    }

    /// Sends the full buffer and returns its length
    fn send(&mut self, _socket: &mut Socket, buffer: &[u8]) -> nb::Result<usize, Self::Error> {
        self.socket_send(buffer)?;
        Ok(buffer.len())
    }

    /// Returns buffered or newly received data. [nb::Error::WouldBlock] if nothing arrived within
    /// the configured poll window.
    fn receive(&mut self, _socket: &mut Socket, buffer: &mut [u8]) -> nb::Result<usize, Self::Error> {
        if self.pending.is_empty() {
            let data = self.socket_receive(self.config.receive_poll_ms)?;
            self.pending = data;
        }

        if self.pending.is_empty() {
            return Err(nb::Error::WouldBlock);
        }

        let length = buffer.len().min(self.pending.len());
        buffer[..length].copy_from_slice(&self.pending[..length]);
        self.pending.drain(..length);

        Ok(length)
    }

    fn close(&mut self, _socket: Socket) -> Result<(), Self::Error> {
        self.socket_taken = false;
        self.socket_disconnect()
    }
}

impl<S: SerialPort, T: Timer<TIMER_HZ>, const TIMER_HZ: u32, F: OutputPin, R: OutputPin> Dns
    for Adapter<S, T, TIMER_HZ, F, R>
{
    type Error = ProtocolError;

    fn get_host_by_name(&mut self, hostname: &str, addr_type: AddrType) -> nb::Result<IpAddr, Self::Error> {
        let address = self.nslookup(hostname)?;

        match (addr_type, address) {
            (AddrType::IPv4, IpAddr::V6(_)) | (AddrType::IPv6, IpAddr::V4(_)) => {
                Err(nb::Error::Other(ProtocolError::BadResponse))
            }
            _ => Ok(address),
        }
    }

    fn get_host_by_address(&mut self, _addr: IpAddr, _result: &mut [u8]) -> nb::Result<usize, Self::Error> {
        Err(nb::Error::Other(ProtocolError::Unsupported))
    }
}
