//! # Connection status
//!
//! Older firmware reports the overall state by a single `AT+CIPSTATUS` code. Newer firmware splits
//! it into WIFI state (`AT+CWSTATE?`) and socket state (`AT+CIPSTATE?`). Both get mapped to one
//! [CanonicalStatus], which uses the `CIPSTATUS` numbering.
//!
//! ````
//! use esp_at_control::status::{reconcile, CanonicalStatus, SocketState, WifiState};
//!
//! let status = reconcile(Some(WifiState::Connected), SocketState::Open);
//! assert_eq!(CanonicalStatus::SocketOpen, status);
//!
//! let status = reconcile(Some(WifiState::Disconnected), SocketState::Open);
//! assert_eq!(CanonicalStatus::NotConnected, status);
//! ````
use crate::adapter::{Adapter, SerialPort};
use crate::commands::Command;
use crate::error::ProtocolError;
use crate::responses::parse_number;
use embedded_hal::digital::OutputPin;
use fugit_timer::Timer;
use log::debug;

/// Status command set supported by the firmware
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StatusDialect {
    /// Separate `AT+CWSTATE?` and `AT+CIPSTATE?` queries
    Modern,

    /// Single `AT+CIPSTATUS` query
    Legacy,
}

impl StatusDialect {
    pub(crate) fn from_legacy_flag(legacy: bool) -> Self {
        if legacy {
            Self::Legacy
        } else {
            Self::Modern
        }
    }
}

/// Unified connectivity state, independent of the firmware dialect
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CanonicalStatus {
    /// Station started but not (yet) connected with an IP. Code 1.
    InProgress,

    /// Connected to an access point and got an IP. Code 2.
    ApConnected,

    /// A socket is open. Code 3.
    SocketOpen,

    /// Socket was closed. Code 4.
    SocketClosed,

    /// Not connected to any access point. Code 5.
    NotConnected,

    /// State can not be characterized currently
    Unknown,
}

impl CanonicalStatus {
    /// Maps a `CIPSTATUS` code
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => Self::InProgress,
            2 => Self::ApConnected,
            3 => Self::SocketOpen,
            4 => Self::SocketClosed,
            5 => Self::NotConnected,
            _ => Self::Unknown,
        }
    }

    /// Returns the `CIPSTATUS` compatible code. None for unknown state.
    pub fn code(&self) -> Option<u8> {
        match self {
            Self::InProgress => Some(1),
            Self::ApConnected => Some(2),
            Self::SocketOpen => Some(3),
            Self::SocketClosed => Some(4),
            Self::NotConnected => Some(5),
            Self::Unknown => None,
        }
    }

    /// True if joined to an access point, regardless of socket state
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::ApConnected | Self::SocketOpen | Self::SocketClosed)
    }
}

/// WIFI state as reported by `AT+CWSTATE?`
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WifiState {
    /// 0: Station has not started any connection
    NotStarted,

    /// 1: Connected to an access point, but no IPv4 address yet
    ConnectedNoIp,

    /// 2: Connected to an access point and got an IPv4 address
    Connected,

    /// 3: Connecting or reconnecting
    Connecting,

    /// 4: Disconnected
    Disconnected,

    /// Any other code
    Other(u32),
}

impl From<u32> for WifiState {
    fn from(code: u32) -> Self {
        match code {
            0 => Self::NotStarted,
            1 => Self::ConnectedNoIp,
            2 => Self::Connected,
            3 => Self::Connecting,
            4 => Self::Disconnected,
            other => Self::Other(other),
        }
    }
}

/// Socket state as reported by `AT+CIPSTATE?`
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SocketState {
    Open,
    Closed,
}

/// Merges WIFI and socket state into one canonical state
///
/// Rules are evaluated in order, first match wins. Codes 1 and 4 count as not connected, while
/// code 0 (and 1, which never gets there) are reported as still in progress.
pub fn reconcile(wifi: Option<WifiState>, socket: SocketState) -> CanonicalStatus {
    if matches!(wifi, Some(WifiState::ConnectedNoIp | WifiState::Disconnected)) {
        return CanonicalStatus::NotConnected;
    }

    if socket == SocketState::Open {
        return CanonicalStatus::SocketOpen;
    }

    if wifi == Some(WifiState::Connected) {
        return CanonicalStatus::ApConnected;
    }

    if matches!(wifi, Some(WifiState::NotStarted | WifiState::ConnectedNoIp)) {
        return CanonicalStatus::InProgress;
    }

    if wifi == Some(WifiState::Connecting) {
        return CanonicalStatus::NotConnected;
    }

    if socket == SocketState::Closed {
        return CanonicalStatus::SocketClosed;
    }

    CanonicalStatus::Unknown
}

impl<S: SerialPort, T: Timer<TIMER_HZ>, const TIMER_HZ: u32, F: OutputPin, R: OutputPin> Adapter<S, T, TIMER_HZ, F, R> {
    /// Queries the current connection state using the status commands supported by the firmware
    pub fn canonical_status(&mut self) -> Result<CanonicalStatus, ProtocolError> {
        self.ensure_initialized()?;

        if self.dialect == StatusDialect::Legacy {
            return self.legacy_status();
        }

        let wifi = self.status_wifi()?;
        let socket = self.status_socket()?;
        let status = reconcile(wifi, socket);

        if self.debug {
            debug!("STATUS: CWSTATE: {:?}, CIPSTATE: {:?} => {:?}", wifi, socket, status);
        }

        Ok(status)
    }

    /// Queries the `AT+CIPSTATUS` code. Missing status line results in [CanonicalStatus::Unknown].
    pub fn legacy_status(&mut self) -> Result<CanonicalStatus, ProtocolError> {
        let response = self.execute(Command::legacy_status()?)?;

        let status = response
            .find_prefixed(b"STATUS:")
            .and_then(|code| parse_number(code.get(..1)?))
            .map(CanonicalStatus::from_code)
            .unwrap_or(CanonicalStatus::Unknown);

        if self.debug {
            debug!("CIPSTATUS state is {:?}", status);
        }

        Ok(status)
    }

    /// Queries the WIFI state code, e.g. `+CWSTATE:2,"ssid"`. None if the response has no state line.
    pub fn status_wifi(&mut self) -> Result<Option<WifiState>, ProtocolError> {
        let response = self.execute(Command::wifi_state()?)?;

        Ok(response
            .find_prefixed(b"+CWSTATE:")
            .and_then(|state| parse_number(state.split(|byte| *byte == b',').next()?))
            .map(WifiState::from))
    }

    /// Queries the socket state. Any `+CIPSTATE:` line signals an open socket.
    pub fn status_socket(&mut self) -> Result<SocketState, ProtocolError> {
        let response = self.execute(Command::socket_state()?)?;

        if response.find_prefixed(b"+CIPSTATE:").is_some() {
            return Ok(SocketState::Open);
        }

        Ok(SocketState::Closed)
    }

    /// Status command set currently in use
    pub fn status_dialect(&self) -> StatusDialect {
        self.dialect
    }

    /// Initializes the module if required and returns true if joined to an access point.
    /// Any failure is reported as not connected.
    pub fn is_connected(&mut self) -> bool {
        let result = self.ensure_initialized().and_then(|_| {
            self.set_echo(false)?;
            self.canonical_status()
        });

        let connected = matches!(result, Ok(status) if status.is_connected());
        if self.debug {
            debug!("is_connected(): {}", connected);
        }

        connected
    }
}
