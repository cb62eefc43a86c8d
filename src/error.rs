use core::fmt::{Display, Formatter};
use embedded_io::ErrorKind;
use embedded_nal::{TcpError, TcpErrorKind};

/// Errors of the command/response engine and the socket data plane
#[derive(Clone, Debug, PartialEq)]
pub enum ProtocolError {
    /// All attempts of a command timed out without `OK` or `ERROR` terminator
    NoAcknowledgement,

    /// Firmware responded with the `ERROR` terminator
    FirmwareError,

    /// Join response did not contain `WIFI CONNECTED`
    NotConnected,

    /// Join response contained `WIFI CONNECTED` but no `WIFI GOT IP`
    NoIPAddress,

    /// Firmware did not emit the `>` prompt after `CIPSEND`
    NoSendPrompt,

    /// Malformed `+IPD,<len>:` header or frame exceeding the scratch buffer
    FrameParseError,

    /// WIFI mode outside of station, soft-AP and station+soft-AP
    InvalidMode,

    /// Response is missing an expected marker or line
    BadResponse,

    /// Given SSID is longer then the max. size of 32 chars
    InvalidSsidLength,

    /// Given password is longer then the max. size of 63 chars
    InvalidPasswordLength,

    /// Encoded command does not fit into the command buffer
    CommandOverflow,

    /// No connection type given and the port has no well-known default
    MissingConnectionType,

    /// Module did not signal `ready` after a reset
    ReadyTimeout,

    /// Operation is not supported by the AT firmware
    Unsupported,

    /// Upstream serial error
    Serial(ErrorKind),

    /// Upstream timer error
    TimerError,

    /// Upstream pin error (flow control or reset line)
    PinError,
}

impl ProtocolError {
    /// Returns true for failures of a single AT command round trip (`ERROR` or timeout)
    pub fn is_acknowledgement(&self) -> bool {
        matches!(self, Self::NoAcknowledgement | Self::FirmwareError)
    }
}

impl Display for ProtocolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NoAcknowledgement => write!(f, "no acknowledgement to AT command"),
            Self::FirmwareError => write!(f, "AT command answered with ERROR"),
            Self::NotConnected => write!(f, "could not connect to WIFI"),
            Self::NoIPAddress => write!(f, "did not get an IP address"),
            Self::NoSendPrompt => write!(f, "no data prompt for sending"),
            Self::FrameParseError => write!(f, "parsing error during receive"),
            Self::InvalidMode => write!(f, "invalid WIFI mode"),
            Self::BadResponse => write!(f, "unexpected response"),
            Self::InvalidSsidLength => write!(f, "SSID longer than 32 chars"),
            Self::InvalidPasswordLength => write!(f, "password longer than 63 chars"),
            Self::CommandOverflow => write!(f, "command exceeds buffer size"),
            Self::MissingConnectionType => write!(f, "connection type must be TCP, UDP or SSL"),
            Self::ReadyTimeout => write!(f, "module not ready after reset"),
            Self::Unsupported => write!(f, "operation not supported"),
            Self::Serial(kind) => write!(f, "serial error: {:?}", kind),
            Self::TimerError => write!(f, "timer error"),
            Self::PinError => write!(f, "pin error"),
        }
    }
}

impl TcpError for ProtocolError {
    fn kind(&self) -> TcpErrorKind {
        match self {
            Self::NotConnected => TcpErrorKind::PipeClosed,
            _ => TcpErrorKind::Other,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ProtocolError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            ProtocolError::NoAcknowledgement => defmt::write!(f, "ProtocolError::NoAcknowledgement"),
            ProtocolError::FirmwareError => defmt::write!(f, "ProtocolError::FirmwareError"),
            ProtocolError::NotConnected => defmt::write!(f, "ProtocolError::NotConnected"),
            ProtocolError::NoIPAddress => defmt::write!(f, "ProtocolError::NoIPAddress"),
            ProtocolError::NoSendPrompt => defmt::write!(f, "ProtocolError::NoSendPrompt"),
            ProtocolError::FrameParseError => defmt::write!(f, "ProtocolError::FrameParseError"),
            ProtocolError::InvalidMode => defmt::write!(f, "ProtocolError::InvalidMode"),
            ProtocolError::BadResponse => defmt::write!(f, "ProtocolError::BadResponse"),
            ProtocolError::InvalidSsidLength => defmt::write!(f, "ProtocolError::InvalidSsidLength"),
            ProtocolError::InvalidPasswordLength => defmt::write!(f, "ProtocolError::InvalidPasswordLength"),
            ProtocolError::CommandOverflow => defmt::write!(f, "ProtocolError::CommandOverflow"),
            ProtocolError::MissingConnectionType => defmt::write!(f, "ProtocolError::MissingConnectionType"),
            ProtocolError::ReadyTimeout => defmt::write!(f, "ProtocolError::ReadyTimeout"),
            ProtocolError::Unsupported => defmt::write!(f, "ProtocolError::Unsupported"),
            ProtocolError::Serial(kind) => {
                defmt::write!(f, "ProtocolError::Serial({})", defmt::Debug2Format(kind))
            }
            ProtocolError::TimerError => defmt::write!(f, "ProtocolError::TimerError"),
            ProtocolError::PinError => defmt::write!(f, "ProtocolError::PinError"),
        }
    }
}
