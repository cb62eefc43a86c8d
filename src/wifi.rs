//! # WIFI access point client
//!
//! Joining a network, scanning and obtaining address information is supported.
//!
//! Note: If the connection was not successful or is lost, the ESP-AT will try independently from time
//! to time (by default every second) to establish connection to the network. The status can be
//! queried using `canonical_status()`.
//!
//! ## Example
//!
//! ````
//! # use esp_at_control::example::{ExampleSerial, ExampleTimer};
//! use esp_at_control::adapter::Adapter;
//! use esp_at_control::config::Config;
//! use esp_at_control::wifi::WifiAdapter;
//!
//! let mut adapter: Adapter<_, _, 1_000_000> = Adapter::new(ExampleSerial::default(), ExampleTimer::default(), Config::default());
//!
//! // Joining the target WIFI access point
//! adapter.join("test_wifi", "secret").unwrap();
//!
//! let address = adapter.get_address().unwrap();
//! assert_eq!("10:fe:ed:05:ba:50", address.mac.unwrap().as_str());
//! assert_eq!("10.0.0.181", address.ipv4.unwrap().to_string());
//! ````
use crate::adapter::{Adapter, SerialPort};
use crate::commands::Command;
use crate::error::ProtocolError;
use crate::responses::{parse_number, unquote, Response};
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Debug;
use core::fmt::Write as _;
use core::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use core::str::FromStr;
use embedded_hal::digital::OutputPin;
use fugit_timer::Timer;
use heapless::String as FixedString;
use log::{debug, info, warn};

/// Marker of a successful association
const CONNECTED_MARKER: &[u8] = b"WIFI CONNECTED";

/// Marker of a successful DHCP lease
const GOT_IP_MARKER: &[u8] = b"WIFI GOT IP";

/// Wifi network adapter trait
pub trait WifiAdapter {
    /// Error when joining a WIFI network or receiving address information
    type Error: Debug;

    /// Joins the WIFI access point using the configured timeout and attempts
    fn join(&mut self, ssid: &str, key: &str) -> Result<(), Self::Error>;

    /// Returns true if joined to an access point
    fn get_join_status(&mut self) -> bool;

    /// Returns local address information
    fn get_address(&mut self) -> Result<LocalAddress, Self::Error>;
}

/// WIFI operation mode
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum WifiMode {
    Station = 1,
    SoftAp = 2,
    SoftApStation = 3,
}

impl TryFrom<u32> for WifiMode {
    type Error = ProtocolError;

    fn try_from(mode: u32) -> Result<Self, Self::Error> {
        match mode {
            1 => Ok(Self::Station),
            2 => Ok(Self::SoftAp),
            3 => Ok(Self::SoftApStation),
            _ => Err(ProtocolError::InvalidMode),
        }
    }
}

/// Single field of an access point record
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Field {
    /// Numeric field, e.g. RSSI or channel
    Number(i32),

    /// De-quoted text field, e.g. SSID or MAC address
    Text(String),
}

impl Field {
    fn parse(raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw);

        match text.trim().parse::<i32>() {
            Ok(number) => Self::Number(number),
            Err(_) => Self::Text(String::from_utf8_lossy(unquote(raw)).into_owned()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text.as_str()),
            Self::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<i32> {
        match self {
            Self::Number(number) => Some(*number),
            Self::Text(_) => None,
        }
    }
}

/// Fields of a scan result (`+CWLAP:`) or association query (`+CWJAP:`) line in order
///
/// Numeric fields are converted to integers, all other fields are de-quoted strings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccessPoint {
    pub fields: Vec<Field>,
}

impl AccessPoint {
    /// Parses the comma separated fields. Commas inside quotes do not split fields.
    pub fn parse(data: &[u8]) -> Self {
        let mut fields = Vec::new();
        let mut start = 0;
        let mut quoted = false;
        let mut escaped = false;

        for (index, byte) in data.iter().enumerate() {
            match byte {
                _ if escaped => escaped = false,
                b'\\' if quoted => escaped = true,
                b'"' => quoted = !quoted,
                b',' if !quoted => {
                    fields.push(Field::parse(&data[start..index]));
                    start = index + 1;
                }
                _ => {}
            }
        }

        fields.push(Field::parse(&data[start..]));
        Self { fields }
    }

    /// Parses a `+CWLAP:(...)` scan result line. None for unrelated or malformed lines.
    pub fn from_scan_line(line: &[u8]) -> Option<Self> {
        let data = line.strip_prefix(b"+CWLAP:(")?.strip_suffix(b")")?;
        Some(Self::parse(data))
    }

    /// Parses a `+CWJAP:...` association query line. None for unrelated lines.
    pub fn from_join_line(line: &[u8]) -> Option<Self> {
        Some(Self::parse(line.strip_prefix(b"+CWJAP:")?))
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    /// SSID of an association query result (first field)
    pub fn joined_ssid(&self) -> Option<&str> {
        self.field(0)?.as_text()
    }

    /// SSID of a scan result (second field, after the encryption type)
    pub fn scanned_ssid(&self) -> Option<&str> {
        self.field(1)?.as_text()
    }

    /// Serializes the fields again: numbers plain, texts quoted
    pub fn to_line(&self) -> String {
        let mut line = String::new();

        for (index, field) in self.fields.iter().enumerate() {
            if index > 0 {
                line.push(',');
            }

            match field {
                Field::Number(number) => {
                    let _ = write!(line, "{}", number);
                }
                Field::Text(text) => {
                    line.push('"');
                    line.push_str(text);
                    line.push('"');
                }
            }
        }

        line
    }
}

/// WIFI credentials and optional time settings
#[derive(Clone, Debug, Default)]
pub struct Credentials<'a> {
    pub ssid: &'a str,
    pub password: &'a str,

    /// UTC offset in hours. Enables SNTP if set.
    pub timezone: Option<i32>,

    /// SNTP server, firmware default if None
    pub ntp_server: Option<&'a str>,
}

impl<S: SerialPort, T: Timer<TIMER_HZ>, const TIMER_HZ: u32, F: OutputPin, R: OutputPin> WifiAdapter
    for Adapter<S, T, TIMER_HZ, F, R>
{
    type Error = ProtocolError;

    fn join(&mut self, ssid: &str, key: &str) -> Result<(), ProtocolError> {
        let timeout = self.config.join_timeout_ms;
        let attempts = self.config.join_retries;
        self.join_access_point(ssid, key, timeout, attempts)
    }

    fn get_join_status(&mut self) -> bool {
        self.is_connected()
    }

    fn get_address(&mut self) -> Result<LocalAddress, ProtocolError> {
        let response = self.execute(Command::local_address()?)?;
        LocalAddress::from_response(&response)
    }
}

impl<S: SerialPort, T: Timer<TIMER_HZ>, const TIMER_HZ: u32, F: OutputPin, R: OutputPin> Adapter<S, T, TIMER_HZ, F, R> {
    /// Joins the given access point, unless already joined to it.
    ///
    /// Station mode is enforced first. Returns [ProtocolError::NotConnected] if the association was
    /// not confirmed (incl. a failing or unanswered join command) and [ProtocolError::NoIPAddress]
    /// if no IP was assigned.
    pub fn join_access_point(
        &mut self,
        ssid: &str,
        password: &str,
        timeout_ms: u32,
        retries: usize,
    ) -> Result<(), ProtocolError> {
        self.join_if_required(ssid, password, timeout_ms, retries)?;
        Ok(())
    }

    /// Returns false if already joined to the given access point
    fn join_if_required(
        &mut self,
        ssid: &str,
        password: &str,
        timeout_ms: u32,
        retries: usize,
    ) -> Result<bool, ProtocolError> {
        let command = Command::join_access_point(ssid, password, timeout_ms, retries)?;
        self.ensure_station_mode()?;

        if let Some(access_point) = self.remote_access_point()? {
            if access_point.joined_ssid() == Some(ssid) {
                debug!("Already joined to {}", ssid);
                return Ok(false);
            }
        }

        let response = match self.execute(command) {
            Ok(response) => response,
            Err(error) if error.is_acknowledgement() => {
                warn!("Joining {} failed: {}", ssid, error);
                return Err(ProtocolError::NotConnected);
            }
            Err(error) => return Err(error),
        };

        if !response.contains(CONNECTED_MARKER) {
            return Err(ProtocolError::NotConnected);
        }

        if !response.contains(GOT_IP_MARKER) {
            return Err(ProtocolError::NoIPAddress);
        }

        Ok(true)
    }

    /// Initializes the module and joins the network of the given credentials, if not already joined.
    /// SNTP gets configured after a new join if a timezone is given.
    pub fn join_network(&mut self, credentials: &Credentials) -> Result<(), ProtocolError> {
        self.ensure_initialized()?;

        let timeout = self.config.join_timeout_ms;
        let attempts = self.config.join_retries;
        if !self.join_if_required(credentials.ssid, credentials.password, timeout, attempts)? {
            info!("Already connected to {}", credentials.ssid);
            return Ok(());
        }

        info!("Connected to {}", credentials.ssid);

        if let Some(timezone) = credentials.timezone {
            self.sntp_config(true, Some(timezone), credentials.ntp_server)?;
        }

        Ok(())
    }

    /// Leaves the current access point
    pub fn leave(&mut self) -> Result<(), ProtocolError> {
        self.execute(Command::quit_access_point()?)?;
        Ok(())
    }

    /// Queries the currently joined access point (SSID, BSSID, channel, RSSI, ...). None if not joined.
    pub fn remote_access_point(&mut self) -> Result<Option<AccessPoint>, ProtocolError> {
        let response = self.execute(Command::access_point_query()?)?;
        let access_point = response.lines().find_map(AccessPoint::from_join_line);
        Ok(access_point)
    }

    /// Scans for access points. Station mode is enforced first.
    ///
    /// Unrelated or malformed lines are skipped. Failing scans are retried up to `retries` times.
    pub fn scan_access_points(&mut self, retries: usize) -> Result<Vec<AccessPoint>, ProtocolError> {
        let mut error = ProtocolError::NoAcknowledgement;

        for _ in 0..retries.max(1) {
            match self.scan_once() {
                Ok(access_points) => return Ok(access_points),
                Err(scan_error) if scan_error.is_acknowledgement() => {
                    warn!("Access point scan failed: {}", scan_error);
                    error = scan_error;
                }
                Err(scan_error) => return Err(scan_error),
            }
        }

        Err(error)
    }

    fn scan_once(&mut self) -> Result<Vec<AccessPoint>, ProtocolError> {
        self.ensure_station_mode()?;
        let response = self.execute(Command::list_access_points()?)?;

        Ok(response.lines().filter_map(AccessPoint::from_scan_line).collect())
    }

    /// Queries the current WIFI mode
    pub fn get_mode(&mut self) -> Result<WifiMode, ProtocolError> {
        self.ensure_initialized()?;
        let response = self.execute(Command::wifi_mode_query()?)?;

        let mode = response
            .find_prefixed(b"+CWMODE:")
            .and_then(parse_number)
            .ok_or(ProtocolError::BadResponse)?;

        WifiMode::try_from(mode)
    }

    /// Sets the WIFI mode
    pub fn set_mode(&mut self, mode: WifiMode) -> Result<(), ProtocolError> {
        self.ensure_initialized()?;
        self.execute(Command::set_wifi_mode(mode)?)?;
        Ok(())
    }

    /// Switches to station mode if not active yet
    fn ensure_station_mode(&mut self) -> Result<(), ProtocolError> {
        if self.get_mode()? != WifiMode::Station {
            self.set_mode(WifiMode::Station)?;
        }

        Ok(())
    }

    /// Returns the local IPv4 address of the station
    pub fn get_local_ip(&mut self) -> Result<Ipv4Addr, ProtocolError> {
        let response = self.execute(Command::local_address()?)?;

        let address = response
            .find_prefixed(b"+CIFSR:STAIP,")
            .ok_or(ProtocolError::BadResponse)?;

        parse_address(unquote(address))
    }

    /// Pings the given IP or hostname. Returns the response time in ms or None on failure (e.g. timeout).
    pub fn ping(&mut self, host: &str) -> Result<Option<u32>, ProtocolError> {
        let response = self.execute(Command::ping(host)?)?;

        let line = response
            .lines()
            .find(|line| line.starts_with(b"+"))
            .ok_or(ProtocolError::BadResponse)?;

        // Either "+PING:<time>" or "+<time>", depending on firmware version
        let time = line.strip_prefix(b"+PING:").unwrap_or(&line[1..]);
        Ok(parse_number(time))
    }

    /// Resolves the given hostname
    pub fn nslookup(&mut self, host: &str) -> Result<IpAddr, ProtocolError> {
        let response = self.execute(Command::resolve_domain(host)?)?;

        let address = response
            .find_prefixed(b"+CIPDOMAIN:")
            .ok_or(ProtocolError::BadResponse)?;

        parse_address(unquote(address))
    }

    /// Configures the built-in SNTP client with an UTC offset and server (IP or hostname)
    pub fn sntp_config(&mut self, enable: bool, timezone: Option<i32>, server: Option<&str>) -> Result<(), ProtocolError> {
        self.execute(Command::sntp_config(enable, timezone, server)?)?;
        Ok(())
    }

    /// Returns the SNTP time string, e.g. `Thu Aug 04 14:48:05 2016`.
    /// Note: May be 1970 during the first minutes after SNTP was enabled.
    pub fn sntp_time(&mut self) -> Result<Option<String>, ProtocolError> {
        let response = self.execute(Command::sntp_time()?)?;

        Ok(response
            .find_prefixed(b"+CIPSNTPTIME:")
            .map(|time| String::from_utf8_lossy(time).into_owned()))
    }
}

/// Parses an textual IPv4 or IPv6 address
fn parse_address<A: FromStr>(data: &[u8]) -> Result<A, ProtocolError> {
    core::str::from_utf8(data)
        .map_err(|_| ProtocolError::BadResponse)?
        .parse()
        .map_err(|_| ProtocolError::BadResponse)
}

/// Local IP and MAC addresses
#[derive(Default, Clone, Debug)]
pub struct LocalAddress {
    /// Local IPv4 address if assigned
    pub ipv4: Option<Ipv4Addr>,

    /// Local MAC address
    pub mac: Option<FixedString<17>>,

    /// Link local IPv6 address if assigned
    pub ipv6_link_local: Option<Ipv6Addr>,

    /// Global IPv6 address if assigned
    pub ipv6_global: Option<Ipv6Addr>,
}

impl LocalAddress {
    pub(crate) fn from_response(response: &Response) -> Result<Self, ProtocolError> {
        let mut data = Self::default();

        for line in response.lines() {
            let Some(entry) = line.strip_prefix(b"+CIFSR:") else {
                continue;
            };

            let mut parts = entry.splitn(2, |byte| *byte == b',');
            let address_type = parts.next().unwrap_or_default();
            let address = match parts.next() {
                None => continue,
                Some(address) => unquote(address),
            };

            match address_type {
                b"STAIP" => data.ipv4 = Some(parse_address(address)?),
                b"STAIP6LL" => data.ipv6_link_local = Some(parse_address(address)?),
                b"STAIP6GL" => data.ipv6_global = Some(parse_address(address)?),
                b"STAMAC" => {
                    let mac = core::str::from_utf8(address).map_err(|_| ProtocolError::BadResponse)?;
                    let mut string = FixedString::new();
                    string.push_str(mac).map_err(|_| ProtocolError::BadResponse)?;
                    data.mac = Some(string);
                }
                &_ => {}
            }
        }

        Ok(data)
    }
}
