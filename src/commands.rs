use crate::error::ProtocolError;
use crate::stack::ConnectionType;
use crate::wifi::WifiMode;
use heapless::String;
use numtoa::NumToA;

/// Max. length of an encoded command (without line terminator)
pub(crate) const COMMAND_SIZE: usize = 256;

/// Encoded command text
pub(crate) type CommandBuffer = String<COMMAND_SIZE>;

/// A single AT command including its timing parameters
#[derive(Clone, Debug)]
pub(crate) struct Command {
    /// Command text without line terminator
    pub(crate) text: CommandBuffer,

    /// Timeout of a single attempt. None => adapter default
    pub(crate) timeout_ms: Option<u32>,

    /// Number of attempts. None => adapter default
    pub(crate) attempts: Option<usize>,
}

impl Command {
    fn new(builder: CommandBuilder, timeout_ms: u32) -> Self {
        Self {
            text: builder.finish(),
            timeout_ms: Some(timeout_ms),
            attempts: None,
        }
    }

    /// Command using the default timeout and attempts of the adapter
    fn standard(builder: CommandBuilder) -> Self {
        Self {
            text: builder.finish(),
            timeout_ms: None,
            attempts: None,
        }
    }

    /// Command without any arguments
    fn basic(name: &str, timeout_ms: u32) -> Result<Self, ProtocolError> {
        Ok(Self::new(CommandBuilder::new(name)?, timeout_ms))
    }

    /// Query without any arguments using the default timeout
    fn query(name: &str) -> Result<Self, ProtocolError> {
        Ok(Self::standard(CommandBuilder::new(name)?))
    }

    fn with_attempts(mut self, attempts: usize) -> Self {
        self.attempts = Some(attempts);
        self
    }

    /// Enables/disables command echo
    pub fn echo(enabled: bool) -> Result<Self, ProtocolError> {
        Self::basic(if enabled { "ATE1" } else { "ATE0" }, 1_000)
    }

    /// Plain `AT` for testing the link
    pub fn attention() -> Result<Self, ProtocolError> {
        Self::basic("AT", 3_000)
    }

    /// Changes the UART configuration (not stored in flash)
    ///
    /// Format: 8 data bits, 1 stop bit, no parity. Flow control is set to RTS/CTS if `flow_control` is true.
    pub fn uart_config(baud_rate: u32, flow_control: bool) -> Result<Self, ProtocolError> {
        let mut builder = CommandBuilder::new("AT+UART_CUR")?;
        builder.unsigned(baud_rate)?;
        builder.unsigned(8)?;
        builder.unsigned(1)?;
        builder.unsigned(0)?;
        builder.unsigned(if flow_control { 3 } else { 0 })?;
        Ok(Self::new(builder, 3_000))
    }

    /// Firmware version information
    pub fn version() -> Result<Self, ProtocolError> {
        Self::basic("AT+GMR", 3_000)
    }

    /// WIFI state query of modern firmware. Used as capability probe, so just one attempt.
    pub fn wifi_state_probe() -> Result<Self, ProtocolError> {
        Ok(Self::basic("AT+CWSTATE?", 3_000)?.with_attempts(1))
    }

    /// WIFI state query of modern firmware
    pub fn wifi_state() -> Result<Self, ProtocolError> {
        Self::query("AT+CWSTATE?")
    }

    /// Socket state query of modern firmware
    pub fn socket_state() -> Result<Self, ProtocolError> {
        Self::query("AT+CIPSTATE?")
    }

    /// Combined status query of legacy firmware
    pub fn legacy_status() -> Result<Self, ProtocolError> {
        Self::query("AT+CIPSTATUS")
    }

    pub fn wifi_mode_query() -> Result<Self, ProtocolError> {
        Self::query("AT+CWMODE?")
    }

    pub fn set_wifi_mode(mode: WifiMode) -> Result<Self, ProtocolError> {
        let mut builder = CommandBuilder::new("AT+CWMODE")?;
        builder.unsigned(mode as u32)?;
        Ok(Self::new(builder, 3_000))
    }

    /// Joins the given access point
    pub fn join_access_point(ssid: &str, password: &str, timeout_ms: u32, attempts: usize) -> Result<Self, ProtocolError> {
        if ssid.len() > 32 {
            return Err(ProtocolError::InvalidSsidLength);
        }

        if password.len() > 63 {
            return Err(ProtocolError::InvalidPasswordLength);
        }

        let mut builder = CommandBuilder::new("AT+CWJAP")?;
        builder.quoted(ssid)?;
        builder.quoted(password)?;
        Ok(Self::new(builder, timeout_ms).with_attempts(attempts))
    }

    /// Queries the currently joined access point
    pub fn access_point_query() -> Result<Self, ProtocolError> {
        Self::basic("AT+CWJAP?", 10_000)
    }

    /// Leaves the current access point
    pub fn quit_access_point() -> Result<Self, ProtocolError> {
        Self::query("AT+CWQAP")
    }

    /// Lists all visible access points
    pub fn list_access_points() -> Result<Self, ProtocolError> {
        Ok(Self::query("AT+CWLAP")?.with_attempts(1))
    }

    /// Obtains the local IP and MAC addresses
    pub fn local_address() -> Result<Self, ProtocolError> {
        Self::query("AT+CIFSR")
    }

    pub fn ping(host: &str) -> Result<Self, ProtocolError> {
        let mut builder = CommandBuilder::new("AT+PING")?;
        builder.quoted(host.trim_matches('"'))?;
        Ok(Self::standard(builder))
    }

    /// Resolves the given domain name
    pub fn resolve_domain(host: &str) -> Result<Self, ProtocolError> {
        let mut builder = CommandBuilder::new("AT+CIPDOMAIN")?;
        builder.quoted(host.trim_matches('"'))?;
        Ok(Self::new(builder, 3_000))
    }

    /// Configures the SNTP client
    pub fn sntp_config(enable: bool, timezone: Option<i32>, server: Option<&str>) -> Result<Self, ProtocolError> {
        let mut builder = CommandBuilder::new("AT+CIPSNTPCFG")?;
        builder.unsigned(enable as u32)?;

        if let Some(timezone) = timezone {
            builder.signed(timezone)?;
        }

        if let Some(server) = server {
            builder.quoted(server)?;
        }

        Ok(Self::new(builder, 3_000))
    }

    pub fn sntp_time() -> Result<Self, ProtocolError> {
        Self::query("AT+CIPSNTPTIME?")
    }

    /// Establishes a TCP/TLS connection or UDP transmission
    pub fn connect(
        connection_type: ConnectionType,
        host: &str,
        port: u16,
        keepalive: u16,
        udp_local_port: u16,
        timeout_ms: u32,
    ) -> Result<Self, ProtocolError> {
        let mut builder = CommandBuilder::new("AT+CIPSTART")?;
        builder.quoted(connection_type.as_str())?;
        builder.quoted(host)?;
        builder.unsigned(port as u32)?;

        match connection_type {
            // Mode 2: remote may change
            ConnectionType::Udp => {
                builder.unsigned(udp_local_port as u32)?;
                builder.unsigned(2)?;
            }
            ConnectionType::Tcp | ConnectionType::Tls => {
                builder.unsigned(keepalive as u32)?;
            }
        }

        Ok(Self::new(builder, timeout_ms).with_attempts(1))
    }

    /// Announces the transmission of the given number of bytes
    pub fn prepare_transmission(length: usize) -> Result<Self, ProtocolError> {
        let mut builder = CommandBuilder::new("AT+CIPSEND")?;
        builder.unsigned(length as u32)?;
        Ok(Self::standard(builder).with_attempts(1))
    }

    pub fn close_socket() -> Result<Self, ProtocolError> {
        Ok(Self::query("AT+CIPCLOSE")?.with_attempts(1))
    }
}

/// Serializes a command name and its arguments, e.g. `AT+CWJAP="ssid","secret"`
pub(crate) struct CommandBuilder {
    buffer: CommandBuffer,

    /// Number of already appended arguments
    arguments: usize,
}

impl CommandBuilder {
    pub fn new(name: &str) -> Result<Self, ProtocolError> {
        let mut buffer = String::new();
        buffer.push_str(name).map_err(|_| ProtocolError::CommandOverflow)?;

        Ok(Self { buffer, arguments: 0 })
    }

    /// Appends an unquoted numeric argument
    pub fn unsigned(&mut self, value: u32) -> Result<(), ProtocolError> {
        let mut digits = [0x0; 20];
        let text = value.numtoa_str(10, &mut digits);
        self.separator()?;
        self.push(text)
    }

    /// Appends an unquoted, possibly negative numeric argument
    pub fn signed(&mut self, value: i32) -> Result<(), ProtocolError> {
        let mut digits = [0x0; 20];
        let text = value.numtoa_str(10, &mut digits);
        self.separator()?;
        self.push(text)
    }

    /// Appends a quoted string argument. Quotes, commas and backslashes get escaped.
    pub fn quoted(&mut self, value: &str) -> Result<(), ProtocolError> {
        self.separator()?;
        self.push("\"")?;

        for char in value.chars() {
            if matches!(char, '"' | ',' | '\\') {
                self.push("\\")?;
            }

            self.buffer.push(char).map_err(|_| ProtocolError::CommandOverflow)?;
        }

        self.push("\"")
    }

    pub fn finish(self) -> CommandBuffer {
        self.buffer
    }

    fn separator(&mut self) -> Result<(), ProtocolError> {
        let separator = if self.arguments == 0 { "=" } else { "," };
        self.arguments += 1;
        self.push(separator)
    }

    fn push(&mut self, text: &str) -> Result<(), ProtocolError> {
        self.buffer.push_str(text).map_err(|_| ProtocolError::CommandOverflow)
    }
}
