//! # Adapter configuration
//!
//! All timeouts are given in milliseconds and converted to the timer rate of the adapter.
//!
//! ````
//! use esp_at_control::config::Config;
//!
//! let config = Config::default()
//!     .run_baud_rate(921_600)
//!     .debug(true)
//!     .command_timeout_ms(3_000);
//!
//! assert_eq!(115_200, config.default_baud_rate);
//! assert_eq!(921_600, config.run_baud_rate);
//! ````

/// Static settings of an [Adapter](crate::adapter::Adapter)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Baud rate the module uses after power up
    pub default_baud_rate: u32,

    /// Baud rate switched to during initialization
    pub run_baud_rate: u32,

    /// Logs every command and response on debug level
    pub debug: bool,

    /// Starts in single status (`AT+CIPSTATUS`) mode instead of probing for `AT+CWSTATE?`
    pub legacy_status: bool,

    /// Default timeout of a single command attempt
    pub command_timeout_ms: u32,

    /// Default number of attempts per command
    pub command_retries: usize,

    /// Timeout of a single `AT+CWJAP` attempt
    pub join_timeout_ms: u32,

    /// Number of `AT+CWJAP` attempts
    pub join_retries: usize,

    /// Max. time waiting for the `>` prompt after `AT+CIPSEND`
    pub send_prompt_timeout_ms: u32,

    /// Max. time waiting for `SEND OK` of TCP/TLS transmissions
    pub send_timeout_ms: u32,

    /// Timeout of the `AT+CIPSTART` command
    pub connect_timeout_ms: u32,

    /// TCP keep alive interval in seconds, 0 disables keep alive
    pub keepalive: u16,

    /// Local port of UDP transmissions, 0 lets the firmware choose
    pub udp_local_port: u16,

    /// Number of status queries before connecting a socket
    pub status_poll_attempts: usize,

    /// Delay between status queries before connecting a socket
    pub status_poll_delay_ms: u32,

    /// Receive window of the non-blocking [TcpClientStack](embedded_nal::TcpClientStack) implementation
    pub receive_poll_ms: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_baud_rate: 115_200,
            run_baud_rate: 115_200,
            debug: false,
            legacy_status: false,
            command_timeout_ms: 5_000,
            command_retries: 3,
            join_timeout_ms: 15_000,
            join_retries: 3,
            send_prompt_timeout_ms: 1_000,
            send_timeout_ms: 5_000,
            connect_timeout_ms: 10_000,
            keepalive: 10,
            udp_local_port: 0,
            status_poll_attempts: 10,
            status_poll_delay_ms: 1_000,
            receive_poll_ms: 100,
        }
    }
}

impl Config {
    /// Sets the power up baud rate. Run baud rate follows unless it was changed before.
    pub fn default_baud_rate(mut self, baud_rate: u32) -> Self {
        if self.run_baud_rate == self.default_baud_rate {
            self.run_baud_rate = baud_rate;
        }

        self.default_baud_rate = baud_rate;
        self
    }

    pub fn run_baud_rate(mut self, baud_rate: u32) -> Self {
        self.run_baud_rate = baud_rate;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn legacy_status(mut self, legacy: bool) -> Self {
        self.legacy_status = legacy;
        self
    }

    pub fn command_timeout_ms(mut self, timeout: u32) -> Self {
        self.command_timeout_ms = timeout;
        self
    }

    pub fn command_retries(mut self, retries: usize) -> Self {
        self.command_retries = retries;
        self
    }

    pub fn join_timeout_ms(mut self, timeout: u32) -> Self {
        self.join_timeout_ms = timeout;
        self
    }

    pub fn join_retries(mut self, retries: usize) -> Self {
        self.join_retries = retries;
        self
    }

    pub fn send_prompt_timeout_ms(mut self, timeout: u32) -> Self {
        self.send_prompt_timeout_ms = timeout;
        self
    }

    pub fn send_timeout_ms(mut self, timeout: u32) -> Self {
        self.send_timeout_ms = timeout;
        self
    }

    pub fn connect_timeout_ms(mut self, timeout: u32) -> Self {
        self.connect_timeout_ms = timeout;
        self
    }

    pub fn keepalive(mut self, seconds: u16) -> Self {
        self.keepalive = seconds;
        self
    }

    pub fn udp_local_port(mut self, port: u16) -> Self {
        self.udp_local_port = port;
        self
    }

    /// Bounds the status polling of `socket_connect()`
    pub fn status_polling(mut self, attempts: usize, delay_ms: u32) -> Self {
        self.status_poll_attempts = attempts;
        self.status_poll_delay_ms = delay_ms;
        self
    }

    pub fn receive_poll_ms(mut self, timeout: u32) -> Self {
        self.receive_poll_ms = timeout;
        self
    }
}
