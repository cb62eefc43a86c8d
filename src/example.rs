//! Mocks for doc examples
use crate::adapter::SerialPort;
use alloc::collections::VecDeque;
use alloc::vec::Vec;
use embedded_io::{ErrorKind, ErrorType, Read, ReadReady, Write};
use fugit::{TimerDurationU32, TimerInstantU32};
use fugit_timer::Timer;

/// Serial port mock answering a fixed set of commands like an ESP32-C3 would
#[derive(Default)]
pub struct ExampleSerial {
    /// Bytes written since the last complete command
    line: Vec<u8>,

    /// Pending bytes "sent" by the module
    rx: VecDeque<u8>,

    /// Remaining payload length announced by CIPSEND
    payload: usize,

    /// True after a socket was connected
    socket_open: bool,
}

impl ExampleSerial {
    fn respond(&mut self, data: &[u8]) {
        self.rx.extend(data.iter().copied());
    }

    fn handle_command(&mut self) {
        let command = core::mem::take(&mut self.line);

        match command.as_slice() {
            b"AT+GMR\r\n" => self.respond(
                b"AT version:2.2.0.0(s-b097cdf - ESP32C3 - Jul 2 2021 11:43:35)\r\nSDK version:v4.2.2-76-gefa6eca\r\n\r\nOK\r\n",
            ),
            b"AT+CWSTATE?\r\n" => self.respond(b"+CWSTATE:2,\"test_wifi\"\r\n\r\nOK\r\n"),
            b"AT+CIPSTATE?\r\n" if self.socket_open => {
                self.respond(b"+CIPSTATE:0,\"TCP\",\"10.0.0.1\",21,54321,0\r\n\r\nOK\r\n")
            }
            b"AT+CWMODE?\r\n" => self.respond(b"+CWMODE:1\r\n\r\nOK\r\n"),
            b"AT+CWJAP?\r\n" => self.respond(b"No AP\r\n\r\nOK\r\n"),
            b"AT+CWJAP=\"test_wifi\",\"secret\"\r\n" => {
                self.respond(b"WIFI CONNECTED\r\nWIFI GOT IP\r\n\r\nOK\r\n")
            }
            b"AT+CIFSR\r\n" => self.respond(
                b"+CIFSR:STAIP,\"10.0.0.181\"\r\n+CIFSR:STAMAC,\"10:fe:ed:05:ba:50\"\r\n\r\nOK\r\n",
            ),
            b"AT+CIPSTART=\"TCP\",\"10.0.0.1\",21,10\r\n" => {
                self.socket_open = true;
                self.respond(b"CONNECT\r\n\r\nOK\r\n");
            }
            b"AT+CIPSEND=6\r\n" => {
                self.payload = 6;
                self.respond(b"\r\nOK\r\n>");
            }
            b"AT+CIPCLOSE\r\n" => {
                self.socket_open = false;
                self.respond(b"CLOSED\r\n\r\nOK\r\n");
            }
            _ => self.respond(b"\r\nOK\r\n"),
        }
    }
}

impl ErrorType for ExampleSerial {
    type Error = ErrorKind;
}

impl Read for ExampleSerial {
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

impl ReadReady for ExampleSerial {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.rx.is_empty())
    }
}

impl Write for ExampleSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        for byte in buf {
            if self.payload > 0 {
                self.payload -= 1;

                if self.payload == 0 {
                    self.respond(b"\r\nRecv 6 bytes\r\n\r\nSEND OK\r\n");
                    self.respond(b"\r\n+IPD,16:nice to see you!");
                }
                continue;
            }

            self.line.push(*byte);
            if self.line.ends_with(b"\r\n") {
                self.handle_command();
            }
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl SerialPort for ExampleSerial {
    fn set_baud_rate(&mut self, _baud_rate: u32) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Number of polls until [ExampleTimer] elapses
const POLL_BUDGET: usize = 1_024;

/// Timer mock, elapsing after a fixed number of polls
#[derive(Default)]
pub struct ExampleTimer {
    remaining_polls: usize,
}

impl Timer<1_000_000> for ExampleTimer {
    type Error = u32;

    fn now(&mut self) -> TimerInstantU32<1000000> {
        TimerInstantU32::from_ticks(0)
    }

    fn start(&mut self, _duration: TimerDurationU32<1000000>) -> Result<(), Self::Error> {
        self.remaining_polls = POLL_BUDGET;
        Ok(())
    }

    fn cancel(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn wait(&mut self) -> nb::Result<(), Self::Error> {
        if self.remaining_polls == 0 {
            return Ok(());
        }

        self.remaining_polls -= 1;
        Err(nb::Error::WouldBlock)
    }
}
