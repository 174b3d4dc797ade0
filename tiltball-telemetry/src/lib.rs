use thiserror::Error;

// --- Error Type ---

/// A line that does not match its frame format. The whole frame is dropped;
/// nothing is partially applied.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("expected at least {expected} fields, got {got}")]
    MissingFields { expected: usize, got: usize },
    #[error("field {index} is missing its tag: {token:?}")]
    BadTag { index: usize, token: String },
    #[error("field {index} is not numeric: {token:?}")]
    BadNumber { index: usize, token: String },
}

// --- Sample ---

/// One decoded telemetry frame. Produced fresh each tick; has no identity
/// beyond its values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySample {
    pub x: f32,
    pub y: f32,
    pub jump_pressed: bool,
}

// --- Decoder ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// `x:<float> y:<float>[ j:<0|1>]`, e.g. `x:12.3456 y:-3.2100 j:0`.
    Tagged,
    /// `<x>,<y>,<sw>` with raw 10-bit analog axes, e.g. `512,700,1`.
    AnalogCsv,
}

impl FrameFormat {
    /// Decoding is pure and stateless: identical input always yields an
    /// identical sample or an identical error.
    pub fn decode(&self, line: &str) -> Result<TelemetrySample, DecodeError> {
        match self {
            FrameFormat::Tagged => decode_tagged(line),
            FrameFormat::AnalogCsv => decode_analog_csv(line),
        }
    }
}

fn tagged_payload<'a>(token: &'a str, tag: &str, index: usize) -> Result<&'a str, DecodeError> {
    token.strip_prefix(tag).ok_or_else(|| DecodeError::BadTag {
        index,
        token: token.to_string(),
    })
}

fn parse_float(payload: &str, index: usize) -> Result<f32, DecodeError> {
    // f32 parsing always uses `.` as the decimal separator, matching the
    // wire format regardless of host locale.
    payload.parse::<f32>().map_err(|_| DecodeError::BadNumber {
        index,
        token: payload.to_string(),
    })
}

fn parse_int(payload: &str, index: usize) -> Result<i32, DecodeError> {
    payload.parse::<i32>().map_err(|_| DecodeError::BadNumber {
        index,
        token: payload.to_string(),
    })
}

fn decode_tagged(line: &str) -> Result<TelemetrySample, DecodeError> {
    let fields: Vec<&str> = line.split(' ').collect();
    if fields.len() < 2 {
        return Err(DecodeError::MissingFields { expected: 2, got: fields.len() });
    }

    let x = parse_float(tagged_payload(fields[0], "x:", 0)?, 0)?;
    let y = parse_float(tagged_payload(fields[1], "y:", 1)?, 1)?;

    // The jump field is optional; when present it must be well-formed.
    let jump_pressed = match fields.get(2) {
        Some(token) => parse_int(tagged_payload(token, "j:", 2)?, 2)? == 1,
        None => false,
    };

    Ok(TelemetrySample { x, y, jump_pressed })
}

fn decode_analog_csv(line: &str) -> Result<TelemetrySample, DecodeError> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != 3 {
        return Err(DecodeError::MissingFields { expected: 3, got: fields.len() });
    }

    let raw_x = parse_int(fields[0], 0)?;
    let raw_y = parse_int(fields[1], 1)?;
    let switch = parse_int(fields[2], 2)?;

    // 10-bit ADC readout centered on 512; the joystick switch is active-low.
    Ok(TelemetrySample {
        x: (raw_x - 512) as f32 / 512.0,
        y: (raw_y - 512) as f32 / 512.0,
        jump_pressed: switch == 0,
    })
}

// --- Line Assembly ---

// A stream that never sends a newline must not grow the buffer forever.
const MAX_PENDING: usize = 4096;

/// Assembles newline-terminated lines from a raw byte feed. Only the most
/// recently completed line survives each poll; older lines are discarded in
/// favor of freshness.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        if self.pending.len() > MAX_PENDING {
            let excess = self.pending.len() - MAX_PENDING;
            self.pending.drain(..excess);
        }
    }

    /// Returns the last complete line, dropping any earlier ones, or `None`
    /// if no full line has arrived yet. An incomplete trailing fragment is
    /// retained for the next poll.
    pub fn take_latest(&mut self) -> Option<String> {
        let last_newline = self.pending.iter().rposition(|&b| b == b'\n')?;
        let mut complete: Vec<u8> = self.pending.drain(..=last_newline).collect();
        complete.pop(); // trailing '\n'

        let start = complete.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1);
        match std::str::from_utf8(&complete[start..]) {
            // Arduino `println` terminates lines with CRLF.
            Ok(line) => Some(line.trim_end_matches('\r').to_string()),
            // Garbage bytes (boot noise, framing glitch): drop the line.
            Err(_) => None,
        }
    }
}

// --- Traits ---

/// A polled source of telemetry lines. Yields at most one line per poll,
/// always the freshest available.
pub trait LineSource {
    fn poll_line(&mut self) -> Option<String>;
}

#[cfg(feature = "serial")]
mod serial {
    use super::{LineBuffer, LineSource};
    use log::debug;
    use serialport::{ClearBuffer, SerialPort};
    use std::io::Read;
    use std::time::Duration;
    use thiserror::Error;

    /// Failure to open the serial device. Reported once at startup; the
    /// caller decides whether to abort or continue with a disabled link.
    #[derive(Debug, Error)]
    pub enum LinkError {
        #[error("failed to open serial port {port}: {source}")]
        Open {
            port: String,
            source: serialport::Error,
        },
    }

    /// A byte-stream endpoint over a serial device. Opened once, polled
    /// every tick, closed exactly once; closing is idempotent and a closed
    /// link polls as "no data".
    pub struct SerialLink {
        port: Option<Box<dyn SerialPort>>,
        buffer: LineBuffer,
    }

    fn open_port(
        port_name: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> serialport::Result<Box<dyn SerialPort>> {
        let mut port = serialport::new(port_name, baud_rate)
            .timeout(read_timeout)
            .open()?;
        // Most Arduino boards hold in reset until DTR/RTS are asserted.
        port.write_data_terminal_ready(true)?;
        port.write_request_to_send(true)?;
        // Discard whatever the board printed while booting.
        port.clear(ClearBuffer::Input)?;
        Ok(port)
    }

    impl SerialLink {
        pub fn open(
            port_name: &str,
            baud_rate: u32,
            read_timeout: Duration,
        ) -> Result<Self, LinkError> {
            let port = open_port(port_name, baud_rate, read_timeout).map_err(|source| {
                LinkError::Open { port: port_name.to_string(), source }
            })?;
            debug!("serial port {} open at {} baud", port_name, baud_rate);
            Ok(Self { port: Some(port), buffer: LineBuffer::new() })
        }

        /// A link that never yields data. Used after a failed open so the
        /// polling loop keeps ticking without a device; there is no retry.
        pub fn disabled() -> Self {
            Self { port: None, buffer: LineBuffer::new() }
        }

        pub fn is_open(&self) -> bool {
            self.port.is_some()
        }

        /// Releases the device. Safe to call on an already-closed or
        /// never-opened link.
        pub fn close(&mut self) {
            if let Some(port) = self.port.take() {
                drop(port);
                debug!("serial port closed");
            }
        }
    }

    impl LineSource for SerialLink {
        fn poll_line(&mut self) -> Option<String> {
            let port = self.port.as_mut()?;

            // Drain everything buffered right now. Timeouts and read faults
            // look exactly like "nothing arrived"; they never propagate.
            let mut chunk = [0u8; 256];
            loop {
                match port.bytes_to_read() {
                    Ok(0) | Err(_) => break,
                    Ok(_) => match port.read(&mut chunk) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => self.buffer.push(&chunk[..n]),
                    },
                }
            }

            self.buffer.take_latest()
        }
    }

    impl Drop for SerialLink {
        fn drop(&mut self) {
            self.close();
        }
    }
}

#[cfg(feature = "serial")]
pub use serial::{LinkError, SerialLink};
