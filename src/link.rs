// Line-oriented serial links to the LV and WPT controllers
//
// Inbound bytes are buffered until a CR or LF arrives, so a poll only ever
// returns complete lines. Outbound tokens get a single terminator.

use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use tracing::{debug, warn};

use crate::config::{LINK_BAUDRATE, LINK_READ_TIMEOUT};

/// Terminator expected by the ESP32 consoles
pub const CONSOLE_TERMINATOR: &str = "\r";

const READ_CHUNK: usize = 256;

// Longest fragment kept while waiting for a terminator
const MAX_LINE_LEN: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Serial port error on {name} link: {source}")]
    Serial {
        name: &'static str,
        #[source]
        source: serialport::Error,
    },

    #[error("IO error on {name} link: {source}")]
    Io {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{name} link closed by peer")]
    Closed { name: &'static str },
}

/// A text channel to a peripheral
pub trait LineLink {
    /// Write one token followed by the link terminator
    fn send(&mut self, token: &str) -> Result<(), LinkError>;

    /// Complete lines received since the last poll, in arrival order.
    /// Returns an empty batch when nothing arrived within the read timeout.
    fn poll_lines(&mut self) -> Result<Vec<String>, LinkError>;
}

pub struct SerialLink<T: Read + Write = Box<dyn SerialPort>> {
    name: &'static str,
    port: T,
    terminator: &'static str,
    pending: Vec<u8>,
    // Dropping an oversized fragment until its terminator shows up
    discarding: bool,
}

impl SerialLink {
    /// Open a serial device with the default baudrate and read timeout
    pub fn open(name: &'static str, port_name: &str) -> Result<Self, LinkError> {
        debug!("Opening {} link on {}", name, port_name);
        let port = serialport::new(port_name, LINK_BAUDRATE)
            .timeout(LINK_READ_TIMEOUT)
            .open()
            .map_err(|source| LinkError::Serial { name, source })?;
        Ok(Self::new(name, port))
    }
}

impl<T: Read + Write> SerialLink<T> {
    pub fn new(name: &'static str, port: T) -> Self {
        Self {
            name,
            port,
            terminator: CONSOLE_TERMINATOR,
            pending: Vec::new(),
            discarding: false,
        }
    }

    pub fn with_terminator(mut self, terminator: &'static str) -> Self {
        self.terminator = terminator;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    #[cfg(test)]
    pub(crate) fn port(&self) -> &T {
        &self.port
    }

    fn io_error(&self, source: std::io::Error) -> LinkError {
        LinkError::Io {
            name: self.name,
            source,
        }
    }

    /// Read whatever the port has (one read, bounded by the port timeout)
    fn fill(&mut self) -> Result<(), LinkError> {
        let mut buf = [0u8; READ_CHUNK];
        match self.port.read(&mut buf) {
            Ok(0) => Err(LinkError::Closed { name: self.name }),
            Ok(n) => {
                self.pending.extend_from_slice(&buf[..n]);
                Ok(())
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                Ok(())
            }
            Err(e) => Err(self.io_error(e)),
        }
    }

    /// Split off every complete line, keeping a trailing fragment buffered
    fn take_lines(&mut self) -> Vec<String> {
        let is_eol = |b: &u8| *b == b'\r' || *b == b'\n';

        if self.discarding {
            match self.pending.iter().position(is_eol) {
                Some(eol) => {
                    self.pending.drain(..=eol);
                    self.discarding = false;
                }
                None => {
                    self.pending.clear();
                    return Vec::new();
                }
            }
        }

        let Some(last_eol) = self.pending.iter().rposition(is_eol) else {
            if self.pending.len() > MAX_LINE_LEN {
                warn!(
                    "{} link: dropping {} bytes with no line terminator",
                    self.name,
                    self.pending.len()
                );
                self.pending.clear();
                self.discarding = true;
            }
            return Vec::new();
        };

        let complete: Vec<u8> = self.pending.drain(..=last_eol).collect();
        complete
            .split(is_eol)
            .map(|line| String::from_utf8_lossy(line).trim().to_string())
            .filter(|line| !line.is_empty())
            .collect()
    }
}

impl<T: Read + Write> LineLink for SerialLink<T> {
    fn send(&mut self, token: &str) -> Result<(), LinkError> {
        debug!("{} <- {:?}", self.name, token);
        let line = format!("{}{}", token, self.terminator);
        if let Err(e) = self.port.write_all(line.as_bytes()) {
            return Err(self.io_error(e));
        }
        self.port.flush().map_err(|e| self.io_error(e))
    }

    fn poll_lines(&mut self) -> Result<Vec<String>, LinkError> {
        self.fill()?;
        let lines = self.take_lines();
        for line in &lines {
            debug!("{} -> {:?}", self.name, line);
        }
        Ok(lines)
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::VecDeque;
    use std::io::{ErrorKind, Read, Write};

    /// In-memory port: each read hands out the next scripted chunk, then
    /// times out like a quiet serial line.
    #[derive(Default)]
    pub struct ScriptedPort {
        pub inbound: VecDeque<Vec<u8>>,
        pub written: Vec<u8>,
        pub eof: bool,
    }

    impl ScriptedPort {
        pub fn with_chunks(chunks: &[&str]) -> Self {
            Self {
                inbound: chunks.iter().map(|c| c.as_bytes().to_vec()).collect(),
                ..Self::default()
            }
        }

        pub fn written_str(&self) -> String {
            String::from_utf8_lossy(&self.written).to_string()
        }
    }

    impl Read for ScriptedPort {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.inbound.pop_front() {
                Some(chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        self.inbound.push_front(chunk[n..].to_vec());
                    }
                    Ok(n)
                }
                None if self.eof => Ok(0),
                None => Err(std::io::Error::new(ErrorKind::TimedOut, "timed out")),
            }
        }
    }

    impl Write for ScriptedPort {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::ScriptedPort;
    use super::*;

    #[test]
    fn test_batch_split_on_crlf() {
        let port = ScriptedPort::with_chunks(&["Closed\r\nCOMPVISION\r\n"]);
        let mut link = SerialLink::new("lv", port);

        let lines = link.poll_lines().unwrap();
        assert_eq!(lines, vec!["Closed", "COMPVISION"]);
    }

    #[test]
    fn test_partial_line_is_held_back() {
        let port = ScriptedPort::with_chunks(&["Clo", "sed\r\nWait", "ForFinish\r\n"]);
        let mut link = SerialLink::new("lv", port);

        assert!(link.poll_lines().unwrap().is_empty());
        assert_eq!(link.poll_lines().unwrap(), vec!["Closed"]);
        assert_eq!(link.poll_lines().unwrap(), vec!["WaitForFinish"]);
    }

    #[test]
    fn test_timeout_is_empty_batch() {
        let mut link = SerialLink::new("lv", ScriptedPort::default());
        assert!(link.poll_lines().unwrap().is_empty());
    }

    #[test]
    fn test_eof_is_link_loss() {
        let port = ScriptedPort {
            eof: true,
            ..ScriptedPort::default()
        };
        let mut link = SerialLink::new("wpt", port);
        match link.poll_lines() {
            Err(LinkError::Closed { name }) => assert_eq!(name, "wpt"),
            other => panic!("expected Closed, got {:?}", other),
        }
    }

    #[test]
    fn test_unterminated_stream_is_bounded() {
        let flood = "x".repeat(1500);
        let port = ScriptedPort::with_chunks(&[&flood, "\r\nClosed\r\n"]);
        let mut link = SerialLink::new("lv", port);

        let mut lines = Vec::new();
        for _ in 0..10 {
            lines.extend(link.poll_lines().unwrap());
            assert!(link.pending.len() <= MAX_LINE_LEN + READ_CHUNK);
        }
        // The tail of the dropped fragment must not leak into the next line
        assert_eq!(lines, vec!["Closed"]);
    }

    #[test]
    fn test_open_error_names_the_link() {
        match SerialLink::open("wpt", "/dev/no-such-locker-port") {
            Err(e @ LinkError::Serial { .. }) => {
                assert!(e.to_string().contains("wpt"), "got {}", e);
            }
            Err(e) => panic!("expected Serial error, got {:?}", e),
            Ok(_) => panic!("opened a port that does not exist"),
        }
    }

    #[test]
    fn test_send_uses_single_cr() {
        let mut link = SerialLink::new("wpt", ScriptedPort::default());
        link.send("startCharging").unwrap();
        assert_eq!(link.port.written_str(), "startCharging\r");
    }

    #[test]
    fn test_blank_lines_and_invalid_utf8_dropped_or_replaced() {
        let port = ScriptedPort {
            inbound: vec![b"\r\n\r\nEm\xffpty\r\n".to_vec()].into(),
            ..ScriptedPort::default()
        };
        let mut link = SerialLink::new("lv", port);
        let lines = link.poll_lines().unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0], "Em\u{fffd}pty");
    }
}
