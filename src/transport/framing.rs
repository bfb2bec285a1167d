//! Content-Length framing (spec.md §4.A "Framing", §6.1). Grounded on the
//! teacher's `dap::transport`/`dap::yadap::io` read loop, but rewritten
//! over a raw `Channel::read` buffer instead of `BufRead::read_line` so a
//! single `read()` that returns a partial header, or one that returns
//! several concatenated messages, is both handled correctly.

use crate::error::Error;
use crate::transport::channel::Channel;
use serde::Serialize;
use serde_json::Value;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

pub struct FrameReader<C> {
    channel: C,
    buf: Vec<u8>,
}

impl<C: Channel> FrameReader<C> {
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            buf: Vec::new(),
        }
    }

    /// Reads one full DAP message, blocking on `Channel::read` as needed.
    /// Returns `Error::ChannelClosed` on EOF, `Error::Protocol` on a
    /// malformed frame.
    pub fn read_message(&mut self) -> Result<Value, Error> {
        let header_end = loop {
            if let Some(pos) = find_subslice(&self.buf, HEADER_TERMINATOR) {
                break pos;
            }
            self.fill()?;
        };

        let header_bytes = &self.buf[..header_end];
        let header_text = std::str::from_utf8(header_bytes)
            .map_err(|_| Error::protocol("frame header is not valid UTF-8"))?;
        let content_length = parse_content_length(header_text)?;

        let body_start = header_end + HEADER_TERMINATOR.len();
        let body_end = body_start + content_length;
        while self.buf.len() < body_end {
            self.fill()?;
        }

        let body = &self.buf[body_start..body_end];
        let value: Value = serde_json::from_slice(body)
            .map_err(|_| Error::protocol("frame body is not valid UTF-8 JSON"))?;

        self.buf.drain(..body_end);
        Ok(value)
    }

    fn fill(&mut self) -> Result<(), Error> {
        let mut chunk = [0u8; 4096];
        let n = self.channel.read(&mut chunk)?;
        if n == 0 {
            return Err(Error::ChannelClosed);
        }
        self.buf.extend_from_slice(&chunk[..n]);
        Ok(())
    }
}

pub struct FrameWriter<C> {
    channel: C,
}

impl<C: Channel> FrameWriter<C> {
    pub fn new(channel: C) -> Self {
        Self { channel }
    }

    pub fn write_message<T: Serialize>(&mut self, message: &T) -> Result<(), Error> {
        let payload = serde_json::to_vec(message)?;
        let header = format!("Content-Length: {}\r\n\r\n", payload.len());
        self.channel.write(header.as_bytes())?;
        self.channel.write(&payload)?;
        Ok(())
    }
}

fn parse_content_length(header_text: &str) -> Result<usize, Error> {
    for line in header_text.split("\r\n") {
        if let Some(value) = line.strip_prefix("Content-Length:") {
            let value = value.trim();
            let len: i64 = value
                .parse()
                .map_err(|_| Error::protocol(format!("non-numeric Content-Length: {value:?}")))?;
            if len < 0 {
                return Err(Error::protocol(format!("negative Content-Length: {len}")));
            }
            return Ok(len as usize);
        }
    }
    Err(Error::protocol("missing Content-Length header"))
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::channel::memory::MemoryChannel;

    #[test]
    fn reads_a_single_frame() {
        let (mut ours, mut theirs) = MemoryChannel::new_pair();
        let body = br#"{"seq":1,"type":"event","event":"initialized"}"#;
        theirs
            .write(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes())
            .unwrap();
        theirs.write(body).unwrap();

        let mut reader = FrameReader::new(&mut ours);
        let value = reader.read_message().unwrap();
        assert_eq!(value["event"], "initialized");
    }

    #[test]
    fn reads_concatenated_frames_from_one_chunk() {
        let (mut ours, mut theirs) = MemoryChannel::new_pair();
        let a = br#"{"seq":1,"type":"event","event":"thread"}"#;
        let b = br#"{"seq":2,"type":"event","event":"stopped"}"#;
        let mut combined = Vec::new();
        combined.extend_from_slice(format!("Content-Length: {}\r\n\r\n", a.len()).as_bytes());
        combined.extend_from_slice(a);
        combined.extend_from_slice(format!("Content-Length: {}\r\n\r\n", b.len()).as_bytes());
        combined.extend_from_slice(b);
        theirs.write(&combined).unwrap();

        let mut reader = FrameReader::new(&mut ours);
        assert_eq!(reader.read_message().unwrap()["event"], "thread");
        assert_eq!(reader.read_message().unwrap()["event"], "stopped");
    }

    #[test]
    fn missing_content_length_is_a_protocol_error() {
        let (mut ours, mut theirs) = MemoryChannel::new_pair();
        theirs.write(b"X-Other: 1\r\n\r\n{}").unwrap();
        let mut reader = FrameReader::new(&mut ours);
        match reader.read_message() {
            Err(Error::Protocol(_)) => {}
            other => panic!("expected Protocol error, got {other:?}"),
        }
    }

    #[test]
    fn eof_is_channel_closed() {
        let (mut ours, theirs) = MemoryChannel::new_pair();
        drop(theirs);
        let mut reader = FrameReader::new(&mut ours);
        match reader.read_message() {
            Err(Error::ChannelClosed) => {}
            other => panic!("expected ChannelClosed, got {other:?}"),
        }
    }
}
