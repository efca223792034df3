//! pkt-line framing.
//!
//! Every line is prefixed with its total length (prefix included) as four
//! lowercase hex digits. `0000` is a flush packet and carries no payload;
//! an empty data line is `0004`. `0001` and `0002` are the delimiter and
//! response-end packets of protocol v2.

use crate::{GitError, Result};
use std::fmt;
use std::io::{Read, Write};

/// Largest total packet length, length prefix included.
pub const MAX_PKT_LEN: usize = 65520;

/// Largest payload that fits in one packet.
pub const MAX_PAYLOAD_LEN: usize = MAX_PKT_LEN - 4;

/// One decoded packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktLine {
    /// Payload bytes, header stripped. May be empty (`0004`).
    Data(Vec<u8>),
    /// `0000`
    Flush,
    /// `0001`
    Delimiter,
    /// `0002`
    ResponseEnd,
}

impl PktLine {
    pub fn from_string(text: &str) -> Self {
        PktLine::Data(text.into())
    }

    /// Full wire form, header included. Oversized payloads are an error
    /// rather than being split or cut.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let special: &[u8; 4] = match self {
            PktLine::Data(payload) => {
                let mut wire = length_prefix(payload.len())?.to_vec();
                wire.extend_from_slice(payload);
                return Ok(wire);
            }
            PktLine::Flush => b"0000",
            PktLine::Delimiter => b"0001",
            PktLine::ResponseEnd => b"0002",
        };
        Ok(special.to_vec())
    }

    pub fn is_flush(&self) -> bool {
        *self == PktLine::Flush
    }

    /// Payload of a data packet.
    pub fn data(&self) -> Option<&[u8]> {
        if let PktLine::Data(payload) = self {
            Some(payload)
        } else {
            None
        }
    }

    /// UTF-8 payload without its line terminator. `None` for special
    /// packets and for payloads that are not UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        let text = std::str::from_utf8(self.data()?).ok()?;
        Some(text.strip_suffix('\n').unwrap_or(text))
    }
}

/// Renders the 4-digit header for a payload of `payload_len` bytes.
fn length_prefix(payload_len: usize) -> Result<[u8; 4]> {
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(GitError::InvalidPktLine(format!(
            "payload of {} bytes exceeds {}",
            payload_len, MAX_PAYLOAD_LEN
        )));
    }
    let mut prefix = [0u8; 4];
    prefix.copy_from_slice(format!("{:04x}", payload_len + 4).as_bytes());
    Ok(prefix)
}

/// Decodes a 4-digit hex header. Both letter cases are accepted.
fn decode_length(header: [u8; 4]) -> Result<usize> {
    header.iter().try_fold(0usize, |acc, &digit| {
        let nibble = (digit as char).to_digit(16).ok_or_else(|| {
            GitError::InvalidPktLine(format!("bad length header {:?}", String::from_utf8_lossy(&header)))
        })?;
        Ok(acc * 16 + nibble as usize)
    })
}

/// Pulls packets off any `Read`.
pub struct PktLineReader<R> {
    reader: R,
}

impl<R: Read> PktLineReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Reads the next packet, or `None` at a clean end of input.
    pub fn read(&mut self) -> Result<Option<PktLine>> {
        let mut header = [0u8; 4];
        if let Err(e) = self.reader.read_exact(&mut header) {
            return match e.kind() {
                std::io::ErrorKind::UnexpectedEof => Ok(None),
                _ => Err(e.into()),
            };
        }

        let packet = match decode_length(header)? {
            0 => PktLine::Flush,
            1 => PktLine::Delimiter,
            2 => PktLine::ResponseEnd,
            3 => {
                return Err(GitError::InvalidPktLine(
                    "length 3 is shorter than its own header".into(),
                ))
            }
            total if total > MAX_PKT_LEN => {
                return Err(GitError::InvalidPktLine(format!(
                    "length {} is over the {} limit",
                    total, MAX_PKT_LEN
                )))
            }
            total => {
                let mut payload = vec![0u8; total - 4];
                self.reader.read_exact(&mut payload)?;
                PktLine::Data(payload)
            }
        };
        Ok(Some(packet))
    }

    /// Collects data packets up to the next flush or end of input. The
    /// flush itself is consumed.
    pub fn read_until_flush(&mut self) -> Result<Vec<PktLine>> {
        let mut packets = Vec::new();
        loop {
            match self.read()? {
                Some(PktLine::Flush) | None => break,
                Some(pkt) => packets.push(pkt),
            }
        }
        Ok(packets)
    }

    /// The source, positioned after the last packet read. Pack data follows
    /// the command list on the same stream.
    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Frames packets onto any `Write`.
///
/// Each packet reaches the underlying writer as one `write_all` call, so at
/// most one line is held in memory at a time.
pub struct PktLineWriter<W> {
    writer: W,
}

impl<W: Write> PktLineWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn write(&mut self, pkt: &PktLine) -> Result<()> {
        self.writer.write_all(&pkt.encode()?)?;
        Ok(())
    }

    /// Frames `data` verbatim; no newline is added.
    pub fn write_data(&mut self, data: &[u8]) -> Result<()> {
        let mut frame = Vec::with_capacity(data.len() + 4);
        frame.extend_from_slice(&length_prefix(data.len())?);
        frame.extend_from_slice(data);
        self.writer.write_all(&frame)?;
        Ok(())
    }

    /// Writes text exactly as given; an empty string becomes `0004`.
    pub fn write_text(&mut self, text: &str) -> Result<()> {
        self.write_data(text.as_bytes())
    }

    /// Formats and writes one line, e.g. `write_fmt(format_args!("# service={}\n", name))`.
    pub fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> Result<()> {
        match args.as_str() {
            Some(text) => self.write_text(text),
            None => self.write_text(&args.to_string()),
        }
    }

    /// Writes a string line, appending a newline if missing.
    pub fn write_line(&mut self, s: &str) -> Result<()> {
        if s.ends_with('\n') {
            self.write_text(s)
        } else {
            self.write_fmt(format_args!("{}\n", s))
        }
    }

    /// Writes a side-band packet on `channel` (1 data, 2 progress, 3 error).
    pub fn write_sideband(&mut self, channel: u8, data: &[u8]) -> Result<()> {
        let mut frame = Vec::with_capacity(data.len() + 5);
        frame.extend_from_slice(&length_prefix(data.len() + 1)?);
        frame.push(channel);
        frame.extend_from_slice(data);
        self.writer.write_all(&frame)?;
        Ok(())
    }

    /// Emits `0000`.
    pub fn flush_pkt(&mut self) -> Result<()> {
        self.writer.write_all(b"0000")?;
        Ok(())
    }

    /// Flushes the sink, not a pkt-line flush.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Raw access for pack bytes that follow the framed section.
    pub fn inner_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn special_packets_encode_to_their_codes() {
        assert_eq!(PktLine::from_string("hello\n").encode().unwrap(), b"000ahello\n");
        assert_eq!(PktLine::Flush.encode().unwrap(), b"0000");
        assert_eq!(PktLine::Delimiter.encode().unwrap(), b"0001");
        assert_eq!(PktLine::ResponseEnd.encode().unwrap(), b"0002");
    }

    #[test]
    fn empty_line_is_not_flush() {
        let mut buf = Vec::new();
        {
            let mut writer = PktLineWriter::new(&mut buf);
            writer.write_text("").unwrap();
            writer.flush_pkt().unwrap();
        }
        assert_eq!(buf, b"00040000");

        let mut reader = PktLineReader::new(Cursor::new(buf));
        assert_eq!(reader.read().unwrap(), Some(PktLine::Data(Vec::new())));
        assert_eq!(reader.read().unwrap(), Some(PktLine::Flush));
        assert_eq!(reader.read().unwrap(), None);
    }

    #[test]
    fn service_header_length() {
        let mut buf = Vec::new();
        let mut writer = PktLineWriter::new(&mut buf);
        writer
            .write_fmt(format_args!("# service={}\n", "git-upload-pack"))
            .unwrap();
        assert_eq!(buf, b"001e# service=git-upload-pack\n");
    }

    #[test]
    fn header_hex_is_lowercase() {
        let mut buf = Vec::new();
        PktLineWriter::new(&mut buf)
            .write_data(&[b'x'; 0xab - 4])
            .unwrap();
        assert_eq!(&buf[..4], b"00ab");
    }

    #[test]
    fn max_payload_is_accepted_one_more_is_not() {
        let mut buf = Vec::new();
        let mut writer = PktLineWriter::new(&mut buf);
        writer.write_data(&vec![0u8; MAX_PAYLOAD_LEN]).unwrap();
        assert_eq!(&buf[..4], b"fff0");

        let mut writer = PktLineWriter::new(Vec::new());
        let err = writer.write_data(&vec![0u8; MAX_PAYLOAD_LEN + 1]).unwrap_err();
        assert!(matches!(err, GitError::InvalidPktLine(_)));
        assert!(writer.into_inner().is_empty());
        assert!(PktLine::Data(vec![0u8; MAX_PAYLOAD_LEN + 1]).encode().is_err());
    }

    #[test]
    fn sideband_length_counts_channel_byte() {
        let mut buf = Vec::new();
        PktLineWriter::new(&mut buf).write_sideband(1, b"abc").unwrap();
        assert_eq!(buf, b"0008\x01abc");

        let mut writer = PktLineWriter::new(Vec::new());
        assert!(writer.write_sideband(1, &vec![0u8; MAX_PAYLOAD_LEN]).is_err());
    }

    #[test]
    fn writer_output_reads_back() {
        let packets = vec![
            PktLine::from_string("hello\n"),
            PktLine::from_string("world\n"),
            PktLine::Flush,
        ];

        let mut buf = Vec::new();
        {
            let mut writer = PktLineWriter::new(&mut buf);
            for pkt in &packets {
                writer.write(pkt).unwrap();
            }
        }

        let mut reader = PktLineReader::new(Cursor::new(buf));
        assert_eq!(reader.read().unwrap(), Some(packets[0].clone()));
        assert_eq!(reader.read().unwrap(), Some(packets[1].clone()));
        assert_eq!(reader.read().unwrap(), Some(PktLine::Flush));
    }

    #[test]
    fn as_str_trims_one_newline() {
        assert_eq!(PktLine::from_string("hello\n").as_str(), Some("hello"));
        assert_eq!(PktLine::from_string("no newline").as_str(), Some("no newline"));
        assert!(PktLine::Data(vec![0xff, 0xfe]).as_str().is_none());
        assert_eq!(PktLine::from_string("two\n\n").as_str(), Some("two\n"));
        assert!(PktLine::Flush.as_str().is_none());
    }

    #[test]
    fn read_until_flush_leaves_rest() {
        let mut buf = Vec::new();
        {
            let mut writer = PktLineWriter::new(&mut buf);
            writer.write_line("line1").unwrap();
            writer.write_line("line2\n").unwrap();
            writer.flush_pkt().unwrap();
            writer.write_line("line3").unwrap();
        }

        let mut reader = PktLineReader::new(Cursor::new(buf));
        let packets = reader.read_until_flush().unwrap();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[1].as_str(), Some("line2"));
        assert_eq!(reader.read().unwrap().unwrap().as_str(), Some("line3"));
    }

    #[test]
    fn bad_headers_are_errors() {
        for bad in [&b"0003"[..], b"zzzz", b"fff1", b"-001", b"00 4"] {
            let mut reader = PktLineReader::new(Cursor::new(bad.to_vec()));
            assert!(reader.read().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn truncated_payload_is_io_error() {
        let mut reader = PktLineReader::new(Cursor::new(b"000ahel".to_vec()));
        assert!(matches!(reader.read(), Err(GitError::Io(_))));
    }

    #[test]
    fn uppercase_header_is_read() {
        let mut reader = PktLineReader::new(Cursor::new(b"000Ahello\n".to_vec()));
        assert_eq!(reader.read().unwrap().unwrap().as_str(), Some("hello"));
    }

    #[test]
    fn empty_input_is_clean_eof() {
        let mut reader = PktLineReader::new(Cursor::new(Vec::<u8>::new()));
        assert!(reader.read().unwrap().is_none());
    }
}
