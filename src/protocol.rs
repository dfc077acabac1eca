//! Wire format of the stdio bridge.
//!
//! A request is one JSON header line, `{"clientId": "...", "len": N}`, followed by
//! exactly `N` raw bytes of an encoded frame. Every request is answered with one JSON
//! line, `{"clientId": ..., "boxes": [...]}`, flushed immediately.

use std::io::{self, BufRead, Read, Write};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Parsed request header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHeader {
    pub client_id: Option<String>,
    /// Declared payload length. Zero or negative means "no frame".
    pub len: i64,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("header is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("header is not a JSON object")]
    NotAnObject,
    #[error("invalid len {raw} for client {client_id:?}")]
    InvalidLength {
        client_id: Option<String>,
        raw: String,
    },
}

impl FrameError {
    /// Client id recovered before the failure, if any.
    pub fn client_id(&self) -> Option<&str> {
        match self {
            FrameError::InvalidLength { client_id, .. } => client_id.as_deref(),
            _ => None,
        }
    }
}

impl RequestHeader {
    pub fn parse(line: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(line.trim())?;
        let object = value.as_object().ok_or(FrameError::NotAnObject)?;

        // clientId first so it can be echoed even when len is unusable.
        let client_id = match object.get("clientId") {
            Some(Value::String(id)) => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        };
        let len = match object.get("len") {
            None | Some(Value::Null) => Some(0),
            Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(truncate)),
            Some(Value::String(s)) => parse_len(s),
            Some(_) => None,
        };
        match len {
            Some(len) => Ok(Self { client_id, len }),
            None => Err(FrameError::InvalidLength {
                client_id,
                raw: object
                    .get("len")
                    .map(Value::to_string)
                    .unwrap_or_default(),
            }),
        }
    }
}

fn parse_len(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    raw.parse::<i64>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().filter(|f| f.is_finite()).map(truncate))
}

fn truncate(value: f64) -> i64 {
    // `as` saturates at the i64 bounds; NaN becomes 0.
    value.trunc() as i64
}

/// One bounding box on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxRecord {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub conf: f32,
    #[serde(rename = "class")]
    pub class_id: usize,
    pub name: String,
    /// Track ID, `null` when tracking was not used.
    pub id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    #[serde(rename = "clientId")]
    pub client_id: Option<String>,
    pub boxes: Vec<BoxRecord>,
}

impl Response {
    pub fn new(client_id: Option<String>, boxes: Vec<BoxRecord>) -> Self {
        Self { client_id, boxes }
    }

    pub fn empty(client_id: Option<String>) -> Self {
        Self::new(client_id, Vec::new())
    }
}

/// Outcome of reading a frame payload.
#[derive(Debug)]
pub enum Payload {
    Complete(Vec<u8>),
    /// Input ended after this many bytes.
    Short(usize),
}

/// Longest header line accepted, terminator included.
pub const MAX_HEADER_BYTES: u64 = 64 * 1024;

/// Outcome of reading a header line.
#[derive(Debug, PartialEq, Eq)]
pub enum HeaderLine {
    /// The line without its terminator.
    Line(String),
    /// No newline within `MAX_HEADER_BYTES`; the rest of the line was skipped.
    TooLong(u64),
}

/// Read the next header line. `None` at end of input.
///
/// Invalid UTF-8 is replaced rather than rejected so a garbled header only costs
/// that request. At most `MAX_HEADER_BYTES` are buffered.
pub fn read_header<R: BufRead>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> io::Result<Option<HeaderLine>> {
    buf.clear();
    let read = reader
        .by_ref()
        .take(MAX_HEADER_BYTES)
        .read_until(b'\n', buf)?;
    if read == 0 {
        return Ok(None);
    }
    if read as u64 == MAX_HEADER_BYTES && buf.last() != Some(&b'\n') {
        let skipped = skip_line(reader)?;
        return Ok(Some(HeaderLine::TooLong(read as u64 + skipped)));
    }
    let line = String::from_utf8_lossy(buf);
    Ok(Some(HeaderLine::Line(
        line.trim_end_matches(['\r', '\n']).to_string(),
    )))
}

/// Consume input up to and including the next newline without buffering it.
fn skip_line<R: BufRead>(reader: &mut R) -> io::Result<u64> {
    let mut skipped = 0u64;
    loop {
        let available = match reader.fill_buf() {
            Ok(available) => available,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        if available.is_empty() {
            return Ok(skipped);
        }
        match available.iter().position(|&b| b == b'\n') {
            Some(end) => {
                reader.consume(end + 1);
                return Ok(skipped + end as u64 + 1);
            }
            None => {
                let len = available.len();
                reader.consume(len);
                skipped += len as u64;
            }
        }
    }
}

/// Read exactly `len` bytes, or report how many arrived before end of input.
pub fn read_payload<R: Read>(reader: &mut R, len: u64) -> io::Result<Payload> {
    let mut payload = Vec::with_capacity(len.min(1 << 20) as usize);
    reader.by_ref().take(len).read_to_end(&mut payload)?;
    if (payload.len() as u64) < len {
        Ok(Payload::Short(payload.len()))
    } else {
        Ok(Payload::Complete(payload))
    }
}

/// Consume `len` bytes without buffering them. Returns how many were consumed.
pub fn discard_payload<R: Read>(reader: &mut R, len: u64) -> io::Result<u64> {
    io::copy(&mut reader.by_ref().take(len), &mut io::sink())
}

pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> io::Result<()> {
    serde_json::to_writer(&mut *writer, response).map_err(io::Error::from)?;
    writer.write_all(b"\n")?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn len_accepts_numbers_floats_and_strings() {
        let header = RequestHeader::parse(r#"{"clientId":"a","len":12}"#).unwrap();
        assert_eq!(header, RequestHeader { client_id: Some("a".into()), len: 12 });
        assert_eq!(RequestHeader::parse(r#"{"clientId":"a","len":12.9}"#).unwrap().len, 12);
        assert_eq!(RequestHeader::parse(r#"{"clientId":"a","len":" 7 "}"#).unwrap().len, 7);
        assert_eq!(RequestHeader::parse(r#"{"clientId":"a"}"#).unwrap().len, 0);
        assert_eq!(RequestHeader::parse(r#"{"clientId":"a","len":-3}"#).unwrap().len, -3);
    }

    #[test]
    fn bad_len_keeps_client_id() {
        let err = RequestHeader::parse(r#"{"clientId":"cam-2","len":"lots"}"#).unwrap_err();
        assert_eq!(err.client_id(), Some("cam-2"));
    }

    #[test]
    fn non_object_headers_are_rejected() {
        assert!(matches!(
            RequestHeader::parse("[1,2]"),
            Err(FrameError::NotAnObject)
        ));
        let err = RequestHeader::parse("not json").unwrap_err();
        assert!(matches!(err, FrameError::InvalidJson(_)));
        assert_eq!(err.client_id(), None);
    }

    #[test]
    fn response_field_names_and_order() {
        let response = Response::new(
            Some("c1".into()),
            vec![BoxRecord {
                x1: 1.0,
                y1: 2.0,
                x2: 3.0,
                y2: 4.0,
                conf: 0.5,
                class_id: 2,
                name: "car".into(),
                id: None,
            }],
        );
        let mut out = Vec::new();
        write_response(&mut out, &response).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\"clientId\":\"c1\",\"boxes\":[{\"x1\":1.0,\"y1\":2.0,\"x2\":3.0,\"y2\":4.0,\"conf\":0.5,\"class\":2,\"name\":\"car\",\"id\":null}]}\n"
        );
    }

    #[test]
    fn short_payload_is_reported() {
        let mut input = Cursor::new(vec![1u8, 2, 3]);
        match read_payload(&mut input, 10).unwrap() {
            Payload::Short(n) => assert_eq!(n, 3),
            other => panic!("expected short read, got {:?}", other),
        }
    }

    #[test]
    fn header_strips_line_endings() {
        let mut input = Cursor::new(b"{\"len\":0}\r\nrest".to_vec());
        let mut buf = Vec::new();
        assert_eq!(
            read_header(&mut input, &mut buf).unwrap(),
            Some(HeaderLine::Line("{\"len\":0}".into()))
        );
        assert_eq!(
            read_header(&mut input, &mut buf).unwrap(),
            Some(HeaderLine::Line("rest".into()))
        );
        assert_eq!(read_header(&mut input, &mut buf).unwrap(), None);
    }

    #[test]
    fn overlong_header_is_skipped_to_next_line() {
        let long = MAX_HEADER_BYTES as usize + 500;
        let mut bytes = vec![b'{'; long];
        bytes.extend_from_slice(b"\nnext\n");
        let mut input = Cursor::new(bytes);
        let mut buf = Vec::new();
        assert_eq!(
            read_header(&mut input, &mut buf).unwrap(),
            Some(HeaderLine::TooLong(long as u64 + 1))
        );
        assert!(buf.len() as u64 <= MAX_HEADER_BYTES);
        assert_eq!(
            read_header(&mut input, &mut buf).unwrap(),
            Some(HeaderLine::Line("next".into()))
        );
    }
}
