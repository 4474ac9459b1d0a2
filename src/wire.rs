//! Request decoder and response encoder sitting in front of the dispatcher.
//!
//! Accepts both the line-oriented convenience form (`VERB arg1 arg2\r\n`)
//! and RESP-style arrays (`*N\r\n$len\r\n<payload>\r\n...`), since
//! binary-safe arguments require the latter.
use crate::{error::Error, value::Value};
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// A parsed, not-yet-dispatched command: verb plus arguments.
pub type Request = Vec<Bytes>;

pub struct RequestDecoder;

impl Decoder for RequestDecoder {
    type Item = Request;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        if src[0] == b'*' {
            decode_resp_array(src)
        } else {
            decode_line(src)
        }
    }
}

fn find_crlf(buf: &[u8], from: usize) -> Option<usize> {
    buf[from..].windows(2).position(|w| w == b"\r\n").map(|p| p + from)
}

fn decode_line(src: &mut BytesMut) -> Result<Option<Request>, Error> {
    let end = match find_line_end(src) {
        Some(end) => end,
        None => {
            if src.len() > 512 * 1024 * 1024 {
                return Err(Error::Syntax("request line too long".into()));
            }
            return Ok(None);
        }
    };
    let line = src.split_to(end);
    // consume the line terminator(s)
    let term_len = if src.starts_with(b"\r\n") { 2 } else { 1 };
    src.advance(term_len);

    let line = String::from_utf8_lossy(&line).into_owned();
    let parts: Vec<Bytes> = line
        .split_whitespace()
        .map(|p| Bytes::copy_from_slice(p.as_bytes()))
        .collect();
    if parts.is_empty() {
        return Ok(Some(Vec::new()));
    }
    Ok(Some(parts))
}

fn find_line_end(buf: &[u8]) -> Option<usize> {
    if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
        if pos > 0 && buf[pos - 1] == b'\r' {
            Some(pos - 1)
        } else {
            Some(pos)
        }
    } else {
        None
    }
}

fn decode_resp_array(src: &mut BytesMut) -> Result<Option<Request>, Error> {
    let header_end = match find_crlf(src, 0) {
        Some(e) => e,
        None => return Ok(None),
    };
    let count: i64 = std::str::from_utf8(&src[1..header_end])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::Syntax("invalid multibulk length".into()))?;

    if count <= 0 {
        src.advance(header_end + 2);
        return Ok(Some(Vec::new()));
    }

    let mut cursor = header_end + 2;
    let mut parts = Vec::with_capacity(count as usize);

    for _ in 0..count {
        if cursor >= src.len() || src[cursor] != b'$' {
            if cursor >= src.len() {
                return Ok(None);
            }
            return Err(Error::Syntax("expected bulk string".into()));
        }
        let len_end = match find_crlf(src, cursor) {
            Some(e) => e,
            None => return Ok(None),
        };
        let len: i64 = std::str::from_utf8(&src[cursor + 1..len_end])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Error::Syntax("invalid bulk length".into()))?;
        let payload_start = len_end + 2;
        let payload_end = payload_start + len.max(0) as usize;
        if payload_end + 2 > src.len() {
            return Ok(None);
        }
        parts.push(Bytes::copy_from_slice(&src[payload_start..payload_end]));
        cursor = payload_end + 2;
    }

    src.advance(cursor);
    Ok(Some(parts))
}

pub struct ResponseEncoder;

impl Encoder<Value> for ResponseEncoder {
    type Error = Error;

    fn encode(&mut self, item: Value, dst: &mut BytesMut) -> Result<(), Error> {
        if matches!(item, Value::Ignore) {
            return Ok(());
        }
        let bytes: Vec<u8> = item.into();
        dst.extend_from_slice(&bytes);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decodes_a_line_request() {
        let mut buf = BytesMut::from("SET foo bar\r\n");
        let req = RequestDecoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(vec![Bytes::from("SET"), Bytes::from("foo"), Bytes::from("bar")], req);
        assert!(buf.is_empty());
    }

    #[test]
    fn decodes_a_resp_array() {
        let mut buf = BytesMut::from("*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n");
        let req = RequestDecoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(vec![Bytes::from("GET"), Bytes::from("foo")], req);
        assert!(buf.is_empty());
    }

    #[test]
    fn waits_for_more_bytes_on_partial_resp_array() {
        let mut buf = BytesMut::from("*2\r\n$3\r\nGET\r\n$3\r\nfo");
        assert_eq!(None, RequestDecoder.decode(&mut buf).unwrap());
    }

    #[test]
    fn waits_for_more_bytes_on_partial_line() {
        let mut buf = BytesMut::from("SET foo");
        assert_eq!(None, RequestDecoder.decode(&mut buf).unwrap());
    }

    #[test]
    fn encodes_ok_and_error() {
        let mut buf = BytesMut::new();
        ResponseEncoder.encode(Value::Ok, &mut buf).unwrap();
        assert_eq!(b"+OK\r\n".to_vec(), buf.to_vec());

        let mut buf = BytesMut::new();
        ResponseEncoder
            .encode(Value::Err("ERR".into(), "bad".into()), &mut buf)
            .unwrap();
        assert_eq!(b"-ERR bad\r\n".to_vec(), buf.to_vec());
    }
}
