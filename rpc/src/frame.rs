// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! Length-prefixed framing for request/response messages over a byte
//! stream: a 4-byte big-endian length header followed by a `bincode`-
//! encoded body over this crate's `serde`/`bincode` ambient stack
//! (`SPEC_FULL.md` §B).

use std::io::{self, Read, Write};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::RpcError;

const BINCODE_CONFIG: bincode::config::Configuration = bincode::config::standard();

/// Reads one length-prefixed frame from `reader`. Returns `Ok(None)` on a
/// clean EOF before any header byte is read; any other truncation is an
/// error.
pub fn read_frame<T: DeserializeOwned>(mut reader: impl Read) -> Result<Option<T>, RpcError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(RpcError::Io(e)),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    let (value, _) = bincode::serde::decode_from_slice(&body, BINCODE_CONFIG)
        .map_err(|e| RpcError::Encoding(format!("decoding frame body: {e}")))?;
    Ok(Some(value))
}

/// Writes one length-prefixed frame to `writer`.
pub fn write_frame<T: Serialize>(mut writer: impl Write, value: &T) -> Result<(), RpcError> {
    let body = bincode::serde::encode_to_vec(value, BINCODE_CONFIG)
        .map_err(|e| RpcError::Encoding(format!("encoding frame body: {e}")))?;
    writer.write_all(&(body.len() as u32).to_be_bytes())?;
    writer.write_all(&body)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RpcRequest;

    #[test]
    fn roundtrips_a_frame() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &RpcRequest::TipStatus).unwrap();
        let decoded: RpcRequest = read_frame(&mut buf.as_slice()).unwrap().unwrap();
        assert!(matches!(decoded, RpcRequest::TipStatus));
    }

    #[test]
    fn empty_stream_yields_none() {
        let decoded: Option<RpcRequest> = read_frame(&mut [].as_slice()).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn two_frames_stream_sequentially() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &RpcRequest::Ping).unwrap();
        write_frame(&mut buf, &RpcRequest::Property { property: 31 }).unwrap();
        let mut cursor = io::Cursor::new(&buf);
        let first: RpcRequest = read_frame(&mut cursor).unwrap().unwrap();
        let second: RpcRequest = read_frame(&mut cursor).unwrap().unwrap();
        assert!(matches!(first, RpcRequest::Ping));
        assert!(matches!(second, RpcRequest::Property { property: 31 }));
    }
}
