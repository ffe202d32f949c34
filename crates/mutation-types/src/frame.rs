//! Wire framing.
//!
//! ```text
//! +----------------+---------------------------+
//! | schema id (BE) | record body               |
//! | 2 bytes        | rest of transport message |
//! +----------------+---------------------------+
//! ```
//!
//! There is no length field; the transport message boundary ends the body.
//! Integrity checking is left to the transport.

use crate::error::{Error, Result};
use crate::registry::SchemaId;
use bytes::{Buf, BufMut};

/// Width of the schema id header.
pub const HEADER_LEN: usize = 2;

/// A decoded frame borrowing its body from the transport payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub schema_id: SchemaId,
    pub body: &'a [u8],
}

/// Prefix a record body with its schema id.
pub fn encode(schema_id: SchemaId, body: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
    frame.put_u16(schema_id);
    frame.put_slice(body);
    frame
}

/// Split a payload into its schema id and record body.
pub fn decode(payload: &[u8]) -> Result<Frame<'_>> {
    if payload.len() < HEADER_LEN {
        return Err(Error::FrameTooShort {
            len: payload.len(),
            header: HEADER_LEN,
        });
    }

    let (mut header, body) = payload.split_at(HEADER_LEN);
    Ok(Frame {
        schema_id: header.get_u16(),
        body,
    })
}
