use bytes::{Bytes, BytesMut};
use thiserror::Error;

use crate::dns_header::{DnsHeader, HEADER_LEN};
use crate::dns_question::DnsQuestion;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("message truncated in {0}")]
    Truncated(&'static str),
    #[error("label too long: {0}")]
    LabelTooLong(String),
    #[error("invalid UTF-8 in domain label")]
    InvalidLabel,
    #[error("too many compression pointers")]
    PointerLoop,
    #[error("message is not a response")]
    NotResponse,
    #[error("response id {got:#06x} does not match query id {expected:#06x}")]
    IdMismatch { expected: u16, got: u16 },
}

/// The parts of a resolver response the probes care about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub rcode: u8,
    pub answer_count: u16,
    pub truncated: bool,
}

impl Reply {
    pub fn is_success(&self) -> bool {
        self.rcode == 0
    }
}

/// Build a recursive single-question A query for `name`
pub fn build_query(id: u16, name: &str) -> Result<Bytes, WireError> {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + name.len() + 6);

    DnsHeader::query(id, 1).write_to(&mut buf);
    DnsQuestion::a_record(name).write_to(&mut buf)?;

    Ok(buf.freeze())
}

/// Parse a response to the query with id `expected_id`.
/// The question section is walked so a mangled reply is reported as such.
pub fn parse_reply(buf: &[u8], expected_id: u16) -> Result<Reply, WireError> {
    let header = DnsHeader::from_bytes(buf)?;
    let flags = header.flags();

    if !flags.qr {
        return Err(WireError::NotResponse);
    }

    if header.id != expected_id {
        return Err(WireError::IdMismatch {
            expected: expected_id,
            got: header.id,
        });
    }

    // A truncated UDP answer may stop anywhere after the header
    if !flags.tc {
        let mut offset = HEADER_LEN;
        for _ in 0..header.question_count {
            let (_, next) = DnsQuestion::from_bytes(buf, offset)?;
            offset = next;
        }
    }

    Ok(Reply {
        rcode: flags.rcode,
        answer_count: header.answer_count,
        truncated: flags.tc,
    })
}
