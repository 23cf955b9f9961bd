use bytes::{Buf, BufMut};

use crate::dns_message::WireError;

pub const HEADER_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsHeader {
    pub id: u16,
    pub flags: u16,
    pub question_count: u16,
    pub answer_count: u16,
    pub authority_count: u16,
    pub additional_count: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DnsFlags {
    pub qr: bool,     // Query/Response (false = query, true = response)
    pub opcode: u8,   // Operation code (0 = standard query)
    pub aa: bool,     // Authoritative Answer
    pub tc: bool,     // Truncation
    pub rd: bool,     // Recursion Desired
    pub ra: bool,     // Recursion Available
    pub z: u8,        // Reserved (must be 0)
    pub rcode: u8,    // Response code (0 = no error, 1 = format error, etc.)
}

impl DnsFlags {
    /// Flags for a plain recursive standard query
    pub fn query() -> Self {
        DnsFlags {
            qr: false,
            opcode: 0,
            aa: false,
            tc: false,
            rd: true,
            ra: false,
            z: 0,
            rcode: 0,
        }
    }

    pub fn to_u16(&self) -> u16 {
        let mut flags: u16 = 0;

        if self.qr { flags |= 1 << 15; }
        flags |= (self.opcode as u16 & 0xF) << 11;
        if self.aa { flags |= 1 << 10; }
        if self.tc { flags |= 1 << 9; }
        if self.rd { flags |= 1 << 8; }
        if self.ra { flags |= 1 << 7; }
        flags |= (self.z as u16 & 0x7) << 4;
        flags |= self.rcode as u16 & 0xF;

        flags
    }

    pub fn from_u16(flags: u16) -> Self {
        DnsFlags {
            qr: (flags & (1 << 15)) != 0,
            opcode: ((flags >> 11) & 0xF) as u8,
            aa: (flags & (1 << 10)) != 0,
            tc: (flags & (1 << 9)) != 0,
            rd: (flags & (1 << 8)) != 0,
            ra: (flags & (1 << 7)) != 0,
            z: ((flags >> 4) & 0x7) as u8,
            rcode: (flags & 0xF) as u8,
        }
    }
}

impl DnsHeader {
    /// Header for a query carrying `question_count` questions and nothing else
    pub fn query(id: u16, question_count: u16) -> Self {
        DnsHeader {
            id,
            flags: DnsFlags::query().to_u16(),
            question_count,
            answer_count: 0,
            authority_count: 0,
            additional_count: 0,
        }
    }

    pub fn from_bytes(mut bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() < HEADER_LEN {
            return Err(WireError::Truncated("header"));
        }

        Ok(DnsHeader {
            id: bytes.get_u16(),
            flags: bytes.get_u16(),
            question_count: bytes.get_u16(),
            answer_count: bytes.get_u16(),
            authority_count: bytes.get_u16(),
            additional_count: bytes.get_u16(),
        })
    }

    pub fn write_to<B: BufMut>(&self, buf: &mut B) {
        buf.put_u16(self.id);
        buf.put_u16(self.flags);
        buf.put_u16(self.question_count);
        buf.put_u16(self.answer_count);
        buf.put_u16(self.authority_count);
        buf.put_u16(self.additional_count);
    }

    pub fn flags(&self) -> DnsFlags {
        DnsFlags::from_u16(self.flags)
    }
}

/// Mnemonic for a response code, as printed in diagnostics
pub fn rcode_name(rcode: u8) -> &'static str {
    match rcode {
        0 => "NOERROR",
        1 => "FORMERR",
        2 => "SERVFAIL",
        3 => "NXDOMAIN",
        4 => "NOTIMP",
        5 => "REFUSED",
        6 => "YXDOMAIN",
        7 => "YXRRSET",
        8 => "NXRRSET",
        9 => "NOTAUTH",
        10 => "NOTZONE",
        _ => "RESERVED",
    }
}
