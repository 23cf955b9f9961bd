use bytes::BufMut;

use crate::dns_message::WireError;

pub const TYPE_A: u16 = 1;
pub const CLASS_IN: u16 = 1;

const MAX_LABEL_LEN: usize = 63;
const MAX_POINTER_JUMPS: usize = 5;

/// DNS Question Section
/// Format: QNAME + QTYPE (2 bytes) + QCLASS (2 bytes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsQuestion {
    pub name: String,
    pub qtype: u16,
    pub qclass: u16,
}

impl DnsQuestion {
    /// Internet-class A question for `name`
    pub fn a_record(name: &str) -> Self {
        DnsQuestion {
            name: name.trim_end_matches('.').to_string(),
            qtype: TYPE_A,
            qclass: CLASS_IN,
        }
    }

    /// Parse a DNS question from bytes starting at the given offset
    /// Returns the question and the new offset after parsing
    pub fn from_bytes(bytes: &[u8], offset: usize) -> Result<(Self, usize), WireError> {
        let (name, offset) = parse_domain_name(bytes, offset)?;

        if offset + 4 > bytes.len() {
            return Err(WireError::Truncated("question"));
        }

        let qtype = u16::from_be_bytes([bytes[offset], bytes[offset + 1]]);
        let qclass = u16::from_be_bytes([bytes[offset + 2], bytes[offset + 3]]);

        Ok((
            DnsQuestion {
                name,
                qtype,
                qclass,
            },
            offset + 4,
        ))
    }

    pub fn write_to<B: BufMut>(&self, buf: &mut B) -> Result<(), WireError> {
        encode_domain_name(&self.name, buf)?;
        buf.put_u16(self.qtype);
        buf.put_u16(self.qclass);
        Ok(())
    }
}

/// Parse a domain name from DNS message format, following compression pointers.
/// Returns the dotted name and the offset just past the name at its original position.
pub fn parse_domain_name(bytes: &[u8], mut offset: usize) -> Result<(String, usize), WireError> {
    let mut labels = Vec::new();
    let mut resume_at = None;
    let mut jumps = 0;

    loop {
        let length = *bytes.get(offset).ok_or(WireError::Truncated("name"))?;

        if (length & 0xC0) == 0xC0 {
            let low = *bytes.get(offset + 1).ok_or(WireError::Truncated("name pointer"))?;

            if resume_at.is_none() {
                resume_at = Some(offset + 2);
            }

            jumps += 1;
            if jumps > MAX_POINTER_JUMPS {
                return Err(WireError::PointerLoop);
            }

            offset = u16::from_be_bytes([length & 0x3F, low]) as usize;
            continue;
        }

        offset += 1;

        if length == 0 {
            break;
        }

        let end = offset + length as usize;
        let label = bytes.get(offset..end).ok_or(WireError::Truncated("label"))?;
        let label = std::str::from_utf8(label).map_err(|_| WireError::InvalidLabel)?;

        labels.push(label.to_string());
        offset = end;
    }

    let name = if labels.is_empty() {
        ".".to_string()
    } else {
        labels.join(".")
    };

    Ok((name, resume_at.unwrap_or(offset)))
}

/// Encode a domain name as length-prefixed labels terminated with a null byte.
/// Example: "example.com" -> [7]example[3]com[0]
pub fn encode_domain_name<B: BufMut>(name: &str, buf: &mut B) -> Result<(), WireError> {
    for label in name.split('.').filter(|label| !label.is_empty()) {
        if label.len() > MAX_LABEL_LEN {
            return Err(WireError::LabelTooLong(label.to_string()));
        }

        buf.put_u8(label.len() as u8);
        buf.put_slice(label.as_bytes());
    }

    buf.put_u8(0);
    Ok(())
}
