//! Thin wrapper around `domain`'s wire-format types for the pieces this
//! proxy actually touches: parsing an inbound query, building its replies,
//! and pulling A-record addresses out of an upstream response.

use std::net::Ipv4Addr;

use domain::base::iana::Rcode;
use domain::base::name::ToName;
use domain::base::{Message, MessageBuilder, ParsedName};
use domain::rdata::AllRecordData;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("message is too short or malformed")]
    Malformed,
    #[error("message does not carry exactly one question")]
    NoQuestion,
}

/// A parsed inbound query, structurally valid but not yet known to carry a
/// usable question section.
pub struct Query {
    inner: Message<Vec<u8>>,
}

impl Query {
    pub fn parse(bytes: &[u8]) -> Result<Self, WireError> {
        let inner = Message::from_octets(bytes.to_vec()).map_err(|_| WireError::Malformed)?;

        Ok(Self { inner })
    }

    pub fn id(&self) -> u16 {
        self.inner.header().id()
    }

    pub fn rd(&self) -> bool {
        self.inner.header().rd()
    }

    /// The lowercase, trailing-dot-stripped name from the sole question.
    ///
    /// `Err(WireError::NoQuestion)` covers both "zero questions" and "more
    /// than one question" — this proxy only ever answers single-question
    /// queries, same as the upstream resolver it forwards to.
    pub fn name(&self) -> Result<String, WireError> {
        let question = self
            .inner
            .sole_question()
            .map_err(|_| WireError::NoQuestion)?;

        let name = question.qname().to_string();

        Ok(name.trim_end_matches('.').to_lowercase())
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.inner.as_slice()
    }

    pub fn nxdomain(&self) -> Vec<u8> {
        self.reply(Rcode::NXDOMAIN)
    }

    /// A reply that echoes the question back with no answers and no error,
    /// used when the upstream exchange itself failed; the query was
    /// policy-allowed, the resolver just didn't answer in time.
    pub fn empty_noerror(&self) -> Vec<u8> {
        self.reply(Rcode::NOERROR)
    }

    fn reply(&self, rcode: Rcode) -> Vec<u8> {
        MessageBuilder::new_vec()
            .start_answer(&self.inner, rcode)
            .expect("vec-backed message builder never fails")
            .into_message()
            .into_octets()
    }
}

/// Builds a header-only reply with no question section, for datagrams that
/// didn't carry exactly one question to begin with.
pub fn minimal_reply(request_id: u16, rd: bool) -> Vec<u8> {
    let mut buf = vec![0u8; 12];
    buf[0..2].copy_from_slice(&request_id.to_be_bytes());

    let mut flags: u16 = 0x8000; // QR = 1, NOERROR
    if rd {
        flags |= 0x0100; // echo RD
    }
    buf[2..4].copy_from_slice(&flags.to_be_bytes());

    buf
}

/// Extracts every A-record address out of a raw, presumably well-formed
/// upstream response. Any parse failure yields no addresses rather than an
/// error — a malformed upstream reply still gets forwarded to the client
/// verbatim, it just contributes nothing to the egress allowlist.
pub fn extract_a_records(bytes: &[u8]) -> Vec<Ipv4Addr> {
    let Ok(message) = Message::from_octets(bytes) else {
        return Vec::new();
    };

    let Ok(answer) = message.answer() else {
        return Vec::new();
    };

    answer
        .filter_map(|record| record.ok())
        .filter_map(|record| {
            record
                .into_any_record::<AllRecordData<_, ParsedName<_>>>()
                .ok()
        })
        .filter_map(|record| match record.into_data() {
            AllRecordData::A(a) => Some(a.addr()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use domain::base::Name;

    use super::*;

    fn query_for(name: &str) -> Query {
        let domain = Name::<Vec<u8>>::vec_from_str(name).expect("valid test domain name");

        let mut builder = MessageBuilder::new_vec().question();
        builder.header_mut().set_rd(true);
        builder
            .push((domain, domain::base::iana::Rtype::A))
            .expect("vec-backed message builder never fails");

        Query {
            inner: builder.into_message(),
        }
    }

    #[test]
    fn extracts_name_lowercased_without_trailing_dot() {
        let query = query_for("Example.COM.");

        assert_eq!(query.name().unwrap(), "example.com");
    }

    #[test]
    fn minimal_reply_preserves_id_and_sets_qr() {
        let reply = minimal_reply(0x1234, true);

        assert_eq!(&reply[0..2], &0x1234u16.to_be_bytes());
        assert_eq!(reply[2] & 0x80, 0x80);
        assert_eq!(reply[2] & 0x01, 0x01);
    }

    #[test]
    fn extract_a_records_ignores_garbage() {
        assert!(extract_a_records(b"not a dns message").is_empty());
    }
}
