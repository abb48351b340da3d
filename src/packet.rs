//! The `Packet` collaborator produced by an external dissector
//!
//! Capture, wire dissection, and SIP/SDP/RTP/RTCP parsing are out of scope
//! for this crate. This module only defines the shape of the
//! already-parsed records the dissector hands to [`crate::Store`].

use std::net::SocketAddr;

/// An already-dissected packet, carrying zero or more decoded protocol
/// records alongside the wire-level addresses and raw payload.
#[derive(Debug, Clone)]
pub struct Packet {
    pub src: SocketAddr,
    pub dst: SocketAddr,
    /// Capture timestamp in milliseconds, monotonic within a capture.
    pub timestamp: u64,
    pub payload: Vec<u8>,
    pub records: ProtocolRecords,
}

/// The fixed set of protocol records a dissector may attach to a packet.
/// A struct rather than a generic map: exactly these four protocols
/// reach the correlation core and nothing else.
#[derive(Debug, Clone, Default)]
pub struct ProtocolRecords {
    pub sip: Option<SipRecord>,
    pub sdp: Option<SdpRecord>,
    pub rtp: Option<RtpRecord>,
    pub rtcp: Option<RtcpRecord>,
}

/// SIP request/response code, distinguishing the two over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReqResp {
    Request(Method),
    Response(u16),
}

/// SIP request methods relevant to call/dialog correlation.
///
/// Declaration order doubles as the `reqresp` total order the admission
/// rules compare against: `reqresp > Message` means "not a dialog-initiating
/// request". `Invite`, `Subscribe`, and `Refer` create a dialog and sort at
/// or before `Message`; everything after it is a request that only ever
/// occurs inside an existing dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Method {
    Invite,
    Subscribe,
    Refer,
    Message,
    Ack,
    Bye,
    Cancel,
    Options,
    Register,
    Prack,
    Notify,
    Publish,
    Info,
    Update,
}

impl ReqResp {
    /// True for any final (2xx–6xx) response.
    pub fn is_final_response(self) -> bool {
        matches!(self, ReqResp::Response(code) if code >= 200)
    }

    pub fn is_provisional(self) -> bool {
        matches!(self, ReqResp::Response(code) if (100..200).contains(&code))
    }

    pub fn is_response(self) -> bool {
        matches!(self, ReqResp::Response(_))
    }

    pub fn method(self) -> Option<Method> {
        match self {
            ReqResp::Request(m) => Some(m),
            ReqResp::Response(_) => None,
        }
    }

    /// True for a response, or for a request that can only occur inside an
    /// already-established dialog.
    pub fn is_non_dialog_initiating(self) -> bool {
        self > ReqResp::Request(Method::Message)
    }
}

/// Already-parsed SIP header fields relevant to correlation.
#[derive(Debug, Clone)]
pub struct SipRecord {
    pub callid: String,
    pub xcallid: Option<String>,
    pub from: String,
    pub to: String,
    pub cseq: u32,
    /// The method named in the `CSeq` header, e.g. `CSeq: 1 INVITE`. Present
    /// on requests and responses alike: a response's `CSeq` names the method
    /// of the request it answers, which is not always `reqresp`'s own method
    /// (a CANCEL shares its CSeq *number* with the INVITE it cancels, per
    /// RFC 3261 9.1, but carries its own method tag).
    pub cseq_method: Method,
    pub reqresp: ReqResp,
    pub resp_str: Option<String>,
}

/// A single SDP media descriptor, already parsed from the session body.
#[derive(Debug, Clone)]
pub struct SdpMediaDescriptor {
    pub media_type: String,
    pub address: std::net::IpAddr,
    pub rtp_port: u16,
    pub rtcp_port: Option<u16>,
}

/// Already-parsed SDP payload: the session's announced media descriptors.
#[derive(Debug, Clone, Default)]
pub struct SdpRecord {
    pub media: Vec<SdpMediaDescriptor>,
}

/// Already-parsed RTP header fields relevant to stream correlation.
#[derive(Debug, Clone, Copy)]
pub struct RtpRecord {
    /// RTP payload type identifying the codec in use.
    pub format: u8,
}

/// RTCP is correlated by address alone; no header field is read.
#[derive(Debug, Clone, Copy, Default)]
pub struct RtcpRecord;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_ordering_places_dialog_initiating_requests_at_or_before_message() {
        assert!(Method::Invite < Method::Message);
        assert!(Method::Ack > Method::Message);
        assert!(Method::Bye > Method::Message);
    }

    #[test]
    fn reqresp_classifies_responses() {
        assert!(ReqResp::Response(100).is_provisional());
        assert!(!ReqResp::Response(100).is_final_response());
        assert!(ReqResp::Response(200).is_final_response());
        assert!(!ReqResp::Request(Method::Invite).is_response());
    }

    #[test]
    fn complete_filter_semantics_match_dialog_initiating_requests() {
        assert!(!ReqResp::Request(Method::Invite).is_non_dialog_initiating());
        assert!(!ReqResp::Request(Method::Subscribe).is_non_dialog_initiating());
        assert!(!ReqResp::Request(Method::Message).is_non_dialog_initiating());
        assert!(ReqResp::Request(Method::Bye).is_non_dialog_initiating());
        assert!(ReqResp::Request(Method::Options).is_non_dialog_initiating());
        assert!(ReqResp::Response(200).is_non_dialog_initiating());
    }
}
