//! Call, Message, and Stream: the data model owned by the Call Store
//!
//! A Call owns its Messages and Streams in place: the Call Store's arena
//! owns all Calls, and each Call owns its own Messages and Streams. Back
//! references (Message → Call, Stream → Message/Call) are plain indices into
//! the owning Call's own vectors, never a pointer back into the arena.

use std::net::SocketAddr;

use strum_macros::Display;

use crate::packet::ReqResp;

/// A non-owning handle identifying a Call inside the Store's arena.
///
/// Carries a generation counter so a handle captured before a `rotate` or
/// `clear` can never be mistaken for a different Call that later reuses the
/// same slot — the non-owning back-reference is dropped implicitly once the
/// Call is evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallHandle {
    pub(crate) slot: usize,
    pub(crate) generation: u64,
}

/// Call lifecycle state, derived from message history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "PascalCase")]
pub enum CallState {
    Calling,
    InCall,
    Completed,
    Cancelled,
    Rejected,
    BusyLine,
    Diverted,
}

impl CallState {
    /// "Active" means in-progress: not yet completed, cancelled, rejected,
    /// or diverted.
    pub fn is_active(self) -> bool {
        matches!(self, CallState::Calling | CallState::InCall)
    }
}

/// One SIP message admitted into a Call.
#[derive(Debug, Clone)]
pub struct Message {
    pub cseq: u32,
    /// The method named in this message's own `CSeq` header; see
    /// [`crate::packet::SipRecord::cseq_method`].
    pub cseq_method: crate::packet::Method,
    pub from: String,
    pub to: String,
    pub reqresp: ReqResp,
    pub resp_str: Option<String>,
    /// Capture timestamp of the originating packet.
    pub timestamp: u64,
    /// Raw payload, retained unless `CaptureOptions::storage_mode` is
    /// `HeadersOnly`.
    pub payload: Option<Vec<u8>>,
    /// Index into the owning Call's `messages` of an earlier, identical
    /// message, if this one is a retransmission.
    pub retrans_of: Option<usize>,
}

/// RTP or RTCP, as distinguished by a Stream's `kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Rtp,
    Rtcp,
}

/// A media stream grouped by 4-tuple.
#[derive(Debug, Clone)]
pub struct Stream {
    /// Index into the owning Call's `messages` of the SDP-bearing message
    /// that announced this stream's destination.
    pub announcing_message: usize,
    pub kind: StreamKind,
    pub dst: SocketAddr,
    /// Known only once the first packet for this stream has been observed.
    pub src: Option<SocketAddr>,
    /// RTP payload type. Unset until the first packet binds it.
    pub fmtcode: Option<u8>,
    pub packet_count: u64,
    pub byte_count: u64,
}

impl Stream {
    pub fn new(kind: StreamKind, dst: SocketAddr, announcing_message: usize) -> Self {
        Stream {
            announcing_message,
            kind,
            dst,
            src: None,
            fmtcode: None,
            packet_count: 0,
            byte_count: 0,
        }
    }

    /// True once `src` has been bound by an observed packet.
    pub fn is_complete(&self) -> bool {
        self.src.is_some()
    }

    pub fn record_packet(&mut self, bytes: usize) {
        self.packet_count += 1;
        self.byte_count += bytes as u64;
    }
}

/// A correlated SIP dialog and its messages/streams.
#[derive(Debug, Clone)]
pub struct Call {
    pub callid: String,
    pub xcallid: Option<String>,
    pub index: u64,
    pub state: CallState,
    pub locked: bool,
    pub from: String,
    pub to: String,
    pub messages: Vec<Message>,
    pub streams: Vec<Stream>,
    /// Call-IDs of children linked via their `X-Call-ID` header.
    pub children: Vec<String>,
}

impl Call {
    pub fn new(index: u64, callid: String) -> Self {
        Call {
            callid,
            xcallid: None,
            index,
            state: CallState::Calling,
            locked: false,
            from: String::new(),
            to: String::new(),
            messages: Vec::new(),
            streams: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Timestamp of the first admitted message, if any.
    pub fn start_time(&self) -> Option<u64> {
        self.messages.first().map(|m| m.timestamp)
    }

    /// Wall-clock span from first to last message, in the same time units
    /// as `Packet::timestamp` (milliseconds).
    pub fn duration(&self) -> u64 {
        match (self.messages.first(), self.messages.last()) {
            (Some(first), Some(last)) => last.timestamp.saturating_sub(first.timestamp),
            _ => 0,
        }
    }

    /// Finds a stream by exact (dst, src, kind) 4-tuple.
    pub fn find_stream(&self, dst: SocketAddr, src: SocketAddr, kind: StreamKind) -> Option<usize> {
        self.streams
            .iter()
            .position(|s| s.kind == kind && s.dst == dst && s.src == Some(src))
    }

    /// Finds a stream whose destination matches and whose source either
    /// matches `src` or is not yet bound.
    pub fn find_by_format(&self, dst: SocketAddr, src: SocketAddr, kind: StreamKind) -> Option<usize> {
        self.streams
            .iter()
            .position(|s| s.kind == kind && s.dst == dst && (s.src == Some(src) || s.src.is_none()))
    }

    /// True if any stream already announces `dst` (used by `register_streams`
    /// to avoid re-announcing the same endpoint).
    pub fn has_stream_with_dst(&self, dst: SocketAddr, kind: StreamKind) -> bool {
        self.streams.iter().any(|s| s.kind == kind && s.dst == dst)
    }

    /// Recomputes `state` from the message history.
    pub fn recompute_state(&mut self) {
        use crate::packet::Method;

        // A CANCEL shares its CSeq *number* with the INVITE it cancels (RFC
        // 3261 9.1), so `cseq` alone can't tell the CANCEL's own final
        // response apart from the INVITE's. Match on `(cseq, cseq_method)`
        // instead, same as a real CSeq header comparison would.
        let final_response_to = |method: Method| -> Option<u16> {
            let cseq = self
                .messages
                .iter()
                .find(|m| m.cseq_method == method && matches!(m.reqresp, ReqResp::Request(_)))
                .map(|m| m.cseq)?;
            self.messages.iter().find_map(|m| match m.reqresp {
                ReqResp::Response(code) if code >= 200 && m.cseq == cseq && m.cseq_method == method => Some(code),
                _ => None,
            })
        };

        let invite_final = final_response_to(Method::Invite);
        // A BYE or CANCEL only ends the call on its own success (a 2xx); a
        // rejected BYE (e.g. 481 to a stray retransmission) or a rejected
        // CANCEL (e.g. 481, arrived too late) leaves the state to whatever
        // the INVITE's own final response says.
        let bye_final_2xx = matches!(final_response_to(Method::Bye), Some(200..=299));
        let cancel_final_2xx = matches!(final_response_to(Method::Cancel), Some(200..=299));

        // A successful CANCEL normally still earns the INVITE a final 487
        // (Request Terminated) response; that 487 is a side effect of the
        // cancellation, not a rejection, so a completed CANCEL takes
        // priority over the INVITE's own final response unless that
        // response was itself a 2xx (the callee answered before the
        // CANCEL took effect).
        self.state = if bye_final_2xx {
            CallState::Completed
        } else if cancel_final_2xx && !matches!(invite_final, Some(200..=299)) {
            CallState::Cancelled
        } else if let Some(code) = invite_final {
            match code {
                200..=299 => CallState::InCall,
                300..=399 => CallState::Diverted,
                486 | 600 => CallState::BusyLine,
                _ => CallState::Rejected,
            }
        } else {
            CallState::Calling
        };
    }
}
