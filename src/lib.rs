//! sipcorr — the call and media correlation core of a live SIP traffic
//! analyzer.
//!
//! This crate ingests already-dissected SIP and RTP/RTCP packet records
//! ([`packet::Packet`]) and maintains a queryable, sorted, filterable model
//! of ongoing telephony calls, their messages, and their media streams
//! ([`Store`]). Packet capture, wire-level protocol dissection, the
//! interactive UI, and on-disk persistence are external collaborators.

pub mod call;
pub mod config;
pub mod error;
pub mod index;
pub mod match_engine;
pub mod media_correlator;
pub mod packet;
pub mod sip_correlator;
pub mod sort;
pub mod store;

pub use call::{Call, CallHandle, CallState, Message, Stream, StreamKind};
pub use config::{CaptureOptions, MapSettings, MatchOptions, SettingLookup, SortOptions, StorageMode};
pub use error::{CoreError, CoreResult};
pub use packet::{
    Method, Packet, ProtocolRecords, ReqResp, RtcpRecord, RtpRecord, SdpMediaDescriptor, SdpRecord, SipRecord,
};
pub use sort::SortField;

use index::CallIdIndex;
use match_engine::MatchEngine;
use store::CallStore;

/// The three counts an analyzer UI wants together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub total: usize,
    pub active: usize,
    pub displayed: usize,
}

/// The correlation core's process-wide state.
///
/// Owns the Call Store, the Call-ID Index, and the compiled Match Engine,
/// and wires the Message and Media Correlators' free functions together
/// behind one public API. Not `Sync` by itself; see [`global`] for the
/// process-scoped singleton wrapper used purely for call-site ergonomics
/// under the single-threaded contract.
pub struct Store {
    calls: CallStore,
    callids: CallIdIndex,
    match_engine: MatchEngine,
    match_opts: MatchOptions,
    changed: bool,
}

impl Store {
    /// Compiles the match expression and allocates the Call Store and
    /// Call-ID Index. Fails only if the match expression does not compile
    /// ([`CoreError::RegexCompile`]).
    pub fn init(capture: CaptureOptions, match_opts: MatchOptions, sort: SortOptions) -> CoreResult<Self> {
        let match_engine = MatchEngine::init(&match_opts)?;
        Ok(Store {
            calls: CallStore::new(capture, sort.by, sort.asc),
            callids: CallIdIndex::new(),
            match_engine,
            match_opts,
            changed: false,
        })
    }

    /// Releases every retained Call, Message, and Stream. Safe only when no
    /// ingress call is in flight.
    pub fn deinit(&mut self) {
        self.calls.clear_hard();
        self.callids.clear();
    }

    /// Runs the full admission algorithm. Returns the admitted message, or
    /// `None` if the packet carried no SIP record or was dropped by an
    /// admission rule.
    pub fn on_sip_packet(&mut self, packet: &Packet) -> Option<Message> {
        let (handle, message_index, _newcall) = sip_correlator::on_sip_packet(
            &mut self.calls,
            &mut self.callids,
            &self.match_engine,
            &self.match_opts,
            packet,
        )?;
        self.changed = true;
        self.calls.get(handle)?.messages.get(message_index).cloned()
    }

    /// Resolves an RTP or RTCP packet against the streams known across
    /// every retained call. Returns `None` immediately when
    /// `capture.rtp_capture` is disabled, the packet carries neither an RTP
    /// nor an RTCP record, or no matching stream was found.
    pub fn on_rtp_packet(&mut self, packet: &Packet) -> Option<Stream> {
        if !self.calls.capture().rtp_capture {
            return None;
        }
        let (handle, stream_index) = media_correlator::on_rtp_packet(&mut self.calls, packet)?;
        self.changed = true;
        self.calls.get(handle)?.streams.get(stream_index).cloned()
    }

    pub fn count(&self) -> usize {
        self.calls.count()
    }

    /// Lazy, ordered traversal over retained calls in the current sort
    /// order.
    pub fn iterator(&self) -> impl Iterator<Item = &Call> {
        self.calls.iter()
    }

    /// Ordered traversal over only the active calls.
    pub fn active_iterator(&self) -> impl Iterator<Item = &Call> {
        self.calls.iter_active()
    }

    pub fn find_by_callid(&self, callid: &str) -> Option<&Call> {
        let handle = self.callids.lookup(callid)?;
        self.calls.get(handle)
    }

    /// Membership test in the active sequence.
    pub fn is_active(&self, call: &Call) -> bool {
        match self.callids.lookup(&call.callid) {
            Some(handle) => self.calls.is_active(handle),
            None => false,
        }
    }

    /// Pins a Call against rotation. `lock` and `unlock` are the explicit
    /// entry points for the `locked` attribute.
    pub fn lock(&mut self, callid: &str) -> bool {
        self.set_locked(callid, true)
    }

    /// Un-pins a Call, making it eligible for rotation again.
    pub fn unlock(&mut self, callid: &str) -> bool {
        self.set_locked(callid, false)
    }

    fn set_locked(&mut self, callid: &str, locked: bool) -> bool {
        match self.callids.lookup(callid).and_then(|h| self.calls.get_mut(h)) {
            Some(call) => {
                call.locked = locked;
                true
            }
            None => false,
        }
    }

    /// `total` and `active` come from the store directly; `displayed` is
    /// evaluated eagerly against the caller-supplied filter predicate.
    pub fn stats(&self, filter: impl Fn(&Call) -> bool) -> Stats {
        Stats {
            total: self.calls.count(),
            active: self.calls.active_count(),
            displayed: self.calls.iter().filter(|c| filter(c)).count(),
        }
    }

    /// Returns the dirty flag and clears it.
    pub fn changed_and_reset(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    /// Drops every retained Call.
    pub fn clear_hard(&mut self) {
        self.calls.clear_hard();
        self.callids.clear();
        self.changed = true;
    }

    /// Retains only Calls for which `predicate` holds, rebuilding the
    /// Call-ID Index to match so it stays in sync with the store.
    pub fn clear_soft(&mut self, predicate: impl Fn(&Call) -> bool) {
        self.calls.clear_soft(predicate);
        self.callids.clear();
        for handle in self.calls.handles().collect::<Vec<_>>() {
            if let Some(call) = self.calls.get(handle) {
                self.callids.insert(call.callid.clone(), handle);
            }
        }
        self.changed = true;
    }

    /// Evicts the oldest unlocked Call, if any. Returns whether a Call was
    /// actually evicted.
    pub fn rotate(&mut self) -> bool {
        match self.calls.rotate() {
            Some(callid) => {
                self.callids.remove(&callid);
                self.changed = true;
                true
            }
            None => false,
        }
    }

    pub fn set_sort(&mut self, by: SortField, asc: bool) {
        self.calls.set_sort(by, asc);
        self.changed = true;
    }

    pub fn get_sort(&self) -> SortOptions {
        SortOptions {
            by: self.calls.sort_field(),
            asc: self.calls.sort_ascending(),
        }
    }

    pub fn get_capture(&self) -> &CaptureOptions {
        self.calls.capture()
    }

    pub fn match_expr(&self) -> Option<&str> {
        self.match_opts.mexpr.as_deref()
    }
}

/// A process-scoped singleton wrapper, purely for call-site ergonomics
/// under the single-threaded contract. Tests always construct an independent
/// [`Store`] directly rather than going through this module.
pub mod global {
    use super::{CaptureOptions, CoreError, CoreResult, MatchOptions, SortOptions, Store};
    use std::sync::{Mutex, OnceLock};

    static STORE: OnceLock<Mutex<Store>> = OnceLock::new();

    /// Initializes the global store. Calling this more than once is a
    /// `ResourceAllocation` error — the singleton is one-shot: acquired at
    /// init, released at deinit.
    pub fn init(capture: CaptureOptions, match_opts: MatchOptions, sort: SortOptions) -> CoreResult<()> {
        let store = Store::init(capture, match_opts, sort)?;
        STORE
            .set(Mutex::new(store))
            .map_err(|_| CoreError::resource_allocation("global store", "already initialized"))
    }

    /// Runs `f` against the global store, if initialized.
    pub fn with<R>(f: impl FnOnce(&mut Store) -> R) -> Option<R> {
        STORE.get().map(|mutex| {
            let mut store = mutex.lock().expect("global store mutex poisoned");
            f(&mut store)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), port)
    }

    fn sip_packet(callid: &str, cseq: u32, reqresp: packet::ReqResp, payload: &[u8]) -> Packet {
        // Every call site below passes a request, whose own method is its
        // CSeq method.
        let cseq_method = reqresp.method().expect("test helper only used with requests");
        Packet {
            src: addr(5060),
            dst: addr(5061),
            timestamp: 0,
            payload: payload.to_vec(),
            records: ProtocolRecords {
                sip: Some(SipRecord {
                    callid: callid.into(),
                    xcallid: None,
                    from: "alice".into(),
                    to: "bob".into(),
                    cseq,
                    cseq_method,
                    reqresp,
                    resp_str: None,
                }),
                sdp: None,
                rtp: None,
                rtcp: None,
            },
        }
    }

    #[test]
    fn init_rejects_an_invalid_match_expression() {
        let match_opts = MatchOptions {
            mexpr: Some("(unclosed".into()),
            ..Default::default()
        };
        let result = Store::init(CaptureOptions::default(), match_opts, SortOptions::default());
        assert!(result.is_err());
    }

    #[test]
    fn changed_flag_resets_after_read() {
        let mut store = Store::init(CaptureOptions::default(), MatchOptions::default(), SortOptions::default())
            .unwrap();
        assert!(!store.changed_and_reset());

        let pkt = sip_packet(
            "call-1",
            1,
            packet::ReqResp::Request(packet::Method::Invite),
            b"INVITE ...",
        );
        store.on_sip_packet(&pkt);
        assert!(store.changed_and_reset());
        assert!(!store.changed_and_reset());
    }

    #[test]
    fn stats_reports_total_active_and_displayed() {
        let mut store = Store::init(CaptureOptions::default(), MatchOptions::default(), SortOptions::default())
            .unwrap();
        let pkt = sip_packet(
            "call-1",
            1,
            packet::ReqResp::Request(packet::Method::Invite),
            b"INVITE ...",
        );
        store.on_sip_packet(&pkt);

        let stats = store.stats(|c| c.callid == "call-1");
        assert_eq!(stats.total, 1);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.displayed, 1);

        let stats = store.stats(|c| c.callid == "nonexistent");
        assert_eq!(stats.displayed, 0);
    }

    #[test]
    fn lock_protects_a_call_from_rotation() {
        let capture = CaptureOptions {
            limit: 1,
            rotate: true,
            ..Default::default()
        };
        let mut store = Store::init(capture, MatchOptions::default(), SortOptions::default()).unwrap();
        let pkt_a = sip_packet(
            "a",
            1,
            packet::ReqResp::Request(packet::Method::Invite),
            b"INVITE a",
        );
        store.on_sip_packet(&pkt_a);
        store.lock("a");

        let pkt_b = sip_packet(
            "b",
            1,
            packet::ReqResp::Request(packet::Method::Invite),
            b"INVITE b",
        );
        store.on_sip_packet(&pkt_b);

        assert!(store.find_by_callid("a").is_some());
    }

    #[test]
    fn clear_soft_rebuilds_the_callid_index() {
        let mut store = Store::init(CaptureOptions::default(), MatchOptions::default(), SortOptions::default())
            .unwrap();
        store.on_sip_packet(&sip_packet(
            "a",
            1,
            packet::ReqResp::Request(packet::Method::Invite),
            b"INVITE a",
        ));
        store.on_sip_packet(&sip_packet(
            "b",
            1,
            packet::ReqResp::Request(packet::Method::Invite),
            b"INVITE b",
        ));

        store.clear_soft(|c| c.callid == "b");
        assert!(store.find_by_callid("a").is_none());
        assert!(store.find_by_callid("b").is_some());
        assert_eq!(store.count(), 1);
    }
}
