//! Message Correlator: the SIP ingress path
//!
//! `Store::on_sip_packet` delegates here once it has confirmed a SIP
//! record is present on the packet.

use crate::call::{Call, CallHandle, Message};
use crate::config::{MatchOptions, StorageMode};
use crate::index::CallIdIndex;
use crate::match_engine::MatchEngine;
use crate::media_correlator;
use crate::packet::{Method, Packet, ReqResp};
use crate::store::CallStore;

/// Runs the full admission algorithm. Returns the admitted message's index
/// within its Call, and whether the call was newly created, or `None` if the
/// packet was dropped or carried no SIP record.
pub fn on_sip_packet(
    store: &mut CallStore,
    index: &mut CallIdIndex,
    match_engine: &MatchEngine,
    match_opts: &MatchOptions,
    packet: &Packet,
) -> Option<(CallHandle, usize, bool)> {
    let sip = packet.records.sip.as_ref()?;

    // Step 1: existing call short-circuits admission rules entirely.
    let existing = index.lookup(&sip.callid);

    if existing.is_none() {
        // Step 2: match engine.
        if !match_engine.check(&packet.payload) {
            tracing::debug!(callid = %sip.callid, "dropped: match expression rejected");
            return None;
        }
        // Step 3: invite-only admission.
        if match_opts.invite && sip.reqresp != ReqResp::Request(Method::Invite) {
            tracing::debug!(callid = %sip.callid, "dropped: invite-only admission");
            return None;
        }
        // Step 4: dialog-initiating-only admission.
        if match_opts.complete && sip.reqresp.is_non_dialog_initiating() {
            tracing::debug!(callid = %sip.callid, "dropped: not dialog-initiating");
            return None;
        }
    }

    let mut newcall = false;
    let handle = match existing {
        Some(h) => h,
        None => {
            // Step 5: rotate if at capacity, then create.
            let capture = store.capture().clone();
            if capture.limit > 0 && capture.rotate && store.count() >= capture.limit {
                if let Some(evicted_callid) = store.rotate() {
                    index.remove(&evicted_callid);
                    tracing::info!(callid = %evicted_callid, "rotated oldest unlocked call");
                }
            }
            let call_index = store.next_index();
            let mut call = Call::new(call_index, sip.callid.clone());
            call.xcallid = sip.xcallid.clone();
            call.from = sip.from.clone();
            call.to = sip.to.clone();
            // Allocate the arena slot now, but defer the sorted `order`
            // insertion to step 11: this call has no messages and a
            // placeholder `Calling` state until steps 6-10 run below, and
            // `order` is never revisited after insertion (only an explicit
            // `set_sort` re-sorts it), so inserting now would place the call
            // by its content at creation rather than after its first message.
            let handle = store.allocate(call);
            index.insert(sip.callid.clone(), handle);
            newcall = true;
            tracing::info!(callid = %sip.callid, index = call_index, "new call");
            handle
        }
    };

    // Step 6 + 8: attach the packet to a new Message, append it.
    let payload = match store.capture().storage_mode {
        StorageMode::Full => Some(packet.payload.clone()),
        StorageMode::HeadersOnly => None,
    };
    let message = Message {
        cseq: sip.cseq,
        cseq_method: sip.cseq_method,
        from: sip.from.clone(),
        to: sip.to.clone(),
        reqresp: sip.reqresp,
        resp_str: sip.resp_str.clone(),
        timestamp: packet.timestamp,
        payload,
        retrans_of: None,
    };

    let call = store.get_mut(handle)?;

    // Step 7: first message of a new call with an X-Call-ID links to parent.
    if call.messages.is_empty() {
        if let Some(parent_id) = sip.xcallid.clone() {
            if let Some(parent_handle) = index.lookup(&parent_id) {
                drop(call);
                if let Some(parent) = store.get_mut(parent_handle) {
                    parent.children.push(sip.callid.clone());
                }
            }
        }
    }

    let call = store.get_mut(handle)?;
    let message_index = call.messages.len();
    call.messages.push(message);

    // Step 9: retransmission detection.
    detect_retransmission(call, message_index, packet);

    // Step 10: INVITE-initiated calls get SDP stream registration and a
    // state/active-set refresh.
    let is_invite_initiated = call
        .messages
        .first()
        .map(|m| m.reqresp == ReqResp::Request(Method::Invite))
        .unwrap_or(false);

    if is_invite_initiated {
        if let Some(sdp) = packet.records.sdp.as_ref() {
            media_correlator::register_streams(call, message_index, packet, sdp);
        }

        call.recompute_state();
        // Both `mark_active`/`unmark_active` are idempotent, so the active
        // set is simply resynced to the freshly recomputed state rather than
        // diffed against the state before this message — a brand-new call
        // already starts `Calling` (active) before its first message, so a
        // before/after diff would never see the true->true edge and the call
        // would never actually get added to the active set.
        if call.state.is_active() {
            store.mark_active(handle);
        } else {
            store.unmark_active(handle);
        }
    }

    // Step 11: a newly created call is inserted into the sorted display
    // list only now, after its first message, stream registration, and
    // state recompute have all run, so attributes like start time,
    // duration, and state are populated when the sort comparator sees them.
    if newcall {
        store.place_in_order(handle);
    }

    Some((handle, message_index, newcall))
}

/// A message is a retransmission if an earlier message in the same call
/// shares (cseq, cseq_method, reqresp, from, to, payload hash). `cseq_method`
/// is needed alongside `cseq` because a CANCEL shares its CSeq number with
/// the INVITE it cancels (RFC 3261 9.1).
fn detect_retransmission(call: &mut Call, message_index: usize, packet: &Packet) {
    let (cseq, cseq_method, reqresp, from, to) = {
        let m = &call.messages[message_index];
        (m.cseq, m.cseq_method, m.reqresp, m.from.clone(), m.to.clone())
    };
    let payload_hash = simple_hash(&packet.payload);

    let prior = call.messages[..message_index].iter().position(|m| {
        m.cseq == cseq
            && m.cseq_method == cseq_method
            && m.reqresp == reqresp
            && m.from == from
            && m.to == to
            && m.payload.as_deref().map(simple_hash).unwrap_or(payload_hash) == payload_hash
    });

    if let Some(prior_index) = prior {
        call.messages[message_index].retrans_of = Some(prior_index);
    }
}

fn simple_hash(bytes: &[u8]) -> u64 {
    // FNV-1a: fast, stable across runs, adequate for retransmission
    // deduplication (not a cryptographic requirement).
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}
