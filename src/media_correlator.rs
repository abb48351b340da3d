//! Media Correlator: the RTP/RTCP ingress path
//!
//! Stream identity is announced in SDP but routinely not honored on the
//! wire — endpoints reply from whatever port they like instead of the one
//! their peer advertised. This module resolves an observed packet against
//! the streams SDP already announced, and heals the common late-binding and
//! NAT-rebinding cases by synthesizing a second, reverse-direction stream
//! once the first packet shows up.

use std::net::SocketAddr;

use crate::call::{Call, CallHandle, Stream, StreamKind};
use crate::packet::{Packet, SdpRecord};
use crate::store::CallStore;

/// SDP-time entry point: announces the streams a newly-parsed SDP body
/// implies, without requiring any packet to have been observed on them yet.
pub fn register_streams(call: &mut Call, announcing_message: usize, packet: &Packet, sdp: &SdpRecord) {
    for media in &sdp.media {
        let dst = SocketAddr::new(media.address, media.rtp_port);
        if !call.has_stream_with_dst(dst, StreamKind::Rtp) {
            call.streams.push(Stream::new(StreamKind::Rtp, dst, announcing_message));
        }

        let rtcp_port = media.rtcp_port.unwrap_or(media.rtp_port + 1);
        let rtcp_dst = SocketAddr::new(media.address, rtcp_port);
        if !call.has_stream_with_dst(rtcp_dst, StreamKind::Rtcp) {
            call.streams.push(Stream::new(StreamKind::Rtcp, rtcp_dst, announcing_message));
        }

        // Common NAT case: the peer sends from the address it actually has,
        // not the one it announced in its own SDP.
        let nat_dst = SocketAddr::new(packet.src.ip(), media.rtp_port);
        if nat_dst != dst && !call.has_stream_with_dst(nat_dst, StreamKind::Rtp) {
            call.streams.push(Stream::new(StreamKind::Rtp, nat_dst, announcing_message));
        }
    }
}

/// packet-time entry point: resolves an observed RTP or RTCP packet
/// against the streams announced (or previously synthesized) across every
/// retained call, and returns the handle and stream index it was applied to.
pub fn on_rtp_packet(store: &mut CallStore, packet: &Packet) -> Option<(CallHandle, usize)> {
    if let Some(rtp) = packet.records.rtp {
        return on_rtp(store, packet, rtp.format);
    }
    if packet.records.rtcp.is_some() {
        return on_rtcp(store, packet);
    }
    None
}

fn on_rtp(store: &mut CallStore, packet: &Packet, format: u8) -> Option<(CallHandle, usize)> {
    let handles: Vec<CallHandle> = store.handles().collect();
    for handle in handles {
        let stream_idx = store
            .get(handle)?
            .find_by_format(packet.dst, packet.src, StreamKind::Rtp);
        let Some(stream_idx) = stream_idx else { continue };

        let call = store.get_mut(handle)?;
        let final_idx = apply_rtp_packet(call, stream_idx, packet.src, packet.dst, format, packet.payload.len());
        tracing::debug!(
            callid = %call.callid,
            src = %packet.src,
            dst = %packet.dst,
            format,
            stream = final_idx,
            "rtp packet resolved"
        );
        return Some((handle, final_idx));
    }
    None
}

/// Applies one observed RTP packet to the stream found at `stream_idx`,
/// handling format-multiplex and late-binding plus reverse
/// synthesis before recording the packet.
fn apply_rtp_packet(
    call: &mut Call,
    stream_idx: usize,
    src: SocketAddr,
    dst: SocketAddr,
    format: u8,
    bytes: usize,
) -> usize {
    let announcing_message = call.streams[stream_idx].announcing_message;

    if call.streams[stream_idx].is_complete() {
        if call.streams[stream_idx].fmtcode != Some(format) {
            // The endpoint is multiplexing more than one codec on this port.
            // Always route this packet to a fresh, format-specific stream
            // rather than the original (which stays as-is for its format).
            let mut fresh = Stream::new(StreamKind::Rtp, dst, announcing_message);
            fresh.src = Some(src);
            fresh.fmtcode = Some(format);
            fresh.record_packet(bytes);
            call.streams.push(fresh);
            tracing::debug!(callid = %call.callid, format, "format-multiplexed stream split");
            return call.streams.len() - 1;
        }
        call.streams[stream_idx].record_packet(bytes);
        return stream_idx;
    }

    // Late binding: this is the first packet observed for an SDP-announced
    // but previously-unobserved stream.
    call.streams[stream_idx].src = Some(src);
    call.streams[stream_idx].fmtcode = Some(format);
    ensure_reverse_stream(call, src, dst, Some(format), announcing_message);
    call.streams[stream_idx].record_packet(bytes);
    stream_idx
}

/// Heals the common case where a peer ignores the advertised port and
/// replies from whatever source it actually used: makes sure a stream
/// exists going the other way, `dst` = the address we just observed
/// sending, `src` = the address we'd announced as the destination.
fn ensure_reverse_stream(
    call: &mut Call,
    observed_src: SocketAddr,
    announced_dst: SocketAddr,
    format: Option<u8>,
    announcing_message: usize,
) {
    match call.find_by_format(observed_src, announced_dst, StreamKind::Rtp) {
        None => {
            let mut reverse = Stream::new(StreamKind::Rtp, observed_src, announcing_message);
            reverse.src = Some(announced_dst);
            reverse.fmtcode = format;
            tracing::debug!(callid = %call.callid, dst = %observed_src, src = %announced_dst, "reverse stream synthesized");
            call.streams.push(reverse);
        }
        Some(idx) => {
            // A candidate reverse stream exists but was last bound to a
            // different peer address (the far end shifted ports again).
            // Only create another one if no exact 4-tuple already covers it.
            if call.streams[idx].src != Some(announced_dst)
                && call
                    .find_stream(observed_src, announced_dst, StreamKind::Rtp)
                    .is_none()
            {
                let mut reverse = Stream::new(StreamKind::Rtp, observed_src, announcing_message);
                reverse.src = Some(announced_dst);
                reverse.fmtcode = format;
                tracing::debug!(callid = %call.callid, dst = %observed_src, src = %announced_dst, "reverse stream re-synthesized after endpoint shift");
                call.streams.push(reverse);
            }
        }
    }
}

fn on_rtcp(store: &mut CallStore, packet: &Packet) -> Option<(CallHandle, usize)> {
    let handles: Vec<CallHandle> = store.handles().collect();
    for handle in handles {
        let stream_idx = store.get(handle)?.streams.iter().position(|s| {
            s.kind == StreamKind::Rtcp && s.dst == packet.dst && (s.src == Some(packet.src) || s.src.is_none())
        });
        let Some(stream_idx) = stream_idx else { continue };

        let call = store.get_mut(handle)?;
        if call.streams[stream_idx].src.is_none() {
            call.streams[stream_idx].src = Some(packet.src);
        }
        call.streams[stream_idx].record_packet(packet.payload.len());
        return Some((handle, stream_idx));
    }
    None
}
