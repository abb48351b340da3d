//! Replays a small scripted sequence of SIP and RTP packets against a
//! `Store` and prints the resulting call list, giving the crate a runnable
//! surface for manual smoke-testing without a real pcap/UI front end.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use sipcorr::{
    CaptureOptions, MatchOptions, Method, Packet, ProtocolRecords, ReqResp, RtpRecord,
    SdpMediaDescriptor, SdpRecord, SipRecord, SortOptions, Store,
};

fn addr(a: u8, b: u8, c: u8, d: u8, port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(a, b, c, d)), port)
}

fn sip(
    callid: &str,
    cseq: u32,
    cseq_method: Method,
    reqresp: ReqResp,
    from: &str,
    to: &str,
    ts: u64,
    payload: &'static str,
) -> Packet {
    Packet {
        src: addr(10, 0, 0, 1, 5060),
        dst: addr(10, 0, 0, 2, 5060),
        timestamp: ts,
        payload: payload.as_bytes().to_vec(),
        records: ProtocolRecords {
            sip: Some(SipRecord {
                callid: callid.into(),
                xcallid: None,
                from: from.into(),
                to: to.into(),
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

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut store = Store::init(CaptureOptions::default(), MatchOptions::default(), SortOptions::default())
        .expect("default options always compile");

    let mut invite = sip(
        "demo-call-1",
        1,
        Method::Invite,
        ReqResp::Request(Method::Invite),
        "alice",
        "bob",
        0,
        "INVITE sip:bob@example.com SIP/2.0",
    );
    invite.records.sdp = Some(SdpRecord {
        media: vec![SdpMediaDescriptor {
            media_type: "audio".into(),
            address: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            rtp_port: 5000,
            rtcp_port: None,
        }],
    });
    store.on_sip_packet(&invite);

    store.on_sip_packet(&sip(
        "demo-call-1",
        1,
        Method::Invite,
        ReqResp::Response(200),
        "alice",
        "bob",
        10,
        "SIP/2.0 200 OK",
    ));
    store.on_sip_packet(&sip(
        "demo-call-1",
        1,
        Method::Ack,
        ReqResp::Request(Method::Ack),
        "alice",
        "bob",
        11,
        "ACK sip:bob@example.com SIP/2.0",
    ));

    let rtp_packet = Packet {
        src: addr(10, 0, 0, 3, 6000),
        dst: addr(10, 0, 0, 2, 5000),
        timestamp: 12,
        payload: vec![0u8; 160],
        records: ProtocolRecords {
            sip: None,
            sdp: None,
            rtp: Some(RtpRecord { format: 0 }),
            rtcp: None,
        },
    };
    store.on_rtp_packet(&rtp_packet);

    store.on_sip_packet(&sip(
        "demo-call-1",
        2,
        Method::Bye,
        ReqResp::Request(Method::Bye),
        "alice",
        "bob",
        20,
        "BYE sip:bob@example.com SIP/2.0",
    ));
    store.on_sip_packet(&sip(
        "demo-call-1",
        2,
        Method::Bye,
        ReqResp::Response(200),
        "alice",
        "bob",
        21,
        "SIP/2.0 200 OK",
    ));

    println!("{} call(s) retained:", store.count());
    for call in store.iterator() {
        println!(
            "  #{} {} {} -> {} [{}] messages={} streams={}",
            call.index,
            call.callid,
            call.from,
            call.to,
            call.state,
            call.messages.len(),
            call.streams.len(),
        );
        for stream in &call.streams {
            println!(
                "      stream {:?} dst={} src={:?} fmt={:?} packets={}",
                stream.kind, stream.dst, stream.src, stream.fmtcode, stream.packet_count
            );
        }
    }

    let stats = store.stats(|_| true);
    println!("stats: total={} active={} displayed={}", stats.total, stats.active, stats.displayed);
}
