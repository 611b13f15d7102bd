//! Scenarios 2-6: broadcast partitioning, handshake denial/timeout, lossy
//! RELIABLE delivery, a dropped SEQUENCED parcel, and idle-timeout teardown.

mod common;

use common::{LoopbackAdapter, Network};
use relaycore::codec::token::{ConnectToken, USER_DATA_SIZE};
use relaycore::delivery::Mode;
use relaycore::{ConnectResult, DeliveredMessage, Message, Socket};
use std::net::SocketAddr;

const PROTOCOL_ID: u64 = 50;
const CHANNEL: usize = 0;

fn pump(sockets: &mut [&mut Socket], now_ms: &mut u64, rounds: usize) -> Vec<Vec<DeliveredMessage>> {
    let mut all = vec![Vec::new(); sockets.len()];
    for _ in 0..rounds {
        *now_ms += 10;
        for (index, socket) in sockets.iter_mut().enumerate() {
            all[index].extend(socket.poll(*now_ms).unwrap());
        }
    }
    all
}

fn token_bytes(server_addr: SocketAddr, client_id: i64, protocol_id: u64, timeout_seconds: i32, now_ms: u64, server_key: &[u8; relaycore::crypto::KEY_SIZE]) -> Vec<u8> {
    let (token, _private) =
        ConnectToken::generate(client_id, timeout_seconds, vec![server_addr], [0u8; USER_DATA_SIZE], protocol_id, now_ms + 30_000, now_ms, server_key)
            .unwrap();
    token.encode().unwrap().to_vec()
}

/// Scenario 2: the server broadcasts one parcel to three connected clients
/// and every one of them receives it.
#[test]
fn broadcast_reaches_every_connected_client() {
    let network = Network::new();
    let server_addr: SocketAddr = "127.0.0.1:8810".parse().unwrap();
    let server_key = [3u8; relaycore::crypto::KEY_SIZE];
    let mut now_ms = 1_000u64;

    let mut server = Socket::create(Box::new(LoopbackAdapter::new(server_addr, network.clone())), vec![Mode::Reliable]);
    server.listen(server_key, PROTOCOL_ID, 16, server_addr).unwrap();

    let mut clients: Vec<Socket> = (0..3)
        .map(|i| {
            let addr: SocketAddr = format!("127.0.0.1:{}", 9100 + i).parse().unwrap();
            let bytes = token_bytes(server_addr, 100 + i as i64, PROTOCOL_ID, -1, now_ms, &server_key);
            let mut client = Socket::create(Box::new(LoopbackAdapter::new(addr, network.clone())), vec![Mode::Reliable]);
            client.connect(&bytes, now_ms).unwrap();
            client
        })
        .collect();

    {
        let mut refs: Vec<&mut Socket> = std::iter::once(&mut server).chain(clients.iter_mut()).collect();
        pump(&mut refs, &mut now_ms, 6);
    }

    assert_eq!(server.session_count(), 3, "all three clients should have completed the handshake");

    let handles: Vec<relaycore::SessionHandle> =
        (0..3i64).map(|i| server.session_by_client_id(100 + i).expect("server should track this peer")).collect();

    let message = Message::new();
    message.write(&[99u8]).unwrap();
    let sent = server.send(CHANNEL, &message, &handles, now_ms).unwrap();
    assert_eq!(sent, 3);

    let delivered = {
        let mut refs: Vec<&mut Socket> = std::iter::once(&mut server).chain(clients.iter_mut()).collect();
        pump(&mut refs, &mut now_ms, 6)
    };

    for client_slot in &delivered[1..] {
        assert_eq!(client_slot.len(), 1, "every client should receive the broadcast exactly once");
        assert_eq!(client_slot[0].body, vec![99u8]);
    }
}

/// Scenario 3: a client whose token carries the wrong protocol id is
/// silently dropped by the server and, once its attempt budget on every
/// listed address elapses, the client surfaces a terminal timeout.
#[test]
fn mismatched_protocol_id_eventually_times_out() {
    let network = Network::new();
    let server_addr: SocketAddr = "127.0.0.1:8820".parse().unwrap();
    let client_addr: SocketAddr = "127.0.0.1:9200".parse().unwrap();
    let server_key = [4u8; relaycore::crypto::KEY_SIZE];
    let mut now_ms = 1_000u64;

    let mut server = Socket::create(Box::new(LoopbackAdapter::new(server_addr, network.clone())), vec![Mode::Reliable]);
    server.listen(server_key, PROTOCOL_ID, 16, server_addr).unwrap();

    let bytes = token_bytes(server_addr, 200, PROTOCOL_ID + 1, 5, now_ms, &server_key);
    let mut client = Socket::create(Box::new(LoopbackAdapter::new(client_addr, network.clone())), vec![Mode::Reliable]);
    client.connect(&bytes, now_ms).unwrap();

    assert_eq!(client.connect_result(), None, "the attempt should still be in flight right after connect()");

    let mut refs = [&mut server, &mut client];
    // The token's 5-second timeout is this address's attempt budget; run
    // well past it so the single listed address is exhausted.
    pump(&mut refs, &mut now_ms, 700);

    assert_eq!(server.session_count(), 0, "the server should never have accepted the mismatched request");
    assert_eq!(client.connect_result(), Some(ConnectResult::TimedOut));
}

/// Scenario 4: with one in five outbound client datagrams dropped after the
/// handshake, a RELIABLE parcel larger than the MTU still arrives whole via
/// fragmentation and retransmission, and the server's standalone acks let
/// the client measure a real round-trip time even though nothing ever flows
/// back from the server on this channel.
#[test]
fn lossy_reliable_channel_still_delivers_everything() {
    let network = Network::new();
    let server_addr: SocketAddr = "127.0.0.1:8830".parse().unwrap();
    let client_addr: SocketAddr = "127.0.0.1:9300".parse().unwrap();
    let server_key = [5u8; relaycore::crypto::KEY_SIZE];
    let mut now_ms = 1_000u64;

    let mut server = Socket::create(Box::new(LoopbackAdapter::new(server_addr, network.clone())), vec![Mode::Reliable]);
    server.listen(server_key, PROTOCOL_ID, 16, server_addr).unwrap();

    let bytes = token_bytes(server_addr, 300, PROTOCOL_ID, -1, now_ms, &server_key);
    let mut client_adapter = LoopbackAdapter::new(client_addr, network.clone());
    // The handshake's REQUEST and RESPONSE (and the server's immediate
    // connect acknowledgement, which only touches the server's own
    // adapter) must land, so only start dropping once the session's
    // payload traffic begins.
    let mut send_count = 0u32;
    client_adapter.set_drop_filter(move |_| {
        send_count += 1;
        send_count > 1 && send_count % 5 == 0
    });
    let mut client = Socket::create(Box::new(client_adapter), vec![Mode::Reliable]);
    client.connect(&bytes, now_ms).unwrap();

    {
        let mut refs = [&mut server, &mut client];
        pump(&mut refs, &mut now_ms, 6);
    }
    let client_session = client.client_session().expect("connected");

    // Comfortably larger than `DEFAULT_MTU` (1200 bytes), so this parcel
    // only reassembles once every one of its several fragments has arrived.
    let body: Vec<u8> = (0..3200u32).map(|n| (n % 256) as u8).collect();
    let message = Message::new();
    message.write(&body).unwrap();
    client.send(CHANNEL, &message, &[client_session], now_ms).unwrap();

    let mut refs = [&mut server, &mut client];
    let delivered = pump(&mut refs, &mut now_ms, 400);

    assert_eq!(delivered[0].len(), 1, "the oversized parcel should be delivered exactly once");
    assert_eq!(delivered[0][0].body, body, "every fragment should reassemble despite the drops");

    let (rtt, _variance) = client.session(client_session).unwrap().get_rtt();
    assert!(rtt.as_millis() > 0, "the server's standalone acks should let the client measure a nonzero RTT even with no return traffic");
}

/// Scenario 5: in SEQUENCED mode, a parcel whose every fragment is dropped
/// is skipped rather than blocking newer parcels from being delivered.
#[test]
fn sequenced_channel_skips_a_fully_dropped_parcel() {
    let network = Network::new();
    let server_addr: SocketAddr = "127.0.0.1:8840".parse().unwrap();
    let client_addr: SocketAddr = "127.0.0.1:9400".parse().unwrap();
    let server_key = [6u8; relaycore::crypto::KEY_SIZE];
    let mut now_ms = 1_000u64;

    let mut server = Socket::create(Box::new(LoopbackAdapter::new(server_addr, network.clone())), vec![Mode::Sequenced]);
    server.listen(server_key, PROTOCOL_ID, 16, server_addr).unwrap();

    let bytes = token_bytes(server_addr, 400, PROTOCOL_ID, -1, now_ms, &server_key);
    let mut client_adapter = LoopbackAdapter::new(client_addr, network.clone());
    // Sends, in order: REQUEST, RESPONSE, then one fragment per parcel
    // below. Drop only the 4th send, the second parcel's only fragment.
    let mut send_count = 0u32;
    client_adapter.set_drop_filter(move |_| {
        send_count += 1;
        send_count == 4
    });
    let mut client = Socket::create(Box::new(client_adapter), vec![Mode::Sequenced]);
    client.connect(&bytes, now_ms).unwrap();

    {
        let mut refs = [&mut server, &mut client];
        pump(&mut refs, &mut now_ms, 6);
    }
    let client_session = client.client_session().expect("connected");

    let first = Message::new();
    first.write(&[1u8]).unwrap();
    client.send(CHANNEL, &first, &[client_session], now_ms).unwrap();
    {
        let mut refs = [&mut server, &mut client];
        pump(&mut refs, &mut now_ms, 4);
    }

    let second = Message::new();
    second.write(&[2u8]).unwrap();
    client.send(CHANNEL, &second, &[client_session], now_ms).unwrap();
    {
        let mut refs = [&mut server, &mut client];
        pump(&mut refs, &mut now_ms, 4);
    }

    let third = Message::new();
    third.write(&[3u8]).unwrap();
    client.send(CHANNEL, &third, &[client_session], now_ms).unwrap();

    let mut refs = [&mut server, &mut client];
    let delivered = pump(&mut refs, &mut now_ms, 10);

    let bodies: Vec<u8> = delivered[0].iter().map(|m| m.body[0]).collect();
    assert_eq!(bodies, vec![1u8, 3u8], "the dropped middle parcel should never arrive, but the newer one still does");
}

/// Scenario 6: a client that stops sending anything is disconnected by the
/// server once its negotiated idle timeout elapses.
#[test]
fn idle_client_is_disconnected_after_its_timeout() {
    let network = Network::new();
    let server_addr: SocketAddr = "127.0.0.1:8850".parse().unwrap();
    let client_addr: SocketAddr = "127.0.0.1:9500".parse().unwrap();
    let server_key = [7u8; relaycore::crypto::KEY_SIZE];
    let mut now_ms = 1_000u64;

    let mut server = Socket::create(Box::new(LoopbackAdapter::new(server_addr, network.clone())), vec![Mode::Reliable]);
    server.listen(server_key, PROTOCOL_ID, 16, server_addr).unwrap();

    let bytes = token_bytes(server_addr, 500, PROTOCOL_ID, 1, now_ms, &server_key);
    let mut client = Socket::create(Box::new(LoopbackAdapter::new(client_addr, network.clone())), vec![Mode::Reliable]);
    client.connect(&bytes, now_ms).unwrap();

    {
        let mut refs = [&mut server, &mut client];
        pump(&mut refs, &mut now_ms, 6);
    }
    assert_eq!(server.session_count(), 1, "the handshake should have completed before the client goes dark");

    // Stop pumping the client entirely; only the server keeps polling, so
    // no further packet ever touches its `last_recv_ms` for this peer.
    for _ in 0..150 {
        now_ms += 10;
        server.poll(now_ms).unwrap();
    }

    assert_eq!(server.session_count(), 0, "the server should have torn the idle peer down after its 1-second timeout");
}
