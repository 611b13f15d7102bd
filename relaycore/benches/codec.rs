#[macro_use]
extern crate criterion;

use criterion::black_box;
use criterion::Criterion;
use relaycore::codec::token::{ConnectToken, USER_DATA_SIZE};
use relaycore::codec::varint::{read_packed_uint, write_packed_uint};

fn packed_uint_round_trip(c: &mut Criterion) {
    c.bench_function("packed_uint small value", |b| {
        b.iter(|| {
            let mut buf = Vec::with_capacity(9);
            write_packed_uint(&mut buf, black_box(17)).unwrap();
            black_box(read_packed_uint(&buf[..]).unwrap());
        })
    });

    c.bench_function("packed_uint max value", |b| {
        b.iter(|| {
            let mut buf = Vec::with_capacity(9);
            write_packed_uint(&mut buf, black_box(u64::MAX)).unwrap();
            black_box(read_packed_uint(&buf[..]).unwrap());
        })
    });
}

fn connect_token_round_trip(c: &mut Criterion) {
    let server_key = [9u8; relaycore::crypto::KEY_SIZE];
    let addr = "127.0.0.1:8888".parse().unwrap();

    c.bench_function("connect token encode+decode", |b| {
        b.iter(|| {
            let (token, _private) = ConnectToken::generate(
                black_box(125),
                -1,
                vec![addr],
                [0u8; USER_DATA_SIZE],
                50,
                30_000,
                0,
                &server_key,
            )
            .unwrap();
            let bytes = token.encode().unwrap();
            black_box(ConnectToken::decode(&bytes, 0).unwrap());
        })
    });
}

criterion_group!(benches, packed_uint_round_trip, connect_token_round_trip);
criterion_main!(benches);
