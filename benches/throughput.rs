//! Throughput benchmarks

use chaino::core::protocol::{checksum, encode_request, encode_response, Status};
use chaino::core::registry::share_stream;
use chaino::core::session::{SessionOptions, StreamSession};
use chaino::core::transport::mock::MockStreamLink;
use chaino::{args, RemoteCall};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

fn checksum_benchmark(c: &mut Criterion) {
    let data: Vec<u8> = (0..1024).map(|i| (i % 256) as u8).collect();

    let mut group = c.benchmark_group("checksum");
    group.throughput(Throughput::Bytes(data.len() as u64));

    group.bench_function("crc16_xmodem_1k", |b| {
        b.iter(|| black_box(checksum::crc16_xmodem(black_box(&data))))
    });

    group.bench_function("verify_1k", |b| {
        let mut packet = checksum::checksum_bytes(&data).to_vec();
        packet.extend_from_slice(&data);
        b.iter(|| black_box(checksum::verify(black_box(&packet))))
    });

    group.finish();
}

fn codec_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    group.bench_function("encode_request_stream", |b| {
        let values = args![13, true, 2.5, "hello"];
        b.iter(|| black_box(encode_request(Some(0x42), 205, black_box(&values)).unwrap()))
    });

    group.bench_function("encode_request_bus", |b| {
        let values = args![255, 0, 16];
        b.iter(|| black_box(encode_request(None, 205, black_box(&values)).unwrap()))
    });

    group.finish();
}

fn call_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let link = MockStreamLink::new();
    let session = StreamSession::new("bench", share_stream(link.clone()), 0x42, &SessionOptions::default());
    let reply = encode_response(Status::Success, &["Chaino_Hana"]);

    let mut group = c.benchmark_group("call");
    group.bench_function("stream_round_trip", |b| {
        b.to_async(&runtime).iter(|| {
            link.reply_packet(&reply);
            let session = &session;
            async move { black_box(session.call(201, &[]).await.unwrap()) }
        })
    });
    group.finish();
}

criterion_group!(benches, checksum_benchmark, codec_benchmark, call_benchmark);
criterion_main!(benches);
