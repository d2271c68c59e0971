//! Performance benchmarks for the RESP reader, scanner and writer

use std::hint::black_box;

use bytes::BytesMut;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use resp::{Command, RespEncoder, RespReader, RespValue, ScanState};

fn read_tree(data: &[u8]) -> RespValue<'_> {
    let mut reader = RespReader::new(data);
    reader.advance().unwrap();
    reader.read_tree().unwrap()
}

fn bench_read_short_forms(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_short_forms");
    for (name, data) in [
        ("ok", &b"+OK\r\n"[..]),
        ("integer", &b":7\r\n"[..]),
        ("bulk_string", &b"$5\r\nhello\r\n"[..]),
    ] {
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_function(name, |b| b.iter(|| read_tree(black_box(data)).byte_len()));
    }
    group.finish();
}

fn bench_read_general_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_general_path");
    let data = b":1000\r\n";

    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("integer", |b| {
        b.iter(|| read_tree(black_box(data)).as_i64().unwrap())
    });
    group.finish();
}

fn large_array() -> BytesMut {
    let mut data = BytesMut::from("*100\r\n");
    for i in 0..100 {
        let item = format!("$3\r\n{:03}\r\n", i);
        data.extend_from_slice(item.as_bytes());
    }
    data
}

fn bench_read_large_array(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_large_array");
    let data = large_array();

    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("array_100_items", |b| {
        b.iter(|| read_tree(black_box(&data)).aggregate_len().unwrap())
    });
    group.finish();
}

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan");
    let data = large_array();
    let half = data.len() / 2;
    let segments = [&data[..half], &data[half..]];

    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("contiguous", |b| {
        b.iter(|| {
            let mut state = ScanState::new();
            state.try_scan(&mut RespReader::new(black_box(&data))).unwrap();
            state.bytes()
        })
    });
    group.bench_function("two_segments", |b| {
        b.iter(|| {
            let mut state = ScanState::new();
            state
                .try_scan(&mut RespReader::from_segments(black_box(&segments)))
                .unwrap();
            state.bytes()
        })
    });
    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    let command = Command::new("SET").arg("key").arg("value");
    let value = RespValue::map(vec![
        (RespValue::simple_string("server"), RespValue::bulk_string("redis")),
        (RespValue::simple_string("proto"), RespValue::integer(3)),
    ]);

    group.bench_function("set_command", |b| {
        b.iter(|| black_box(&command).encode().unwrap())
    });
    group.bench_function("map", |b| b.iter(|| black_box(&value).encode().unwrap()));
    group.finish();
}

fn bench_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("roundtrip");
    let command = Command::new("SET").arg("key").arg("value");

    group.bench_function("encode_read", |b| {
        b.iter(|| {
            let encoded = black_box(&command).encode().unwrap();
            read_tree(&encoded).preserve()
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_read_short_forms,
    bench_read_general_path,
    bench_read_large_array,
    bench_scan,
    bench_encode,
    bench_roundtrip,
);

criterion_main!(benches);
