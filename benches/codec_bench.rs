//! Throughput of the event channel framing.
//!
//! Run with:
//! ```sh
//! cargo bench -p keyrack-network --bench codec_bench
//! ```

use bytes::BytesMut;
use chrono::Utc;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use keyrack_core::{CorrelationToken, OutboundEvent, SlotNumber, Uid};
use keyrack_network::EventCodec;
use std::hint::black_box;
use tokio_util::codec::{Decoder, Encoder};

const UNLOCK_FRAME: &str =
    "{\"event\":\"gpio:unlock\",\"slotNumber\":3,\"correlationToken\":\"txn-77\"}\n";

fn tag_event() -> OutboundEvent {
    OutboundEvent::TagObserved {
        slot_number: SlotNumber::new(2).unwrap(),
        uid: Uid::parse("DEADBEEF").unwrap(),
        observed_at: Utc::now(),
    }
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Elements(1));

    let tag = tag_event();
    group.bench_function("nfc_tag", |b| {
        b.iter(|| {
            let mut codec = EventCodec::new();
            let mut buffer = BytesMut::new();
            codec.encode(black_box(&tag), &mut buffer).unwrap();
            black_box(buffer);
        });
    });

    let pulled = OutboundEvent::KeyPulled {
        slot_number: SlotNumber::new(3).unwrap(),
        correlation_token: CorrelationToken::new("txn-77").unwrap(),
    };
    group.bench_function("key_pulled", |b| {
        b.iter(|| {
            let mut codec = EventCodec::new();
            let mut buffer = BytesMut::new();
            codec.encode(black_box(&pulled), &mut buffer).unwrap();
            black_box(buffer);
        });
    });

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Elements(1));

    group.bench_function("gpio_unlock", |b| {
        b.iter(|| {
            let mut codec = EventCodec::new();
            let mut buffer = BytesMut::from(black_box(UNLOCK_FRAME));
            black_box(codec.decode(&mut buffer).unwrap());
        });
    });

    group.bench_function("malformed", |b| {
        b.iter(|| {
            let mut codec = EventCodec::new();
            let mut buffer = BytesMut::from(black_box("{\"event\":\"gpio:unlock\",\"slotNumber\":99}\n"));
            black_box(codec.decode(&mut buffer).unwrap());
        });
    });

    group.finish();
}

fn bench_decode_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_batch");
    let batch = UNLOCK_FRAME.repeat(100);
    group.throughput(Throughput::Elements(100));

    group.bench_function("gpio_unlock_x100", |b| {
        b.iter(|| {
            let mut codec = EventCodec::new();
            let mut buffer = BytesMut::from(batch.as_str());
            while let Some(frame) = codec.decode(&mut buffer).unwrap() {
                black_box(frame);
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_decode_batch);
criterion_main!(benches);
