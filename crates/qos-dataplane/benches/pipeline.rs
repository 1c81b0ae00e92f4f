//! Packet path benchmarks

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use qos_common::{L4Type, Packet, PacketHeader, QosConfig, QueueConfig, SchedulerConfig, IA};
use qos_dataplane::{build_scheduler, Forwarder, QosEngine, TokenBucket};

struct Discard;

impl Forwarder for Discard {
    fn forward(&self, packet: Packet) {
        black_box(packet);
    }
}

fn packet(len: usize) -> Packet {
    let header = PacketHeader::new(IA::new(1, 0xff00_0000_0110), IA::new(2, 0xff00_0000_0220), 1, L4Type::UDP);
    Packet::new(header, Bytes::from(vec![0u8; len]))
}

fn config() -> QosConfig {
    QosConfig {
        queues: vec![
            QueueConfig { id: 0, min_bandwidth: 90, max_length: 1 << 16, police_rate: u64::MAX / 4, ..Default::default() },
            QueueConfig { id: 1, min_bandwidth: 10, max_length: 1 << 16, police_rate: u64::MAX / 4, ..Default::default() },
        ],
        scheduler: SchedulerConfig { bandwidth: u64::MAX / 4, ..Default::default() },
        ..Default::default()
    }
}

fn bench_police(c: &mut Criterion) {
    let mut bucket = TokenBucket::new(u64::MAX / 4);
    c.bench_function("police_1500", |b| b.iter(|| black_box(bucket.police(black_box(1500)))));
}

fn bench_queue_and_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_and_drain");
    group.throughput(Throughput::Elements(64));

    let engine = QosEngine::new(config()).unwrap();
    let queues = vec![
        engine.core().queue(0).unwrap().clone(),
        engine.core().queue(1).unwrap().clone(),
    ];
    let mut scheduler = build_scheduler(&config().scheduler, queues).unwrap();
    let pkt = packet(1500);

    group.bench_function("64_packets", |b| {
        b.iter(|| {
            for _ in 0..64 {
                black_box(engine.queue_packet(pkt.clone()));
            }
            black_box(scheduler.run_cycle(&Discard))
        })
    });

    group.finish();
}

criterion_group!(benches, bench_police, bench_queue_and_drain);
criterion_main!(benches);
