//! Classification benchmarks
//!
//! Cached versus uncached resolution as the rule count grows.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use qos_classifier::{ClassRule, MatchSpec, RuleSet};
use qos_common::{Asn, Isd, L4Type, PacketHeader, IA};

fn rules(count: u64) -> Vec<ClassRule> {
    (0..count)
        .map(|i| {
            let src = match i % 4 {
                0 => MatchSpec::Exact(IA::new(1, i)),
                1 => MatchSpec::AsOnly(Asn(i)),
                2 => MatchSpec::IsdOnly(Isd((i % 64) as u16)),
                _ => MatchSpec::Range(IA::new(2, i), IA::new(2, i + 10)),
            };
            let dst = if i % 3 == 0 { MatchSpec::Any } else { MatchSpec::Exact(IA::new(3, i)) };
            ClassRule::new(format!("r{}", i), (i % 17) as i32, src, dst, (i % 8) as u32)
        })
        .collect()
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");

    for size in [100u64, 1000, 10000] {
        let set = RuleSet::from_rules(rules(size), 1, None);
        let header = PacketHeader::new(IA::new(1, 40), IA::new(3, 40), 1, L4Type::UDP);

        group.bench_with_input(BenchmarkId::new("cached", size), &header, |b, h| {
            b.iter(|| black_box(set.resolve(black_box(h))))
        });

        group.bench_with_input(BenchmarkId::new("uncached", size), &header, |b, h| {
            b.iter(|| black_box(set.find_best(black_box(h))))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_resolve);
criterion_main!(benches);
