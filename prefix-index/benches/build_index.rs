mod common;

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use prefix_index::{
    BitLength, PrefixEncoding, PrefixIndex, PrefixSet, Sha256Hasher, analyze, match_index_against_external,
};

use common::generate_random_patterns;

fn bits(n: u8) -> BitLength {
    BitLength::new(n).unwrap()
}

fn bench_build(c: &mut Criterion) {
    let patterns = generate_random_patterns(100_000);

    let mut group = c.benchmark_group("build_100k");
    for b in [16u8, 24, 32] {
        group.bench_function(format!("{b}_bits"), |bench| {
            bench.iter_batched(
                || patterns.clone(),
                |patterns| black_box(PrefixIndex::build(patterns, &Sha256Hasher, bits(b)).unwrap()),
                BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

fn bench_truncate_vs_rebuild(c: &mut Criterion) {
    let patterns = generate_random_patterns(100_000);
    let wide = PrefixIndex::build(patterns.clone(), &Sha256Hasher, bits(32)).unwrap();

    c.bench_function("truncate_32_to_18", |b| {
        b.iter(|| black_box(wide.truncate(bits(18)).unwrap()))
    });
    c.bench_function("rebuild_at_18", |b| {
        b.iter(|| black_box(PrefixIndex::build(&patterns, &Sha256Hasher, bits(18)).unwrap()))
    });
}

fn bench_analyze_and_match(c: &mut Criterion) {
    let patterns = generate_random_patterns(100_000);
    let index = PrefixIndex::build(&patterns[..60_000], &Sha256Hasher, bits(32)).unwrap();
    let other = PrefixIndex::build(&patterns[40_000..], &Sha256Hasher, bits(32)).unwrap();
    let hex: Vec<String> = other.prefixes().map(|p| format!("{:08x}", p.value())).collect();
    let external = PrefixSet::parse(&hex, PrefixEncoding::Hex, bits(32)).unwrap();

    c.bench_function("analyze_60k", |b| b.iter(|| black_box(analyze(&index).unwrap())));
    c.bench_function("match_index_against_external_60k", |b| {
        b.iter(|| black_box(match_index_against_external(&index, &external).unwrap()))
    });
    c.bench_function("parse_hex_population_60k", |b| {
        b.iter(|| black_box(PrefixSet::parse(&hex, PrefixEncoding::Hex, bits(32)).unwrap()))
    });
}

criterion_group!(benches, bench_build, bench_truncate_vs_rebuild, bench_analyze_and_match);
criterion_main!(benches);
