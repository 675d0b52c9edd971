// Criterion benchmarks for navi-parser
//
// Run benchmarks with:
//   cargo bench -p navi-parser
//
// For detailed output with plots:
//   cargo bench -p navi-parser -- --save-baseline main

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use navi_parser::{Converter, ParserRegistry, PropertyDescriptor, RecordParser};

fn lun_listing(count: usize) -> String {
    (0..count)
        .map(|i| {
            format!(
                "LOGICAL UNIT NUMBER {i}\nName:  lun_{i}\nCurrent Owner:  SP {}\nCurrent State:  Ready\nUser Capacity (Blocks):  {}\nUser Capacity (GBs):  {}.000\nIs Thin LUN:  Yes\n\n",
                if i % 2 == 0 { "A" } else { "B" },
                i * 2_097_152,
                i
            )
        })
        .collect()
}

fn bench_registry_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_load");

    group.bench_function("builtin", |b| {
        b.iter(|| ParserRegistry::builtin().unwrap());
    });

    group.finish();
}

fn bench_parse_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_all");
    let registry = ParserRegistry::builtin().unwrap();
    let parser = registry.parser("Lun").unwrap();

    for count in [1, 10, 100, 500].iter() {
        let text = lun_listing(*count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &text, |b, text| {
            b.iter(|| parser.parse_all(black_box(text)));
        });
    }

    group.finish();
}

fn bench_merge_by_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_by_index");
    let parser = RecordParser::new(
        "Sample",
        vec![
            PropertyDescriptor::label("id", "id:")
                .index()
                .with_converter(Converter::Int),
            PropertyDescriptor::label("value", "value:"),
        ],
    )
    .unwrap();

    // every index appears twice, once without a value
    let text: String = (0..200)
        .map(|i| format!("id: {i}\n\nid: {i}\nvalue: v{i}\n\n"))
        .collect();

    group.bench_function("200_duplicated_indexes", |b| {
        b.iter(|| parser.parse_all(black_box(&text)));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_registry_load,
    bench_parse_all,
    bench_merge_by_index
);
criterion_main!(benches);
