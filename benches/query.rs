use criterion::{black_box, BatchSize, BenchmarkId, Criterion};
use criterion::{criterion_group, criterion_main};

use chronos::query::ColumnFilters;
use chronos::{CancelToken, Dataset, Query, ResolverPolicy, SortSpec, TablePage};

fn synthetic(rows: usize) -> Dataset {
    Dataset::from_rows(
        &["Timestamp", "EventID", "User", "Message"],
        (0..rows).map(|n| {
            let secs = (n * 7919) % 86_400;
            vec![
                format!(
                    "2024-02-01 {:02}:{:02}:{:02}",
                    secs / 3600,
                    (secs / 60) % 60,
                    secs % 60
                ),
                (4624 + n % 7).to_string(),
                format!("user{}", n % 97),
                format!("event {n} from host{}", n % 13),
            ]
        }),
    )
}

fn bench_sequence(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequence");
    for &rows in &[10_000_usize, 100_000] {
        let dataset = synthetic(rows);
        group.bench_with_input(BenchmarkId::from_parameter(rows), &dataset, |b, dataset| {
            b.iter_batched(
                || dataset.clone(),
                |dataset| {
                    chronos::sequence::sequence(
                        dataset,
                        &ResolverPolicy::sequencing(),
                        &CancelToken::new(),
                    )
                    .expect("sequence")
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let seq = chronos::sequence::sequence(
        synthetic(100_000),
        &ResolverPolicy::sequencing(),
        &CancelToken::new(),
    )
    .expect("sequence");
    let cancel = CancelToken::new();

    c.bench_function("query/search_sort_page", |b| {
        b.iter(|| {
            let view = Query::new()
                .search(black_box("host7"))
                .column_filters(ColumnFilters::new().with("User", "user1"))
                .sort(SortSpec::new("EventID", true))
                .evaluate(&seq, &cancel)
                .expect("evaluate");
            TablePage::build(&seq, &view, 1, 50)
        });
    });
}

criterion_group!(benches, bench_sequence, bench_query);
criterion_main!(benches);
