use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use scdp_billing::{AllocationMethod, LineId, LineInput, allocate};
use scdp_core::Money;

fn lines(count: usize) -> Vec<LineInput> {
    (0..count)
        .map(|i| LineInput {
            line_id: LineId::new(),
            original_amount: Money::from_cents(1_000 + (i as i64 * 137) % 90_000),
            quantity: Some(1.0 + (i % 40) as f64 * 0.25),
        })
        .collect()
}

fn bench_allocate(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocate");

    // Realistic invoice batches run tens to low hundreds of lines.
    for &count in &[10usize, 100, 500] {
        let input = lines(count);
        let target = Money::from_cents(1_000_000);

        group.bench_function(BenchmarkId::new("pro_rata_amount", count), |b| {
            b.iter(|| {
                allocate(
                    black_box(&input),
                    black_box(target),
                    AllocationMethod::ProRataAmount,
                    None,
                )
                .unwrap()
            })
        });

        group.bench_function(BenchmarkId::new("pro_rata_hours", count), |b| {
            b.iter(|| {
                allocate(
                    black_box(&input),
                    black_box(target),
                    AllocationMethod::ProRataHours,
                    None,
                )
                .unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_allocate);
criterion_main!(benches);
