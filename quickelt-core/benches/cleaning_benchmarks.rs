use criterion::{Criterion, black_box, criterion_group, criterion_main};
use quickelt_core::cleaning::{CleaningConfig, CleaningPass, clean};
use quickelt_core::columnar::{self, FileFormat, OutputFormat};
use quickelt_core::table::DataTable;
use serde_json::{Value, json};

fn messy_table(rows: usize) -> DataTable {
    let categories = ["North", "south ", "EAST", "west", "n/a"];
    let data = (0..rows)
        .map(|i| {
            let amount = if i % 17 == 0 {
                Value::Null
            } else if i % 101 == 0 {
                json!(1_000_000)
            } else {
                json!((i % 250) as f64 * 1.5)
            };
            vec![
                json!(i / 2),
                json!(format!("  Customer #{} ", i % 400)),
                amount,
                json!(categories[i % categories.len()]),
                json!(format!("{}", i % 90)),
                if i % 5 == 0 { json!("x") } else { Value::Null },
            ]
        })
        .collect();
    DataTable::new(
        vec![
            "Order ID".into(),
            "Customer Name".into(),
            "Amount".into(),
            "Region".into(),
            "Age".into(),
            "Notes".into(),
        ],
        data,
    )
    .unwrap()
}

fn bench_cleaning(c: &mut Criterion) {
    let table = messy_table(5_000);
    let config = CleaningConfig::default();

    c.bench_function("clean_default_5000_rows", |b| {
        b.iter(|| clean(black_box(&table), black_box(&config)).unwrap())
    });

    for pass in [
        CleaningPass::Deduplicate,
        CleaningPass::MissingValues,
        CleaningPass::TypeCoercion,
        CleaningPass::Outliers,
        CleaningPass::Text,
    ] {
        let only = CleaningConfig::only(pass);
        c.bench_function(&format!("clean_only_{}", pass.as_str()), |b| {
            b.iter(|| clean(black_box(&table), black_box(&only)).unwrap())
        });
    }
}

fn bench_codecs(c: &mut Criterion) {
    let (table, _) = clean(&messy_table(5_000), &CleaningConfig::default()).unwrap();

    for output in [OutputFormat::Parquet, OutputFormat::Csv, OutputFormat::Jsonl] {
        c.bench_function(&format!("encode_{}", output.extension()), |b| {
            b.iter(|| columnar::encode(black_box(&table), output, 1024).unwrap())
        });
    }

    let parquet = columnar::encode(&table, OutputFormat::Parquet, 1024).unwrap();
    c.bench_function("decode_parquet", |b| {
        b.iter(|| columnar::decode(black_box(parquet.clone()), FileFormat::Parquet, b',').unwrap())
    });
}

criterion_group!(benches, bench_cleaning, bench_codecs);
criterion_main!(benches);
