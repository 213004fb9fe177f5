use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use text2sql_core::sql::types::Value;
use text2sql_core::{sanitize, AppConfig, ExplainMode, Explainer, QueryResult, ResultFormatter};

fn explain_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("explain");

    let simple = "SELECT name FROM employees";
    let full = "SELECT name, salary FROM employees WHERE department = 'IT' ORDER BY salary DESC LIMIT 3";
    let join = "SELECT e.name, d.name FROM employees e JOIN departments d ON e.department_id = d.id WHERE d.location = '北京'";

    let single = Explainer::new(ExplainMode::SingleTable);
    let multi = Explainer::new(ExplainMode::MultiTable);

    group.bench_function("simple_select", |b| {
        b.iter(|| black_box(single.explain(black_box(simple)).unwrap().to_string()));
    });

    group.bench_function("all_clauses", |b| {
        b.iter(|| black_box(single.explain(black_box(full)).unwrap().to_string()));
    });

    group.bench_function("multi_table_join", |b| {
        b.iter(|| black_box(multi.explain(black_box(join)).unwrap().to_string()));
    });

    group.bench_function("sanitize_fenced", |b| {
        let fenced = format!("```sql\n{}\n```", full);
        b.iter(|| black_box(sanitize(black_box(&fenced))));
    });

    group.finish();
}

fn format_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("format");

    let formatter = ResultFormatter::new(AppConfig::preset("employees").unwrap().formatting);
    let headers: Vec<String> = ["id", "name", "department", "salary"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    for row_count in [1, 10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*row_count as u64));

        let rows: Vec<Vec<Value>> = (0..*row_count)
            .map(|i| {
                vec![
                    Value::Integer(i),
                    Value::Text(format!("员工{}", i)),
                    Value::Text("IT".to_string()),
                    Value::Float(60000.0 + (i % 50) as f64 * 500.0),
                ]
            })
            .collect();
        let result = QueryResult::Rows {
            headers: headers.clone(),
            rows,
        };

        group.bench_with_input(
            BenchmarkId::new("salary_grid", row_count),
            &result,
            |b, result| {
                b.iter(|| black_box(formatter.format(result)));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, explain_benchmark, format_benchmark);
criterion_main!(benches);
