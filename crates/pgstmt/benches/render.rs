use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use pgstmt::{PostgreSql, Sql, WithStmt, render, with};

/// SELECT col0, col1, ... FROM t WHERE col0 = $1 AND col1 = $2 ...
fn build_select_sql(n: usize) -> Sql {
    let mut sql = Sql::new("SELECT ");
    for i in 0..n {
        if i > 0 {
            sql.push(", ");
        }
        sql.push(&format!("col{i}"));
    }
    sql.push(" FROM t WHERE ");
    for i in 0..n {
        if i > 0 {
            sql.push(" AND ");
        }
        sql.push(&format!("col{i} = "));
        sql.push_bind(i as i64);
    }
    sql
}

/// `ctes` CTEs of 5 binds each plus a primary statement.
fn build_with(ctes: usize) -> WithStmt<'static> {
    let mut stmt = with().recursive(ctes > 1);
    for i in 0..ctes {
        stmt = stmt.cte(format!("c{i}"), build_select_sql(5));
    }
    stmt.primary(Sql::new("SELECT * FROM c0"))
}

fn bench_render_sql(c: &mut Criterion) {
    let mut group = c.benchmark_group("render/sql");

    for n in [1, 5, 10, 50, 100] {
        let sql = build_select_sql(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &sql, |b, sql| {
            b.iter(|| black_box(render(sql, &PostgreSql)));
        });
    }

    group.finish();
}

fn bench_render_with(c: &mut Criterion) {
    let mut group = c.benchmark_group("render/with");

    for ctes in [1, 4, 16, 64] {
        let stmt = build_with(ctes);
        group.bench_with_input(BenchmarkId::from_parameter(ctes), &stmt, |b, stmt| {
            b.iter(|| black_box(render(stmt, &PostgreSql)));
        });
    }

    group.finish();
}

fn bench_build_and_render_with(c: &mut Criterion) {
    let mut group = c.benchmark_group("render/build_and_render_with");

    for ctes in [1, 4, 16] {
        group.bench_with_input(BenchmarkId::from_parameter(ctes), &ctes, |b, &ctes| {
            b.iter(|| {
                let stmt = build_with(ctes);
                black_box(render(&stmt, &PostgreSql))
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_render_sql,
    bench_render_with,
    bench_build_and_render_with
);
criterion_main!(benches);
