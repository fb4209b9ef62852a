//! Benchmarks for the pure scoring paths of the guardian and the quorum.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use warden::domain::models::{AdvisorOpinion, ConvergenceStage, ParseStatus, Vote};
use warden::services::{classify_changes, parse_advisor_output, resolve_convergence};
use warden::GuardContract;

fn changed_files(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| match i % 4 {
            0 => format!("src/module_{i}/mod.rs"),
            1 => format!("docs/page_{i}.md"),
            2 => format!("migrations/{i:04}_change.sql"),
            _ => format!("src-other/file_{i}.rs"),
        })
        .collect()
}

fn bench_classify_changes(c: &mut Criterion) {
    let contract = GuardContract::new("bench")
        .with_scope("src/**")
        .with_scope("tests/")
        .with_protected("migrations/")
        .with_protected(".github/");

    let mut group = c.benchmark_group("classify_changes");
    for n in [10, 100, 1_000] {
        let files = changed_files(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &files, |b, files| {
            b.iter(|| classify_changes(black_box(files), black_box(&contract)));
        });
    }
    group.finish();
}

fn bench_resolve_convergence(c: &mut Criterion) {
    let votes = [Vote::Approve, Vote::Reject, Vote::Approve, Vote::Abstain, Vote::Reject];
    let opinions: Vec<AdvisorOpinion> = votes
        .iter()
        .enumerate()
        .map(|(i, vote)| AdvisorOpinion {
            advisor: format!("advisor-{i}"),
            vote: *vote,
            summary: String::new(),
            evidence_ref: (i % 2 == 0).then(|| format!("ref-{i}")),
            parse_status: ParseStatus::Ok,
        })
        .collect();

    c.bench_function("resolve_convergence_5", |b| {
        b.iter(|| {
            resolve_convergence(
                ConvergenceStage::Exec,
                black_box(opinions.clone()),
                black_box(true),
            )
        });
    });
}

fn bench_parse_advisor_output(c: &mut Criterion) {
    let mut noisy = "analysis line\n".repeat(200);
    noisy.push_str(r#"{"vote":"approve","summary":"fine","evidenceRef":"r"}"#);

    c.bench_function("parse_advisor_output_structured", |b| {
        b.iter(|| parse_advisor_output(black_box(&noisy)));
    });
    c.bench_function("parse_advisor_output_fallback", |b| {
        b.iter(|| parse_advisor_output(black_box("Looks good to me, ship it.")));
    });
}

criterion_group!(
    benches,
    bench_classify_changes,
    bench_resolve_convergence,
    bench_parse_advisor_output
);
criterion_main!(benches);
