//! Benchmarks for the dependency graph resolver.
//!
//! Performance-critical paths:
//! - `populate_task_views`: runs on every task read
//! - `ready_tasks`: readiness over the full task set
//! - `validate_blocked_by`: cycle detection on every blocker edit
//! - `detect_task_references`: description scan behind `referenced_by`

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use supervisor::domain::{Task, TaskId, TaskStatus};
use supervisor::graph::{
    detect_task_references, populate_task_views, ready_tasks, validate_blocked_by,
};

/// Builds `count` tasks where each task is blocked by the previous `fan_in`
/// tasks and every third task is completed.
fn layered_tasks(count: u64, fan_in: u64) -> Vec<Task> {
    (1..=count)
        .map(|n| {
            let mut task = Task::new(TaskId::from_sequence(n), format!("Task {n}"))
                .expect("titles are non-empty");
            task.blocked_by = (n.saturating_sub(fan_in).max(1)..n)
                .map(TaskId::from_sequence)
                .collect();
            task.description = Some(format!("Follows up TASK-{:03}", n.saturating_sub(1).max(1)));
            if n % 3 == 0 {
                task.status = TaskStatus::Completed;
            }
            task
        })
        .collect()
}

fn bench_populate_task_views(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph/populate_task_views");

    for count in [10_u64, 100, 1000] {
        let tasks = layered_tasks(count, 3);
        group.bench_with_input(BenchmarkId::from_parameter(count), &tasks, |b, tasks| {
            b.iter(|| black_box(populate_task_views(black_box(tasks.clone()))));
        });
    }

    group.finish();
}

fn bench_ready_tasks(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph/ready_tasks");

    for count in [100_u64, 1000] {
        let tasks = layered_tasks(count, 2);
        group.bench_with_input(BenchmarkId::from_parameter(count), &tasks, |b, tasks| {
            b.iter(|| black_box(ready_tasks(black_box(tasks)).len()));
        });
    }

    group.finish();
}

fn bench_cycle_detection(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph/validate_blocked_by");

    for count in [100_u64, 1000] {
        let tasks = layered_tasks(count, 3);
        let head = TaskId::from_sequence(1);

        // Blocking the first task on the last one closes a cycle through the whole chain.
        let closing = vec![TaskId::from_sequence(count)];
        group.bench_with_input(
            BenchmarkId::new("cycle", count),
            &(&head, &closing, &tasks),
            |b, (id, blockers, tasks)| {
                b.iter(|| {
                    black_box(
                        validate_blocked_by::<Task>(id, blockers.as_slice(), tasks.as_slice())
                            .is_err(),
                    )
                });
            },
        );

        let last = TaskId::from_sequence(count);
        let acyclic = vec![TaskId::from_sequence(1), TaskId::from_sequence(count / 2)];
        group.bench_with_input(
            BenchmarkId::new("acyclic", count),
            &(&last, &acyclic, &tasks),
            |b, (id, blockers, tasks)| {
                b.iter(|| {
                    black_box(
                        validate_blocked_by::<Task>(id, blockers.as_slice(), tasks.as_slice())
                            .is_ok(),
                    )
                });
            },
        );
    }

    group.finish();
}

fn bench_reference_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph/detect_task_references");

    let inputs = [
        ("none", "Refactor the login form"),
        ("single", "Depends on TASK-042 being merged"),
        (
            "many",
            "See TASK-001, TASK-002 and TASK-010; TASK-001 again, then TASK-1234 for docs",
        ),
    ];

    for (name, text) in inputs {
        group.bench_with_input(BenchmarkId::from_parameter(name), text, |b, text| {
            b.iter(|| black_box(detect_task_references(black_box(text))));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_populate_task_views,
    bench_ready_tasks,
    bench_cycle_detection,
    bench_reference_scan
);
criterion_main!(benches);
