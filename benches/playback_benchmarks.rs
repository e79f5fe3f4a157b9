use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::SmallRng;

use stagehand::distraction::{Scheduler, default_policies};
use stagehand::playback::{DiffAction, Director, FileDiff, Unit};
use stagehand::problem::{FileEntry, MultiFileProblem, Problem};

fn make_problem(files: usize, lines: usize) -> Problem {
    let entries = (0..files)
        .map(|f| {
            let content: String = (0..lines)
                .map(|l| format!("def f{f}_{l}(x):\n    return x * {l}\n"))
                .collect();
            FileEntry::new(format!("mod{f}.py"), content)
        })
        .collect();
    Problem::MultiFile(MultiFileProblem::new("bench", "", entries, None).unwrap())
}

fn drain(director: &mut Director) -> usize {
    let mut units = 0;
    loop {
        units += 1;
        match director.emit_next() {
            Unit::ExecuteScene | Unit::Idle => return units,
            Unit::NextFile => {
                director.advance_sequential();
            }
            _ => {}
        }
    }
}

fn bench_emit(c: &mut Criterion) {
    let problem = make_problem(4, 200);

    c.bench_function("emit_next whole scene (4 files x 200 fns)", |b| {
        b.iter(|| {
            let mut director = Director::with_rng(SmallRng::seed_from_u64(7), true);
            director.start_new_scene(black_box(&problem));
            drain(&mut director)
        })
    });
}

fn bench_emit_with_switches(c: &mut Criterion) {
    let problem = make_problem(4, 200);

    c.bench_function("emit_next with file hops every 50 chars", |b| {
        b.iter(|| {
            let mut director = Director::with_rng(SmallRng::seed_from_u64(7), true);
            director.start_new_scene(&problem);
            let mut n = 0u32;
            loop {
                n += 1;
                if n % 50 == 0 {
                    director.request_file_switch();
                }
                match director.emit_next() {
                    Unit::ExecuteScene | Unit::Idle => break,
                    Unit::NextFile => {
                        director.advance_sequential();
                    }
                    _ => {}
                }
            }
            n
        })
    });
}

fn bench_diff_apply(c: &mut Criterion) {
    let problem = make_problem(4, 100);
    let diffs: Vec<FileDiff> = (0..4)
        .map(|f| FileDiff {
            filename: format!("mod{f}.py"),
            action: DiffAction::Modify,
            content: "def g(x):\n    return x\n".repeat(100),
        })
        .collect();

    c.bench_function("diff-apply 4 modified files", |b| {
        b.iter(|| {
            let mut director = Director::with_rng(SmallRng::seed_from_u64(7), true);
            director.start_new_scene(&problem);
            drain(&mut director);
            director.begin_diff_apply(black_box(diffs.clone()));
            drain(&mut director)
        })
    });
}

fn bench_scheduler(c: &mut Criterion) {
    c.bench_function("scheduler on_character_emitted (10k chars)", |b| {
        b.iter(|| {
            let mut scheduler =
                Scheduler::with_rng(default_policies(), 40, 120, SmallRng::seed_from_u64(3));
            let mut fired = 0;
            for _ in 0..10_000 {
                if scheduler.on_character_emitted().is_some() {
                    fired += 1;
                }
            }
            fired
        })
    });
}

criterion_group!(
    benches,
    bench_emit,
    bench_emit_with_switches,
    bench_diff_apply,
    bench_scheduler
);
criterion_main!(benches);
