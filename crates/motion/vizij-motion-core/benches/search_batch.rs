//! Search batch throughput over synthetic locomotion data.
//!
//! Run with: cargo bench -p vizij-motion-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use glam::Vec3;
use vizij_motion_core::database::BuildSettings;
use vizij_motion_core::search::search_sequential;
use vizij_motion_core::{
    BoneSample, Clip, Config, CostConfig, Frame, FrameDatabase, JobSystem, MotionDataGroup, Query,
    SearchRequest, SectionTable, TrajectoryPoint,
};

const BONES: usize = 6;

fn pose(t: f32, offset: f32) -> Vec<BoneSample> {
    (0..BONES)
        .map(|k| {
            let a = t * 3.1 + k as f32 + offset;
            BoneSample::new(
                Vec3::new(a.sin(), 1.0 + 0.1 * a.cos(), a.cos()),
                Vec3::new(a.cos(), -0.1 * a.sin(), -a.sin()),
            )
        })
        .collect()
}

fn trajectory(speed: f32, turn: f32) -> Vec<TrajectoryPoint> {
    [-0.5f32, -0.25, 0.25, 0.5, 0.75, 1.0]
        .iter()
        .map(|t| {
            let dir = Vec3::new((turn * t).sin(), 0.0, (turn * t).cos());
            TrajectoryPoint::new(dir * speed * *t, dir * speed, dir)
        })
        .collect()
}

/// `clips` looping clips of `seconds` each at 30 fps.
fn group(clips: usize, seconds: f32) -> MotionDataGroup {
    let frames_per_clip = (seconds * 30.0) as usize;
    let clips = (0..clips)
        .map(|c| {
            let speed = 0.5 + c as f32 * 0.25;
            let turn = (c as f32 * 0.37).sin();
            let frames = (0..frames_per_clip)
                .map(|i| {
                    let t = i as f32 / 30.0;
                    Frame {
                        local_time: t,
                        trajectory: trajectory(speed, turn),
                        pose: pose(t, c as f32),
                        ..Default::default()
                    }
                })
                .collect();
            Clip::new(format!("clip_{c}"), seconds, true, frames)
        })
        .collect();
    MotionDataGroup::new("bench", clips)
}

fn bench_search(c: &mut Criterion) {
    let mut group_bench = c.benchmark_group("SearchBatch");
    let jobs = JobSystem::new(&Config::default()).expect("search pool");
    let sections = SectionTable::default();
    let query = Query::new(pose(1.3, 2.0), trajectory(1.0, 0.2));
    let request = SearchRequest::basic(query, CostConfig::default());

    let cases = [("12_clips", group(12, 10.0)), ("48_clips", group(48, 10.0))];
    for (name, data) in &cases {
        let db = FrameDatabase::build(
            data,
            0,
            &sections,
            BuildSettings {
                max_frames_per_job: 512,
                workers: jobs.workers(),
            },
            None,
        )
        .expect("bench database");
        group_bench.throughput(Throughput::Elements(db.usable_frames() as u64));

        group_bench.bench_with_input(BenchmarkId::new("parallel", name), &db, |b, db| {
            b.iter(|| jobs.run(black_box(db), black_box(&request)));
        });
        group_bench.bench_with_input(BenchmarkId::new("sequential", name), &db, |b, db| {
            b.iter(|| search_sequential(black_box(db), black_box(&request)));
        });
    }

    group_bench.finish();
}

criterion_group!(benches, bench_search);
criterion_main!(benches);
