use std::sync::Arc;

use glam::Vec3;
use vizij_motion_core::database::{partition_count, BuildSettings};
use vizij_motion_core::{
    BoneSample, Clip, ClipContact, ContactSample, DatabaseStore, Frame, FrameDatabase,
    MotionDataGroup, MotionError, SectionDesc, SectionInterval, SectionTable, TimeRange,
    TrajectoryPoint,
};

fn frame(t: f32, traj: usize, bones: usize, contacts: usize) -> Frame {
    Frame {
        local_time: t,
        trajectory: vec![TrajectoryPoint::new(Vec3::Z * t, Vec3::Z, Vec3::Z); traj],
        pose: vec![BoneSample::new(Vec3::Y * t, Vec3::ZERO); bones],
        contacts: vec![ContactSample::new(Vec3::X, Vec3::Y); contacts],
        ..Default::default()
    }
}

fn clip(name: &str, frames: usize, traj: usize, bones: usize, contacts: usize) -> Clip {
    let dt = 1.0 / 30.0;
    let frames = (0..frames)
        .map(|i| frame(i as f32 * dt, traj, bones, contacts))
        .collect::<Vec<_>>();
    let length = (frames.len().max(2) - 1) as f32 * dt;
    let mut clip = Clip::new(name, length, false, frames);
    clip.contacts = (0..contacts)
        .map(|k| ClipContact {
            position: Vec3::X,
            normal: Vec3::Y,
            start_time: 0.1 * (k + 1) as f32,
            end_time: 0.1 * (k + 2) as f32,
        })
        .collect();
    clip
}

fn settings(max_frames_per_job: usize, workers: usize) -> BuildSettings {
    BuildSettings {
        max_frames_per_job,
        workers,
    }
}

/// it should spread frames over ceil(F / J) partitions capped at the worker count
#[test]
fn partitions_follow_job_size_and_worker_cap() {
    let group = MotionDataGroup::new("g", vec![clip("a", 70, 2, 3, 0), clip("b", 31, 2, 3, 0)]);
    let sections = SectionTable::default();

    let db = FrameDatabase::build(&group, 0, &sections, settings(25, 8), None).unwrap();
    assert_eq!(db.usable_frames(), 101);
    assert_eq!(db.partitions.len(), partition_count(101, 25, 8));
    assert_eq!(db.partitions.len(), 5);
    let sizes = db.partition_sizes();
    assert_eq!(sizes.iter().sum::<usize>(), 101);
    assert_eq!(sizes[..4], [20, 20, 20, 20]);
    assert_eq!(sizes[4], 21);

    let capped = FrameDatabase::build(&group, 0, &sections, settings(10, 3), None).unwrap();
    assert_eq!(capped.partitions.len(), 3);
    assert_eq!(capped.partition_sizes(), vec![33, 33, 35]);

    let single = FrameDatabase::build(&group, 0, &sections, settings(1000, 8), None).unwrap();
    assert_eq!(single.partitions.len(), 1);
}

/// it should keep a frame's trajectory, pose and metadata at the same index
#[test]
fn channels_stay_aligned_within_partitions() {
    let group = MotionDataGroup::new("g", vec![clip("a", 40, 4, 2, 0)]);
    let db =
        FrameDatabase::build(&group, 0, &SectionTable::default(), settings(7, 4), None).unwrap();
    for part in &db.partitions {
        assert_eq!(part.trajectory.len(), part.len() * db.layout.trajectory_len);
        assert_eq!(part.bones.len(), part.len() * db.layout.bone_count);
        for (i, meta) in part.meta.iter().enumerate() {
            let traj = part.trajectory_of(i, &db.layout);
            let pose = part.pose_of(i, &db.layout);
            assert!((traj[0].position.z - meta.local_time).abs() < 1e-6);
            assert!((pose[0].position.y - meta.local_time).abs() < 1e-6);
        }
    }
}

/// it should reject a group whose clips disagree on the pose sample count
#[test]
fn schema_mismatch_is_rejected() {
    let group = MotionDataGroup::new("g", vec![clip("a", 10, 2, 3, 0), clip("b", 10, 2, 4, 0)]);
    let err = FrameDatabase::build(&group, 0, &SectionTable::default(), settings(64, 2), None)
        .unwrap_err();
    match err {
        MotionError::SchemaMismatch {
            clip,
            channel,
            expected,
            found,
            ..
        } => {
            assert_eq!(clip, "b");
            assert_eq!(channel, "pose");
            assert_eq!((expected, found), (3, 4));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

/// it should refuse contact states whose clips carry too few contact points
#[test]
fn insufficient_contact_points_are_rejected() {
    let group = MotionDataGroup::new("vault", vec![clip("v", 10, 2, 3, 2)]);
    let err = FrameDatabase::build(
        &group,
        0,
        &SectionTable::default(),
        settings(64, 2),
        Some(("vault", 3)),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        MotionError::InsufficientContactPoints {
            required: 3,
            found: 2,
            ..
        }
    ));

    let ok = FrameDatabase::build(
        &group,
        0,
        &SectionTable::default(),
        settings(64, 2),
        Some(("vault", 2)),
    )
    .unwrap();
    assert_eq!(ok.layout.contact_count, 2);
    assert!((ok.clip_contact_start[0] - 0.1).abs() < 1e-6);
}

/// it should leave never/not-searching windows out and tag section intervals
#[test]
fn search_windows_and_sections_shape_the_database() {
    let mut c = clip("a", 31, 2, 2, 0);
    c.never_searching.push(TimeRange::new(0.0, 0.099));
    c.not_searching.push(TimeRange::new(0.9, 2.0));
    c.sections.push(SectionInterval {
        section: "Fast".into(),
        ranges: vec![TimeRange::new(0.5, 1.0)],
    });
    let sections = SectionTable::build(&[SectionDesc {
        name: "Fast".into(),
        allowed_with: vec![],
    }])
    .unwrap();
    let fast = sections.index("Fast").unwrap();
    let db = FrameDatabase::build(
        &MotionDataGroup::new("g", vec![c]),
        0,
        &sections,
        settings(64, 1),
        None,
    )
    .unwrap();

    // 31 frames at 1/30 s: 3 before 0.1 and 4 from 0.9 on are dropped.
    assert_eq!(db.usable_frames(), 24);
    for meta in &db.partitions[0].meta {
        assert!(meta.local_time >= 0.099 && meta.local_time < 0.9);
        assert!(meta.sections.contains(0));
        assert_eq!(meta.sections.contains(fast), meta.local_time >= 0.5);
    }
}

fn store() -> DatabaseStore {
    DatabaseStore::new(settings(64, 2), Arc::new(SectionTable::default()))
}

/// it should build on first acquire and free once the last reference is released
#[test]
fn store_reference_counting() {
    let store = store();
    let id = store.register(
        "locomotion",
        vec![MotionDataGroup::new("walk", vec![clip("a", 10, 2, 2, 0)])],
        None,
    );
    assert!(!store.is_built(id));
    assert!(matches!(
        store.get(id),
        Err(MotionError::DatabaseNotBuilt { .. })
    ));

    let first = store.acquire(id).unwrap();
    let second = store.acquire(id).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(store.ref_count(id), 2);

    store.release(id).unwrap();
    assert!(store.is_built(id));
    store.release(id).unwrap();
    assert!(!store.is_built(id));
    assert_eq!(store.ref_count(id), 0);

    assert!(matches!(
        store.release(id),
        Err(MotionError::DatabaseOverReleased { .. })
    ));
}

/// it should rebuild a live database when groups change and bump its generation
#[test]
fn store_group_edits_rebuild_live_databases() {
    let store = store();
    let id = store.register(
        "locomotion",
        vec![MotionDataGroup::new("walk", vec![clip("a", 10, 2, 2, 0)])],
        None,
    );
    let before = store.acquire(id).unwrap();
    let generation = store.generation(id);

    store
        .add_group(id, MotionDataGroup::new("run", vec![clip("r", 12, 2, 2, 0)]))
        .unwrap();
    assert_eq!(store.group_count(id), 2);
    assert_eq!(store.group_index(id, "run"), Some(1));
    assert!(store.generation(id) > generation);
    let after = store.get(id).unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(after.groups.len(), 2);
    assert_eq!(before.groups.len(), 1);

    assert!(matches!(
        store.add_group(id, MotionDataGroup::new("run", vec![clip("r", 12, 2, 2, 0)])),
        Err(MotionError::DuplicateName { .. })
    ));
    // Layouts are per group, so a group with longer trajectories is fine.
    assert!(store
        .add_group(id, MotionDataGroup::new("bad", vec![clip("x", 12, 5, 2, 0)]))
        .is_ok());
    let removed = store.remove_group(id, "bad").unwrap();
    assert_eq!(removed.name, "bad");

    store.remove_group(id, "walk").unwrap();
    assert_eq!(store.group_index(id, "run"), Some(0));
    assert!(matches!(
        store.remove_group(id, "walk"),
        Err(MotionError::UnknownGroup { .. })
    ));
    assert!(matches!(
        store.remove_group(id, "run"),
        Err(MotionError::EmptyState { .. })
    ));
    store.release(id).unwrap();
}
