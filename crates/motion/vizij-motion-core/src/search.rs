//! Parallel nearest-neighbour search over a frame database.
//!
//! One job scans one partition and reports its local best; the batch result is
//! the min-reduction of every job's winner. Jobs share the database read-only
//! and keep no state between invocations.

use std::sync::mpsc;
use std::sync::Arc;

use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::contact::ContactPattern;
use crate::cost::{
    contact_point_cost, pose_cost, ranking_cost, trajectory_cost, ContactCostMode, CostConfig,
};
use crate::data::{ContactSample, TimeRange};
use crate::database::{FrameDatabase, Partition};
use crate::error::{MotionError, Result};
use crate::query::Query;
use crate::store::StateDatabase;

/// Result of a search batch.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Winner {
    pub group_index: u32,
    /// `-1` when no better pose was found.
    pub clip_index: i32,
    pub local_time: f32,
    pub cost: f32,
}

impl Winner {
    pub const NONE: Winner = Winner {
        group_index: 0,
        clip_index: -1,
        local_time: 0.0,
        cost: f32::INFINITY,
    };

    #[inline]
    pub fn is_none(&self) -> bool {
        self.clip_index < 0
    }

    /// Clip index, or `None` for the sentinel.
    #[inline]
    pub fn clip(&self) -> Option<usize> {
        usize::try_from(self.clip_index).ok()
    }

    /// Strict ordering used by the reduction: lower cost first, then
    /// `(group, clip, time)`.
    fn better_than(&self, other: &Winner) -> bool {
        if self.is_none() {
            return false;
        }
        if other.is_none() {
            return true;
        }
        match self.cost.total_cmp(&other.cost) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Greater => false,
            std::cmp::Ordering::Equal => {
                (self.group_index, self.clip_index, self.local_time.to_bits())
                    < (other.group_index, other.clip_index, other.local_time.to_bits())
            }
        }
    }
}

impl Default for Winner {
    fn default() -> Self {
        Winner::NONE
    }
}

/// Reduce per-partition winners to the global best.
pub fn aggregate<'a>(winners: impl IntoIterator<Item = &'a Winner>) -> Winner {
    winners.into_iter().fold(Winner::NONE, |best, w| {
        if w.better_than(&best) {
            *w
        } else {
            best
        }
    })
}

/// Time window of one clip in which a single-animation search may land.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClipWindow {
    pub clip: u32,
    pub range: TimeRange,
}

/// Search variant.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum SearchKind {
    /// Every usable frame of every clip.
    #[default]
    Basic,
    /// Only frames inside the given per-clip windows. An empty list leaves
    /// every clip eligible.
    SingleAnimation { windows: Vec<ClipWindow> },
    /// Match the query's contacts against the frame's per `pattern`.
    ContactEnter { pattern: ContactPattern },
    /// Match the query's single contact against the frame's first.
    Impact,
}

/// Everything a batch needs besides the database.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchRequest {
    pub query: Query,
    pub kind: SearchKind,
    pub cost: CostConfig,
    /// Clip that may not win (the playing clip when it cannot find itself).
    pub exclude_clip: Option<u32>,
}

impl SearchRequest {
    pub fn basic(query: Query, cost: CostConfig) -> Self {
        Self {
            query,
            kind: SearchKind::Basic,
            cost,
            exclude_clip: None,
        }
    }

    fn uses_contacts(&self) -> bool {
        matches!(
            self.kind,
            SearchKind::ContactEnter { .. } | SearchKind::Impact
        )
    }
}

fn contact_term(
    kind: &SearchKind,
    targets: &[ContactSample],
    frame: &[ContactSample],
    mode: ContactCostMode,
) -> f32 {
    match kind {
        SearchKind::ContactEnter { pattern } => (0..targets.len())
            .filter_map(|i| {
                pattern
                    .frame_index(i, targets.len(), frame.len())
                    .map(|fi| contact_point_cost(&targets[i], &frame[fi], mode))
            })
            .sum(),
        SearchKind::Impact => match (targets.first(), frame.first()) {
            (Some(t), Some(f)) => contact_point_cost(t, f, mode),
            _ => 0.0,
        },
        _ => 0.0,
    }
}

/// Scan one partition; returns its local best or [`Winner::NONE`].
pub fn scan_partition(
    db: &FrameDatabase,
    partition: &Partition,
    request: &SearchRequest,
) -> Winner {
    let layout = &db.layout;
    let query = &request.query;
    let cost_cfg = &request.cost;
    let contacts = request.uses_contacts();
    let mut best = Winner::NONE;

    for (i, meta) in partition.meta.iter().enumerate() {
        if !meta.sections.intersects(query.allowed_sections) {
            continue;
        }
        if request.exclude_clip == Some(meta.clip) {
            continue;
        }
        match &request.kind {
            SearchKind::SingleAnimation { windows } if !windows.is_empty() => {
                let inside = windows
                    .iter()
                    .any(|w| w.clip == meta.clip && w.range.contains(meta.local_time));
                if !inside {
                    continue;
                }
            }
            SearchKind::ContactEnter { .. } | SearchKind::Impact => {
                let start = db
                    .clip_contact_start
                    .get(meta.clip as usize)
                    .copied()
                    .unwrap_or(f32::INFINITY);
                if meta.local_time > start {
                    continue;
                }
            }
            _ => {}
        }

        let traj = trajectory_cost(
            &query.trajectory,
            partition.trajectory_of(i, layout),
            query.responsivity,
            &cost_cfg.channels,
        );
        let pose = pose_cost(&query.pose, partition.pose_of(i, layout), &cost_cfg.channels);
        let contact = if contacts {
            contact_term(
                &request.kind,
                &query.contacts,
                partition.contacts_of(i, layout),
                cost_cfg.contact_mode,
            )
        } else {
            0.0
        };
        let candidate = Winner {
            group_index: db.group_index,
            clip_index: meta.clip as i32,
            local_time: meta.local_time,
            cost: ranking_cost(&cost_cfg.weights, traj, pose, contact),
        };
        if candidate.better_than(&best) {
            best = candidate;
        }
    }
    best
}

/// Single-threaded reference scan of the whole group.
pub fn search_sequential(db: &FrameDatabase, request: &SearchRequest) -> Winner {
    let winners: Vec<Winner> = db
        .partitions
        .iter()
        .map(|p| scan_partition(db, p, request))
        .collect();
    aggregate(&winners)
}

/// Search phase of an animator, made explicit so the one-frame deferral of
/// periodic searches is observable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchPhase {
    /// No batch in flight.
    #[default]
    Idle,
    /// A batch was issued this frame and has not been joined.
    Searching,
    /// A joined result is waiting to be consumed.
    Ready,
}

/// Handle to a batch running on the job system.
#[derive(Debug)]
pub struct PendingSearch {
    rx: mpsc::Receiver<Winner>,
    /// Database generation the batch was issued against.
    pub generation: u64,
    pub group_index: u32,
}

impl PendingSearch {
    /// Non-blocking check for the batch result.
    pub fn poll(&self) -> Option<Result<Winner>> {
        match self.rx.try_recv() {
            Ok(w) => Some(Ok(w)),
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => Some(Err(MotionError::SearchAborted)),
        }
    }

    /// Block until every job of the batch has finished.
    pub fn join(self) -> Result<Winner> {
        self.rx.recv().map_err(|_| MotionError::SearchAborted)
    }
}

/// Worker pool running search jobs.
#[derive(Clone)]
pub struct JobSystem {
    pool: Arc<rayon::ThreadPool>,
    workers: usize,
}

impl std::fmt::Debug for JobSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobSystem")
            .field("workers", &self.workers)
            .finish()
    }
}

impl JobSystem {
    pub fn new(config: &Config) -> Result<Self> {
        let workers = config.worker_threads();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("motion-search-{i}"))
            .build()
            .map_err(|e| MotionError::ThreadPool {
                reason: e.to_string(),
            })?;
        Ok(Self {
            pool: Arc::new(pool),
            workers,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run a batch and wait for all of its jobs.
    pub fn run(&self, db: &FrameDatabase, request: &SearchRequest) -> Winner {
        let winners: Vec<Winner> = self.pool.install(|| {
            db.partitions
                .par_iter()
                .map(|p| scan_partition(db, p, request))
                .collect()
        });
        aggregate(&winners)
    }

    /// Issue a batch against group `group` of `db` without waiting.
    pub fn spawn(
        &self,
        db: Arc<StateDatabase>,
        group: usize,
        generation: u64,
        request: SearchRequest,
    ) -> PendingSearch {
        let (tx, rx) = mpsc::channel();
        let group_index = group as u32;
        debug!(
            "issuing search on state '{}' group {} ({:?})",
            db.name, group, request.kind
        );
        self.pool.spawn(move || {
            let winner = match db.group(group) {
                Some(g) => {
                    let winners: Vec<Winner> = g
                        .frames
                        .partitions
                        .par_iter()
                        .map(|p| scan_partition(&g.frames, p, &request))
                        .collect();
                    aggregate(&winners)
                }
                None => Winner::NONE,
            };
            // Receiver gone means the animator moved on.
            let _ = tx.send(winner);
        });
        PendingSearch {
            rx,
            generation,
            group_index,
        }
    }
}
