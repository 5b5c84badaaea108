//! Duplicate resolution for naive candidate lists
//!
//! The naive search lets several cases claim the same control. Resolution
//! picks, from each case's candidates, at most `final_count` controls such
//! that no control serves more than `max_control_reuse` cases, preferring
//! short distances and then filling short cases through augmenting paths.

use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::algorithm::matching::types::{CaseMatch, Neighbor};
use crate::error::{MatchError, Result};

const COLLABORATOR: &str = "duplicate resolver";

/// Stack bytes budgeted per augmenting-path frame
pub const FRAME_BYTES: usize = 4096;

/// Parameters of one resolution run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Controls to retain per case
    pub final_count: usize,
    /// Worker threads
    pub threads: usize,
    /// Worker stack size in bytes
    pub stack_size: usize,
    /// Cases one control may serve
    pub max_control_reuse: usize,
}

impl ResolverConfig {
    /// Deepest augmenting path that fits in the worker stack
    #[must_use]
    pub const fn depth_budget(&self) -> usize {
        self.stack_size / FRAME_BYTES
    }
}

/// Selects final controls from naive candidate lists
pub trait DuplicateResolver: Send + Sync {
    /// Resolve the candidates of one stratum
    ///
    /// The result holds one entry per input case, in input order, each with at
    /// most `final_count` controls drawn from that case's candidates.
    fn resolve(
        &self,
        stratum: &str,
        naive: &[CaseMatch],
        config: &ResolverConfig,
    ) -> Result<Vec<CaseMatch>>;
}

/// Greedy assignment followed by augmenting-path repair
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyResolver;

impl DuplicateResolver for GreedyResolver {
    fn resolve(
        &self,
        stratum: &str,
        naive: &[CaseMatch],
        config: &ResolverConfig,
    ) -> Result<Vec<CaseMatch>> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .stack_size(config.stack_size)
            .build()
            .map_err(|e| {
                MatchError::collaborator(
                    COLLABORATOR,
                    format!("stratum '{stratum}'"),
                    format!("failed to start worker pool: {e}"),
                )
            })?;

        pool.install(|| {
            resolve_candidates(
                naive,
                config.final_count,
                config.max_control_reuse,
                config.depth_budget(),
            )
        })
        .map_err(|e| match e {
            ResolveError::DepthExceeded(depth) => MatchError::StackExhausted {
                stratum: stratum.to_string(),
                depth,
            },
        })
    }
}

/// Failure inside the assignment routine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    /// An augmenting path needed more frames than the budget allows
    DepthExceeded(usize),
}

/// Assign controls to cases under per-case and per-control capacities
pub fn resolve_candidates(
    naive: &[CaseMatch],
    final_count: usize,
    max_control_reuse: usize,
    depth_budget: usize,
) -> std::result::Result<Vec<CaseMatch>, ResolveError> {
    let mut state = Assignment::new(naive, final_count, max_control_reuse);

    // Greedy pass over every (case, candidate) edge, shortest first
    let mut edges: Vec<(f64, usize, usize)> = naive
        .iter()
        .enumerate()
        .flat_map(|(case, m)| (0..m.controls.len()).map(move |rank| (m.controls[rank].distance, case, rank)))
        .collect();
    edges.par_sort_unstable_by(|a, b| {
        a.0.total_cmp(&b.0)
            .then(a.1.cmp(&b.1))
            .then(a.2.cmp(&b.2))
    });
    for (_, case, rank) in edges {
        let control = naive[case].controls[rank].id;
        if state.case_has_room(case) && state.control_has_room(control) && !state.holds(case, control) {
            state.assign(case, control);
        }
    }

    // Repair pass: give short cases a control by shifting others along
    let mut augmented = 0usize;
    for case in 0..naive.len() {
        while state.case_has_room(case) {
            let mut visited = FxHashSet::default();
            if !state.augment(case, &mut visited, 0, depth_budget)? {
                break;
            }
            augmented += 1;
        }
    }
    if augmented > 0 {
        log::debug!("Augmenting paths added {augmented} assignments");
    }

    Ok(state.into_matches())
}

struct Assignment<'a> {
    naive: &'a [CaseMatch],
    final_count: usize,
    capacity: usize,
    /// Controls held by each case, as candidate ranks
    held: Vec<SmallVec<[usize; 8]>>,
    /// Cases holding each control
    holders: FxHashMap<usize, SmallVec<[usize; 2]>>,
}

impl<'a> Assignment<'a> {
    fn new(naive: &'a [CaseMatch], final_count: usize, capacity: usize) -> Self {
        Self {
            naive,
            final_count,
            capacity,
            held: vec![SmallVec::new(); naive.len()],
            holders: FxHashMap::default(),
        }
    }

    fn case_has_room(&self, case: usize) -> bool {
        self.held[case].len() < self.final_count
    }

    fn control_has_room(&self, control: usize) -> bool {
        self.holders.get(&control).map_or(0, SmallVec::len) < self.capacity
    }

    fn holds(&self, case: usize, control: usize) -> bool {
        self.held[case]
            .iter()
            .any(|&rank| self.naive[case].controls[rank].id == control)
    }

    fn assign(&mut self, case: usize, control: usize) {
        if let Some(rank) = self.naive[case].controls.iter().position(|n| n.id == control) {
            self.held[case].push(rank);
            self.holders.entry(control).or_default().push(case);
        }
    }

    fn release(&mut self, case: usize, control: usize) {
        let naive = self.naive;
        self.held[case].retain(|rank| naive[case].controls[*rank].id != control);
        if let Some(cases) = self.holders.get_mut(&control) {
            cases.retain(|c| *c != case);
        }
    }

    /// Find one more control for `case`, possibly moving other cases
    fn augment(
        &mut self,
        case: usize,
        visited: &mut FxHashSet<usize>,
        depth: usize,
        budget: usize,
    ) -> std::result::Result<bool, ResolveError> {
        if depth >= budget {
            return Err(ResolveError::DepthExceeded(budget));
        }

        let naive = self.naive;
        for candidate in &naive[case].controls {
            let control = candidate.id;
            if self.holds(case, control) || !visited.insert(control) {
                continue;
            }
            if self.control_has_room(control) {
                self.assign(case, control);
                return Ok(true);
            }

            let holders = self.holders.get(&control).cloned().unwrap_or_default();
            for holder in holders {
                if holder != case && self.augment(holder, visited, depth + 1, budget)? {
                    self.release(holder, control);
                    self.assign(case, control);
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn into_matches(self) -> Vec<CaseMatch> {
        let naive = self.naive;
        self.held
            .into_iter()
            .enumerate()
            .map(|(case, ranks)| {
                let mut controls: Vec<Neighbor> = ranks
                    .into_iter()
                    .map(|rank| naive[case].controls[rank])
                    .collect();
                controls.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
                CaseMatch {
                    case: naive[case].case,
                    controls,
                }
            })
            .collect()
    }
}
