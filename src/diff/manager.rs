//! Versioned snapshot holder for one (scraper, term).
//!
//! A [`DiffManager`] keeps the current snapshot plus a pruned history of
//! diffs-to-present, so that "what changed since timestamp T?" can be
//! answered for *any* past T in logarithmic memory: either with a stored
//! diff, or by promotion to the full snapshot once T predates the retained
//! history.

use std::sync::Arc;

use serde::{Serialize, Serializer};

use super::{compute, merge, Diff, Tree};

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// Age at which the snapshot this entry diffs *from* was current.
    pub age: i64,
    /// Diff taking that snapshot to the present tree.
    pub diff: Arc<Diff>,
}

/// The state triple. Replaced wholesale on every update; readers hold `Arc`
/// clones of the payloads, so an in-progress update is never observable.
#[derive(Debug, Clone)]
pub struct ManagerState {
    pub age: i64,
    pub tree: Arc<Tree>,
    /// Ascending by age; every age is at most `self.age`.
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Default)]
pub struct DiffManager {
    state: Option<ManagerState>,
}

/// Payload of a diff query: the full snapshot or an incremental diff.
#[derive(Debug, Clone)]
pub enum DiffPayload {
    Full(Arc<Tree>),
    Partial(Arc<Diff>),
}

impl Serialize for DiffPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Full(tree) => tree.serialize(serializer),
            Self::Partial(diff) => diff.serialize(serializer),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiffSince {
    pub payload: DiffPayload,
    /// When true the payload is the full snapshot, not a diff, and the
    /// caller should discard whatever it held before.
    pub full: bool,
    pub age: i64,
}

impl DiffManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new snapshot, updating and pruning the history.
    ///
    /// Ages must be non-decreasing; a violation means the caller lost track
    /// of time ordering and panics.
    pub fn set_current(&mut self, new_age: i64, new_tree: Tree) {
        let mut history = match &self.state {
            Some(state) => {
                assert!(
                    new_age >= state.age,
                    "diff manager ages must be non-decreasing ({new_age} < {})",
                    state.age
                );
                prune(&state.history, new_age)
            }
            None => Vec::new(),
        };

        self.state = Some(match self.state.take() {
            None => ManagerState {
                age: new_age,
                tree: Arc::new(new_tree),
                history,
            },
            Some(state) => {
                let new_tree = Arc::new(new_tree);
                let new_diff = compute(&state.tree, &new_tree);
                // The outgoing snapshot enters the history as an identity
                // diff; folding `new_diff` into every entry keeps them all
                // diffs-to-present.
                history.push(HistoryEntry {
                    age: state.age,
                    diff: Arc::new(Diff::empty()),
                });
                let history = history
                    .into_iter()
                    .map(|entry| HistoryEntry {
                        age: entry.age,
                        diff: Arc::new(merge(&entry.diff, &new_diff)),
                    })
                    .collect();
                ManagerState {
                    age: new_age,
                    tree: new_tree,
                    history,
                }
            }
        });
    }

    /// The current (age, tree) pair, if a snapshot has been installed.
    pub fn get_snapshot(&self) -> Option<(i64, Arc<Tree>)> {
        self.state
            .as_ref()
            .map(|state| (state.age, state.tree.clone()))
    }

    /// Number of retained history entries. Exposed for the pruning tests.
    pub fn history_len(&self) -> usize {
        self.state.as_ref().map_or(0, |state| state.history.len())
    }

    /// Answer "what changed since `since`?". `None` for `since` requests the
    /// full snapshot. Returns `None` only when no snapshot exists yet.
    pub fn get_diff_since(&self, since: Option<i64>) -> Option<DiffSince> {
        let state = self.state.as_ref()?;
        let full = DiffSince {
            payload: DiffPayload::Full(state.tree.clone()),
            full: true,
            age: state.age,
        };
        let Some(since) = since else {
            return Some(full);
        };
        if since >= state.age {
            return Some(DiffSince {
                payload: DiffPayload::Partial(Arc::new(Diff::empty())),
                full: false,
                age: state.age,
            });
        }
        for entry in state.history.iter().rev() {
            if since >= entry.age {
                return Some(DiffSince {
                    payload: DiffPayload::Partial(entry.diff.clone()),
                    full: false,
                    age: state.age,
                });
            }
        }
        // The client is older than anything retained; promote to full.
        Some(full)
    }
}

/// Prune history newest→oldest, doubling the required age gap on every kept
/// entry: at least one entry survives in the last time step, one in the last
/// two, one in the last four, and so on. This bounds the history length by
/// the logarithm of the covered span.
fn prune(history: &[HistoryEntry], new_age: i64) -> Vec<HistoryEntry> {
    let mut required_gap = 1i64;
    let mut kept = Vec::with_capacity(history.len());
    for entry in history.iter().rev() {
        if new_age - entry.age < required_gap {
            continue;
        }
        kept.push(entry.clone());
        required_gap = required_gap.saturating_mul(2);
    }
    kept.reverse();
    kept
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::super::apply;
    use super::*;

    fn tree(value: serde_json::Value) -> Tree {
        Tree::from_value(value)
    }

    fn numbered(i: i64) -> Tree {
        tree(json!({ "v": i, "tag": format!("course-{}", i % 3) }))
    }

    #[test]
    fn empty_manager_has_no_snapshot() {
        let manager = DiffManager::new();
        assert!(manager.get_snapshot().is_none());
        assert!(manager.get_diff_since(None).is_none());
        assert!(manager.get_diff_since(Some(0)).is_none());
    }

    #[test]
    fn snapshot_reflects_latest_update() {
        let mut manager = DiffManager::new();
        manager.set_current(10, numbered(1));
        manager.set_current(20, numbered(2));
        let (age, current) = manager.get_snapshot().unwrap();
        assert_eq!(age, 20);
        assert_eq!(*current, numbered(2));
    }

    #[test]
    fn unset_since_returns_full_snapshot() {
        let mut manager = DiffManager::new();
        manager.set_current(10, numbered(1));
        let result = manager.get_diff_since(None).unwrap();
        assert!(result.full);
        assert_eq!(result.age, 10);
        match result.payload {
            DiffPayload::Full(tree) => assert_eq!(*tree, numbered(1)),
            DiffPayload::Partial(_) => panic!("expected a full payload"),
        }
    }

    #[test]
    fn since_at_or_after_current_age_returns_empty_diff() {
        let mut manager = DiffManager::new();
        manager.set_current(10, numbered(1));
        for since in [10, 11, 1000] {
            let result = manager.get_diff_since(Some(since)).unwrap();
            assert!(!result.full);
            match result.payload {
                DiffPayload::Partial(diff) => assert!(diff.is_empty()),
                DiffPayload::Full(_) => panic!("expected a diff payload"),
            }
        }
    }

    #[test]
    fn retained_diffs_take_old_snapshots_to_present() {
        let mut manager = DiffManager::new();
        let mut installed = Vec::new();
        let mut age = 0;
        for i in 0..60i64 {
            age += 1 + (i * 7) % 13;
            let tree = numbered(i);
            manager.set_current(age, tree.clone());
            installed.push((age, tree));
        }
        let (_, current) = manager.get_snapshot().unwrap();
        for (old_age, old_tree) in &installed {
            let result = manager.get_diff_since(Some(*old_age)).unwrap();
            match result.payload {
                DiffPayload::Partial(diff) => {
                    assert_eq!(
                        apply(old_tree, &diff),
                        *current,
                        "diff from age {old_age} must reach the present"
                    );
                }
                // Promoted to full: the client discards its old tree.
                DiffPayload::Full(tree) => assert_eq!(*tree, *current),
            }
        }
    }

    #[test]
    fn history_stays_logarithmic_in_covered_span() {
        let mut manager = DiffManager::new();
        let mut age = 0;
        for i in 0..500i64 {
            age += 1 + (i * 31) % 47;
            manager.set_current(age, numbered(i));
            let state_age = manager.get_snapshot().unwrap().0;
            let oldest = oldest_retained(&manager).unwrap_or(state_age);
            let span = (state_age - oldest + 1) as f64;
            let bound = span.log2().ceil() as usize + 1;
            assert!(
                manager.history_len() <= bound,
                "history of {} entries exceeds log bound {} for span {}",
                manager.history_len(),
                bound,
                span,
            );
        }
    }

    #[test]
    fn old_readers_are_promoted_to_full_after_pruning() {
        let mut manager = DiffManager::new();
        manager.set_current(1, numbered(0));
        for i in 1..=10i64 {
            manager.set_current(1 + i, numbered(i));
        }
        manager.set_current(11 + 1_000_000, numbered(99));
        let result = manager.get_diff_since(Some(1)).unwrap();
        assert!(result.full, "pruned-away ages must promote to full");
    }

    #[test]
    fn single_update_diff_matches_compute() {
        let mut manager = DiffManager::new();
        manager.set_current(10, tree(json!({"A": 1})));
        manager.set_current(20, tree(json!({"A": 1, "B": 2})));
        let result = manager.get_diff_since(Some(10)).unwrap();
        assert!(!result.full);
        match result.payload {
            DiffPayload::Partial(diff) => {
                assert_eq!(diff.to_value(), json!({"B": 2}));
            }
            DiffPayload::Full(_) => panic!("expected a diff payload"),
        }
    }

    #[test]
    fn deletions_surface_in_diffs() {
        let mut manager = DiffManager::new();
        manager.set_current(10, tree(json!({"A": 1, "B": 2})));
        manager.set_current(20, tree(json!({"A": 1})));
        let result = manager.get_diff_since(Some(10)).unwrap();
        match result.payload {
            DiffPayload::Partial(diff) => {
                assert_eq!(diff.to_value(), json!({"B": "$delete"}));
            }
            DiffPayload::Full(_) => panic!("expected a diff payload"),
        }
    }

    #[test]
    #[should_panic(expected = "non-decreasing")]
    fn rejects_age_regression() {
        let mut manager = DiffManager::new();
        manager.set_current(10, numbered(1));
        manager.set_current(9, numbered(2));
    }

    fn oldest_retained(manager: &DiffManager) -> Option<i64> {
        manager
            .state
            .as_ref()
            .and_then(|state| state.history.first())
            .map(|entry| entry.age)
    }
}
