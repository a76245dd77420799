//! Progressive-unlock rules.
//!
//! Within a binyan, tenses open in course order: past is always open, and
//! each later tense opens once every verb that has data for the preceding
//! tense is marked complete. A binyan opens once the binyan before it is
//! complete for every tense any of its verbs define.
//!
//! Everything here is a pure function of the lesson graph and a progress
//! snapshot. Missing entries read as "not completed", so bad input locks
//! rather than unlocks.

use serde::Serialize;

use crate::lessons::{Binyan, LessonGraph, Tense};
use crate::progress::ProgressState;

/// All verbs defining `tense` are marked complete. False when no verb defines it.
pub fn is_tense_complete(binyan: &Binyan, tense: Tense, progress: &ProgressState) -> bool {
    let Some(marks) = progress.binyan(&binyan.id).and_then(|b| b.get(&tense)) else {
        return false;
    };
    let mut applicable = binyan.verbs_with(tense).peekable();
    if applicable.peek().is_none() {
        return false;
    }
    applicable.all(|v| marks.get(&v.id).copied().unwrap_or(false))
}

/// Complete for every tense at least one verb defines. Tenses no verb
/// defines are skipped. A binyan with no recorded progress is never complete.
pub fn is_binyan_complete(binyan: &Binyan, progress: &ProgressState) -> bool {
    if progress.binyan(&binyan.id).is_none() {
        return false;
    }
    binyan
        .defined_tenses()
        .into_iter()
        .all(|t| is_tense_complete(binyan, t, progress))
}

pub fn can_access_tense(graph: &LessonGraph, binyan_id: &str, tense: Tense, progress: &ProgressState) -> bool {
    let Some(previous) = tense.previous() else {
        return true;
    };
    let Some(binyan) = graph.binyan(binyan_id) else {
        return false;
    };
    // Stricter than the binyan rule: the preceding tense must exist here.
    is_tense_complete(binyan, previous, progress)
}

pub fn can_access_binyan(graph: &LessonGraph, binyan_id: &str, progress: &ProgressState) -> bool {
    match graph.position(binyan_id) {
        None => false,
        Some(0) => true,
        Some(_) => graph
            .previous_binyan(binyan_id)
            .is_some_and(|prev| is_binyan_complete(prev, progress)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenseStatus {
    pub tense: Tense,
    pub accessible: bool,
    pub completed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BinyanStatus {
    pub id: String,
    pub name: String,
    pub accessible: bool,
    pub complete: bool,
    pub tenses: Vec<TenseStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NextStep {
    pub binyan: String,
    pub tense: Tense,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LearningPath {
    pub binyans: Vec<BinyanStatus>,
    /// First open (binyan, tense) that still has unfinished verbs.
    pub next: Option<NextStep>,
    pub adjectives_completed: usize,
}

pub fn learning_path(graph: &LessonGraph, progress: &ProgressState) -> LearningPath {
    let mut next = None;
    let binyans = graph
        .binyans()
        .iter()
        .map(|binyan| {
            let accessible = can_access_binyan(graph, &binyan.id, progress);
            let tenses: Vec<TenseStatus> = binyan
                .defined_tenses()
                .into_iter()
                .map(|tense| {
                    let total = binyan.verbs_with(tense).count();
                    let completed = binyan
                        .verbs_with(tense)
                        .filter(|v| progress.is_verb_completed(&binyan.id, tense, &v.id))
                        .count();
                    TenseStatus {
                        tense,
                        accessible: accessible && can_access_tense(graph, &binyan.id, tense, progress),
                        completed,
                        total,
                    }
                })
                .collect();

            if next.is_none() {
                next = tenses
                    .iter()
                    .find(|t| t.accessible && t.completed < t.total)
                    .map(|t| NextStep {
                        binyan: binyan.id.clone(),
                        tense: t.tense,
                    });
            }

            BinyanStatus {
                id: binyan.id.clone(),
                name: binyan.name.clone(),
                accessible,
                complete: is_binyan_complete(binyan, progress),
                tenses,
            }
        })
        .collect();

    LearningPath {
        binyans,
        next,
        adjectives_completed: progress.adjective_completed_count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lessons::{Pattern, VerbUnit};

    fn verb(id: &str, tenses: &[Tense]) -> VerbUnit {
        VerbUnit {
            id: id.into(),
            tenses: tenses.iter().copied().collect(),
        }
    }

    fn binyan(id: &str, verbs: Vec<VerbUnit>) -> Binyan {
        Binyan {
            id: id.into(),
            name: id.into(),
            patterns: vec![Pattern {
                id: format!("{id}-p"),
                name: String::new(),
                verbs,
            }],
        }
    }

    /// b1: v1 (past, present). b2: v2 (all tenses). b3: empty pattern list.
    fn graph() -> LessonGraph {
        LessonGraph::new(vec![
            binyan("b1", vec![verb("v1", &[Tense::Past, Tense::Present])]),
            binyan("b2", vec![verb("v2", &Tense::ALL)]),
            binyan("b3", vec![]),
        ])
        .unwrap()
    }

    fn mark(p: &mut ProgressState, b: &str, t: Tense, v: &str) {
        p.set_verb_completed(b, t, v, true);
    }

    #[test]
    fn empty_progress_opens_only_past() {
        let g = graph();
        let empty = ProgressState::default();
        for b in ["b1", "b2", "b3"] {
            assert!(can_access_tense(&g, b, Tense::Past, &empty));
            for t in [Tense::Present, Tense::Future, Tense::Imperative] {
                assert!(!can_access_tense(&g, b, t, &empty), "{b}/{t}");
            }
        }
    }

    #[test]
    fn empty_progress_opens_only_first_binyan() {
        let g = graph();
        let empty = ProgressState::default();
        assert!(can_access_binyan(&g, "b1", &empty));
        assert!(!can_access_binyan(&g, "b2", &empty));
        assert!(!can_access_binyan(&g, "b3", &empty));
    }

    #[test]
    fn unknown_binyan_is_locked() {
        let g = graph();
        let empty = ProgressState::default();
        assert!(!can_access_binyan(&g, "nope", &empty));
        assert!(!can_access_tense(&g, "nope", Tense::Present, &empty));
        assert!(can_access_tense(&g, "nope", Tense::Past, &empty));
    }

    #[test]
    fn finishing_past_opens_present_but_not_future() {
        let g = graph();
        let mut p = ProgressState::default();
        mark(&mut p, "b1", Tense::Past, "v1");

        assert!(can_access_tense(&g, "b1", Tense::Present, &p));
        assert!(!can_access_tense(&g, "b1", Tense::Future, &p));
    }

    #[test]
    fn tense_access_needs_preceding_tense_to_exist() {
        let g = graph();
        let mut p = ProgressState::default();
        mark(&mut p, "b1", Tense::Past, "v1");
        mark(&mut p, "b1", Tense::Present, "v1");

        // present exists and is done, so future opens even though no verb has it
        assert!(can_access_tense(&g, "b1", Tense::Future, &p));
        // future is defined by no verb, so imperative stays shut
        assert!(!can_access_tense(&g, "b1", Tense::Imperative, &p));
        // while the binyan rule skips the undefined tenses entirely
        assert!(is_binyan_complete(g.binyan("b1").unwrap(), &p));
        assert!(can_access_binyan(&g, "b2", &p));
    }

    #[test]
    fn explicit_false_mark_is_not_completion() {
        let g = graph();
        let mut p = ProgressState::default();
        p.set_verb_completed("b1", Tense::Past, "v1", false);
        assert!(!can_access_tense(&g, "b1", Tense::Present, &p));
    }

    #[test]
    fn later_binyan_needs_every_defined_tense() {
        let g = graph();
        let mut p = ProgressState::default();
        mark(&mut p, "b1", Tense::Past, "v1");
        mark(&mut p, "b1", Tense::Present, "v1");
        for t in [Tense::Past, Tense::Present, Tense::Future] {
            mark(&mut p, "b2", t, "v2");
        }
        assert!(!can_access_binyan(&g, "b3", &p));

        mark(&mut p, "b2", Tense::Imperative, "v2");
        assert!(can_access_binyan(&g, "b3", &p));
    }

    #[test]
    fn partial_tense_verbs_do_not_block_the_next_binyan() {
        let g = LessonGraph::sample();
        let mut p = ProgressState::default();
        for t in Tense::ALL {
            for v in ["v1-katab", "v1-akal", "v1-shirib"] {
                mark(&mut p, "binyan1", t, v);
            }
        }
        assert!(can_access_binyan(&g, "binyan2", &p));

        // v2-allam has no future data; only v2-sakkar needs it
        for t in Tense::ALL {
            mark(&mut p, "binyan2", t, "v2-sakkar");
        }
        mark(&mut p, "binyan2", Tense::Past, "v2-allam");
        mark(&mut p, "binyan2", Tense::Present, "v2-allam");
        assert!(is_binyan_complete(g.binyan("binyan2").unwrap(), &p));
        assert!(can_access_tense(&g, "binyan2", Tense::Imperative, &p));
    }

    #[test]
    fn learning_path_reports_counts_and_next_step() {
        let g = graph();
        let mut p = ProgressState::default();
        let path = learning_path(&g, &p);
        assert_eq!(
            path.next,
            Some(NextStep {
                binyan: "b1".into(),
                tense: Tense::Past
            })
        );
        assert!(path.binyans[0].accessible);
        assert!(!path.binyans[1].accessible);
        assert!(path.binyans[2].tenses.is_empty());

        mark(&mut p, "b1", Tense::Past, "v1");
        mark(&mut p, "b1", Tense::Present, "v1");
        p.toggle_adjective_category("colors");
        let path = learning_path(&g, &p);
        assert!(path.binyans[0].complete);
        assert_eq!(path.binyans[0].tenses[1].completed, 1);
        assert_eq!(path.binyans[0].tenses[1].total, 1);
        assert_eq!(path.next.as_ref().map(|n| n.binyan.as_str()), Some("b2"));
        assert_eq!(path.adjectives_completed, 1);
    }

    #[test]
    fn locked_binyan_reports_no_open_tenses() {
        let g = graph();
        let path = learning_path(&g, &ProgressState::default());
        assert!(path.binyans[1].tenses.iter().all(|t| !t.accessible));
    }
}
