//! Sequential-consistency checker
//!
//! A single process writes the sub-keys of a key in ascending index order, and
//! reads fetch them in descending order. Under sequential consistency a reader
//! can therefore only see a prefix of the writes: sub-keys `0..m` present and
//! `m..n` absent. Scanning a read in write order, an absent sub-key followed by
//! a present one is a gap, and a gap is proof the read saw the writes reordered.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{CheckOptions, Checker, Counts, Verdict};
use crate::error::SeqcheckResult;
use crate::history::{History, Observation};
use crate::keyspace::expected_observation;

/// Category of one ok read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Category {
    /// Nothing visible yet
    None,
    /// An ordered prefix of the writes
    Some,
    /// Every sub-key visible
    All,
    Bad(ViolationReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ViolationReason {
    /// Sub-key `absent` was missing although the later sub-key `present` was visible
    Gap { absent: usize, present: usize },
    /// The read returned something other than the key's own sub-keys
    Unexpected { detail: String },
}

/// An ok read that no sequentially consistent execution could have produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub index: u64,
    pub process: u64,
    pub key: u64,
    pub observed: Option<Observation>,
    pub reason: ViolationReason,
}

/// Categorize the values a read of `key` returned, given in read order
/// (descending sub-key index)
pub fn classify_read(key_count: usize, key: u64, observed: &Observation) -> Category {
    if observed.len() != key_count {
        return Category::Bad(ViolationReason::Unexpected {
            detail: format!(
                "expected {} sub-keys, observed {}",
                key_count,
                observed.len()
            ),
        });
    }

    let expected = expected_observation(key_count, key);
    for (got, want) in observed.iter().zip(&expected) {
        if let (Some(got), Some(want)) = (got, want) {
            if got != want {
                return Category::Bad(ViolationReason::Unexpected {
                    detail: format!("read {} where {} belongs", got, want),
                });
            }
        }
    }

    // write order: sub-key i sits at position key_count - 1 - i
    let mut first_absent = None;
    for (i, value) in observed.iter().rev().enumerate() {
        match (value, first_absent) {
            (None, None) => first_absent = Some(i),
            (Some(_), Some(absent)) => {
                return Category::Bad(ViolationReason::Gap { absent, present: i });
            }
            _ => {}
        }
    }

    match first_absent {
        None => Category::All,
        Some(0) => Category::None,
        Some(_) => Category::Some,
    }
}

/// Checks ok reads of the sequential workload for gaps
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialChecker;

impl SequentialChecker {
    pub fn new() -> Self {
        Self
    }
}

impl Checker for SequentialChecker {
    fn check(&self, history: &History, options: &CheckOptions) -> SeqcheckResult<Verdict> {
        let key_count = options.require_key_count()?;
        let mut counts = Counts::default();
        let mut bad = Vec::new();

        for read in history.ok_reads() {
            let category = match &read.value {
                Some(observed) => classify_read(key_count, read.key, observed),
                None => Category::Bad(ViolationReason::Unexpected {
                    detail: "ok read carried no value".to_string(),
                }),
            };

            match category {
                Category::None => counts.none += 1,
                Category::Some => counts.some += 1,
                Category::All => counts.all += 1,
                Category::Bad(reason) => {
                    counts.bad += 1;
                    debug!(index = read.index, key = read.key, ?reason, "Bad read");
                    bad.push(Violation {
                        index: read.index,
                        process: read.process,
                        key: read.key,
                        observed: read.value.clone(),
                        reason,
                    });
                }
            }
        }

        let valid = bad.is_empty();
        info!(
            valid,
            none = counts.none,
            some = counts.some,
            all = counts.all,
            bad = counts.bad,
            "Sequential check finished"
        );

        Ok(Verdict { valid, counts, bad })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{HistoryRecorder, Operation};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn observed(values: &[Option<&str>]) -> Observation {
        values.iter().map(|v| v.map(str::to_string)).collect()
    }

    /// Observation of `key` with sub-key `i` present iff `present[i]`
    fn observation(key: u64, present: &[bool]) -> Observation {
        present
            .iter()
            .enumerate()
            .rev()
            .map(|(i, &p)| p.then(|| format!("{}_{}", key, i)))
            .collect()
    }

    fn history_of_reads(reads: &[(u64, Observation)]) -> History {
        let recorder = HistoryRecorder::new();
        for (process, (key, value)) in reads.iter().enumerate() {
            let invoke = recorder.record(Operation::read(process as u64, *key));
            recorder.record(invoke.ok(Some(value.clone())));
        }
        recorder.history()
    }

    #[test]
    fn test_full_read_is_all() {
        let full = observed(&[Some("7_4"), Some("7_3"), Some("7_2"), Some("7_1"), Some("7_0")]);
        assert_eq!(classify_read(5, 7, &full), Category::All);
    }

    #[test]
    fn test_gap_example_is_bad() {
        let read = observed(&[Some("7_4"), None, Some("7_2"), None, None]);
        assert_eq!(
            classify_read(5, 7, &read),
            Category::Bad(ViolationReason::Gap {
                absent: 0,
                present: 2
            })
        );
    }

    #[test]
    fn test_prefix_is_some_and_empty_is_none() {
        let prefix = observed(&[None, None, None, Some("7_1"), Some("7_0")]);
        assert_eq!(classify_read(5, 7, &prefix), Category::Some);
        assert_eq!(classify_read(5, 7, &vec![None; 5]), Category::None);
    }

    #[test]
    fn test_foreign_values_and_wrong_length_are_unexpected() {
        let foreign = observed(&[Some("8_4"), Some("7_3"), Some("7_2"), Some("7_1"), Some("7_0")]);
        assert!(matches!(
            classify_read(5, 7, &foreign),
            Category::Bad(ViolationReason::Unexpected { .. })
        ));
        assert!(matches!(
            classify_read(5, 7, &observed(&[Some("7_0")])),
            Category::Bad(ViolationReason::Unexpected { .. })
        ));
    }

    #[test]
    fn test_verdict_lists_violating_reads() {
        let history = history_of_reads(&[
            (7, observation(7, &[true; 5])),
            (8, observation(8, &[false; 5])),
            (9, observation(9, &[true, true, false, false, false])),
            (7, observed(&[Some("7_4"), None, Some("7_2"), None, None])),
        ]);

        let verdict = SequentialChecker
            .check(&history, &CheckOptions::with_key_count(5))
            .unwrap();

        assert!(!verdict.valid);
        assert_eq!(
            verdict.counts,
            Counts {
                none: 1,
                some: 1,
                all: 1,
                bad: 1
            }
        );
        assert_eq!(verdict.bad.len(), 1);
        assert_eq!(verdict.bad[0].index, 7);
        assert_eq!(verdict.bad[0].process, 3);
        assert_eq!(verdict.bad[0].key, 7);
    }

    #[test]
    fn test_only_ok_reads_are_checked() {
        let recorder = HistoryRecorder::new();
        let write = recorder.record(Operation::write(0, 1));
        recorder.record(write.ok(None));
        let read = recorder.record(Operation::read(1, 1));
        let mut garbled = read.fail(crate::history::ErrorTag::Rollback("x".into()));
        garbled.value = Some(observed(&[None, Some("1_0")]));
        recorder.record(garbled);

        let verdict = SequentialChecker
            .check(&recorder.history(), &CheckOptions::with_key_count(2))
            .unwrap();
        assert!(verdict.valid);
        assert_eq!(verdict.counts.total(), 0);
    }

    #[test]
    fn test_missing_key_count_refused() {
        let history = history_of_reads(&[]);
        assert!(SequentialChecker
            .check(&history, &CheckOptions::default())
            .is_err());
    }

    proptest! {
        #[test]
        fn prop_empty_or_full_reads_are_valid(
            reads in prop::collection::vec((0u64..50, any::<bool>()), 0..40),
            key_count in 1usize..8,
        ) {
            let reads: Vec<_> = reads
                .into_iter()
                .map(|(key, full)| (key, observation(key, &vec![full; key_count])))
                .collect();
            let verdict = SequentialChecker
                .check(&history_of_reads(&reads), &CheckOptions::with_key_count(key_count))
                .unwrap();
            prop_assert!(verdict.valid);
            prop_assert_eq!(verdict.counts.some, 0);
            prop_assert_eq!(verdict.counts.total(), reads.len());
        }

        #[test]
        fn prop_prefixes_are_valid(key in 0u64..1000, key_count in 1usize..10, seen in 0usize..10) {
            let seen = seen.min(key_count);
            let present: Vec<bool> = (0..key_count).map(|i| i < seen).collect();
            let category = classify_read(key_count, key, &observation(key, &present));
            prop_assert!(!matches!(category, Category::Bad(_)));
        }

        #[test]
        fn prop_any_gap_is_reported(
            key in 0u64..1000,
            mut present in prop::collection::vec(any::<bool>(), 2..10),
            a in any::<prop::sample::Index>(),
            b in any::<prop::sample::Index>(),
        ) {
            let n = present.len();
            let absent = a.index(n - 1);
            let later = absent + 1 + b.index(n - 1 - absent);
            present[absent] = false;
            present[later] = true;

            let history = history_of_reads(&[(key, observation(key, &present))]);
            let verdict = SequentialChecker
                .check(&history, &CheckOptions::with_key_count(n))
                .unwrap();
            prop_assert!(!verdict.valid);
            prop_assert_eq!(verdict.bad.len(), 1);
            prop_assert_eq!(verdict.bad[0].key, key);
        }
    }
}
