//! Property tests over randomized read/write sequences, checking the
//! universal invariants the tracker promises regardless of operation order:
//! bounded version history, no two adjacent equal-hash versions, cached
//! content always rehashes to its own version's hash, and sessions that
//! unregister leave no trace.

use proptest::prelude::*;

use coordfs::{FileChangeTracker, Fingerprint, InstanceId, NormalizedPath, SessionId};

#[derive(Clone, Debug)]
enum Op {
    Read { session: u8, content: u8 },
    Write { session: u8, content: u8 },
    Unregister { session: u8 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..4, 0u8..4).prop_map(|(session, content)| Op::Read { session, content }),
        (0u8..4, 0u8..4).prop_map(|(session, content)| Op::Write { session, content }),
        (0u8..4).prop_map(|session| Op::Unregister { session }),
    ]
}

fn sid(n: u8) -> SessionId {
    SessionId::new(format!("s{n}")).unwrap()
}

const MAX_VERSIONS: usize = 5;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn tracker_invariants_hold_over_random_ops(ops in prop::collection::vec(op_strategy(), 0..200)) {
        let mut tracker = FileChangeTracker::new(MAX_VERSIONS, 1024);
        let path = NormalizedPath::new(std::path::Path::new("/a.txt"));
        let instance = InstanceId::new("i1");

        for (i, op) in ops.iter().enumerate() {
            let timestamp = i as u64;
            match op {
                Op::Read { session, content } => {
                    let text = format!("content-{content}");
                    let hash = Fingerprint::of_text(&text);
                    tracker.register_read(
                        &path,
                        std::path::Path::new("/a.txt"),
                        &sid(*session),
                        &instance,
                        &hash,
                        Some(&text),
                        false,
                        text.len() as u64,
                        timestamp,
                    );
                }
                Op::Write { session, content } => {
                    let text = format!("content-{content}");
                    let hash = Fingerprint::of_text(&text);
                    tracker.register_write(
                        &path,
                        std::path::Path::new("/a.txt"),
                        &sid(*session),
                        &instance,
                        &hash,
                        Some(&text),
                        false,
                        text.len() as u64,
                        timestamp,
                    );
                }
                Op::Unregister { session } => {
                    tracker.unregister_session(&sid(*session));
                }
            }

            // Invariant: bounded version ring.
            if let Some(file) = tracker.get_tracked_file(&path) {
                prop_assert!(file.versions.len() <= MAX_VERSIONS);

                // Invariant: no two adjacent versions share a hash.
                for pair in file.versions.windows(2) {
                    prop_assert_ne!(&pair[0].hash, &pair[1].hash);
                }

                // Invariant: every cached version's content rehashes to its
                // own recorded hash.
                for version in &file.versions {
                    if let Some(content) = &version.content {
                        prop_assert_eq!(FileChangeTracker::compute_hash(content.as_bytes()), version.hash.clone());
                    }
                }

                // Invariant: readers/writers are disjoint from having been
                // unregistered -- a session dropped via unregister_session
                // never remains in either set.
                if let Op::Unregister { session } = op {
                    prop_assert!(!file.readers.contains(&sid(*session)));
                    prop_assert!(!file.writers.contains(&sid(*session)));
                }
            }
        }
    }

    #[test]
    fn unregistering_every_session_leaves_no_tracked_file(
        ops in prop::collection::vec(op_strategy(), 0..50),
    ) {
        let mut tracker = FileChangeTracker::new(MAX_VERSIONS, 1024);
        let path = NormalizedPath::new(std::path::Path::new("/a.txt"));
        let instance = InstanceId::new("i1");
        let mut touched = std::collections::HashSet::new();

        for (i, op) in ops.iter().enumerate() {
            let timestamp = i as u64;
            match op {
                Op::Read { session, content } => {
                    touched.insert(*session);
                    let text = format!("content-{content}");
                    let hash = Fingerprint::of_text(&text);
                    tracker.register_read(
                        &path,
                        std::path::Path::new("/a.txt"),
                        &sid(*session),
                        &instance,
                        &hash,
                        Some(&text),
                        false,
                        text.len() as u64,
                        timestamp,
                    );
                }
                Op::Write { session, content } => {
                    touched.insert(*session);
                    let text = format!("content-{content}");
                    let hash = Fingerprint::of_text(&text);
                    tracker.register_write(
                        &path,
                        std::path::Path::new("/a.txt"),
                        &sid(*session),
                        &instance,
                        &hash,
                        Some(&text),
                        false,
                        text.len() as u64,
                        timestamp,
                    );
                }
                Op::Unregister { session } => {
                    tracker.unregister_session(&sid(*session));
                }
            }
        }

        for session in touched {
            tracker.unregister_session(&sid(session));
        }

        prop_assert!(tracker.get_tracked_file(&path).is_none());
    }

    #[test]
    fn fingerprint_is_stable_and_injective_on_short_strings(
        a in "[a-z]{0,12}", b in "[a-z]{0,12}",
    ) {
        let fa1 = Fingerprint::of_text(&a);
        let fa2 = Fingerprint::of_text(&a);
        prop_assert_eq!(fa1.clone(), fa2);
        if a != b {
            prop_assert_ne!(Fingerprint::of_text(&a), Fingerprint::of_text(&b));
        }
    }
}
