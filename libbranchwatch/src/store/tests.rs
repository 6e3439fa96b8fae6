use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use libppc::instruction::kind::BranchKind;

use crate::record::{BranchKey, HitFlags};

use super::BranchWatch;

const B: u32 = 0x4800_0100;
const BEQ: u32 = 0x4182_0010;

fn recording() -> BranchWatch {
    let mut branch_watch = BranchWatch::new();
    branch_watch.start_recording();
    branch_watch
}

#[test]
fn one_record_per_key() {
    let mut branch_watch = recording();

    let hits = [
        (0x8000_0100, 0x8000_0200, BranchKind::Unconditional, B, true),
        (0x8000_0100, 0x8000_0200, BranchKind::Unconditional, B, true),
        (0x8000_0104, 0x8000_0114, BranchKind::Conditional, BEQ, false),
        (0x8000_0100, 0x8000_0300, BranchKind::Indirect, B, true),
        (0x8000_0100, 0x8000_0200, BranchKind::Unconditional, B, true),
        (0x8000_0104, 0x8000_0114, BranchKind::Conditional, BEQ, true),
    ];

    for (origin, destination, kind, word, taken) in hits {
        branch_watch.record_hit(origin, destination, kind, word, taken);
    }

    assert_eq!(branch_watch.len(), 3);

    for record in branch_watch.iter() {
        let expected = hits
            .iter()
            .filter(|(origin, destination, kind, ..)| {
                BranchKey::new(*origin, *destination, *kind) == record.key
            })
            .count() as u64;

        assert_eq!(record.total_hits, expected, "{:?}", record.key);
    }
}

#[test]
fn hit_flags_follow_outcome() {
    let mut branch_watch = recording();
    let key = BranchKey::new(0x8000_0104, 0x8000_0114, BranchKind::Conditional);

    branch_watch.record_hit(key.origin, key.destination, key.kind, BEQ, false);
    assert_eq!(
        branch_watch.get(&key).unwrap().hit_flags,
        HitFlags::NOT_TAKEN_RECENT
    );

    branch_watch.record_hit(key.origin, key.destination, key.kind, BEQ, true);
    assert_eq!(branch_watch.get(&key).unwrap().hit_flags, HitFlags::all());
}

#[test]
fn conditions_are_captured() {
    let mut branch_watch = recording();
    branch_watch.record_hit(0x8000_0104, 0x8000_0114, BranchKind::Conditional, BEQ, true);
    branch_watch.record_hit(0x8000_0100, 0x8000_0200, BranchKind::Unconditional, B, true);

    let records: Vec<_> = branch_watch.iter().collect();
    assert_eq!(records[0].condition, None);
    assert_eq!(records[1].condition.map(|condition| condition.bo), Some(0b01100));
}

#[test]
fn paused_recording_ignores_hits() {
    let mut branch_watch = BranchWatch::new();
    branch_watch.record_hit(0x8000_0100, 0x8000_0200, BranchKind::Unconditional, B, true);
    assert!(branch_watch.is_empty());

    branch_watch.start_recording();
    branch_watch.record_hit(0x8000_0100, 0x8000_0200, BranchKind::Unconditional, B, true);
    branch_watch.pause_recording();
    branch_watch.record_hit(0x8000_0100, 0x8000_0200, BranchKind::Unconditional, B, true);

    assert_eq!(branch_watch.iter().next().unwrap().total_hits, 1);
}

#[test]
fn generation_counts_structural_changes() {
    let mut branch_watch = recording();
    let start = branch_watch.generation();

    branch_watch.record_hit(0x8000_0100, 0x8000_0200, BranchKind::Unconditional, B, true);
    assert_eq!(branch_watch.generation(), start + 1, "insert");

    branch_watch.record_hit(0x8000_0100, 0x8000_0200, BranchKind::Unconditional, B, true);
    assert_eq!(branch_watch.generation(), start + 1, "re-hit isn't structural");

    let absent = BranchKey::new(0x8000_0000, 0, BranchKind::Indirect);
    assert_eq!(branch_watch.remove(&[absent]), 0);
    assert_eq!(branch_watch.generation(), start + 1, "removing nothing");

    let keys: Vec<_> = branch_watch.keys().copied().collect();
    assert_eq!(branch_watch.remove(&keys), 1);
    assert_eq!(branch_watch.remove(&keys), 0, "remove is idempotent");
    assert_eq!(branch_watch.generation(), start + 2);

    branch_watch.clear();
    assert_eq!(branch_watch.generation(), start + 3);
}

#[test]
fn observers_see_generations() {
    let mut branch_watch = recording();
    let seen = Arc::new(AtomicU64::new(0));

    let observer_seen = Arc::clone(&seen);
    let id = branch_watch.subscribe(Box::new(move |generation| {
        observer_seen.store(generation, Ordering::SeqCst)
    }));

    branch_watch.record_hit(0x8000_0100, 0x8000_0200, BranchKind::Unconditional, B, true);
    assert_eq!(seen.load(Ordering::SeqCst), branch_watch.generation());

    assert!(branch_watch.unsubscribe(id));
    assert!(!branch_watch.unsubscribe(id));

    branch_watch.clear();
    assert_ne!(seen.load(Ordering::SeqCst), branch_watch.generation());
}

#[test]
fn keys_at_origin() {
    let mut branch_watch = recording();

    branch_watch.record_hit(0x8000_0100, 0x8000_0300, BranchKind::Indirect, B, true);
    branch_watch.record_hit(0x8000_0100, 0x8000_0200, BranchKind::Indirect, B, true);
    branch_watch.record_hit(0x8000_0104, 0x8000_0200, BranchKind::Indirect, B, true);
    branch_watch.record_hit(0x8000_00FC, 0x8000_0200, BranchKind::Indirect, B, true);

    let keys = branch_watch.keys_at(0x8000_0100);
    assert_eq!(
        keys,
        [
            BranchKey::new(0x8000_0100, 0x8000_0200, BranchKind::Indirect),
            BranchKey::new(0x8000_0100, 0x8000_0300, BranchKind::Indirect),
        ]
    );
}

#[test]
fn snapshot_is_a_copy() {
    let mut branch_watch = recording();
    let key = BranchKey::new(0x8000_0100, 0x8000_0200, BranchKind::Unconditional);

    branch_watch.record_hit(key.origin, key.destination, key.kind, B, true);
    let snapshot = branch_watch.snapshot();

    branch_watch.clear();

    assert!(snapshot.contains(&key));
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot.flags(&key).contains(HitFlags::TAKEN_SESSION));
}

#[test]
fn ignored_origins_are_not_recorded() {
    let mut branch_watch = recording();
    branch_watch.record_hit(0x8000_0104, 0x8000_0114, BranchKind::Conditional, BEQ, true);

    branch_watch.set_ignored_origins(Some(0x8000_0100..=0x8000_01FF));

    branch_watch.record_hit(0x8000_0100, 0x8000_0200, BranchKind::Unconditional, B, true);
    branch_watch.record_hit(0x8000_0104, 0x8000_0114, BranchKind::Conditional, BEQ, true);
    branch_watch.record_hit(0x8000_0200, 0x8000_0300, BranchKind::Unconditional, B, true);

    let keys: Vec<_> = branch_watch.keys().map(|key| key.origin).collect();
    assert_eq!(keys, [0x8000_0104, 0x8000_0200]);
    assert_eq!(branch_watch.iter().next().unwrap().total_hits, 1, "re-hit in ignored range");

    branch_watch.set_ignored_origins(None);
    branch_watch.record_hit(0x8000_0100, 0x8000_0200, BranchKind::Unconditional, B, true);
    assert_eq!(branch_watch.len(), 3);
}
