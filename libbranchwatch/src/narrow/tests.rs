use libppc::instruction::kind::BranchKind;

use crate::{
    memory::{InstructionMemory, Memory},
    record::{BranchKey, HitFlags},
    store::BranchWatch,
};

use super::Narrowed;

const BASE: u32 = 0x8000_0000;
const B: u32 = 0x4800_0100;
const BEQ: u32 = 0x4182_0010;

const UNCOND: BranchKey = BranchKey::new(0x8000_0100, 0x8000_0200, BranchKind::Unconditional);
const COND: BranchKey = BranchKey::new(0x8000_0104, 0x8000_0114, BranchKind::Conditional);

fn recording() -> BranchWatch {
    let mut branch_watch = BranchWatch::new();
    branch_watch.start_recording();
    branch_watch
}

fn hit(branch_watch: &mut BranchWatch, key: BranchKey, word: u32, taken: bool) {
    branch_watch.record_hit(key.origin, key.destination, key.kind, word, taken);
}

#[test]
fn taken_branch_survives_one_window() {
    let mut branch_watch = recording();

    for _ in 0..3 {
        hit(&mut branch_watch, UNCOND, B, true);
    }

    let record = branch_watch.get(&UNCOND).unwrap();
    assert_eq!(record.total_hits, 3);
    assert!(record.hit_flags.contains(HitFlags::TAKEN_SESSION));

    assert_eq!(
        branch_watch.isolate_was_taken(),
        Narrowed {
            kept: 1,
            removed: 0
        }
    );

    // Nothing ran in between, so it didn't newly go taken.
    assert_eq!(
        branch_watch.isolate_was_taken(),
        Narrowed {
            kept: 0,
            removed: 1
        }
    );
    assert!(branch_watch.is_empty());
}

#[test]
fn chained_windows_keep_repeat_offenders() {
    let mut branch_watch = recording();

    hit(&mut branch_watch, UNCOND, B, true);
    hit(&mut branch_watch, COND, BEQ, true);
    branch_watch.isolate_was_taken();
    assert_eq!(branch_watch.len(), 2);

    hit(&mut branch_watch, COND, BEQ, true);
    branch_watch.isolate_was_taken();

    assert_eq!(branch_watch.keys().collect::<Vec<_>>(), [&COND]);
}

#[test]
fn taken_then_not_taken_is_empty() {
    let mut branch_watch = recording();

    hit(&mut branch_watch, UNCOND, B, true);
    hit(&mut branch_watch, COND, BEQ, true);
    hit(&mut branch_watch, COND, BEQ, false);

    branch_watch.isolate_was_taken();
    branch_watch.isolate_not_taken();

    assert!(branch_watch.is_empty());
}

#[test]
fn not_taken_keeps_fallthroughs() {
    let mut branch_watch = recording();

    hit(&mut branch_watch, UNCOND, B, true);
    hit(&mut branch_watch, COND, BEQ, false);

    branch_watch.isolate_not_taken();

    assert_eq!(branch_watch.keys().collect::<Vec<_>>(), [&COND]);
    assert!(branch_watch.get(&COND).unwrap().hit_flags.is_empty());
}

#[test]
fn narrowing_nothing_is_fine() {
    let mut branch_watch = recording();

    assert_eq!(branch_watch.isolate_was_taken(), Narrowed::default());
    assert_eq!(branch_watch.isolate_not_taken(), Narrowed::default());
    assert!(branch_watch.is_empty());
}

#[test]
fn narrowing_resets_counters_and_baseline() {
    let mut branch_watch = recording();

    hit(&mut branch_watch, COND, BEQ, true);
    hit(&mut branch_watch, COND, BEQ, true);
    let generation = branch_watch.generation();

    branch_watch.isolate_was_taken();

    let record = branch_watch.get(&COND).unwrap();
    assert_eq!(record.recent_hits(), 0);
    assert_eq!(record.total_hits, 2);
    assert!(!record.hit_flags.intersects(HitFlags::RECENT));
    assert!(record.hit_flags.contains(HitFlags::TAKEN_SESSION));

    assert!(branch_watch.generation() > generation);
    assert_eq!(branch_watch.baseline().flags(&COND), HitFlags::TAKEN_SESSION);

    hit(&mut branch_watch, COND, BEQ, true);
    assert_eq!(branch_watch.get(&COND).unwrap().recent_hits(), 1);
}

#[test]
fn custom_predicate_sees_both_sides() {
    let mut branch_watch = recording();

    hit(&mut branch_watch, UNCOND, B, true);
    hit(&mut branch_watch, COND, BEQ, false);

    // Only keep what has ever gone taken.
    branch_watch.narrow_by(|_, after| after.contains(HitFlags::TAKEN_SESSION));
    assert_eq!(branch_watch.keys().collect::<Vec<_>>(), [&UNCOND]);

    // The baseline now has TAKEN_SESSION set, so nothing "newly" has it.
    branch_watch.narrow_by(|before, after| {
        after.contains(HitFlags::TAKEN_SESSION) && !before.contains(HitFlags::TAKEN_SESSION)
    });
    assert!(branch_watch.is_empty());
}

#[test]
fn wipe_recent_hits_keeps_everything() {
    let mut branch_watch = recording();

    hit(&mut branch_watch, UNCOND, B, true);
    hit(&mut branch_watch, COND, BEQ, false);
    branch_watch.wipe_recent_hits();

    assert_eq!(branch_watch.len(), 2);
    assert!(branch_watch
        .iter()
        .all(|record| !record.hit_flags.intersects(HitFlags::RECENT)));
}

#[test]
fn overwritten_narrowing() {
    let mut memory = Memory::new(BASE, 0x200);
    assert!(memory.write_instruction(UNCOND.origin, B));
    assert!(memory.write_instruction(COND.origin, BEQ));

    let mut branch_watch = recording();
    hit(&mut branch_watch, UNCOND, B, true);
    hit(&mut branch_watch, COND, BEQ, true);

    branch_watch.isolate_not_overwritten(&memory);
    assert_eq!(branch_watch.len(), 2);

    // The program rewrites one of its branches.
    assert!(memory.write_instruction(COND.origin, libppc::NOP));

    let mut was_overwritten = recording();
    hit(&mut was_overwritten, UNCOND, B, true);
    hit(&mut was_overwritten, COND, BEQ, true);
    was_overwritten.isolate_was_overwritten(&memory);
    assert_eq!(was_overwritten.keys().collect::<Vec<_>>(), [&COND]);

    branch_watch.isolate_not_overwritten(&memory);
    assert_eq!(branch_watch.keys().collect::<Vec<_>>(), [&UNCOND]);
}

#[test]
fn unmapped_origin_counts_as_overwritten() {
    let memory = Memory::new(BASE, 0x10);

    let mut branch_watch = recording();
    hit(&mut branch_watch, UNCOND, B, true);

    branch_watch.isolate_was_overwritten(&memory);
    assert_eq!(branch_watch.len(), 1);
}
