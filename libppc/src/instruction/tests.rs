use super::{
    condition::{ConditionSpec, BO_ALWAYS},
    kind::BranchKind,
    BranchForm, BranchInstruction, InstructionDecodeError,
};

const BEQ_CR0: ConditionSpec = ConditionSpec::new(0b01100, 2);
const BDNZ: ConditionSpec = ConditionSpec::new(0b10000, 0);

#[test]
fn encodes_known_words() {
    assert_eq!(BranchInstruction::b(0x100).encode(), 0x4800_0100);
    assert_eq!(BranchInstruction::b(-4).encode(), 0x4BFF_FFFC);
    assert_eq!(BranchInstruction::bc(BEQ_CR0, 0x10).encode(), 0x4182_0010);
    assert_eq!(BranchInstruction::blr().encode(), crate::BLR);
    assert_eq!(BranchInstruction::bctr().encode(), 0x4E80_0420);
    assert_eq!(BranchInstruction::bctr().with_link().encode(), 0x4E80_0421);
}

#[test]
fn decode_reverses_encode() -> anyhow::Result<()> {
    let instructions = [
        BranchInstruction::b(-0x40).with_link(),
        BranchInstruction::b(0x8000).with_absolute(),
        BranchInstruction::bc(BEQ_CR0, -0x20),
        BranchInstruction::bc(BDNZ, 0x8),
        BranchInstruction::blr().with_condition(ConditionSpec::new(0b00100, 2)),
        BranchInstruction::bctr(),
    ];

    for instruction in instructions {
        let decoded = BranchInstruction::decode(instruction.encode())?;
        assert_eq!(decoded, instruction, "{}", instruction);
    }

    Ok(())
}

#[test]
fn rejects_non_branches() {
    assert_eq!(
        BranchInstruction::decode(crate::NOP),
        Err(InstructionDecodeError::NotABranch(crate::NOP))
    );

    // mtspr-shaped XL word with an extended opcode that isn't a branch.
    let isync = 0x4C00_012C;
    assert!(BranchInstruction::decode(isync).is_err());
}

#[test]
fn classifies_kinds() {
    assert_eq!(BranchInstruction::b(8).kind(), BranchKind::Unconditional);
    assert_eq!(BranchInstruction::bc(BEQ_CR0, 8).kind(), BranchKind::Conditional);
    assert_eq!(
        BranchInstruction::bc(BDNZ, 8).kind(),
        BranchKind::ConditionalDecrement
    );
    assert_eq!(
        BranchInstruction::bc(ConditionSpec::always(), 8).kind(),
        BranchKind::Unconditional
    );
    assert_eq!(BranchInstruction::blr().kind(), BranchKind::Indirect);
}

#[test]
fn condition_spec_only_for_real_conditions() {
    assert_eq!(BranchInstruction::b(8).condition_spec(), None);
    assert_eq!(BranchInstruction::blr().condition_spec(), None);
    assert_eq!(
        BranchInstruction::bc(BEQ_CR0, 8).condition_spec(),
        Some(BEQ_CR0)
    );
}

#[test]
fn direct_targets() {
    assert_eq!(
        BranchInstruction::b(-0x10).direct_target(0x8000_0100),
        Some(0x8000_00F0)
    );
    assert_eq!(
        BranchInstruction::b(0x20).with_absolute().direct_target(0x8000_0100),
        Some(0x20)
    );
    assert_eq!(BranchInstruction::bctr().direct_target(0x8000_0100), None);
    assert!(matches!(
        BranchInstruction::decode(0x4182_0010).map(|i| i.form),
        Ok(BranchForm::Conditional { bd: 0x10 })
    ));
}

#[test]
fn condition_edits() {
    let bne = BEQ_CR0.inverted();
    assert_eq!(bne.bo, 0b00100);
    assert_eq!(bne.inverted(), BEQ_CR0);

    let bdz = BDNZ.decrement_check_inverted();
    assert_eq!(bdz.bo, 0b10010);

    assert_eq!(BEQ_CR0.unconditional().bo, BO_ALWAYS);
    assert!(BEQ_CR0.unconditional().is_always());
}

#[test]
fn condition_evaluation() {
    let cr_eq = 0x2000_0000; // cr0[eq]

    assert!(BEQ_CR0.evaluate(cr_eq, 0));
    assert!(!BEQ_CR0.evaluate(0, 0));
    assert!(BEQ_CR0.inverted().evaluate(0, 0));

    assert!(BDNZ.evaluate(0, 1));
    assert!(!BDNZ.evaluate(0, 0));
    assert!(BDNZ.decrement_check_inverted().evaluate(0, 0));

    assert!(ConditionSpec::always().evaluate(0, 0));
}

#[test]
fn display() {
    assert_eq!(BranchInstruction::b(-0x10).with_link().to_string(), "bl -0x10");
    assert_eq!(BranchInstruction::blr().to_string(), "blr");
    assert_eq!(
        BranchInstruction::bc(BEQ_CR0, 0x10).to_string(),
        "bc 12,2,+0x10"
    );
}
