use super::{InstructionMemory, Memory, MemoryError};

const BASE: u32 = 0x8000_0000;

#[test]
fn words_are_big_endian() {
    let mut memory = Memory::new(BASE, 8);
    memory.set_word(BASE + 4, 0xA0B1_C2D3).unwrap();

    assert_eq!(memory.byte(BASE + 4), Some(0xA0));
    assert_eq!(memory.byte(BASE + 7), Some(0xD3));
    assert_eq!(memory.word(BASE + 4), Some(0xA0B1_C2D3));
}

#[test]
fn out_of_range_accesses() {
    let mut memory = Memory::new(BASE, 8);

    assert_eq!(memory.word(BASE - 4), None);
    assert_eq!(memory.word(BASE + 6), None, "word straddling the end");
    assert_eq!(memory.byte(BASE + 8), None);
    assert!(!memory.write_instruction(BASE + 8, 0));
}

#[test]
fn instruction_access_is_aligned() {
    let mut memory = Memory::new(BASE, 8);

    assert!(!memory.write_instruction(BASE + 2, libppc::NOP));
    assert_eq!(memory.read_instruction(BASE + 2), None);

    assert!(memory.write_instruction(BASE, libppc::NOP));
    assert_eq!(memory.read_instruction(BASE), Some(libppc::NOP));
}

#[test]
fn image_loading() -> anyhow::Result<()> {
    let image = libppc::word_to_bytes(libppc::BLR);
    let memory = Memory::with_image(BASE, 16, BASE + 8, &image)?;
    assert_eq!(memory.word(BASE + 8), Some(libppc::BLR));

    assert_eq!(
        Memory::with_image(BASE, 16, BASE + 14, &image),
        Err(MemoryError::ImageTooLarge {
            image: 4,
            size: 16,
            offset: 14
        })
    );
    assert_eq!(
        Memory::with_image(BASE, 16, 0, &image),
        Err(MemoryError::OutOfRange(0))
    );

    Ok(())
}
