pub mod instruction;

pub type Word = u32;
pub type WordSigned = i32;

pub type Addr = u32;

pub const BYTES_PER_WORD: usize = 4;

/// `ori r0, r0, 0`
pub const NOP: Word = 0x6000_0000;

/// `blr`
pub const BLR: Word = 0x4E80_0020;

pub fn word_to_bytes(word: Word) -> [u8; BYTES_PER_WORD] {
    word.to_be_bytes()
}

pub fn bytes_to_word(bytes: [u8; BYTES_PER_WORD]) -> Word {
    Word::from_be_bytes(bytes)
}

/// Sign extends the lowest `bits` bits of `value`.
pub fn sign_extend(value: Word, bits: u32) -> WordSigned {
    let shift = Word::BITS - bits;
    ((value << shift) as WordSigned) >> shift
}
