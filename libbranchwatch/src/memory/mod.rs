use byteorder::{BigEndian, ByteOrder};
use libppc::{Addr, Word};
use thiserror::Error;

#[cfg(test)]
mod tests;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    #[error("Image ({image} bytes) doesn't fit into memory of {size} bytes at offset {offset:#x}")]
    ImageTooLarge {
        image: usize,
        size: usize,
        offset: usize,
    },

    #[error("Load address {0:#010x} is outside of memory")]
    OutOfRange(Addr),
}

/// Instruction fetch and patching, the only memory access the branch watch needs.
pub trait InstructionMemory {
    fn read_instruction(&self, addr: Addr) -> Option<Word>;

    /// Returns false if `addr` isn't a writable instruction slot.
    fn write_instruction(&mut self, addr: Addr, word: Word) -> bool;
}

/// Big-endian guest memory mapped at `base`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memory {
    base: Addr,
    data: Vec<u8>,
}

impl Memory {
    pub fn new(base: Addr, size: usize) -> Self {
        Self {
            base,
            data: vec![0; size],
        }
    }

    pub fn with_image(
        base: Addr,
        size: usize,
        load_addr: Addr,
        image: &[u8],
    ) -> Result<Self, MemoryError> {
        let mut memory = Self::new(base, size);

        let offset = memory
            .offset(load_addr, 0)
            .ok_or(MemoryError::OutOfRange(load_addr))?;

        let slot = memory
            .data
            .get_mut(offset..offset + image.len())
            .ok_or(MemoryError::ImageTooLarge {
                image: image.len(),
                size,
                offset,
            })?;

        slot.copy_from_slice(image);
        Ok(memory)
    }

    pub fn base(&self) -> Addr {
        self.base
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn byte(&self, addr: Addr) -> Option<u8> {
        self.data.get(self.offset(addr, 1)?).copied()
    }

    pub fn byte_mut(&mut self, addr: Addr) -> Option<&mut u8> {
        let offset = self.offset(addr, 1)?;
        self.data.get_mut(offset)
    }

    pub fn word(&self, addr: Addr) -> Option<Word> {
        let offset = self.offset(addr, libppc::BYTES_PER_WORD)?;
        Some(BigEndian::read_u32(&self.data[offset..offset + libppc::BYTES_PER_WORD]))
    }

    pub fn set_word(&mut self, addr: Addr, word: Word) -> Option<()> {
        let offset = self.offset(addr, libppc::BYTES_PER_WORD)?;
        BigEndian::write_u32(&mut self.data[offset..offset + libppc::BYTES_PER_WORD], word);
        Some(())
    }

    /// Offset of `addr` into the backing store, if `len` bytes from there are mapped.
    fn offset(&self, addr: Addr, len: usize) -> Option<usize> {
        let offset = addr.checked_sub(self.base)? as usize;
        (offset.checked_add(len)? <= self.data.len()).then_some(offset)
    }
}

impl InstructionMemory for Memory {
    fn read_instruction(&self, addr: Addr) -> Option<Word> {
        if addr % libppc::BYTES_PER_WORD as Addr != 0 {
            return None;
        }

        self.word(addr)
    }

    fn write_instruction(&mut self, addr: Addr, word: Word) -> bool {
        addr % libppc::BYTES_PER_WORD as Addr == 0 && self.set_word(addr, word).is_some()
    }
}
