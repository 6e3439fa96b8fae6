use std::collections::BTreeMap;

use bitflags::bitflags;
use libppc::Addr;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BreakAction: u8 {
        const BREAK = 0b01;
        const LOG   = 0b10;
    }
}

#[derive(Debug, Clone, Default)]
pub struct BreakpointTable {
    breakpoints: BTreeMap<Addr, BreakAction>,
}

impl BreakpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false for an empty action, which would be a breakpoint that does nothing.
    pub fn set(&mut self, addr: Addr, action: BreakAction) -> bool {
        if action.is_empty() {
            return false;
        }

        self.breakpoints.insert(addr, action);
        true
    }

    pub fn clear(&mut self, addr: Addr) -> bool {
        self.breakpoints.remove(&addr).is_some()
    }

    pub fn get(&self, addr: Addr) -> Option<BreakAction> {
        self.breakpoints.get(&addr).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Addr, BreakAction)> + '_ {
        self.breakpoints.iter().map(|(addr, action)| (*addr, *action))
    }

    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }
}
