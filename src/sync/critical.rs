//! Scoped interrupt masking.
//!
//! Raising the execution priority is this crate's only locking primitive: a
//! [`CriticalSection`] is held for every structural change to scheduler
//! state and restores the previous masking when dropped, on every exit path.

use crate::arch::Arch;

/// How much to mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mask {
    /// Every maskable interrupt
    All,
    /// Only the context-switch trap (and anything less urgent)
    Switch,
}

/// RAII guard for a masked region.
#[must_use = "the critical section ends when the guard is dropped"]
pub struct CriticalSection<'a, A: Arch> {
    arch: &'a A,
    mask: Mask,
    prev: A::IrqState,
}

impl<'a, A: Arch> CriticalSection<'a, A> {
    pub fn enter(arch: &'a A, mask: Mask) -> Self {
        let prev = match mask {
            Mask::All => arch.disable_all(),
            Mask::Switch => arch.raise_to_switch_priority(),
        };
        Self { arch, mask, prev }
    }

    pub fn mask(&self) -> Mask {
        self.mask
    }
}

impl<A: Arch> Drop for CriticalSection<'_, A> {
    fn drop(&mut self) {
        match self.mask {
            Mask::All => self.arch.enable_all(self.prev),
            Mask::Switch => self.arch.restore_priority(self.prev),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::HostArch;

    #[test]
    fn guard_restores_on_drop() {
        let arch = HostArch::new();
        {
            let _cs = CriticalSection::enter(&arch, Mask::Switch);
            assert!(arch.switch_blocked());
            {
                let inner = CriticalSection::enter(&arch, Mask::All);
                assert_eq!(inner.mask(), Mask::All);
            }
            assert!(arch.switch_blocked());
        }
        assert!(!arch.switch_blocked());
    }

    #[test]
    fn guard_restores_on_early_return() {
        fn bail(arch: &HostArch) -> Option<()> {
            let _cs = CriticalSection::enter(arch, Mask::All);
            let missing: Option<()> = None;
            missing?;
            Some(())
        }

        let arch = HostArch::new();
        assert!(bail(&arch).is_none());
        assert!(!arch.switch_blocked());
    }
}
