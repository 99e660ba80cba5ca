// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Defines the untyped allocator for root-task.
// Author: Lukas Bower

//! Best-fit bookkeeping over the general-purpose untyped inventory.
//!
//! The allocator never talks to the kernel; it only decides which untyped
//! a create operation should consume and tracks the residual bytes each
//! region has left. Residuals matter because whatever survives the
//! allocation pass is split into power-of-two blocks and handed to the
//! children, so the scan minimises leftover fragmentation rather than scan
//! time.

use heapless::Vec;

use super::bootinfo::{UntypedInfo, MAX_TRACKED_UNTYPEDS};
use crate::sel4::Word;

/// Best-fit allocator over the boot-order untyped table.
pub struct UntypedAllocator {
    entries: Vec<UntypedInfo, MAX_TRACKED_UNTYPEDS>,
}

impl UntypedAllocator {
    /// Takes ownership of the general-purpose table produced by the
    /// boot-info loader.
    #[must_use]
    pub fn new(entries: Vec<UntypedInfo, MAX_TRACKED_UNTYPEDS>) -> Self {
        Self { entries }
    }

    /// Returns the index of the smallest untyped with at least
    /// `bytes_required` residual bytes; ties go to the earliest in boot
    /// order.
    #[must_use]
    pub fn find_best_fit(&self, bytes_required: Word) -> Option<usize> {
        let mut best: Option<(usize, Word)> = None;
        for (index, untyped) in self.entries.iter().enumerate() {
            let residual = untyped.bytes_left;
            if residual < bytes_required {
                continue;
            }
            match best {
                Some((_, best_residual)) if residual >= best_residual => {}
                _ => best = Some((index, residual)),
            }
        }
        best.map(|(index, _)| index)
    }

    /// Records that `bytes` were consumed from entry `index`.
    ///
    /// The plan supplies alignment-adjusted sizes, so consumption is exact
    /// subtraction; the caller must have selected the entry via
    /// [`Self::find_best_fit`] or otherwise verified capacity.
    pub fn consume(&mut self, index: usize, bytes: Word) {
        let entry = &mut self.entries[index];
        debug_assert!(
            entry.bytes_left >= bytes,
            "consuming {bytes} bytes from untyped {index} with {left} left",
            left = entry.bytes_left
        );
        entry.bytes_left -= bytes;
    }

    /// Number of tracked untypeds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no untypeds are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The tracked entries in boot order.
    #[must_use]
    pub fn entries(&self) -> &[UntypedInfo] {
        &self.entries
    }
}
