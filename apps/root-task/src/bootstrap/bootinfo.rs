// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Defines the boot descriptor loader for root-task.
// Author: Lukas Bower

//! Parses the kernel's boot descriptor into the tables the executor works
//! from: the empty-slot window, the classified untyped inventory, and any
//! recognised extended boot records.

use heapless::Vec;

use crate::sel4::{BootInfo, CPtr, SlotRegion, Word, WORD_BYTES};
use mainspring_abi::{FramebufferInfo, MEMORY_DESCRIPTOR_ENTRIES};

/// Compile-time cap on tracked untypeds per class.
///
/// Equal to the descriptor page's entry capacity: an untyped the handoff
/// descriptor cannot represent is an untyped no child can learn about, so
/// tracking it would only waste table space. Entries beyond the cap are
/// dropped at load time.
pub const MAX_TRACKED_UNTYPEDS: usize = MEMORY_DESCRIPTOR_ENTRIES;

/// Extended boot record carrying framebuffer parameters.
const EXTRA_TAG_FRAMEBUFFER: Word = 4;

/// Allocator bookkeeping for one general-purpose untyped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UntypedInfo {
    /// Capability to the untyped region.
    pub cptr: CPtr,
    /// Size exponent reported by the kernel at boot.
    pub original_size_bits: u8,
    /// Residual bytes not yet consumed by retypes. Monotonically
    /// non-increasing.
    pub bytes_left: Word,
}

impl UntypedInfo {
    /// Total capacity of the region in bytes.
    #[must_use]
    pub fn capacity_bytes(&self) -> Word {
        1 << self.original_size_bits
    }
}

/// One device untyped, kept aside for terminal handoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceUntyped {
    /// Capability to the untyped region.
    pub cptr: CPtr,
    /// Size exponent reported by the kernel.
    pub size_bits: u8,
    /// Fixed physical base address of the region.
    pub paddr: Word,
}

/// Tables produced from the boot descriptor, in boot order.
pub struct BootTables {
    /// First slot of the kernel-declared empty window.
    pub first_empty_slot: Word,
    /// Number of slots in the empty window.
    pub num_empty_slots: Word,
    /// Frame capabilities backing the root task image.
    pub user_image_frames: SlotRegion,
    /// General-purpose untypeds feeding the allocator.
    pub gp_untypeds: Vec<UntypedInfo, MAX_TRACKED_UNTYPEDS>,
    /// Device untypeds awaiting handoff.
    pub device_untypeds: Vec<DeviceUntyped, MAX_TRACKED_UNTYPEDS>,
    /// Framebuffer record from extended boot info, when present.
    pub framebuffer: Option<FramebufferInfo>,
}

impl BootTables {
    /// Classifies the boot descriptor's untyped list and captures extended
    /// records.
    pub fn load(bootinfo: &BootInfo<'_>) -> Self {
        let mut gp_untypeds: Vec<UntypedInfo, MAX_TRACKED_UNTYPEDS> = Vec::new();
        let mut device_untypeds: Vec<DeviceUntyped, MAX_TRACKED_UNTYPEDS> = Vec::new();
        let mut dropped_gp = 0usize;
        let mut dropped_device = 0usize;

        for (index, desc) in bootinfo.untyped_list.iter().enumerate() {
            let cptr = bootinfo.untyped.start + index as CPtr;
            if desc.is_device {
                let entry = DeviceUntyped {
                    cptr,
                    size_bits: desc.size_bits,
                    paddr: desc.paddr,
                };
                if device_untypeds.push(entry).is_err() {
                    dropped_device += 1;
                }
            } else {
                let entry = UntypedInfo {
                    cptr,
                    original_size_bits: desc.size_bits,
                    bytes_left: 1 << desc.size_bits,
                };
                if gp_untypeds.push(entry).is_err() {
                    dropped_gp += 1;
                }
            }
        }

        if dropped_gp > 0 || dropped_device > 0 {
            log::warn!(
                "untyped inventory exceeds descriptor capacity: dropped {dropped_gp} general-purpose, {dropped_device} device"
            );
        }

        Self {
            first_empty_slot: bootinfo.empty.start,
            num_empty_slots: bootinfo.empty.len(),
            user_image_frames: bootinfo.user_image_frames,
            gp_untypeds,
            device_untypeds,
            framebuffer: find_framebuffer(bootinfo.extra),
        }
    }

    /// Logs the tracked inventory, one line per untyped, in boot order.
    pub fn log_inventory(&self) {
        log::info!(
            "empty slots [{first:#x}..{end:#x}), image frames [{img_start:#x}..{img_end:#x})",
            first = self.first_empty_slot,
            end = self.first_empty_slot + self.num_empty_slots,
            img_start = self.user_image_frames.start,
            img_end = self.user_image_frames.end,
        );
        for untyped in &self.gp_untypeds {
            log::info!(
                "untyped cap={cap:#05x} size_bits={bits} general-purpose",
                cap = untyped.cptr,
                bits = untyped.original_size_bits,
            );
        }
        for untyped in &self.device_untypeds {
            log::info!(
                "untyped cap={cap:#05x} size_bits={bits} device paddr={paddr:#010x}",
                cap = untyped.cptr,
                bits = untyped.size_bits,
                paddr = untyped.paddr,
            );
        }
    }
}

/// Walks the chained `{id, len}` records after the fixed descriptor and
/// returns the framebuffer record if one is present.
///
/// `len` covers the header itself; a record too short to carry its own
/// header terminates the walk. Unknown tags are skipped.
fn find_framebuffer(extra: &[u8]) -> Option<FramebufferInfo> {
    let header_bytes = 2 * WORD_BYTES;
    let mut offset = 0usize;
    while offset + header_bytes <= extra.len() {
        let id = read_word(extra, offset);
        let len = read_word(extra, offset + WORD_BYTES);
        if len < header_bytes || offset + len > extra.len() {
            break;
        }
        if id == EXTRA_TAG_FRAMEBUFFER {
            let blob = &extra[offset + header_bytes..offset + len];
            match FramebufferInfo::read_from(blob) {
                Ok(info) => return Some(info),
                Err(_) => break,
            }
        }
        offset += len;
    }
    None
}

fn read_word(bytes: &[u8], offset: usize) -> usize {
    let mut word = [0u8; WORD_BYTES];
    word.copy_from_slice(&bytes[offset..offset + WORD_BYTES]);
    usize::from_ne_bytes(word)
}
