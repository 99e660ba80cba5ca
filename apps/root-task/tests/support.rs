// Author: Lukas Bower
//! Shared fixtures for the executor test suites.
#![allow(dead_code)]

use root_task::bootstrap::bootinfo::{DeviceUntyped, UntypedInfo};
use root_task::bootstrap::BootTables;
use root_task::exec::ImageLayout;
use root_task::sel4::{SlotRegion, Word};

/// First empty slot in every fixture's boot window.
pub const FIRST_EMPTY: Word = 0x40;
/// Capability of the first untyped in every fixture.
pub const UNTYPED_BASE: Word = 0x200;
/// User-image frame window shared by the fixtures.
pub const IMAGE_FRAMES: SlotRegion = SlotRegion {
    start: 0x10,
    end: 0x40,
};
/// First mapped address of the fixture root image.
pub const LOWEST_VADDR: Word = 0x40_0000;
/// Scratch page address inside the fixture image.
pub const SCRATCH_VADDR: Word = 0x40_3000;

/// Image layout matching the constants above.
pub fn layout() -> ImageLayout {
    ImageLayout {
        lowest_vaddr: LOWEST_VADDR,
        scratch_vaddr: SCRATCH_VADDR,
    }
}

/// Boot tables with the given general-purpose untypeds (size exponents)
/// and no device memory.
pub fn tables_with_gp(size_bits: &[u8]) -> BootTables {
    let mut tables = empty_tables();
    for (index, &bits) in size_bits.iter().enumerate() {
        tables
            .gp_untypeds
            .push(UntypedInfo {
                cptr: UNTYPED_BASE + index as Word,
                original_size_bits: bits,
                bytes_left: 1 << bits,
            })
            .unwrap();
    }
    tables
}

/// Boot tables with explicit residuals, for handoff tests that want to
/// start mid-run.
pub fn tables_with_residuals(residuals: &[Word]) -> BootTables {
    let mut tables = empty_tables();
    for (index, &bytes_left) in residuals.iter().enumerate() {
        tables
            .gp_untypeds
            .push(UntypedInfo {
                cptr: UNTYPED_BASE + index as Word,
                original_size_bits: 20,
                bytes_left,
            })
            .unwrap();
    }
    tables
}

/// Boot tables with no untypeds at all.
pub fn empty_tables() -> BootTables {
    BootTables {
        first_empty_slot: FIRST_EMPTY,
        num_empty_slots: 0x1000 - FIRST_EMPTY,
        user_image_frames: IMAGE_FRAMES,
        gp_untypeds: heapless::Vec::new(),
        device_untypeds: heapless::Vec::new(),
        framebuffer: None,
    }
}

/// Appends device untypeds `(size_bits, paddr)` to `tables`, after any
/// existing entries.
pub fn add_devices(tables: &mut BootTables, devices: &[(u8, Word)]) {
    let base = UNTYPED_BASE + 0x100;
    for (index, &(size_bits, paddr)) in devices.iter().enumerate() {
        tables
            .device_untypeds
            .push(DeviceUntyped {
                cptr: base + index as Word,
                size_bits,
                paddr,
            })
            .unwrap();
    }
}

/// Rebases a plan-relative slot the way the executor does.
pub fn slot(relative: Word) -> Word {
    FIRST_EMPTY + relative
}
