// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Defines the kernel entrypoint and fault boundary for root-task.
// Author: Lukas Bower
#![allow(dead_code)]
#![allow(unsafe_code)]

//! Kernel-build entrypoint: acquire the boot descriptor, free the scratch
//! window, run the generated plan, halt.
//!
//! Halting is the only exit. Failure after children are partially
//! configured is unrecoverable by design; the kernel reclaims everything
//! when the image restarts.

use heapless::Vec;

use crate::bootstrap::{self, BootTables};
use crate::exec::{Executor, ImageLayout};
use crate::handoff::ScratchPage;
use crate::plan::generated;
use crate::sel4::calls::{KernelCalls, Sel4Kernel};
use crate::sel4::{
    BootInfo, SlotRegion, UntypedDesc, Word, INIT_THREAD_TCB, PAGE_BITS, PAGE_BYTES,
};

/// Upper bound on untyped descriptors in the kernel's boot frame.
const MAX_BOOTINFO_UNTYPEDS: usize = 230;

/// Untyped descriptor as laid out in the kernel's boot frame.
#[repr(C)]
#[derive(Clone, Copy)]
struct RawUntypedDesc {
    paddr: Word,
    size_bits: u8,
    is_device: u8,
    padding: [u8; core::mem::size_of::<Word>() - 2],
}

/// Slot region as laid out in the kernel's boot frame.
#[repr(C)]
#[derive(Clone, Copy)]
struct RawSlotRegion {
    start: Word,
    end: Word,
}

impl From<RawSlotRegion> for SlotRegion {
    fn from(raw: RawSlotRegion) -> Self {
        Self {
            start: raw.start,
            end: raw.end,
        }
    }
}

/// The kernel's boot frame, as handed to the root task.
#[repr(C)]
pub struct RawBootInfo {
    extra_len: Word,
    node_id: Word,
    num_nodes: Word,
    num_io_pt_levels: Word,
    ipc_buffer: Word,
    empty: RawSlotRegion,
    shared_frames: RawSlotRegion,
    user_image_frames: RawSlotRegion,
    user_image_paging: RawSlotRegion,
    io_space_caps: RawSlotRegion,
    extra_bi_pages: RawSlotRegion,
    init_thread_cnode_size_bits: Word,
    init_thread_domain: Word,
    untyped: RawSlotRegion,
    untyped_list: [RawUntypedDesc; MAX_BOOTINFO_UNTYPEDS],
}

#[cfg(all(target_os = "none", target_arch = "x86_64"))]
core::arch::global_asm!(
    r#"
    .section .bss.root_task_stack,"aw",@nobits
    .align 16
__root_task_stack:
    .space {stack_size}
__root_task_stack_end:

    .section .text._start,"ax",@progbits
    .global _start
    .type _start,@function
_start:
    lea rsp, [rip + __root_task_stack_end]
    jmp kernel_start
    .size _start, . - _start
"#,
    stack_size = const ROOT_STACK_SIZE,
);

#[cfg(all(target_os = "none", target_arch = "aarch64"))]
core::arch::global_asm!(
    r#"
    .section .bss.root_task_stack,"aw",@nobits
    .align 16
__root_task_stack:
    .space {stack_size}
__root_task_stack_end:

    .section .text._start,"ax",@progbits
    .global _start
    .type _start,%function
_start:
    adrp    x1, __root_task_stack_end
    add     x1, x1, :lo12:__root_task_stack_end
    mov     sp, x1
    b       kernel_start
    .size _start, . - _start
"#,
    stack_size = const ROOT_STACK_SIZE,
);

const ROOT_STACK_SIZE: usize = 64 * 1024;

/// The scratch page: a page of the root image sacrificed at startup so
/// its virtual address can host transient frame mappings.
static mut SCRATCH_PAGE: ScratchPage = ScratchPage::new();

#[cfg(target_os = "none")]
extern "C" {
    /// Linker-provided first mapped address of the root image.
    static _lowest_vaddr: u8;
}

#[cfg(target_os = "none")]
#[allow(unsafe_code)]
fn image_base() -> Word {
    // SAFETY: taking the address of a linker symbol; never dereferenced.
    unsafe { core::ptr::addr_of!(_lowest_vaddr) as Word }
}

#[cfg(not(target_os = "none"))]
fn image_base() -> Word {
    0x40_0000
}

/// Suspends the root task forever. There is no clean shutdown.
fn halt(kernel: &mut impl KernelCalls) -> ! {
    loop {
        let _ = kernel.tcb_suspend(INIT_THREAD_TCB);
    }
}

/// Root task entry point, reached from the `_start` trampoline with the
/// boot frame pointer still in the first argument register.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn kernel_start(raw: *const RawBootInfo) -> ! {
    bootstrap::log::init();
    log::info!("root task online");

    let mut kernel = Sel4Kernel;

    // SAFETY: the kernel hands over a live boot frame; a null pointer
    // means the handover itself failed.
    let Some(raw) = (unsafe { raw.as_ref() }) else {
        log::error!("boot frame pointer is null");
        halt(&mut kernel);
    };

    let untyped_count = (raw.untyped.end - raw.untyped.start).min(MAX_BOOTINFO_UNTYPEDS as Word);
    let mut untyped_list: Vec<UntypedDesc, MAX_BOOTINFO_UNTYPEDS> = Vec::new();
    for desc in raw.untyped_list.iter().take(untyped_count) {
        let _ = untyped_list.push(UntypedDesc {
            paddr: desc.paddr,
            size_bits: desc.size_bits,
            is_device: desc.is_device != 0,
        });
    }

    // SAFETY: the kernel places `extra_len` bytes of chained records in
    // the pages directly after the boot frame.
    let extra = unsafe {
        core::slice::from_raw_parts(
            core::ptr::from_ref(raw).cast::<u8>().add(PAGE_BYTES),
            raw.extra_len,
        )
    };

    let bootinfo = BootInfo {
        empty: raw.empty.into(),
        user_image_frames: raw.user_image_frames.into(),
        untyped: raw.untyped.into(),
        untyped_list: &untyped_list,
        init_cnode_size_bits: raw.init_thread_cnode_size_bits as u8,
        extra,
    };

    let tables = BootTables::load(&bootinfo);
    tables.log_inventory();

    // SAFETY: single-threaded; this is the only reference ever taken.
    let scratch = unsafe { &mut *core::ptr::addr_of_mut!(SCRATCH_PAGE) };
    let layout = ImageLayout {
        lowest_vaddr: image_base(),
        scratch_vaddr: scratch.addr(),
    };

    // Free the scratch window before any operation wants to map there.
    let scratch_frame =
        tables.user_image_frames.start + ((layout.scratch_vaddr - layout.lowest_vaddr) >> PAGE_BITS);
    if let Err(error) = kernel.page_unmap(scratch_frame) {
        log::error!("scratch page unmap failed: {error}");
        halt(&mut kernel);
    }

    let plan = generated::plan();
    let mut executor = Executor::new(&mut kernel, tables, layout, scratch);
    match executor.run(&plan) {
        Ok(()) => log::info!("plan complete; children are live"),
        Err(error) => log::error!("bootstrap failed: {error}"),
    }
    drop(executor);

    halt(&mut kernel)
}

/// Panic plumbing shared with the panic handler.
pub(crate) fn panic_halt() -> ! {
    let mut kernel = Sel4Kernel;
    halt(&mut kernel)
}
