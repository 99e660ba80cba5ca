// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Defines the operation executor for root-task.
// Author: Lukas Bower

//! The operation executor: interprets the generated plan against the
//! untyped allocator, the mapping shims, and the handoff builder.
//!
//! Execution is fail-stop. The first operation that cannot be satisfied —
//! allocator exhaustion, a kernel refusal, or a plan defect the type
//! system could not rule out — aborts the run; nothing is rolled back
//! because the whole image restarts anyway.

use heapless::Vec;

use crate::arch;
use crate::bootstrap::bootinfo::{BootTables, DeviceUntyped, MAX_TRACKED_UNTYPEDS};
use crate::bootstrap::UntypedAllocator;
use crate::handoff::{plan_leftover_split, ScratchPage};
use crate::plan::{
    decode_rights, BinaryChunkLoadOp, CapOperation, CopyOp, CreateOp, MapFrameOp, MapFunc, MapOp,
    MintOp, MoveDeviceUntypedsOp, MutateOp, PassInfoOp, PassSystemInfoOp, Plan,
    RetypeLeftoverGpUntypedsOp, TcbSetupOp, TcbStartOp,
};
use crate::sel4::calls::KernelCalls;
use crate::sel4::{
    CPtr, CapRights, ObjectType, SlotRegion, SysError, Word, INIT_THREAD_ASID_POOL,
    INIT_THREAD_CNODE, INIT_THREAD_VSPACE, PAGE_BITS, PAGE_BYTES, WORD_BITS,
};
use mainspring_abi::{FramebufferInfo, MemoryDescriptor, SystemDescriptor};

/// Addresses the executor needs from the root task's own image layout.
#[derive(Debug, Clone, Copy)]
pub struct ImageLayout {
    /// Lowest virtual address mapped in the root task's VSpace; the first
    /// user-image frame backs this page.
    pub lowest_vaddr: Word,
    /// Virtual address of the scratch page.
    pub scratch_vaddr: Word,
}

/// Defects in the generated plan that only surface at execution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanDefect {
    /// A map operation named a paging level outside this build's shim set.
    InvalidMapLevel {
        /// Offending level.
        level: u8,
    },
    /// A handoff window had `end_slot < start_slot`.
    InvertedSlotWindow {
        /// Window start slot.
        start: Word,
        /// Window end slot.
        end: Word,
    },
    /// A chunk load pointed below the root image base.
    ChunkBelowImageBase {
        /// Source address named by the plan.
        src_vaddr: Word,
        /// First mapped address of the root image.
        lowest_vaddr: Word,
    },
    /// A chunk load covered frames past the user-image window.
    ChunkOutsideImage {
        /// First frame capability past the valid window.
        frame: CPtr,
    },
    /// A chunk load with zero length.
    EmptyChunk,
}

impl core::fmt::Display for PlanDefect {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidMapLevel { level } => {
                write!(f, "map level {level} outside this build's shim set")
            }
            Self::InvertedSlotWindow { start, end } => {
                write!(f, "slot window [{start}..{end}) is inverted")
            }
            Self::ChunkBelowImageBase {
                src_vaddr,
                lowest_vaddr,
            } => write!(
                f,
                "chunk source {src_vaddr:#x} below image base {lowest_vaddr:#x}"
            ),
            Self::ChunkOutsideImage { frame } => {
                write!(f, "chunk frame {frame:#x} outside the user-image window")
            }
            Self::EmptyChunk => f.write_str("zero-length chunk load"),
        }
    }
}

/// Fatal bootstrap failures, distinguished only for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapError {
    /// The plan needs more empty slots than boot info provided.
    PlanOversubscribed {
        /// Slots the plan requires.
        required: Word,
        /// Slots the kernel provided.
        available: Word,
    },
    /// Best-fit found no untyped for a create operation.
    AllocationFailure {
        /// Index of the failing operation.
        op_index: usize,
        /// Bytes the operation asked for.
        bytes_required: Word,
    },
    /// A kernel invocation failed.
    Kernel {
        /// Index of the failing operation.
        op_index: usize,
        /// Error the kernel reported.
        error: SysError,
    },
    /// The plan itself was malformed.
    BuggyPlan {
        /// Index of the defective operation.
        op_index: usize,
        /// What was wrong with it.
        defect: PlanDefect,
    },
}

impl core::fmt::Display for BootstrapError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::PlanOversubscribed {
                required,
                available,
            } => write!(
                f,
                "plan needs {required} empty slots but boot info provides {available}"
            ),
            Self::AllocationFailure {
                op_index,
                bytes_required,
            } => write!(
                f,
                "op {op_index}: no untyped can supply {bytes_required} bytes"
            ),
            Self::Kernel { op_index, error } => {
                write!(f, "op {op_index}: kernel reported {error}")
            }
            Self::BuggyPlan { op_index, defect } => {
                write!(f, "op {op_index}: defective plan: {defect}")
            }
        }
    }
}

/// All mutable bootstrap state, threaded through plan execution by
/// exclusive reference.
pub struct Executor<'a, K: KernelCalls> {
    kernel: &'a mut K,
    allocator: UntypedAllocator,
    first_empty_slot: Word,
    num_empty_slots: Word,
    user_image_frames: SlotRegion,
    device_untypeds: Vec<DeviceUntyped, MAX_TRACKED_UNTYPEDS>,
    framebuffer: Option<FramebufferInfo>,
    layout: ImageLayout,
    scratch: &'a mut ScratchPage,
    gp_memory_info: MemoryDescriptor,
    device_memory_info: MemoryDescriptor,
    system_info: SystemDescriptor,
}

impl<'a, K: KernelCalls> Executor<'a, K> {
    /// Builds an executor from the loaded boot tables.
    pub fn new(
        kernel: &'a mut K,
        tables: BootTables,
        layout: ImageLayout,
        scratch: &'a mut ScratchPage,
    ) -> Self {
        Self {
            kernel,
            allocator: UntypedAllocator::new(tables.gp_untypeds),
            first_empty_slot: tables.first_empty_slot,
            num_empty_slots: tables.num_empty_slots,
            user_image_frames: tables.user_image_frames,
            device_untypeds: tables.device_untypeds,
            framebuffer: tables.framebuffer,
            layout,
            scratch,
            gp_memory_info: MemoryDescriptor::new(),
            device_memory_info: MemoryDescriptor::new(),
            system_info: SystemDescriptor::default(),
        }
    }

    /// Runs the plan to completion or to its first failure.
    pub fn run(&mut self, plan: &Plan<'_>) -> Result<(), BootstrapError> {
        if plan.slots_required > self.num_empty_slots {
            return Err(BootstrapError::PlanOversubscribed {
                required: plan.slots_required,
                available: self.num_empty_slots,
            });
        }

        log::info!(
            "executing {count} operations (slots_required={slots}, bytes_required={bytes:#x})",
            count = plan.operations.len(),
            slots = plan.slots_required,
            bytes = plan.bytes_required,
        );
        for (index, operation) in plan.operations.iter().enumerate() {
            log::info!("op {index}: {operation}");
            self.dispatch(index, operation)?;
        }
        Ok(())
    }

    fn dispatch(&mut self, index: usize, operation: &CapOperation) -> Result<(), BootstrapError> {
        match operation {
            CapOperation::Create(op) => self.do_create(index, op),
            CapOperation::Copy(op) => self.do_copy(index, op),
            CapOperation::Mint(op) => self.do_mint(index, op),
            CapOperation::Mutate(op) => self.do_mutate(index, op),
            CapOperation::Map(op) => self.do_map(index, op),
            CapOperation::BinaryChunkLoad(op) => self.do_binary_chunk_load(index, op),
            CapOperation::TcbSetup(op) => self.do_tcb_setup(index, op),
            CapOperation::MapFrame(op) => self.do_map_frame(index, op),
            CapOperation::RetypeLeftoverGpUntypeds(op) => self.do_retype_leftovers(index, op),
            CapOperation::MoveDeviceUntypeds(op) => self.do_move_device_untypeds(index, op),
            CapOperation::PassGpMemoryInfo(op) => self.do_pass_memory_info(index, op, false),
            CapOperation::PassDeviceMemoryInfo(op) => self.do_pass_memory_info(index, op, true),
            CapOperation::PassSystemInfo(op) => self.do_pass_system_info(index, op),
            CapOperation::TcbStart(op) => self.do_tcb_start(index, op),
        }
    }

    /// Rebases a plan-relative slot onto the boot-time empty window.
    fn slot(&self, relative: Word) -> CPtr {
        self.first_empty_slot + relative
    }

    fn kernel_err(index: usize, error: SysError) -> BootstrapError {
        BootstrapError::Kernel {
            op_index: index,
            error,
        }
    }

    fn do_create(&mut self, index: usize, op: &CreateOp) -> Result<(), BootstrapError> {
        let chosen = self.allocator.find_best_fit(op.bytes_required).ok_or(
            BootstrapError::AllocationFailure {
                op_index: index,
                bytes_required: op.bytes_required,
            },
        )?;
        self.allocator.consume(chosen, op.bytes_required);
        let untyped = self.allocator.entries()[chosen].cptr;
        let dest = self.slot(op.dest);

        self.kernel
            .untyped_retype(untyped, op.object, op.size_bits, INIT_THREAD_CNODE, 0, 0, dest)
            .map_err(|error| Self::kernel_err(index, error))
    }

    fn do_copy(&mut self, index: usize, op: &CopyOp) -> Result<(), BootstrapError> {
        let dest_root = self.slot(op.dest_root);
        let src = self.slot(op.src);
        self.kernel
            .cnode_copy(
                dest_root,
                op.dest_index,
                op.dest_depth,
                INIT_THREAD_CNODE,
                src,
                WORD_BITS as u8,
                CapRights::ALL,
            )
            .map_err(|error| Self::kernel_err(index, error))
    }

    fn do_mint(&mut self, index: usize, op: &MintOp) -> Result<(), BootstrapError> {
        let dest = self.slot(op.dest);
        let src = self.slot(op.src);
        self.kernel
            .cnode_mint(
                INIT_THREAD_CNODE,
                dest,
                WORD_BITS as u8,
                INIT_THREAD_CNODE,
                src,
                WORD_BITS as u8,
                decode_rights(op.rights),
                op.badge,
            )
            .map_err(|error| Self::kernel_err(index, error))
    }

    fn do_mutate(&mut self, index: usize, op: &MutateOp) -> Result<(), BootstrapError> {
        let dest = self.slot(op.dest);
        let src = self.slot(op.src);
        self.kernel
            .cnode_mutate(
                INIT_THREAD_CNODE,
                dest,
                WORD_BITS as u8,
                INIT_THREAD_CNODE,
                src,
                WORD_BITS as u8,
                op.guard,
            )
            .map_err(|error| Self::kernel_err(index, error))
    }

    fn do_map(&mut self, index: usize, op: &MapOp) -> Result<(), BootstrapError> {
        let service = self.slot(op.service);
        let vspace = self.slot(op.vspace);
        match op.func {
            MapFunc::AssignAsid => self.kernel.asid_pool_assign(INIT_THREAD_ASID_POOL, service),
            MapFunc::MapStructure { level } => {
                if level == 0 || level > arch::PAGE_STRUCTURE_LEVELS {
                    return Err(BootstrapError::BuggyPlan {
                        op_index: index,
                        defect: PlanDefect::InvalidMapLevel { level },
                    });
                }
                self.kernel.map_structure(level, service, vspace, op.vaddr)
            }
            MapFunc::MapPage => self
                .kernel
                .page_map(service, vspace, op.vaddr, CapRights::READ_WRITE),
            MapFunc::UnmapPage => self.kernel.page_unmap(service),
        }
        .map_err(|error| Self::kernel_err(index, error))
    }

    /// Translates a root-image virtual address to its backing frame
    /// capability.
    fn user_image_frame(&self, vaddr: Word) -> CPtr {
        self.user_image_frames.start + ((vaddr - self.layout.lowest_vaddr) >> PAGE_BITS)
    }

    fn do_binary_chunk_load(
        &mut self,
        index: usize,
        op: &BinaryChunkLoadOp,
    ) -> Result<(), BootstrapError> {
        if op.length == 0 {
            return Err(BootstrapError::BuggyPlan {
                op_index: index,
                defect: PlanDefect::EmptyChunk,
            });
        }
        if op.src_vaddr < self.layout.lowest_vaddr {
            return Err(BootstrapError::BuggyPlan {
                op_index: index,
                defect: PlanDefect::ChunkBelowImageBase {
                    src_vaddr: op.src_vaddr,
                    lowest_vaddr: self.layout.lowest_vaddr,
                },
            });
        }

        let pages = (op.length + PAGE_BYTES - 1) >> PAGE_BITS;
        let first_frame = self.user_image_frame(op.src_vaddr);
        if first_frame + pages > self.user_image_frames.end {
            return Err(BootstrapError::BuggyPlan {
                op_index: index,
                defect: PlanDefect::ChunkOutsideImage {
                    frame: first_frame + pages - 1,
                },
            });
        }

        // Donation, page by page: once unmapped from the root VSpace the
        // child owns the contents exclusively.
        let dest_vspace = self.slot(op.dest_vspace);
        for page in 0..pages {
            let frame = first_frame + page;
            self.kernel
                .page_unmap(frame)
                .map_err(|error| Self::kernel_err(index, error))?;
            self.kernel
                .page_map(
                    frame,
                    dest_vspace,
                    op.dest_vaddr + (page << PAGE_BITS),
                    CapRights::READ_WRITE,
                )
                .map_err(|error| Self::kernel_err(index, error))?;
        }
        Ok(())
    }

    fn do_tcb_setup(&mut self, index: usize, op: &TcbSetupOp) -> Result<(), BootstrapError> {
        let tcb = self.slot(op.tcb);
        let cspace = self.slot(op.cspace);
        let vspace = self.slot(op.vspace);
        let ipc_buffer = self.slot(op.ipc_buffer);
        self.kernel
            .tcb_configure(tcb, cspace, vspace, op.ipc_buffer_addr, ipc_buffer)
            .map_err(|error| Self::kernel_err(index, error))?;

        let mut context = self
            .kernel
            .tcb_read_registers(tcb)
            .map_err(|error| Self::kernel_err(index, error))?;
        arch::context_init(
            &mut context,
            op.entry_addr,
            op.stack_pointer_addr,
            [op.arg0, op.arg1, op.arg2],
        );
        self.kernel
            .tcb_write_registers(tcb, &context)
            .map_err(|error| Self::kernel_err(index, error))
    }

    fn do_map_frame(&mut self, index: usize, op: &MapFrameOp) -> Result<(), BootstrapError> {
        let frame = self.slot(op.frame);
        let vspace = self.slot(op.vspace);
        self.kernel
            .page_map(frame, vspace, op.vaddr, CapRights::READ_WRITE)
            .map_err(|error| Self::kernel_err(index, error))
    }

    fn do_retype_leftovers(
        &mut self,
        index: usize,
        op: &RetypeLeftoverGpUntypedsOp,
    ) -> Result<(), BootstrapError> {
        if op.end_slot < op.start_slot {
            return Err(BootstrapError::BuggyPlan {
                op_index: index,
                defect: PlanDefect::InvertedSlotWindow {
                    start: op.start_slot,
                    end: op.end_slot,
                },
            });
        }

        let window_slots = op.end_slot - op.start_slot;
        let split = plan_leftover_split(self.allocator.entries(), window_slots);
        if split.skip > 0 {
            log::warn!(
                "residual handoff oversubscribed: dropping the {skip} smallest of {total} blocks",
                skip = split.skip,
                total = split.total_blocks,
            );
        }

        // Ascending bit order visits the smallest blocks first, so the
        // skip counter discards exactly the smallest ones. Slots fill
        // downwards, leaving the window's prefix sorted by descending
        // size, with descriptor entry i describing slot start_slot + i.
        let mut skip = split.skip;
        let mut next_entry = split.write_count;
        let cnode = self.slot(op.cnode_dest);
        for bit in 0..WORD_BITS as u8 {
            for untyped_index in 0..self.allocator.len() {
                let entry = self.allocator.entries()[untyped_index];
                if entry.bytes_left & (1 << bit) == 0 {
                    continue;
                }
                if skip > 0 {
                    skip -= 1;
                    continue;
                }
                next_entry -= 1;
                let dest_slot = op.start_slot + next_entry as Word;
                self.kernel
                    .untyped_retype(
                        entry.cptr,
                        ObjectType::Untyped,
                        bit,
                        INIT_THREAD_CNODE,
                        cnode,
                        op.cnode_depth,
                        dest_slot,
                    )
                    .map_err(|error| Self::kernel_err(index, error))?;
                self.allocator.consume(untyped_index, 1 << bit);
                self.gp_memory_info
                    .place(next_entry, bit as Word, 0)
                    .unwrap_or_else(|_| {
                        unreachable!("split planner caps entries at descriptor capacity")
                    });
            }
        }
        Ok(())
    }

    fn do_move_device_untypeds(
        &mut self,
        index: usize,
        op: &MoveDeviceUntypedsOp,
    ) -> Result<(), BootstrapError> {
        if op.end_slot < op.start_slot {
            return Err(BootstrapError::BuggyPlan {
                op_index: index,
                defect: PlanDefect::InvertedSlotWindow {
                    start: op.start_slot,
                    end: op.end_slot,
                },
            });
        }

        let window_slots = (op.end_slot - op.start_slot) as usize;
        let movable = self
            .device_untypeds
            .len()
            .min(window_slots)
            .min(mainspring_abi::MEMORY_DESCRIPTOR_ENTRIES);
        if movable < self.device_untypeds.len() {
            log::warn!(
                "device handoff window holds {movable} of {total} untypeds; the rest stay behind",
                total = self.device_untypeds.len(),
            );
        }

        let cnode = self.slot(op.cnode_dest);
        for offset in 0..movable {
            let device = self.device_untypeds[offset];
            self.kernel
                .cnode_move(
                    cnode,
                    op.start_slot + offset as Word,
                    op.cnode_depth,
                    INIT_THREAD_CNODE,
                    device.cptr,
                    WORD_BITS as u8,
                )
                .map_err(|error| Self::kernel_err(index, error))?;
            self.device_memory_info
                .place(offset, device.size_bits as Word, device.paddr)
                .unwrap_or_else(|_| unreachable!("movable count is capped at capacity"));
        }
        Ok(())
    }

    /// Maps `frame` at the scratch address, runs `fill` to serialise into
    /// it, then remaps the frame into the child.
    fn publish_page(
        &mut self,
        index: usize,
        frame_slot: Word,
        dest_vspace: Word,
        dest_vaddr: Word,
        fill: impl FnOnce(&mut [u8; PAGE_BYTES]),
    ) -> Result<(), BootstrapError> {
        let frame = self.slot(frame_slot);
        let dest_vspace = self.slot(dest_vspace);
        let scratch_vaddr = self.layout.scratch_vaddr;
        self.kernel
            .page_map(frame, INIT_THREAD_VSPACE, scratch_vaddr, CapRights::READ_WRITE)
            .map_err(|error| Self::kernel_err(index, error))?;

        fill(&mut self.scratch.0);

        self.kernel
            .page_unmap(frame)
            .map_err(|error| Self::kernel_err(index, error))?;
        self.kernel
            .page_map(frame, dest_vspace, dest_vaddr, CapRights::READ_WRITE)
            .map_err(|error| Self::kernel_err(index, error))
    }

    fn do_pass_memory_info(
        &mut self,
        index: usize,
        op: &PassInfoOp,
        device: bool,
    ) -> Result<(), BootstrapError> {
        let descriptor = if device {
            self.device_memory_info.clone()
        } else {
            self.gp_memory_info.clone()
        };
        self.publish_page(index, op.frame, op.dest_vspace, op.dest_vaddr, |page| {
            descriptor.write_to_page(page);
        })
    }

    fn do_pass_system_info(
        &mut self,
        index: usize,
        op: &PassSystemInfoOp,
    ) -> Result<(), BootstrapError> {
        let framebuffer = if op.pass_framebuffer_info {
            self.framebuffer
        } else {
            None
        };
        self.system_info = SystemDescriptor {
            framebuffer_info: framebuffer.unwrap_or_default(),
            framebuffer_info_present: framebuffer.is_some(),
        };
        let descriptor = self.system_info;
        self.publish_page(index, op.frame, op.dest_vspace, op.dest_vaddr, |page| {
            descriptor.write_to_page(page);
        })
    }

    fn do_tcb_start(&mut self, index: usize, op: &TcbStartOp) -> Result<(), BootstrapError> {
        let tcb = self.slot(op.tcb);
        self.kernel
            .tcb_resume(tcb)
            .map_err(|error| Self::kernel_err(index, error))
    }

    /// Allocator state, mainly for diagnostics and tests.
    #[must_use]
    pub fn allocator(&self) -> &UntypedAllocator {
        &self.allocator
    }

    /// The general-purpose memory descriptor as built so far.
    #[must_use]
    pub fn gp_memory_info(&self) -> &MemoryDescriptor {
        &self.gp_memory_info
    }

    /// The device memory descriptor as built so far.
    #[must_use]
    pub fn device_memory_info(&self) -> &MemoryDescriptor {
        &self.device_memory_info
    }

    /// The system descriptor as last published.
    #[must_use]
    pub fn system_info(&self) -> &SystemDescriptor {
        &self.system_info
    }

    /// Frame capability backing the scratch page, for the startup unmap.
    #[must_use]
    pub fn scratch_frame(&self) -> CPtr {
        self.user_image_frame(self.layout.scratch_vaddr)
    }
}
