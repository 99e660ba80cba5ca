// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Defines the host-mode simulation for root-task.
// Author: Lukas Bower
#![cfg(not(feature = "kernel"))]

//! Host-mode simulation used for developer testing.
//!
//! [`SimKernel`] is an in-memory stand-in for the microkernel: it records
//! every invocation the executor makes, enforces the unmap-before-map
//! discipline on frames, and can inject a failure at any call ordinal.
//! The host binary replays the bundled demonstration plan against it.

use std::collections::HashMap;

use anyhow::anyhow;

use crate::arch::{self, UserContext};
use crate::bootstrap::BootTables;
use crate::exec::{Executor, ImageLayout};
use crate::handoff::ScratchPage;
use crate::plan::generated;
use crate::sel4::calls::KernelCalls;
use crate::sel4::{
    BootInfo, CPtr, CapRights, ObjectType, SlotRegion, SysError, SysResult, UntypedDesc, Word,
};

/// One recorded kernel invocation, in call order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum KernelCall {
    UntypedRetype {
        service: CPtr,
        object: ObjectType,
        size_bits: u8,
        root: CPtr,
        node_index: CPtr,
        node_depth: u8,
        node_offset: CPtr,
    },
    CnodeCopy {
        dest_root: CPtr,
        dest_index: CPtr,
        dest_depth: u8,
        src_root: CPtr,
        src_index: CPtr,
        src_depth: u8,
        rights: CapRights,
    },
    CnodeMint {
        dest_root: CPtr,
        dest_index: CPtr,
        dest_depth: u8,
        src_root: CPtr,
        src_index: CPtr,
        src_depth: u8,
        rights: CapRights,
        badge: Word,
    },
    CnodeMutate {
        dest_root: CPtr,
        dest_index: CPtr,
        dest_depth: u8,
        src_root: CPtr,
        src_index: CPtr,
        src_depth: u8,
        guard: Word,
    },
    CnodeMove {
        dest_root: CPtr,
        dest_index: CPtr,
        dest_depth: u8,
        src_root: CPtr,
        src_index: CPtr,
        src_depth: u8,
    },
    AsidPoolAssign {
        pool: CPtr,
        vspace: CPtr,
    },
    MapStructure {
        level: u8,
        service: CPtr,
        vspace: CPtr,
        vaddr: Word,
    },
    PageMap {
        frame: CPtr,
        vspace: CPtr,
        vaddr: Word,
        rights: CapRights,
    },
    PageUnmap {
        frame: CPtr,
    },
    TcbConfigure {
        tcb: CPtr,
        cspace_root: CPtr,
        vspace_root: CPtr,
        ipc_buffer_addr: Word,
        ipc_buffer_frame: CPtr,
    },
    TcbReadRegisters {
        tcb: CPtr,
    },
    TcbWriteRegisters {
        tcb: CPtr,
        entry: Word,
        stack_pointer: Word,
        args: [Word; 3],
    },
    TcbResume {
        tcb: CPtr,
    },
    TcbSuspend {
        tcb: CPtr,
    },
}

/// Recording kernel simulator with optional fault injection.
#[derive(Default)]
pub struct SimKernel {
    calls: Vec<KernelCall>,
    fail_at: Option<(usize, SysError)>,
    contexts: HashMap<CPtr, UserContext>,
    mapped_frames: HashMap<CPtr, (CPtr, Word)>,
}

impl SimKernel {
    /// A simulator that accepts every call.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A simulator that fails the call with ordinal `call_index`
    /// (zero-based) with `error`, accepting everything before it.
    #[must_use]
    pub fn failing_at(call_index: usize, error: SysError) -> Self {
        Self {
            fail_at: Some((call_index, error)),
            ..Self::default()
        }
    }

    /// Every invocation recorded so far, in order.
    #[must_use]
    pub fn calls(&self) -> &[KernelCall] {
        &self.calls
    }

    /// Last written register context of `tcb`, if any.
    #[must_use]
    pub fn context(&self, tcb: CPtr) -> Option<&UserContext> {
        self.contexts.get(&tcb)
    }

    /// Current mapping of `frame`, if the simulator saw one installed.
    #[must_use]
    pub fn frame_mapping(&self, frame: CPtr) -> Option<(CPtr, Word)> {
        self.mapped_frames.get(&frame).copied()
    }

    fn record(&mut self, call: KernelCall) -> SysResult {
        let ordinal = self.calls.len();
        self.calls.push(call);
        match self.fail_at {
            Some((index, error)) if index == ordinal => Err(error),
            _ => Ok(()),
        }
    }
}

impl KernelCalls for SimKernel {
    fn untyped_retype(
        &mut self,
        service: CPtr,
        object: ObjectType,
        size_bits: u8,
        root: CPtr,
        node_index: CPtr,
        node_depth: u8,
        node_offset: CPtr,
    ) -> SysResult {
        self.record(KernelCall::UntypedRetype {
            service,
            object,
            size_bits,
            root,
            node_index,
            node_depth,
            node_offset,
        })
    }

    fn cnode_copy(
        &mut self,
        dest_root: CPtr,
        dest_index: CPtr,
        dest_depth: u8,
        src_root: CPtr,
        src_index: CPtr,
        src_depth: u8,
        rights: CapRights,
    ) -> SysResult {
        self.record(KernelCall::CnodeCopy {
            dest_root,
            dest_index,
            dest_depth,
            src_root,
            src_index,
            src_depth,
            rights,
        })
    }

    fn cnode_mint(
        &mut self,
        dest_root: CPtr,
        dest_index: CPtr,
        dest_depth: u8,
        src_root: CPtr,
        src_index: CPtr,
        src_depth: u8,
        rights: CapRights,
        badge: Word,
    ) -> SysResult {
        self.record(KernelCall::CnodeMint {
            dest_root,
            dest_index,
            dest_depth,
            src_root,
            src_index,
            src_depth,
            rights,
            badge,
        })
    }

    fn cnode_mutate(
        &mut self,
        dest_root: CPtr,
        dest_index: CPtr,
        dest_depth: u8,
        src_root: CPtr,
        src_index: CPtr,
        src_depth: u8,
        guard: Word,
    ) -> SysResult {
        self.record(KernelCall::CnodeMutate {
            dest_root,
            dest_index,
            dest_depth,
            src_root,
            src_index,
            src_depth,
            guard,
        })
    }

    fn cnode_move(
        &mut self,
        dest_root: CPtr,
        dest_index: CPtr,
        dest_depth: u8,
        src_root: CPtr,
        src_index: CPtr,
        src_depth: u8,
    ) -> SysResult {
        self.record(KernelCall::CnodeMove {
            dest_root,
            dest_index,
            dest_depth,
            src_root,
            src_index,
            src_depth,
        })
    }

    fn asid_pool_assign(&mut self, pool: CPtr, vspace: CPtr) -> SysResult {
        self.record(KernelCall::AsidPoolAssign { pool, vspace })
    }

    fn map_structure(&mut self, level: u8, service: CPtr, vspace: CPtr, vaddr: Word) -> SysResult {
        self.record(KernelCall::MapStructure {
            level,
            service,
            vspace,
            vaddr,
        })
    }

    fn page_map(&mut self, frame: CPtr, vspace: CPtr, vaddr: Word, rights: CapRights) -> SysResult {
        self.record(KernelCall::PageMap {
            frame,
            vspace,
            vaddr,
            rights,
        })?;
        if self.mapped_frames.contains_key(&frame) {
            // A frame can back only one mapping at a time; the caller must
            // unmap first, as the real kernel would demand.
            return Err(SysError::DeleteFirst);
        }
        self.mapped_frames.insert(frame, (vspace, vaddr));
        Ok(())
    }

    fn page_unmap(&mut self, frame: CPtr) -> SysResult {
        self.record(KernelCall::PageUnmap { frame })?;
        self.mapped_frames.remove(&frame);
        Ok(())
    }

    fn tcb_configure(
        &mut self,
        tcb: CPtr,
        cspace_root: CPtr,
        vspace_root: CPtr,
        ipc_buffer_addr: Word,
        ipc_buffer_frame: CPtr,
    ) -> SysResult {
        self.record(KernelCall::TcbConfigure {
            tcb,
            cspace_root,
            vspace_root,
            ipc_buffer_addr,
            ipc_buffer_frame,
        })
    }

    fn tcb_read_registers(&mut self, tcb: CPtr) -> Result<UserContext, SysError> {
        self.record(KernelCall::TcbReadRegisters { tcb })?;
        Ok(self.contexts.get(&tcb).copied().unwrap_or_default())
    }

    fn tcb_write_registers(&mut self, tcb: CPtr, context: &UserContext) -> SysResult {
        self.record(KernelCall::TcbWriteRegisters {
            tcb,
            entry: context.entry_point(),
            stack_pointer: context.stack_pointer(),
            args: context.args(),
        })?;
        self.contexts.insert(tcb, *context);
        Ok(())
    }

    fn tcb_resume(&mut self, tcb: CPtr) -> SysResult {
        self.record(KernelCall::TcbResume { tcb })
    }

    fn tcb_suspend(&mut self, tcb: CPtr) -> SysResult {
        self.record(KernelCall::TcbSuspend { tcb })
    }
}

/// Boot fixture mirroring a small machine: one RAM untyped, one device
/// untyped, no extended records.
fn demo_bootinfo() -> BootInfo<'static> {
    static UNTYPEDS: [UntypedDesc; 2] = [
        UntypedDesc {
            paddr: 0x8000_0000,
            size_bits: 24,
            is_device: false,
        },
        UntypedDesc {
            paddr: 0xfe00_0000,
            size_bits: 16,
            is_device: true,
        },
    ];
    BootInfo {
        empty: SlotRegion {
            start: 0x40,
            end: 0x1000,
        },
        user_image_frames: SlotRegion {
            start: 0x10,
            end: 0x40,
        },
        untyped: SlotRegion {
            start: 0x200,
            end: 0x202,
        },
        untyped_list: &UNTYPEDS,
        init_cnode_size_bits: 14,
        extra: &[],
    }
}

/// Entry point for host-mode execution: replay the bundled plan against
/// the simulator and report the outcome.
pub fn main() -> anyhow::Result<()> {
    crate::bootstrap::log::init();

    let bootinfo = demo_bootinfo();
    let tables = BootTables::load(&bootinfo);
    tables.log_inventory();

    let layout = ImageLayout {
        lowest_vaddr: 0x40_0000,
        scratch_vaddr: 0x40_3000,
    };
    let mut scratch = Box::new(ScratchPage::new());
    let mut kernel = SimKernel::new();

    let plan = generated::plan();
    let mut executor = Executor::new(&mut kernel, tables, layout, &mut scratch);
    executor
        .run(&plan)
        .map_err(|error| anyhow!("bootstrap failed: {error}"))?;
    let gp_entries = executor.gp_memory_info().len();
    let device_entries = executor.device_memory_info().len();
    drop(executor);

    println!(
        "replayed {ops} operations in {calls} kernel calls ({gp_entries} gp blocks, {device_entries} device untypeds handed off)",
        ops = plan.operations.len(),
        calls = kernel.calls().len(),
    );
    println!(
        "context word count for this arch: {words}",
        words = arch::CONTEXT_WORDS
    );
    Ok(())
}
