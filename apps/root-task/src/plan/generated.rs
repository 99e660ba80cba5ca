// Author: Lukas Bower

//! Demonstration plan emitted by the offline generator for a single child
//! ("init") on a 64-bit target. Regenerate rather than edit: slot numbers,
//! depths, and byte counts are derived from the child ELF and the CSpace
//! layout config.

use super::{
    BinaryChunkLoadOp, CapOperation, CopyOp, CreateOp, MapFrameOp, MapFunc, MapOp, MintOp,
    MoveDeviceUntypedsOp, MutateOp, PassInfoOp, PassSystemInfoOp, Plan,
    RetypeLeftoverGpUntypedsOp, TcbSetupOp, TcbStartOp, CAP_ALLOW_READ, CAP_ALLOW_WRITE,
};
use crate::sel4::{ObjectType, Word};

/// Empty root-CNode slots the plan occupies.
pub const SLOTS_REQUIRED: Word = 14;

/// Untyped bytes consumed by the plan's create operations.
pub const BYTES_REQUIRED: Word = 0xB810;

/// The generated program, in execution order.
pub static CAP_OPERATIONS: [CapOperation; 30] = [
    CapOperation::Create(CreateOp {
        object: ObjectType::Tcb,
        bytes_required: 0x800,
        dest: 1,
        size_bits: 11,
    }),
    CapOperation::Create(CreateOp {
        object: ObjectType::CNode,
        bytes_required: 0x2000,
        dest: 0,
        size_bits: 8,
    }),
    CapOperation::Mutate(MutateOp {
        guard: 0,
        src: 0,
        dest: 2,
    }),
    CapOperation::Create(CreateOp {
        object: ObjectType::VSpace,
        bytes_required: 0x1000,
        dest: 3,
        size_bits: 12,
    }),
    CapOperation::Map(MapOp {
        func: MapFunc::AssignAsid,
        vaddr: 0,
        service: 3,
        vspace: 3,
    }),
    CapOperation::Create(CreateOp {
        object: ObjectType::PageStructure { level: 1 },
        bytes_required: 0x1000,
        dest: 5,
        size_bits: 12,
    }),
    CapOperation::Map(MapOp {
        func: MapFunc::MapStructure { level: 1 },
        vaddr: 0x40_0000,
        service: 5,
        vspace: 3,
    }),
    CapOperation::Create(CreateOp {
        object: ObjectType::PageStructure { level: 2 },
        bytes_required: 0x1000,
        dest: 6,
        size_bits: 12,
    }),
    CapOperation::Map(MapOp {
        func: MapFunc::MapStructure { level: 2 },
        vaddr: 0x40_0000,
        service: 6,
        vspace: 3,
    }),
    CapOperation::Create(CreateOp {
        object: ObjectType::PageStructure { level: 3 },
        bytes_required: 0x1000,
        dest: 7,
        size_bits: 12,
    }),
    CapOperation::Map(MapOp {
        func: MapFunc::MapStructure { level: 3 },
        vaddr: 0x40_0000,
        service: 7,
        vspace: 3,
    }),
    CapOperation::Create(CreateOp {
        object: ObjectType::Frame,
        bytes_required: 0x1000,
        dest: 4,
        size_bits: 12,
    }),
    CapOperation::MapFrame(MapFrameOp {
        vaddr: 0x41_F000,
        frame: 4,
        vspace: 3,
    }),
    CapOperation::Create(CreateOp {
        object: ObjectType::Endpoint,
        bytes_required: 0x10,
        dest: 8,
        size_bits: 4,
    }),
    CapOperation::Copy(CopyOp {
        src: 8,
        dest_root: 2,
        dest_index: 1,
        dest_depth: 8,
    }),
    CapOperation::Mint(MintOp {
        badge: 1,
        src: 8,
        dest: 13,
        rights: CAP_ALLOW_READ | CAP_ALLOW_WRITE,
    }),
    CapOperation::Copy(CopyOp {
        src: 13,
        dest_root: 2,
        dest_index: 2,
        dest_depth: 8,
    }),
    CapOperation::Create(CreateOp {
        object: ObjectType::Frame,
        bytes_required: 0x1000,
        dest: 9,
        size_bits: 12,
    }),
    CapOperation::Create(CreateOp {
        object: ObjectType::Frame,
        bytes_required: 0x1000,
        dest: 10,
        size_bits: 12,
    }),
    CapOperation::Create(CreateOp {
        object: ObjectType::Frame,
        bytes_required: 0x1000,
        dest: 11,
        size_bits: 12,
    }),
    CapOperation::Create(CreateOp {
        object: ObjectType::Frame,
        bytes_required: 0x1000,
        dest: 12,
        size_bits: 12,
    }),
    CapOperation::MapFrame(MapFrameOp {
        vaddr: 0x41_D000,
        frame: 12,
        vspace: 3,
    }),
    CapOperation::BinaryChunkLoad(BinaryChunkLoadOp {
        src_vaddr: 0x41_0000,
        dest_vaddr: 0x40_0000,
        length: 0x4000,
        dest_vspace: 3,
    }),
    CapOperation::TcbSetup(TcbSetupOp {
        entry_addr: 0x40_0000,
        stack_pointer_addr: 0x41_E000,
        ipc_buffer_addr: 0x41_F000,
        arg0: 0,
        arg1: 0,
        arg2: 0,
        cspace: 2,
        vspace: 3,
        ipc_buffer: 4,
        tcb: 1,
    }),
    CapOperation::RetypeLeftoverGpUntypeds(RetypeLeftoverGpUntypedsOp {
        cnode_dest: 2,
        start_slot: 16,
        end_slot: 240,
        cnode_depth: 8,
    }),
    CapOperation::MoveDeviceUntypeds(MoveDeviceUntypedsOp {
        cnode_dest: 2,
        start_slot: 240,
        end_slot: 254,
        cnode_depth: 8,
    }),
    CapOperation::PassGpMemoryInfo(PassInfoOp {
        dest_vaddr: 0x42_0000,
        frame: 9,
        dest_vspace: 3,
    }),
    CapOperation::PassDeviceMemoryInfo(PassInfoOp {
        dest_vaddr: 0x42_1000,
        frame: 10,
        dest_vspace: 3,
    }),
    CapOperation::PassSystemInfo(PassSystemInfoOp {
        dest_vaddr: 0x42_2000,
        frame: 11,
        dest_vspace: 3,
        pass_framebuffer_info: true,
    }),
    CapOperation::TcbStart(TcbStartOp { tcb: 1 }),
];

/// The generated plan bundled with its sizing scalars.
#[must_use]
pub fn plan() -> Plan<'static> {
    Plan {
        operations: &CAP_OPERATIONS,
        slots_required: SLOTS_REQUIRED,
        bytes_required: BYTES_REQUIRED,
    }
}
