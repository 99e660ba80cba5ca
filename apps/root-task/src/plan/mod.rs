// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Defines the capability-operation plan format for root-task.
// Author: Lukas Bower

//! The ahead-of-time plan the executor interprets.
//!
//! A plan is a topologically ordered array of [`CapOperation`] values
//! emitted by the offline generator, plus two scalars it sizes the run
//! with. Slot fields are relative: the executor rebases them by the first
//! empty slot reported at boot, so the generator can number capabilities
//! densely from zero without knowing the boot layout.

pub mod generated;

use crate::sel4::{CapRights, ObjectType, Word};

/// Right bit permitting writes, as encoded in mint operations.
pub const CAP_ALLOW_WRITE: u8 = 1 << 0;
/// Right bit permitting reads.
pub const CAP_ALLOW_READ: u8 = 1 << 1;
/// Right bit permitting capability transfer.
pub const CAP_ALLOW_GRANT: u8 = 1 << 2;
/// Right bit permitting reply-capability grants.
pub const CAP_ALLOW_GRANT_REPLY: u8 = 1 << 3;

/// Decodes a 4-bit rights mask from a mint operation.
#[must_use]
pub fn decode_rights(mask: u8) -> CapRights {
    CapRights {
        write: (mask & CAP_ALLOW_WRITE) != 0,
        read: (mask & CAP_ALLOW_READ) != 0,
        grant: (mask & CAP_ALLOW_GRANT) != 0,
        grant_reply: (mask & CAP_ALLOW_GRANT_REPLY) != 0,
    }
}

/// Mapping primitive selector carried by [`MapOp`].
///
/// The generator picks the primitive; the executor dispatches through the
/// shim set compiled into this build. Levels count down from the VSpace
/// root, so level 1 is the widest intermediate structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapFunc {
    /// Associate the target VSpace with the root ASID pool.
    AssignAsid,
    /// Install an intermediate paging structure at the given level.
    MapStructure {
        /// Paging tree level, 1-based below the VSpace root.
        level: u8,
    },
    /// Install a leaf frame.
    MapPage,
    /// Tear down a leaf frame mapping.
    UnmapPage,
}

/// Allocate an object from the untyped pool into a root-CNode slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateOp {
    /// Object class to retype.
    pub object: ObjectType,
    /// Alignment-adjusted bytes this create consumes from its untyped.
    pub bytes_required: Word,
    /// Destination slot, relative to the first empty slot.
    pub dest: Word,
    /// Object size exponent where the class is variably sized.
    pub size_bits: u8,
}

/// Derive a full-rights copy into a (possibly child) CNode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyOp {
    /// Source slot, relative to the first empty slot.
    pub src: Word,
    /// Destination CNode, relative to the first empty slot.
    pub dest_root: Word,
    /// Slot index inside the destination CNode.
    pub dest_index: Word,
    /// Resolution depth for the destination CNode, in bits.
    pub dest_depth: u8,
}

/// Derive a restricted, badged copy within the root CNode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintOp {
    /// Badge installed on the derived capability.
    pub badge: Word,
    /// Source slot, relative to the first empty slot.
    pub src: Word,
    /// Destination slot, relative to the first empty slot.
    pub dest: Word,
    /// 4-bit rights mask; see [`decode_rights`].
    pub rights: u8,
}

/// Move a capability within the root CNode, updating guard data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutateOp {
    /// Guard data installed at the destination.
    pub guard: Word,
    /// Source slot, relative to the first empty slot.
    pub src: Word,
    /// Destination slot, relative to the first empty slot.
    pub dest: Word,
}

/// Install a page structure, frame, or ASID binding via the shim set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapOp {
    /// Which mapping primitive to dispatch.
    pub func: MapFunc,
    /// Target virtual address in the destination VSpace.
    pub vaddr: Word,
    /// Capability being installed, relative to the first empty slot.
    pub service: Word,
    /// Destination VSpace root, relative to the first empty slot.
    pub vspace: Word,
}

/// Donate a contiguous run of root-image frames to a child VSpace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryChunkLoadOp {
    /// Start of the chunk in the root task's layout.
    pub src_vaddr: Word,
    /// Where the chunk lands in the child's layout.
    pub dest_vaddr: Word,
    /// Chunk length in bytes; whole pages.
    pub length: Word,
    /// Destination VSpace root, relative to the first empty slot.
    pub dest_vspace: Word,
}

/// Wire a TCB to its CSpace, VSpace, and IPC buffer and seed its registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcbSetupOp {
    /// Child entry point.
    pub entry_addr: Word,
    /// Child initial stack pointer.
    pub stack_pointer_addr: Word,
    /// Child-side virtual address of the IPC buffer.
    pub ipc_buffer_addr: Word,
    /// First start argument.
    pub arg0: Word,
    /// Second start argument.
    pub arg1: Word,
    /// Third start argument.
    pub arg2: Word,
    /// Child CSpace root, relative to the first empty slot.
    pub cspace: Word,
    /// Child VSpace root, relative to the first empty slot.
    pub vspace: Word,
    /// IPC buffer frame, relative to the first empty slot.
    pub ipc_buffer: Word,
    /// Target TCB, relative to the first empty slot.
    pub tcb: Word,
}

/// Install a single data frame into a child VSpace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapFrameOp {
    /// Target virtual address in the child VSpace.
    pub vaddr: Word,
    /// Frame capability, relative to the first empty slot.
    pub frame: Word,
    /// Destination VSpace root, relative to the first empty slot.
    pub vspace: Word,
}

/// Split every general-purpose residual into power-of-two untypeds inside
/// a child CNode window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetypeLeftoverGpUntypedsOp {
    /// Destination CNode, relative to the first empty slot.
    pub cnode_dest: Word,
    /// First slot of the destination window.
    pub start_slot: Word,
    /// One past the last slot of the destination window.
    pub end_slot: Word,
    /// Resolution depth for the destination CNode, in bits.
    pub cnode_depth: u8,
}

/// Move device untypeds, unchanged, into a child CNode window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveDeviceUntypedsOp {
    /// Destination CNode, relative to the first empty slot.
    pub cnode_dest: Word,
    /// First slot of the destination window.
    pub start_slot: Word,
    /// One past the last slot of the destination window.
    pub end_slot: Word,
    /// Resolution depth for the destination CNode, in bits.
    pub cnode_depth: u8,
}

/// Publish a descriptor page into a child VSpace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassInfoOp {
    /// Where the page lands in the child's layout.
    pub dest_vaddr: Word,
    /// Pre-created frame carrying the page, relative to the first empty
    /// slot.
    pub frame: Word,
    /// Destination VSpace root, relative to the first empty slot.
    pub dest_vspace: Word,
}

/// Publish the system descriptor page into a child VSpace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassSystemInfoOp {
    /// Where the page lands in the child's layout.
    pub dest_vaddr: Word,
    /// Pre-created frame carrying the page, relative to the first empty
    /// slot.
    pub frame: Word,
    /// Destination VSpace root, relative to the first empty slot.
    pub dest_vspace: Word,
    /// Whether the framebuffer blob should be copied into the page.
    pub pass_framebuffer_info: bool,
}

/// Resume a configured child TCB; by convention the plan's last operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcbStartOp {
    /// Target TCB, relative to the first empty slot.
    pub tcb: Word,
}

/// One step of the generated program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapOperation {
    /// Allocate and retype a kernel object.
    Create(CreateOp),
    /// Derive a full-rights copy.
    Copy(CopyOp),
    /// Derive a restricted, badged copy.
    Mint(MintOp),
    /// Relocate within the root CNode, installing guard data.
    Mutate(MutateOp),
    /// Dispatch a mapping primitive.
    Map(MapOp),
    /// Donate image frames to a child.
    BinaryChunkLoad(BinaryChunkLoadOp),
    /// Configure a child TCB.
    TcbSetup(TcbSetupOp),
    /// Install one frame into a child VSpace.
    MapFrame(MapFrameOp),
    /// Hand residual general-purpose memory to a child.
    RetypeLeftoverGpUntypeds(RetypeLeftoverGpUntypedsOp),
    /// Hand device untypeds to a child.
    MoveDeviceUntypeds(MoveDeviceUntypedsOp),
    /// Publish the general-purpose memory descriptor.
    PassGpMemoryInfo(PassInfoOp),
    /// Publish the device memory descriptor.
    PassDeviceMemoryInfo(PassInfoOp),
    /// Publish the system descriptor.
    PassSystemInfo(PassSystemInfoOp),
    /// Resume a child.
    TcbStart(TcbStartOp),
}

impl core::fmt::Display for CapOperation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Create(op) => write!(
                f,
                "create {object} size_bits={bits} dest=+{dest}",
                object = op.object,
                bits = op.size_bits,
                dest = op.dest
            ),
            Self::Copy(op) => write!(
                f,
                "copy src=+{src} dest_root=+{root} index={index} depth={depth}",
                src = op.src,
                root = op.dest_root,
                index = op.dest_index,
                depth = op.dest_depth
            ),
            Self::Mint(op) => write!(
                f,
                "mint src=+{src} dest=+{dest} badge={badge} rights={rights:#06b}",
                src = op.src,
                dest = op.dest,
                badge = op.badge,
                rights = op.rights
            ),
            Self::Mutate(op) => write!(
                f,
                "mutate src=+{src} dest=+{dest} guard={guard:#x}",
                src = op.src,
                dest = op.dest,
                guard = op.guard
            ),
            Self::Map(op) => write!(
                f,
                "map {func:?} service=+{service} vspace=+{vspace} vaddr={vaddr:#x}",
                func = op.func,
                service = op.service,
                vspace = op.vspace,
                vaddr = op.vaddr
            ),
            Self::BinaryChunkLoad(op) => write!(
                f,
                "chunk-load src={src:#x} dest={dest:#x} len={len:#x} vspace=+{vspace}",
                src = op.src_vaddr,
                dest = op.dest_vaddr,
                len = op.length,
                vspace = op.dest_vspace
            ),
            Self::TcbSetup(op) => write!(
                f,
                "tcb-setup tcb=+{tcb} entry={entry:#x} sp={sp:#x} ipc={ipc:#x}",
                tcb = op.tcb,
                entry = op.entry_addr,
                sp = op.stack_pointer_addr,
                ipc = op.ipc_buffer_addr
            ),
            Self::MapFrame(op) => write!(
                f,
                "map-frame frame=+{frame} vspace=+{vspace} vaddr={vaddr:#x}",
                frame = op.frame,
                vspace = op.vspace,
                vaddr = op.vaddr
            ),
            Self::RetypeLeftoverGpUntypeds(op) => write!(
                f,
                "retype-leftovers cnode=+{cnode} slots=[{start}..{end}) depth={depth}",
                cnode = op.cnode_dest,
                start = op.start_slot,
                end = op.end_slot,
                depth = op.cnode_depth
            ),
            Self::MoveDeviceUntypeds(op) => write!(
                f,
                "move-device-untypeds cnode=+{cnode} slots=[{start}..{end}) depth={depth}",
                cnode = op.cnode_dest,
                start = op.start_slot,
                end = op.end_slot,
                depth = op.cnode_depth
            ),
            Self::PassGpMemoryInfo(op) => write!(
                f,
                "pass-gp-memory-info frame=+{frame} vspace=+{vspace} vaddr={vaddr:#x}",
                frame = op.frame,
                vspace = op.dest_vspace,
                vaddr = op.dest_vaddr
            ),
            Self::PassDeviceMemoryInfo(op) => write!(
                f,
                "pass-device-memory-info frame=+{frame} vspace=+{vspace} vaddr={vaddr:#x}",
                frame = op.frame,
                vspace = op.dest_vspace,
                vaddr = op.dest_vaddr
            ),
            Self::PassSystemInfo(op) => write!(
                f,
                "pass-system-info frame=+{frame} vspace=+{vspace} vaddr={vaddr:#x} framebuffer={fb}",
                frame = op.frame,
                vspace = op.dest_vspace,
                vaddr = op.dest_vaddr,
                fb = op.pass_framebuffer_info
            ),
            Self::TcbStart(op) => write!(f, "tcb-start tcb=+{tcb}", tcb = op.tcb),
        }
    }
}

/// A complete generated program plus its sizing scalars.
#[derive(Debug, Clone, Copy)]
pub struct Plan<'a> {
    /// Operations in execution order.
    pub operations: &'a [CapOperation],
    /// Empty root-CNode slots the plan will occupy.
    pub slots_required: Word,
    /// Untyped bytes the plan's create operations will consume.
    pub bytes_required: Word,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rights_masks_decode_bit_by_bit() {
        let rights = decode_rights(CAP_ALLOW_READ | CAP_ALLOW_GRANT);
        assert!(!rights.write);
        assert!(rights.read);
        assert!(rights.grant);
        assert!(!rights.grant_reply);

        // A full mask decodes to all rights; an empty mask to none.
        assert_eq!(decode_rights(0b1111), crate::sel4::CapRights::ALL);
        assert_eq!(decode_rights(0), crate::sel4::CapRights::default());
    }
}
