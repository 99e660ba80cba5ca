// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Defines the kernel invocation boundary for root-task.
// Author: Lukas Bower

//! The syscall seam between the operation executor and the microkernel.
//!
//! [`KernelCalls`] covers exactly the invocations a generated plan can
//! demand, nothing more. The kernel build implements it with thin
//! projections over the syscall stubs; the host build substitutes the
//! recording simulator from the `host` module.

#[cfg(all(feature = "kernel", target_os = "none"))]
use crate::arch;
use crate::arch::UserContext;
use crate::sel4::{CPtr, CapRights, ObjectType, SysError, SysResult, Word};

/// Narrow kernel surface driven by the operation executor.
///
/// Every method mirrors one kernel invocation and reports the kernel's
/// verdict; callers treat any error as fatal.
pub trait KernelCalls {
    /// Retypes one object out of `service` into the CNode resolved by
    /// `(root, node_index, node_depth)` at `node_offset`.
    #[allow(clippy::too_many_arguments)]
    fn untyped_retype(
        &mut self,
        service: CPtr,
        object: ObjectType,
        size_bits: u8,
        root: CPtr,
        node_index: CPtr,
        node_depth: u8,
        node_offset: CPtr,
    ) -> SysResult;

    /// Copies a capability with the given rights.
    #[allow(clippy::too_many_arguments)]
    fn cnode_copy(
        &mut self,
        dest_root: CPtr,
        dest_index: CPtr,
        dest_depth: u8,
        src_root: CPtr,
        src_index: CPtr,
        src_depth: u8,
        rights: CapRights,
    ) -> SysResult;

    /// Copies a capability with restricted rights and a badge.
    #[allow(clippy::too_many_arguments)]
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
    ) -> SysResult;

    /// Moves a capability, installing new guard data at the destination.
    #[allow(clippy::too_many_arguments)]
    fn cnode_mutate(
        &mut self,
        dest_root: CPtr,
        dest_index: CPtr,
        dest_depth: u8,
        src_root: CPtr,
        src_index: CPtr,
        src_depth: u8,
        guard: Word,
    ) -> SysResult;

    /// Moves a capability unchanged.
    #[allow(clippy::too_many_arguments)]
    fn cnode_move(
        &mut self,
        dest_root: CPtr,
        dest_index: CPtr,
        dest_depth: u8,
        src_root: CPtr,
        src_index: CPtr,
        src_depth: u8,
    ) -> SysResult;

    /// Associates a VSpace root with an ASID pool.
    fn asid_pool_assign(&mut self, pool: CPtr, vspace: CPtr) -> SysResult;

    /// Installs an intermediate paging object at the given tree level.
    fn map_structure(&mut self, level: u8, service: CPtr, vspace: CPtr, vaddr: Word) -> SysResult;

    /// Installs a leaf frame.
    fn page_map(&mut self, frame: CPtr, vspace: CPtr, vaddr: Word, rights: CapRights) -> SysResult;

    /// Tears down a leaf frame mapping.
    fn page_unmap(&mut self, frame: CPtr) -> SysResult;

    /// Attaches CSpace, VSpace, and IPC buffer to a TCB.
    fn tcb_configure(
        &mut self,
        tcb: CPtr,
        cspace_root: CPtr,
        vspace_root: CPtr,
        ipc_buffer_addr: Word,
        ipc_buffer_frame: CPtr,
    ) -> SysResult;

    /// Reads a thread's register context.
    fn tcb_read_registers(&mut self, tcb: CPtr) -> Result<UserContext, SysError>;

    /// Writes a thread's register context back, leaving it suspended.
    fn tcb_write_registers(&mut self, tcb: CPtr, context: &UserContext) -> SysResult;

    /// Resumes a configured thread.
    fn tcb_resume(&mut self, tcb: CPtr) -> SysResult;

    /// Suspends a thread; also the root task's halt primitive.
    fn tcb_suspend(&mut self, tcb: CPtr) -> SysResult;
}

/// Encodes [`CapRights`] into the kernel's rights word.
#[must_use]
pub fn encode_rights(rights: CapRights) -> Word {
    let mut word = 0;
    if rights.write {
        word |= 1 << 0;
    }
    if rights.read {
        word |= 1 << 1;
    }
    if rights.grant {
        word |= 1 << 2;
    }
    if rights.grant_reply {
        word |= 1 << 3;
    }
    word
}

#[cfg_attr(not(all(feature = "kernel", target_os = "none")), allow(dead_code))]
fn decode(code: Word) -> SysResult {
    match SysError::from_code(code) {
        None => Ok(()),
        Some(err) => Err(err),
    }
}

/// Kernel-backed implementation of [`KernelCalls`].
///
/// Real invocations exist only in the kernel build; on the host every
/// method reports success without side effects, keeping the library
/// linkable while the test suite drives the recording simulator instead.
#[derive(Debug, Default)]
pub struct Sel4Kernel;

#[cfg(all(feature = "kernel", target_os = "none"))]
mod sys {
    #![allow(unsafe_code)]

    use super::*;

    extern "C" {
        pub(super) fn seL4_Untyped_Retype(
            service: CPtr,
            object_type: Word,
            size_bits: Word,
            root: CPtr,
            node_index: Word,
            node_depth: Word,
            node_offset: Word,
            num_objects: Word,
        ) -> Word;
        pub(super) fn seL4_CNode_Copy(
            dest_root: CPtr,
            dest_index: CPtr,
            dest_depth: u8,
            src_root: CPtr,
            src_index: CPtr,
            src_depth: u8,
            rights: Word,
        ) -> Word;
        pub(super) fn seL4_CNode_Mint(
            dest_root: CPtr,
            dest_index: CPtr,
            dest_depth: u8,
            src_root: CPtr,
            src_index: CPtr,
            src_depth: u8,
            rights: Word,
            badge: Word,
        ) -> Word;
        pub(super) fn seL4_CNode_Mutate(
            dest_root: CPtr,
            dest_index: CPtr,
            dest_depth: u8,
            src_root: CPtr,
            src_index: CPtr,
            src_depth: u8,
            guard: Word,
        ) -> Word;
        pub(super) fn seL4_CNode_Move(
            dest_root: CPtr,
            dest_index: CPtr,
            dest_depth: u8,
            src_root: CPtr,
            src_index: CPtr,
            src_depth: u8,
        ) -> Word;
        pub(super) fn seL4_TCB_Configure(
            service: CPtr,
            fault_ep: CPtr,
            cspace_root: CPtr,
            cspace_root_data: Word,
            vspace_root: CPtr,
            vspace_root_data: Word,
            buffer_addr: Word,
            buffer_frame: CPtr,
        ) -> Word;
        pub(super) fn seL4_TCB_ReadRegisters(
            service: CPtr,
            suspend_source: Word,
            arch_flags: u8,
            count: Word,
            regs: *mut UserContext,
        ) -> Word;
        pub(super) fn seL4_TCB_WriteRegisters(
            service: CPtr,
            resume_target: Word,
            arch_flags: u8,
            count: Word,
            regs: *const UserContext,
        ) -> Word;
        pub(super) fn seL4_TCB_Resume(service: CPtr) -> Word;
        pub(super) fn seL4_TCB_Suspend(service: CPtr) -> Word;
    }
}

#[cfg(all(feature = "kernel", target_os = "none"))]
#[allow(unsafe_code)]
impl KernelCalls for Sel4Kernel {
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
        decode(unsafe {
            sys::seL4_Untyped_Retype(
                service,
                arch::object_type_code(object),
                size_bits as Word,
                root,
                node_index,
                node_depth as Word,
                node_offset,
                1,
            )
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
        decode(unsafe {
            sys::seL4_CNode_Copy(
                dest_root,
                dest_index,
                dest_depth,
                src_root,
                src_index,
                src_depth,
                encode_rights(rights),
            )
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
        decode(unsafe {
            sys::seL4_CNode_Mint(
                dest_root,
                dest_index,
                dest_depth,
                src_root,
                src_index,
                src_depth,
                encode_rights(rights),
                badge,
            )
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
        decode(unsafe {
            sys::seL4_CNode_Mutate(
                dest_root, dest_index, dest_depth, src_root, src_index, src_depth, guard,
            )
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
        decode(unsafe {
            sys::seL4_CNode_Move(
                dest_root, dest_index, dest_depth, src_root, src_index, src_depth,
            )
        })
    }

    fn asid_pool_assign(&mut self, pool: CPtr, vspace: CPtr) -> SysResult {
        decode(arch::asid_pool_assign(pool, vspace))
    }

    fn map_structure(&mut self, level: u8, service: CPtr, vspace: CPtr, vaddr: Word) -> SysResult {
        decode(arch::map_structure(level, service, vspace, vaddr))
    }

    fn page_map(&mut self, frame: CPtr, vspace: CPtr, vaddr: Word, rights: CapRights) -> SysResult {
        decode(arch::page_map(frame, vspace, vaddr, encode_rights(rights)))
    }

    fn page_unmap(&mut self, frame: CPtr) -> SysResult {
        decode(arch::page_unmap(frame))
    }

    fn tcb_configure(
        &mut self,
        tcb: CPtr,
        cspace_root: CPtr,
        vspace_root: CPtr,
        ipc_buffer_addr: Word,
        ipc_buffer_frame: CPtr,
    ) -> SysResult {
        decode(unsafe {
            sys::seL4_TCB_Configure(
                tcb,
                0,
                cspace_root,
                0,
                vspace_root,
                0,
                ipc_buffer_addr,
                ipc_buffer_frame,
            )
        })
    }

    fn tcb_read_registers(&mut self, tcb: CPtr) -> Result<UserContext, SysError> {
        let mut context = UserContext::default();
        decode(unsafe {
            sys::seL4_TCB_ReadRegisters(tcb, 0, 0, arch::CONTEXT_WORDS as Word, &mut context)
        })?;
        Ok(context)
    }

    fn tcb_write_registers(&mut self, tcb: CPtr, context: &UserContext) -> SysResult {
        decode(unsafe {
            sys::seL4_TCB_WriteRegisters(tcb, 0, 0, arch::CONTEXT_WORDS as Word, context)
        })
    }

    fn tcb_resume(&mut self, tcb: CPtr) -> SysResult {
        decode(unsafe { sys::seL4_TCB_Resume(tcb) })
    }

    fn tcb_suspend(&mut self, tcb: CPtr) -> SysResult {
        decode(unsafe { sys::seL4_TCB_Suspend(tcb) })
    }
}

#[cfg(not(all(feature = "kernel", target_os = "none")))]
impl KernelCalls for Sel4Kernel {
    fn untyped_retype(
        &mut self,
        _service: CPtr,
        _object: ObjectType,
        _size_bits: u8,
        _root: CPtr,
        _node_index: CPtr,
        _node_depth: u8,
        _node_offset: CPtr,
    ) -> SysResult {
        Ok(())
    }

    fn cnode_copy(
        &mut self,
        _dest_root: CPtr,
        _dest_index: CPtr,
        _dest_depth: u8,
        _src_root: CPtr,
        _src_index: CPtr,
        _src_depth: u8,
        _rights: CapRights,
    ) -> SysResult {
        Ok(())
    }

    fn cnode_mint(
        &mut self,
        _dest_root: CPtr,
        _dest_index: CPtr,
        _dest_depth: u8,
        _src_root: CPtr,
        _src_index: CPtr,
        _src_depth: u8,
        _rights: CapRights,
        _badge: Word,
    ) -> SysResult {
        Ok(())
    }

    fn cnode_mutate(
        &mut self,
        _dest_root: CPtr,
        _dest_index: CPtr,
        _dest_depth: u8,
        _src_root: CPtr,
        _src_index: CPtr,
        _src_depth: u8,
        _guard: Word,
    ) -> SysResult {
        Ok(())
    }

    fn cnode_move(
        &mut self,
        _dest_root: CPtr,
        _dest_index: CPtr,
        _dest_depth: u8,
        _src_root: CPtr,
        _src_index: CPtr,
        _src_depth: u8,
    ) -> SysResult {
        Ok(())
    }

    fn asid_pool_assign(&mut self, _pool: CPtr, _vspace: CPtr) -> SysResult {
        Ok(())
    }

    fn map_structure(
        &mut self,
        _level: u8,
        _service: CPtr,
        _vspace: CPtr,
        _vaddr: Word,
    ) -> SysResult {
        Ok(())
    }

    fn page_map(
        &mut self,
        _frame: CPtr,
        _vspace: CPtr,
        _vaddr: Word,
        _rights: CapRights,
    ) -> SysResult {
        Ok(())
    }

    fn page_unmap(&mut self, _frame: CPtr) -> SysResult {
        Ok(())
    }

    fn tcb_configure(
        &mut self,
        _tcb: CPtr,
        _cspace_root: CPtr,
        _vspace_root: CPtr,
        _ipc_buffer_addr: Word,
        _ipc_buffer_frame: CPtr,
    ) -> SysResult {
        Ok(())
    }

    fn tcb_read_registers(&mut self, _tcb: CPtr) -> Result<UserContext, SysError> {
        Ok(UserContext::default())
    }

    fn tcb_write_registers(&mut self, _tcb: CPtr, _context: &UserContext) -> SysResult {
        Ok(())
    }

    fn tcb_resume(&mut self, _tcb: CPtr) -> SysResult {
        Ok(())
    }

    fn tcb_suspend(&mut self, _tcb: CPtr) -> SysResult {
        Ok(())
    }
}
