// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Defines the kernel-facing types for root-task.
// Author: Lukas Bower

//! Narrow kernel-facing surface for the root task.
//!
//! The bootstrapper drives the microkernel through a deliberately small set
//! of types and the [`calls::KernelCalls`] trait; real syscall bindings stay
//! behind that boundary so every module above it runs unmodified on the
//! host.

pub mod calls;

pub use mainspring_abi::{Word, PAGE_BITS, PAGE_BYTES, WORD_BITS, WORD_BYTES};

/// Absolute capability slot index resolved from the root task's CNode.
pub type CPtr = Word;

/// Half-open range of capability slots `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotRegion {
    /// First slot in the region.
    pub start: CPtr,
    /// One past the last slot in the region.
    pub end: CPtr,
}

impl SlotRegion {
    /// Number of slots covered.
    #[must_use]
    pub fn len(&self) -> Word {
        self.end.saturating_sub(self.start)
    }

    /// Returns `true` when the region covers no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Slot of the root task's own TCB capability.
pub const INIT_THREAD_TCB: CPtr = 1;
/// Slot of the root task's CNode capability.
pub const INIT_THREAD_CNODE: CPtr = 2;
/// Slot of the root task's VSpace root capability.
pub const INIT_THREAD_VSPACE: CPtr = 3;
/// Slot of the kernel-provided ASID pool for the initial thread.
pub const INIT_THREAD_ASID_POOL: CPtr = 6;

/// Kernel error codes surfaced by syscalls.
///
/// Mirrors the kernel's error numbering; `Unknown` captures codes newer
/// than this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysError {
    /// An argument was malformed for the invoked method.
    InvalidArgument,
    /// A capability argument did not name a usable capability.
    InvalidCapability,
    /// The invoked method is not legal on the object.
    IllegalOperation,
    /// A numeric argument fell outside the permitted range.
    RangeError,
    /// An address argument violated an alignment requirement.
    AlignmentError,
    /// Capability lookup failed while resolving an address.
    FailedLookup,
    /// The IPC message was truncated.
    TruncatedMessage,
    /// The destination slot was occupied.
    DeleteFirst,
    /// The object still has derived children.
    RevokeFirst,
    /// The untyped had insufficient free memory.
    NotEnoughMemory,
    /// Unrecognised kernel error code.
    Unknown(Word),
}

impl SysError {
    /// Decodes a raw kernel return value; `0` means success.
    #[must_use]
    pub fn from_code(code: Word) -> Option<Self> {
        match code {
            0 => None,
            1 => Some(Self::InvalidArgument),
            2 => Some(Self::InvalidCapability),
            3 => Some(Self::IllegalOperation),
            4 => Some(Self::RangeError),
            5 => Some(Self::AlignmentError),
            6 => Some(Self::FailedLookup),
            7 => Some(Self::TruncatedMessage),
            8 => Some(Self::DeleteFirst),
            9 => Some(Self::RevokeFirst),
            10 => Some(Self::NotEnoughMemory),
            other => Some(Self::Unknown(other)),
        }
    }

    /// Symbolic name for diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "InvalidArgument",
            Self::InvalidCapability => "InvalidCapability",
            Self::IllegalOperation => "IllegalOperation",
            Self::RangeError => "RangeError",
            Self::AlignmentError => "AlignmentError",
            Self::FailedLookup => "FailedLookup",
            Self::TruncatedMessage => "TruncatedMessage",
            Self::DeleteFirst => "DeleteFirst",
            Self::RevokeFirst => "RevokeFirst",
            Self::NotEnoughMemory => "NotEnoughMemory",
            Self::Unknown(_) => "Unknown",
        }
    }
}

impl core::fmt::Display for SysError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Unknown(code) => write!(f, "Unknown({code})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Result of a kernel invocation.
pub type SysResult = Result<(), SysError>;

/// Access rights attached to a derived capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapRights {
    /// Permit writes through the capability.
    pub write: bool,
    /// Permit reads through the capability.
    pub read: bool,
    /// Permit transferring capabilities through the object.
    pub grant: bool,
    /// Permit granting reply capabilities.
    pub grant_reply: bool,
}

impl CapRights {
    /// All rights set; the default for plain copies.
    pub const ALL: Self = Self {
        write: true,
        read: true,
        grant: true,
        grant_reply: true,
    };

    /// Read and write only; the default for frame mappings.
    pub const READ_WRITE: Self = Self {
        write: true,
        read: true,
        grant: false,
        grant_reply: false,
    };
}

/// Kernel object classes the plan can create.
///
/// Page structures are addressed by tree level rather than by per-arch
/// object names; the syscall layer translates levels into whatever object
/// set the target architecture exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    /// A smaller untyped carved out of a larger one.
    Untyped,
    /// Thread control block.
    Tcb,
    /// IPC endpoint.
    Endpoint,
    /// Notification object.
    Notification,
    /// Capability table node.
    CNode,
    /// Leaf data frame (one page).
    Frame,
    /// Root page-table object of an address space.
    VSpace,
    /// Intermediate paging object at the given tree level (1 = just below
    /// the VSpace root).
    PageStructure {
        /// Paging tree level.
        level: u8,
    },
}

impl core::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Untyped => f.write_str("Untyped"),
            Self::Tcb => f.write_str("Tcb"),
            Self::Endpoint => f.write_str("Endpoint"),
            Self::Notification => f.write_str("Notification"),
            Self::CNode => f.write_str("CNode"),
            Self::Frame => f.write_str("Frame"),
            Self::VSpace => f.write_str("VSpace"),
            Self::PageStructure { level } => write!(f, "PageStructure(level {level})"),
        }
    }
}

/// One untyped region advertised by the kernel at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UntypedDesc {
    /// Physical base address of the region.
    pub paddr: Word,
    /// log2 of the region size in bytes.
    pub size_bits: u8,
    /// Whether the region is device memory (fixed address, never RAM).
    pub is_device: bool,
}

/// Boot descriptor handed to the root task by the kernel.
///
/// This is the already-validated view the loader consumes; the kernel
/// build materialises it from the raw descriptor in the entrypoint, tests
/// build it directly from fixtures.
#[derive(Debug, Clone, Copy)]
pub struct BootInfo<'a> {
    /// Window of empty capability slots in the root CNode.
    pub empty: SlotRegion,
    /// Frame capabilities backing the root task's loaded image, in
    /// ascending virtual-address order.
    pub user_image_frames: SlotRegion,
    /// Capability range of the untyped list below.
    pub untyped: SlotRegion,
    /// Untyped descriptors, index-aligned with the capability range.
    pub untyped_list: &'a [UntypedDesc],
    /// Radix width of the root CNode in bits.
    pub init_cnode_size_bits: u8,
    /// Extended boot records chained after the fixed descriptor.
    pub extra: &'a [u8],
}

/// Emits one byte on the kernel debug console.
#[cfg(all(feature = "kernel", target_os = "none"))]
#[inline(always)]
#[allow(unsafe_code)]
pub fn debug_put_char(byte: u8) {
    extern "C" {
        fn seL4_DebugPutChar(ch: u8);
    }
    // SAFETY: the debug putchar stub has no preconditions beyond running on
    // a debug kernel build.
    unsafe {
        seL4_DebugPutChar(byte);
    }
}

/// Host stand-in for the kernel debug console; swallows the byte.
#[cfg(not(all(feature = "kernel", target_os = "none")))]
#[inline(always)]
pub fn debug_put_char(_byte: u8) {}
