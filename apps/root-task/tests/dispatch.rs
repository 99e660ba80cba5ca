// Author: Lukas Bower
//! Tests for slot rebasing and rights decoding across dispatch.

#[path = "support.rs"]
mod support;

use root_task::exec::Executor;
use root_task::handoff::ScratchPage;
use root_task::host::{KernelCall, SimKernel};
use root_task::plan::{
    CapOperation, CopyOp, MapFunc, MapOp, MintOp, Plan, CAP_ALLOW_GRANT, CAP_ALLOW_READ,
};
use root_task::sel4::{CapRights, INIT_THREAD_CNODE, WORD_BITS};

#[test]
fn copy_rebases_source_and_destination_root() {
    let tables = support::tables_with_gp(&[20]);
    let mut scratch = Box::new(ScratchPage::new());
    let mut kernel = SimKernel::new();
    let mut executor = Executor::new(&mut kernel, tables, support::layout(), &mut scratch);

    let ops = [CapOperation::Copy(CopyOp {
        src: 8,
        dest_root: 2,
        dest_index: 5,
        dest_depth: 12,
    })];
    let plan = Plan {
        operations: &ops,
        slots_required: 9,
        bytes_required: 0,
    };
    executor.run(&plan).unwrap();
    drop(executor);

    assert_eq!(
        kernel.calls(),
        &[KernelCall::CnodeCopy {
            dest_root: support::slot(2),
            dest_index: 5,
            dest_depth: 12,
            src_root: INIT_THREAD_CNODE,
            src_index: support::slot(8),
            src_depth: WORD_BITS as u8,
            rights: CapRights::ALL,
        }]
    );
}

#[test]
fn mint_decodes_the_rights_mask_bit_by_bit() {
    let tables = support::tables_with_gp(&[20]);
    let mut scratch = Box::new(ScratchPage::new());
    let mut kernel = SimKernel::new();
    let mut executor = Executor::new(&mut kernel, tables, support::layout(), &mut scratch);

    let ops = [CapOperation::Mint(MintOp {
        badge: 0xbeef,
        src: 1,
        dest: 2,
        rights: CAP_ALLOW_READ | CAP_ALLOW_GRANT,
    })];
    let plan = Plan {
        operations: &ops,
        slots_required: 3,
        bytes_required: 0,
    };
    executor.run(&plan).unwrap();
    drop(executor);

    assert_eq!(
        kernel.calls(),
        &[KernelCall::CnodeMint {
            dest_root: INIT_THREAD_CNODE,
            dest_index: support::slot(2),
            dest_depth: WORD_BITS as u8,
            src_root: INIT_THREAD_CNODE,
            src_index: support::slot(1),
            src_depth: WORD_BITS as u8,
            rights: CapRights {
                write: false,
                read: true,
                grant: true,
                grant_reply: false,
            },
            badge: 0xbeef,
        }]
    );
}

#[test]
fn map_ops_dispatch_through_the_shim_set() {
    let tables = support::tables_with_gp(&[20]);
    let mut scratch = Box::new(ScratchPage::new());
    let mut kernel = SimKernel::new();
    let mut executor = Executor::new(&mut kernel, tables, support::layout(), &mut scratch);

    let ops = [
        CapOperation::Map(MapOp {
            func: MapFunc::MapStructure { level: 2 },
            vaddr: 0x40_0000,
            service: 4,
            vspace: 3,
        }),
        CapOperation::Map(MapOp {
            func: MapFunc::MapPage,
            vaddr: 0x40_1000,
            service: 5,
            vspace: 3,
        }),
        CapOperation::Map(MapOp {
            func: MapFunc::UnmapPage,
            vaddr: 0,
            service: 5,
            vspace: 3,
        }),
    ];
    let plan = Plan {
        operations: &ops,
        slots_required: 6,
        bytes_required: 0,
    };
    executor.run(&plan).unwrap();
    drop(executor);

    assert_eq!(
        kernel.calls(),
        &[
            KernelCall::MapStructure {
                level: 2,
                service: support::slot(4),
                vspace: support::slot(3),
                vaddr: 0x40_0000,
            },
            KernelCall::PageMap {
                frame: support::slot(5),
                vspace: support::slot(3),
                vaddr: 0x40_1000,
                rights: CapRights::READ_WRITE,
            },
            KernelCall::PageUnmap {
                frame: support::slot(5),
            },
        ]
    );
}
