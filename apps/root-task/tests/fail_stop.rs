// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Defines tests for root-task fail-stop behaviour.
// Author: Lukas Bower

#[path = "support.rs"]
mod support;

use root_task::exec::{BootstrapError, Executor, PlanDefect};
use root_task::handoff::ScratchPage;
use root_task::host::{KernelCall, SimKernel};
use root_task::plan::{
    CapOperation, CreateOp, MapFunc, MapOp, MutateOp, Plan, TcbStartOp,
};
use root_task::sel4::{ObjectType, SysError, INIT_THREAD_CNODE, WORD_BITS};

fn create(dest: usize) -> CapOperation {
    CapOperation::Create(CreateOp {
        object: ObjectType::Tcb,
        bytes_required: 1 << 11,
        dest,
        size_bits: 11,
    })
}

#[test]
fn kernel_failure_stops_the_run_at_the_failing_op() {
    let tables = support::tables_with_gp(&[20]);
    let mut scratch = Box::new(ScratchPage::new());
    // The second kernel call (ordinal 1) backs plan op 1.
    let mut kernel = SimKernel::failing_at(1, SysError::NotEnoughMemory);
    let mut executor = Executor::new(&mut kernel, tables, support::layout(), &mut scratch);

    let ops = [
        create(0),
        create(1),
        CapOperation::TcbStart(TcbStartOp { tcb: 0 }),
    ];
    let plan = Plan {
        operations: &ops,
        slots_required: 3,
        bytes_required: 2 << 11,
    };
    let err = executor.run(&plan).unwrap_err();
    assert_eq!(
        err,
        BootstrapError::Kernel {
            op_index: 1,
            error: SysError::NotEnoughMemory,
        }
    );
    drop(executor);

    // Nothing past the failing operation reached the kernel.
    assert_eq!(kernel.calls().len(), 2);
    assert!(!kernel
        .calls()
        .iter()
        .any(|call| matches!(call, KernelCall::TcbResume { .. })));
}

#[test]
fn defective_map_level_halts_before_any_kernel_call() {
    let tables = support::tables_with_gp(&[20]);
    let mut scratch = Box::new(ScratchPage::new());
    let mut kernel = SimKernel::new();
    let mut executor = Executor::new(&mut kernel, tables, support::layout(), &mut scratch);

    let ops = [
        CapOperation::Map(MapOp {
            func: MapFunc::MapStructure { level: 9 },
            vaddr: 0x40_0000,
            service: 0,
            vspace: 1,
        }),
        CapOperation::TcbStart(TcbStartOp { tcb: 0 }),
    ];
    let plan = Plan {
        operations: &ops,
        slots_required: 2,
        bytes_required: 0,
    };
    let err = executor.run(&plan).unwrap_err();
    assert_eq!(
        err,
        BootstrapError::BuggyPlan {
            op_index: 0,
            defect: PlanDefect::InvalidMapLevel { level: 9 },
        }
    );
    drop(executor);
    assert!(kernel.calls().is_empty());
}

#[test]
fn oversubscribed_plan_is_rejected_up_front() {
    let mut tables = support::tables_with_gp(&[20]);
    tables.num_empty_slots = 4;
    let mut scratch = Box::new(ScratchPage::new());
    let mut kernel = SimKernel::new();
    let mut executor = Executor::new(&mut kernel, tables, support::layout(), &mut scratch);

    let ops = [create(0)];
    let plan = Plan {
        operations: &ops,
        slots_required: 5,
        bytes_required: 1 << 11,
    };
    let err = executor.run(&plan).unwrap_err();
    assert_eq!(
        err,
        BootstrapError::PlanOversubscribed {
            required: 5,
            available: 4,
        }
    );
    drop(executor);
    assert!(kernel.calls().is_empty());
}

#[test]
fn cnode_creation_is_a_create_followed_by_a_guarded_mutate() {
    let tables = support::tables_with_gp(&[20]);
    let mut scratch = Box::new(ScratchPage::new());
    let mut kernel = SimKernel::new();
    let mut executor = Executor::new(&mut kernel, tables, support::layout(), &mut scratch);

    let guard = 0x3f;
    let ops = [
        CapOperation::Create(CreateOp {
            object: ObjectType::CNode,
            bytes_required: 1 << 13,
            dest: 0,
            size_bits: 8,
        }),
        CapOperation::Mutate(MutateOp {
            guard,
            src: 0,
            dest: 2,
        }),
    ];
    let plan = Plan {
        operations: &ops,
        slots_required: 3,
        bytes_required: 1 << 13,
    };
    executor.run(&plan).unwrap();
    drop(executor);

    assert_eq!(
        kernel.calls(),
        &[
            KernelCall::UntypedRetype {
                service: support::UNTYPED_BASE,
                object: ObjectType::CNode,
                size_bits: 8,
                root: INIT_THREAD_CNODE,
                node_index: 0,
                node_depth: 0,
                node_offset: support::slot(0),
            },
            KernelCall::CnodeMutate {
                dest_root: INIT_THREAD_CNODE,
                dest_index: support::slot(2),
                dest_depth: WORD_BITS as u8,
                src_root: INIT_THREAD_CNODE,
                src_index: support::slot(0),
                src_depth: WORD_BITS as u8,
                guard,
            },
        ]
    );
}
