// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Defines tests for root-task minimal child construction.
// Author: Lukas Bower

#[path = "support.rs"]
mod support;

use root_task::exec::Executor;
use root_task::handoff::ScratchPage;
use root_task::host::{KernelCall, SimKernel};
use root_task::plan::{
    CapOperation, CreateOp, MapFrameOp, MapFunc, MapOp, Plan, TcbSetupOp, TcbStartOp,
};
use root_task::sel4::{ObjectType, INIT_THREAD_ASID_POOL};

const IPC_VADDR: usize = 0x7000;
const ENTRY: usize = 0x1000;
const STACK_POINTER: usize = 0x2000;

fn minimal_plan() -> [CapOperation; 8] {
    [
        CapOperation::Create(CreateOp {
            object: ObjectType::Tcb,
            bytes_required: 1 << 11,
            dest: 0,
            size_bits: 11,
        }),
        CapOperation::Create(CreateOp {
            object: ObjectType::CNode,
            bytes_required: 1 << 13,
            dest: 1,
            size_bits: 8,
        }),
        CapOperation::Create(CreateOp {
            object: ObjectType::VSpace,
            bytes_required: 1 << 12,
            dest: 2,
            size_bits: 12,
        }),
        CapOperation::Map(MapOp {
            func: MapFunc::AssignAsid,
            vaddr: 0,
            service: 2,
            vspace: 2,
        }),
        CapOperation::Create(CreateOp {
            object: ObjectType::Frame,
            bytes_required: 1 << 12,
            dest: 3,
            size_bits: 12,
        }),
        CapOperation::MapFrame(MapFrameOp {
            vaddr: IPC_VADDR,
            frame: 3,
            vspace: 2,
        }),
        CapOperation::TcbSetup(TcbSetupOp {
            entry_addr: ENTRY,
            stack_pointer_addr: STACK_POINTER,
            ipc_buffer_addr: IPC_VADDR,
            arg0: 7,
            arg1: 8,
            arg2: 9,
            cspace: 1,
            vspace: 2,
            ipc_buffer: 3,
            tcb: 0,
        }),
        CapOperation::TcbStart(TcbStartOp { tcb: 0 }),
    ]
}

#[test]
fn minimal_child_comes_up_configured_and_running() {
    let tables = support::tables_with_gp(&[20]);
    let mut scratch = Box::new(ScratchPage::new());
    let mut kernel = SimKernel::new();
    let mut executor = Executor::new(&mut kernel, tables, support::layout(), &mut scratch);

    let ops = minimal_plan();
    let plan = Plan {
        operations: &ops,
        slots_required: 4,
        bytes_required: (1 << 11) + (1 << 13) + (1 << 12) + (1 << 12),
    };
    executor.run(&plan).unwrap();
    drop(executor);

    let calls = kernel.calls();

    assert!(calls.contains(&KernelCall::AsidPoolAssign {
        pool: INIT_THREAD_ASID_POOL,
        vspace: support::slot(2),
    }));
    assert!(calls.iter().any(|call| matches!(
        call,
        KernelCall::PageMap {
            frame,
            vspace,
            vaddr: IPC_VADDR,
            ..
        } if *frame == support::slot(3) && *vspace == support::slot(2)
    )));
    assert!(calls.contains(&KernelCall::TcbConfigure {
        tcb: support::slot(0),
        cspace_root: support::slot(1),
        vspace_root: support::slot(2),
        ipc_buffer_addr: IPC_VADDR,
        ipc_buffer_frame: support::slot(3),
    }));

    // Registers were read, seeded, and written back before the resume.
    let write_index = calls
        .iter()
        .position(|call| matches!(call, KernelCall::TcbWriteRegisters { .. }))
        .expect("registers must be written");
    assert!(matches!(
        calls[write_index - 1],
        KernelCall::TcbReadRegisters { tcb } if tcb == support::slot(0)
    ));
    assert_eq!(
        calls[write_index],
        KernelCall::TcbWriteRegisters {
            tcb: support::slot(0),
            entry: ENTRY,
            stack_pointer: STACK_POINTER,
            args: [7, 8, 9],
        }
    );

    // The resume is the terminal call.
    assert_eq!(
        calls.last(),
        Some(&KernelCall::TcbResume {
            tcb: support::slot(0),
        })
    );

    let context = kernel.context(support::slot(0)).expect("context stored");
    assert_eq!(context.entry_point(), ENTRY);
    assert_eq!(context.stack_pointer(), STACK_POINTER);
    assert_eq!(context.args(), [7, 8, 9]);
}

#[test]
fn environment_strip_round_trips_the_ipc_buffer_pointer() {
    // The generator writes the same address the plan mapped the buffer
    // at; the child-side lookup must recover it exactly.
    let mut entry = String::new();
    mainspring_abi::env::write_entry(&mut entry, mainspring_abi::ENV_IPC_BUFFER, IPC_VADDR)
        .unwrap();
    assert_eq!(entry, format!("ipc_buffer={IPC_VADDR}"));

    let strip = [entry.as_str(), "unrelated=42"];
    assert_eq!(
        mainspring_abi::env::ipc_buffer_addr(strip.iter().copied()),
        Some(IPC_VADDR)
    );
}
