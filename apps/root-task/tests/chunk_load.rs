// Author: Lukas Bower
//! Tests for donating root-image frames to a child address space.

#[path = "support.rs"]
mod support;

use root_task::exec::{BootstrapError, Executor, PlanDefect};
use root_task::handoff::ScratchPage;
use root_task::host::{KernelCall, SimKernel};
use root_task::plan::{BinaryChunkLoadOp, CapOperation, Plan};
use root_task::sel4::{CapRights, PAGE_BYTES};

fn run_chunk_load(op: BinaryChunkLoadOp) -> (Result<(), BootstrapError>, SimKernel) {
    let tables = support::tables_with_gp(&[20]);
    let mut scratch = Box::new(ScratchPage::new());
    let mut kernel = SimKernel::new();
    let mut executor = Executor::new(&mut kernel, tables, support::layout(), &mut scratch);

    let ops = [CapOperation::BinaryChunkLoad(op)];
    let plan = Plan {
        operations: &ops,
        slots_required: 1,
        bytes_required: 0,
    };
    let result = executor.run(&plan);
    drop(executor);
    (result, kernel)
}

#[test]
fn each_page_is_unmapped_from_root_then_mapped_into_the_child() {
    let dest_vaddr = 0x20_0000;
    let (result, kernel) = run_chunk_load(BinaryChunkLoadOp {
        src_vaddr: support::LOWEST_VADDR + 4 * PAGE_BYTES,
        dest_vaddr,
        length: 4 * PAGE_BYTES,
        dest_vspace: 3,
    });
    result.unwrap();

    // Frames resolve by image-relative page index; each one migrates with
    // an unmap-then-map pair, in address order.
    let first_frame = support::IMAGE_FRAMES.start + 4;
    let mut expected = Vec::new();
    for page in 0..4 {
        expected.push(KernelCall::PageUnmap {
            frame: first_frame + page,
        });
        expected.push(KernelCall::PageMap {
            frame: first_frame + page,
            vspace: support::slot(3),
            vaddr: dest_vaddr + page * PAGE_BYTES,
            rights: CapRights::READ_WRITE,
        });
    }
    assert_eq!(kernel.calls(), expected.as_slice());
}

#[test]
fn partial_trailing_page_still_migrates() {
    let (result, kernel) = run_chunk_load(BinaryChunkLoadOp {
        src_vaddr: support::LOWEST_VADDR,
        dest_vaddr: 0x20_0000,
        length: PAGE_BYTES + 1,
        dest_vspace: 3,
    });
    result.unwrap();
    // Two pages: the full one and the one covering the trailing byte.
    assert_eq!(kernel.calls().len(), 4);
}

#[test]
fn chunk_below_the_image_base_is_a_plan_defect() {
    let (result, kernel) = run_chunk_load(BinaryChunkLoadOp {
        src_vaddr: support::LOWEST_VADDR - PAGE_BYTES,
        dest_vaddr: 0x20_0000,
        length: PAGE_BYTES,
        dest_vspace: 3,
    });
    assert_eq!(
        result.unwrap_err(),
        BootstrapError::BuggyPlan {
            op_index: 0,
            defect: PlanDefect::ChunkBelowImageBase {
                src_vaddr: support::LOWEST_VADDR - PAGE_BYTES,
                lowest_vaddr: support::LOWEST_VADDR,
            },
        }
    );
    assert!(kernel.calls().is_empty());
}

#[test]
fn chunk_past_the_image_window_is_a_plan_defect() {
    let window_pages = support::IMAGE_FRAMES.end - support::IMAGE_FRAMES.start;
    let (result, kernel) = run_chunk_load(BinaryChunkLoadOp {
        src_vaddr: support::LOWEST_VADDR + (window_pages - 1) * PAGE_BYTES,
        dest_vaddr: 0x20_0000,
        length: 2 * PAGE_BYTES,
        dest_vspace: 3,
    });
    assert!(matches!(
        result.unwrap_err(),
        BootstrapError::BuggyPlan {
            op_index: 0,
            defect: PlanDefect::ChunkOutsideImage { .. },
        }
    ));
    assert!(kernel.calls().is_empty());
}

#[test]
fn zero_length_chunk_is_a_plan_defect() {
    let (result, kernel) = run_chunk_load(BinaryChunkLoadOp {
        src_vaddr: support::LOWEST_VADDR,
        dest_vaddr: 0x20_0000,
        length: 0,
        dest_vspace: 3,
    });
    assert_eq!(
        result.unwrap_err(),
        BootstrapError::BuggyPlan {
            op_index: 0,
            defect: PlanDefect::EmptyChunk,
        }
    );
    assert!(kernel.calls().is_empty());
}
