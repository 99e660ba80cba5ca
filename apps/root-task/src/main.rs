// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Defines the root-task binary entrypoint.
// Author: Lukas Bower
#![cfg_attr(all(feature = "kernel", target_os = "none"), no_std)]
#![cfg_attr(all(feature = "kernel", target_os = "none"), no_main)]
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![doc = "Root task entry points for host and kernel builds."]

#[cfg(all(target_os = "none", not(feature = "kernel")))]
compile_error!("enable the `kernel` feature when building root-task for bare-metal targets");

// The kernel build's `_start` trampoline and `kernel_start` live in the
// library; linking it is all the binary has to do.
#[cfg(all(feature = "kernel", target_os = "none"))]
use root_task as _;

#[cfg(all(not(feature = "kernel"), not(target_os = "none")))]
fn main() -> anyhow::Result<()> {
    root_task::host::main()
}

#[cfg(all(feature = "kernel", not(target_os = "none")))]
fn main() {
    // The kernel feature only produces a runnable image on bare metal;
    // host runs use the default simulation build.
    eprintln!("root-task was built with the `kernel` feature; run the default build on the host");
    std::process::exit(2);
}
