// Author: Lukas Bower
#![cfg(all(feature = "kernel", target_os = "none"))]

use core::fmt::Write;
use core::panic::PanicInfo;

use heapless::String;

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    let mut line = String::<192>::new();
    let _ = write!(&mut line, "[PANIC] {info}");
    crate::bootstrap::log::force_line(line.as_str());
    crate::kernel::panic_halt()
}
