// Author: Lukas Bower
#![allow(dead_code)]

use core::fmt::Write;

use heapless::String as HeaplessString;
use log::{Level, LevelFilter, Log, Metadata, Record};
use spin::Once;

use crate::sel4;

const MAX_LINE: usize = 192;

struct DebugConsoleLogger;

impl DebugConsoleLogger {
    fn emit(&self, bytes: &[u8]) {
        for &byte in bytes {
            sel4::debug_put_char(byte);
        }
        // The kernel debug console expects CRLF for neat QEMU output.
        sel4::debug_put_char(b'\r');
        sel4::debug_put_char(b'\n');
    }
}

impl Log for DebugConsoleLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut line: HeaplessString<MAX_LINE> = HeaplessString::new();
        let _ = write!(
            line,
            "[{level} {target}] {message}",
            level = record.level(),
            target = record.target(),
            message = record.args(),
        );
        self.emit(line.as_bytes());
    }

    fn flush(&self) {}
}

static LOGGER: DebugConsoleLogger = DebugConsoleLogger;
static LOGGER_INSTALL: Once<()> = Once::new();

/// Routes the `log` facade to the kernel debug console.
///
/// Safe to call more than once; later calls are no-ops. On the host the
/// call succeeds but bytes go nowhere, which lets the simulation reuse the
/// same code paths.
pub fn init() {
    LOGGER_INSTALL.call_once(|| {
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(LevelFilter::Info);
    });
}

/// Writes a line straight to the debug console, bypassing the `log`
/// facade. The panic path uses this so a poisoned logger cannot swallow
/// the last words.
pub fn force_line(line: &str) {
    LOGGER.emit(line.as_bytes());
}
