// Author: Lukas Bower

//! Environment-strip handoff pointers.
//!
//! The plan generator writes `key=<decimal-address>` strings into each
//! child's environment strip; children call the lookups below to recover
//! the pointers. Matching is strict: a key counts only when immediately
//! followed by `=`, and the whole value must parse as a decimal address.

use crate::Word;

/// Key for the child-side virtual address of its IPC buffer frame.
pub const ENV_IPC_BUFFER: &str = "ipc_buffer";
/// Key for the general-purpose memory descriptor page.
pub const ENV_GP_MEMORY_INFO: &str = "gp_memory_info";
/// Key for the device memory descriptor page.
pub const ENV_DEVICE_MEMORY_INFO: &str = "device_memory_info";
/// Key for the system descriptor page.
pub const ENV_SYSTEM_INFO: &str = "system_info";

/// Returns the raw value of `key` in the strip, if present.
///
/// `foobar=1` never matches a lookup for `foo`; the character after the
/// key must be `=`.
pub fn lookup_str<'a, I>(env: I, key: &str) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    env.into_iter().find_map(|entry| {
        let rest = entry.strip_prefix(key)?;
        rest.strip_prefix('=')
    })
}

/// Returns the decimal address stored under `key`, if present and valid.
///
/// Parsing consumes the entire value; a trailing non-digit or an empty
/// value makes the entry invisible rather than half-parsed.
pub fn lookup_addr<'a, I>(env: I, key: &str) -> Option<Word>
where
    I: IntoIterator<Item = &'a str>,
{
    parse_decimal(lookup_str(env, key)?)
}

/// Child-side virtual address of the IPC buffer frame.
pub fn ipc_buffer_addr<'a, I>(env: I) -> Option<Word>
where
    I: IntoIterator<Item = &'a str>,
{
    lookup_addr(env, ENV_IPC_BUFFER)
}

/// Child-side virtual address of the general-purpose memory descriptor.
pub fn gp_memory_info_addr<'a, I>(env: I) -> Option<Word>
where
    I: IntoIterator<Item = &'a str>,
{
    lookup_addr(env, ENV_GP_MEMORY_INFO)
}

/// Child-side virtual address of the device memory descriptor.
pub fn device_memory_info_addr<'a, I>(env: I) -> Option<Word>
where
    I: IntoIterator<Item = &'a str>,
{
    lookup_addr(env, ENV_DEVICE_MEMORY_INFO)
}

/// Child-side virtual address of the system descriptor.
pub fn system_info_addr<'a, I>(env: I) -> Option<Word>
where
    I: IntoIterator<Item = &'a str>,
{
    lookup_addr(env, ENV_SYSTEM_INFO)
}

/// Formats one strip entry the way the generator emits it.
pub fn write_entry<W: core::fmt::Write>(
    out: &mut W,
    key: &str,
    addr: Word,
) -> core::fmt::Result {
    write!(out, "{key}={addr}")
}

fn parse_decimal(value: &str) -> Option<Word> {
    if value.is_empty() {
        return None;
    }
    let mut accumulator: Word = 0;
    for byte in value.bytes() {
        let digit = (byte as char).to_digit(10)? as Word;
        accumulator = accumulator.checked_mul(10)?.checked_add(digit)?;
    }
    Some(accumulator)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STRIP: &[&str] = &[
        "PATH=/bin",
        "ipc_buffer=28672",
        "gp_memory_info=1073741824",
        "ipc_bufferx=17",
    ];

    #[test]
    fn lookup_requires_exact_key_before_equals() {
        assert_eq!(lookup_addr(STRIP.iter().copied(), "ipc_buffer"), Some(28672));
        assert_eq!(lookup_addr(STRIP.iter().copied(), "ipc_buf"), None);
    }

    #[test]
    fn lookup_rejects_partial_parses() {
        let strip = ["system_info=123abc", "device_memory_info="];
        assert_eq!(system_info_addr(strip.iter().copied()), None);
        assert_eq!(device_memory_info_addr(strip.iter().copied()), None);
    }

    #[test]
    fn lookup_rejects_overflowing_values() {
        let strip = ["ipc_buffer=999999999999999999999999999999"];
        assert_eq!(ipc_buffer_addr(strip.iter().copied()), None);
    }
}
