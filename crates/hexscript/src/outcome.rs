//! Command outcomes as printed and returned by the CLI.
//!
//! Raw results are 32-bit but process exit statuses keep only the low byte,
//! so the loader's result codes get their own exit statuses:
//!
//! | result                   | exit status |
//! |--------------------------|-------------|
//! | `0`                      | 0           |
//! | `1..=63` (script values) | same        |
//! | `GenericError`           | 70          |
//! | `MethodNotFound`         | 71          |
//! | `LoaderError`            | 72          |
//! | `InvalidCommand`         | 73          |
//! | anything else            | 64          |

use hexscript_runtime::ResultCode;

pub const EXIT_OUT_OF_RANGE: u8 = 64;

pub fn exit_status(result: i32) -> u8 {
    match ResultCode::from_i32(result) {
        Some(ResultCode::Success) => 0,
        Some(ResultCode::GenericError) => 70,
        Some(ResultCode::MethodNotFound) => 71,
        Some(ResultCode::LoaderError) => 72,
        Some(ResultCode::InvalidCommand) => 73,
        None => match u8::try_from(result) {
            Ok(status @ 1..=63) => status,
            _ => EXIT_OUT_OF_RANGE,
        },
    }
}

/// Full result for stdout, e.g. `MethodNotFound (0x10000002)` or `0x0000002a`.
pub fn describe(result: i32) -> String {
    match ResultCode::from_i32(result) {
        Some(code) => code.to_string(),
        None => format!("{:#010x}", result),
    }
}
