//! `console.log` / `console.error`: script log lines.

use std::sync::Arc;

use rhai::Dynamic;
use taskforge_core::script::host::{arg_to_string, HostFunc};

/// Stringify and concatenate the call arguments. A space is inserted only
/// between two adjacent non-string operands, so
/// `console.log("value:", 42)` prints `value:42` while
/// `console.log(1, 2)` prints `1 2`.
fn render(args: &[&mut Dynamic]) -> String {
    let mut output = String::new();
    let mut prev_was_string = false;
    for (i, arg) in args.iter().enumerate() {
        let is_string = arg.is_string();
        if i > 0 && !is_string && !prev_was_string {
            output.push(' ');
        }
        output.push_str(&arg_to_string(arg));
        prev_was_string = is_string;
    }
    output
}

pub fn log() -> HostFunc {
    Arc::new(|_ctx, args| {
        tracing::info!(target: "script", "[SCRIPT] {}", render(args));
        Ok(Dynamic::UNIT)
    })
}

pub fn error() -> HostFunc {
    Arc::new(|_ctx, args| {
        tracing::error!(target: "script", "[SCRIPT ERROR] {}", render(args));
        Ok(Dynamic::UNIT)
    })
}
