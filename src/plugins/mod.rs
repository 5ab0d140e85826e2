//! Methods registered on top of the core builtins

pub mod bloblang;

use crate::query::MethodEntry;

/// Every plugin method, in registration order
pub fn methods() -> Vec<MethodEntry> {
    vec![bloblang::bloblang_method()]
}
