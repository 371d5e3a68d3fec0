mod call;
mod receipt;
pub(crate) mod serde_helpers;
mod user_operation;

// Re-export all types
pub use call::*;
pub use receipt::*;
pub use user_operation::*;

pub(crate) use call::display_value;
pub use serde_helpers::{fmt_hex_quantity, parse_u256};
