//! UserOperation assembly

mod builder;
mod nonce;

pub use builder::{apply_gas, apply_sponsorship, execute_call_data, UserOpBuilder};
pub use nonce::{fetch_nonce, random_nonce_key};
