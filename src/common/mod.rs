//! Common utilities and types shared across hubkv

pub mod config;
pub mod error;
pub mod utils;

pub use config::{Config, HubConfig};
pub use error::{Error, Result};
pub use utils::{
    decode_key, encode_key, parse_duration, timestamp_now_millis, validate_key, NodeStatus,
};
