#![doc = include_str!("../README.md")]

mod config;
mod dispatch;
mod error;
mod pool;
mod promise;

pub use crate::config::*;
pub use crate::dispatch::*;
pub use crate::error::*;
pub use crate::pool::*;
pub use crate::promise::*;
