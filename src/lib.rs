#![cfg_attr(not(test), no_std)]
#![cfg_attr(feature = "strict", deny(warnings))]

extern crate alloc;

pub(crate) mod commands;
pub mod adapter;
pub mod config;
pub mod error;
pub mod frame;
pub mod responses;
pub mod stack;
pub mod status;
pub mod wifi;

#[cfg(feature = "examples")]
pub mod example;

#[cfg(test)]
mod tests;
