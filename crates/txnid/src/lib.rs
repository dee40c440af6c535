#![doc = include_str!("../README.md")]

mod error;
mod generator;
mod progress;

pub use crate::error::*;
pub use crate::generator::*;
pub use crate::progress::*;
