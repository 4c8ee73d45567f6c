#![no_std]

extern crate alloc;

pub use cell::*;
pub use error::*;
pub use knowledge::*;
pub use types::*;

pub use analysis::{
    choose_action, infer, risk, Action, Deduction, RiskConfig, SamplerConfig,
};

pub mod analysis;
mod cell;
mod error;
mod knowledge;
mod types;
