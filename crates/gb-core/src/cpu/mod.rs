#[allow(clippy::module_inception)]
mod cpu;
mod cb_ops;
mod ops;

pub use cpu::{Cpu, Flag, R8};
