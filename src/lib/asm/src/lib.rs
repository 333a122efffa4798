#![cfg_attr(not(test), no_std)]

pub mod io;

pub use io::{mb, readl, writel};
