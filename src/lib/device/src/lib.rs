#![cfg_attr(not(test), no_std)]

mod error;
mod regmap;

pub use self::{
    error::{Error, ErrorKind, ErrorType},
    regmap::{check_offset, Regmap},
};
