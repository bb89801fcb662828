#[macro_use]
mod macros;

pub mod browser;
pub mod config;
pub mod portal;
pub mod prompt;
pub mod roster;
pub mod run;
