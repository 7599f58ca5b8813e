pub mod command;
pub mod toolchain;
