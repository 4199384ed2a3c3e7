pub mod encoder;
pub mod payload;
pub mod registry;
pub mod trampoline;
pub mod runner;
pub mod report;
pub mod bus;
pub mod cpu;
pub mod emulated;
pub mod io;
pub mod config;
pub mod error;
