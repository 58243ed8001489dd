mod cli;
pub mod error;
mod init;
pub mod loader;
pub mod printer;

pub use cli::*;
