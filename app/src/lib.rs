mod config;
mod frameloop;
mod logger;
mod mesh;
mod program;

#[cfg(test)]
mod testing;

pub use config::*;
pub use frameloop::*;
pub use logger::*;
pub use mesh::*;
pub use program::*;
