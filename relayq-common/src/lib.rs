pub mod config;
pub mod logging;
pub mod shutdown;

pub use shutdown::Shutdown;
pub use tracing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
}
