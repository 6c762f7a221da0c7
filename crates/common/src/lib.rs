pub mod bootstrap;
pub mod config;
pub mod shutdown;
pub mod wait;

pub use bootstrap::{Environment, setup_logging};
pub use wait::wait_for_resource;
