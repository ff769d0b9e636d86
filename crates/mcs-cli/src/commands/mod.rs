//! One module per subcommand, each a thin wrapper around
//! [`mcs_core::lifecycle::LifecycleManager`].

pub mod config;
pub mod create;
pub mod exec;
pub mod info;
pub mod list;
pub mod rebuild;
pub mod remove;
pub mod restart;
pub mod start;
pub mod stop;
