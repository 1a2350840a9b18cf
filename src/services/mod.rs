//! Business logic services.

pub mod authorizer;
pub mod discord;
pub mod key_store;
pub mod privilege_scheduler;
pub mod sweeper;

pub use authorizer::{Authorizer, AuthorizerError, LogOnlyAuthorizer};
pub use key_store::KeyStore;
pub use privilege_scheduler::PrivilegeScheduler;
pub use sweeper::start_sweeper_task;
