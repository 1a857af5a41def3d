pub mod config;
pub mod error;
pub mod ids;
pub mod ipc;
pub mod types;

pub use config::{Config, ConfigPaths};
pub use error::GraceGuardError;
pub use ids::ReblockId;
pub use ipc::{GraceGuardRequest, GraceGuardResponse};
pub use types::{AccessStatus, ActivationOutcome, ReblockTicket};
