//! Grace-window access control: the rate limiter, the deferred re-block
//! scheduler and the controller that ties them to the hosts store.

mod controller;
mod policy;
mod rate_limiter;
mod scheduler;

pub use controller::AccessController;
pub use policy::GracePolicy;
pub use rate_limiter::{ActivationWindow, RateLimiter, WindowStatus};
pub use scheduler::ReblockScheduler;
