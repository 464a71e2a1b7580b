pub mod auth;
pub mod autoclose;
pub mod backend;
pub mod events;
pub mod gifts;
pub mod media;
pub mod metrics;
pub mod relay;
pub mod roles;
pub mod seats;
pub mod sink;

pub use auth::{AuthError, AuthGate, Identity};
pub use backend::{BackendClient, BackendError, Role};
pub use roles::RoleCache;
pub use sink::{Broadcaster, EventSink, RelayPublisher};
