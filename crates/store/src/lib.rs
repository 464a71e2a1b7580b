pub mod connection;
pub mod error;
pub mod gifts;
pub mod indexes;
pub mod keys;
pub mod rate_limit;
pub mod revocation;
pub mod rooms;
pub mod seats;

pub use connection::connect;
pub use error::{StoreError, StoreResult};
