pub mod room_manager;
pub mod worker_pool;
