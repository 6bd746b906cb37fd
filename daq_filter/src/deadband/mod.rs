pub mod manager;
pub mod scheduler;
