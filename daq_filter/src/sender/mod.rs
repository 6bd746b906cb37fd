pub mod dispatcher;
pub mod sinks;
