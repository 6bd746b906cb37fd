pub mod convert;
pub mod ladder;
pub mod quality;
pub mod value;
