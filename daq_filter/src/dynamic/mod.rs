pub mod activator;
