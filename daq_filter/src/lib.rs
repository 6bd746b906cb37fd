//! Update filtering and rate control for the DAQ sender.
//!
//! A raw value for a tag flows through [`sender::dispatcher::UpdateDispatcher`], which
//! validates it ([`filter::quality`]), applies the ordering ladder and value deadband
//! ([`filter::ladder`], [`filter::value`]), and either forwards it, suppresses it, or
//! defers it into a per-tag [`deadband::scheduler::TimeDeadbandScheduler`].

pub mod config;
pub mod deadband;
pub mod dynamic;
pub mod error;
pub mod filter;
pub mod logging;
pub mod sender;
pub mod tags;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the guard if a previous holder panicked.
/// Everything guarded in this crate is plain data that stays consistent between statements.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
