//! Background services — the heartbeat task runs independently of the
//! production loop for the lifetime of the process once the CSC enters
//! control.

pub mod alerts;
pub mod heartbeat;
pub mod persistence;
