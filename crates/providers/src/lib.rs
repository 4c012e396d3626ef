//! Model access implementations for Stepwise.
//!
//! All providers implement the `stepwise_core::Provider` trait. HTTP model
//! clients are out of scope for this workspace; the replay provider serves
//! recorded replies so sessions can be reproduced offline.

pub mod replay;

pub use replay::ReplayProvider;
