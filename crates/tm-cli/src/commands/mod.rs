//! Command implementations

pub(crate) mod common;
pub mod down;
pub mod new;
pub mod repair;
pub mod status;
pub mod unlock;
pub mod up;
