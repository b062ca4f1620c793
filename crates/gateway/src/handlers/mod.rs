//! API handlers module

pub mod conversations;
pub mod health;
pub mod passage;
pub mod replay;
pub mod search;
