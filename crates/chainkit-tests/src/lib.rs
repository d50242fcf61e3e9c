//! Scenario tests that drive real chain plugins through the wallet engine.
//!
//! Backends are scripted in memory (see [`helpers`]); nothing here touches
//! the network.

pub mod helpers;
