//! Token models, validated identity claims, OAuth scopes, and the token chain state machine.

pub mod chain;
pub mod id;
pub mod scope;
pub mod token;

pub use chain::*;
pub use id::*;
pub use scope::*;
pub use token::{oauth::*, secret::*, xbox::*, *};
