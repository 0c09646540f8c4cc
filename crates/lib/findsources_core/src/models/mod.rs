//! Domain models shared by the stores, the session flow and the API layer.

pub mod auth;
pub mod reference;
