//! Data shared between the minefield engine, the server and its clients.

pub mod models;
pub mod protocol;
