// BlindMatch participant client

pub mod client;
pub mod core;
