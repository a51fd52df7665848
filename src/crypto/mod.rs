//! Random state nonces and PKCE helpers.

mod engine;

pub use engine::{challenge_for, random_token, Pkce};
