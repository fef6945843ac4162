//! Movie catalog and recommendation backend.
//!
//! The HTTP layer in [`routes`] sits on three services: the catalog read side,
//! user interactions, and the recommendation pipeline. Recommendations run
//! four scoring strategies concurrently, merge them with a weighted hybrid
//! combiner and cache the result per user.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
#[cfg(test)]
pub(crate) mod test_support;
