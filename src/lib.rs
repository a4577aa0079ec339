use std::error::Error;

pub mod api;
pub mod assets;
pub mod config;
pub mod db;
pub mod error;
pub mod handler;
pub mod loan;
pub mod model;
pub mod routes;

/// Joins an error and its sources into one line for logging.
pub fn unpack_error(err: &(dyn Error)) -> String {
    let mut parts = Vec::new();
    parts.push(err.to_string());
    let mut current = err.source();
    while let Some(source) = current {
        parts.push(source.to_string());
        current = source.source();
    }
    parts.join(": ")
}
