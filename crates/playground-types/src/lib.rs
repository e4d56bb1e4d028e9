pub mod api;
pub mod artifact;
pub mod models;
