//! HTTP API for the registrar service.

pub mod admin;
pub mod audit;
pub mod auth;
pub mod courses;
pub mod enrollments;
pub mod error;
pub mod invoices;
pub mod middleware;
pub mod routes;
pub mod status;
pub mod students;
pub mod waitlist;

pub use routes::*;
