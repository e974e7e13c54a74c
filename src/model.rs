//! Records stored in the database and the JSON shapes exchanged with the frontend.

pub mod annotation;
pub mod assignment;
pub mod request;
pub mod response_object;
pub mod stats;
pub mod submission;
pub mod user;
