//! A TCP service that accepts length-framed XML documents, classifies each as an
//! INSERT or a SELECT, and maps it onto a derived relational schema (or back out of
//! one) using a document-supplied UUID as primary key.

pub mod config;
pub mod error;
pub mod mapper;
pub mod network;
pub mod queue;
pub mod session;
pub mod store;
pub mod xmltree;

pub use config::Config;
pub use error::{DbError, Result};
