pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod orm;
pub mod pagination;
pub mod path;
pub mod post;
pub mod registrar;
pub mod repository;
pub mod service;
pub mod store;
pub mod vote;
pub mod web;

pub use error::{Error, Result};
pub use repository::Repository;
pub use service::ForumService;
