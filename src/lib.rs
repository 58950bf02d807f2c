#![doc = "The `taskboard` library crate."]
#![doc = ""]
#![doc = "Task and user management over HTTP: domain models, validators, the error"]
#![doc = "taxonomy with its classifier and responder, persistence backends, GitHub"]
#![doc = "login and routing. The binary (`main.rs`) wires these into a server."]

pub mod auth;
pub mod classify;
pub mod config;
pub mod error;
pub mod models;
pub mod responder;
pub mod response;
pub mod routes;
pub mod state;
pub mod store;
pub mod validation;

pub use crate::error::AppError;
pub use crate::state::AppState;
