pub mod baseline;
pub mod builder;
pub mod cmd;
pub mod config;
pub mod differ;
pub mod error;
pub mod generator;
pub mod introspect;
pub mod linter;
pub mod migrate;
pub mod restore;
pub mod schema;
pub mod seed;
pub mod seedcheck;
pub mod views;
