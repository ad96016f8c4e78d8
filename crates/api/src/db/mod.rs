//! Schema, migrations and sea-query builders for the relational user store.

pub mod invite_codes;
pub mod migrations;
pub mod tables;
pub mod users;

pub use tables::*;

pub type Built = (String, sea_query::Values);
