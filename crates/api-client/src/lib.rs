pub mod client;

pub use client::ApiClient;
pub use gatehouse_api;
