mod auth;
mod client;

pub use auth::ApiCreds;
pub use client::HttpClient;
