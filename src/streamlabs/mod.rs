mod client;
mod models;

pub use client::{StreamlabsClient, DEVICE_PLATFORM, MAX_QUERY_CHARS};
pub use models::{AccountInfo, Category, StreamSession};
