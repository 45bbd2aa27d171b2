// Infrastructure layer - Storage, configuration, hardware and HTTP adapters
pub mod chunked_json;
pub mod config;
pub mod http_response;
pub mod json_file;
pub mod profile_store;
pub mod record_store;
pub mod simulated_hardware;
