// Adapters layer: concrete implementations of the domain ports (http, local files).

pub mod http;
pub mod storage;
