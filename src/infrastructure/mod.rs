pub mod config;
pub mod error;
pub mod feedback;
pub mod http_document_store;
pub mod local_store;
pub mod remote_store;
pub mod storage;
