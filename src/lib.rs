pub mod commands;
pub mod config;
pub mod errors;
pub mod image_processor;
pub mod security;
pub mod uploader;
