pub mod archive;
pub mod config;
pub mod error;
pub mod extensions;
pub mod gate;
pub mod inspector;
pub mod output;
pub mod quota;
pub mod sanitizer;
pub mod shapefile;
pub mod staging;
pub mod upload;
