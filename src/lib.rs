pub mod browse;
pub mod config;
pub mod db;
pub mod debounce;
pub mod model;
pub mod render;
pub mod session;
pub mod source;
pub mod stats;
pub mod store;
pub mod supabase;
pub mod sync;
