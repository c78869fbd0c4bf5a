pub mod kv;
pub mod seed;
pub mod store;
