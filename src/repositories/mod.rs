pub mod contest_progress;
pub mod kv;
pub mod progress;
pub mod redis_kv;
