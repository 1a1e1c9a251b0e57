pub mod admin;
pub mod health;
pub mod manifest;
pub mod stream;

pub use admin::{delete_all_cache, delete_cache_entry, list_archive_cookies, seed_archive_cookie, stats};
pub use health::{health, ready};
pub use manifest::manifest;
pub use stream::stream;
