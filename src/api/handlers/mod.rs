pub mod posts;
pub mod system;

pub use posts::{create_post, list_posts};
pub use system::{admin, health_check, root, secure};
