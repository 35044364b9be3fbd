pub mod cache;
pub mod ip_filter;
pub mod rate_limit;
pub mod redirect;
pub mod security;
pub mod trace;

pub use cache::*;
pub use ip_filter::*;
pub use rate_limit::*;
pub use redirect::*;
pub use security::*;
pub use trace::*;
