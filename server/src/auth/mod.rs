//! Operator authentication.

mod middleware;

pub use middleware::AdminUser;
