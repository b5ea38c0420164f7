pub mod auth;

pub use auth::{AdminUser, AuthKeys, AuthUser, Claims, StaffUser};
