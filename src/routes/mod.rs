//! Administrative HTTP route handlers. Session routes live in
//! [`crate::auth::routes`].

pub mod users;
