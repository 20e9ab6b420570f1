//! Log-in, sessions, users and the two roles (administrator and member).

mod cookie;
mod log_in;
mod log_out;
mod middleware;
mod password;
mod register_user;
mod token;
mod user;

pub use cookie::{DEFAULT_COOKIE_DURATION, invalidate_auth_cookie, set_auth_cookie};
pub use log_in::post_log_in;
pub use log_out::get_log_out;
pub use middleware::{AdminUser, AuthState, UserState, auth_guard};
pub use password::{PasswordHash, ValidatedPassword};
pub use register_user::{create_user_endpoint, list_users_endpoint};
pub(crate) use token::Token;
pub use user::{
    NewUser, Role, User, UserID, UserView, bootstrap_admin, create_user, create_user_table,
    get_user_by_email, get_user_by_id,
};

#[cfg(test)]
pub(crate) use cookie::COOKIE_TOKEN;
