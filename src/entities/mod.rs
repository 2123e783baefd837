pub mod prelude;

pub mod login_links;
pub mod profiles;
pub mod signup_tokens;
pub mod users;
pub mod webhook_events;
