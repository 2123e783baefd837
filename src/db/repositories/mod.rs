pub mod login_link;
pub mod profile;
pub mod signup_token;
pub mod user;
pub mod webhook_event;
