pub use super::login_links::Entity as LoginLinks;
pub use super::profiles::Entity as Profiles;
pub use super::signup_tokens::Entity as SignupTokens;
pub use super::users::Entity as Users;
pub use super::webhook_events::Entity as WebhookEvents;
