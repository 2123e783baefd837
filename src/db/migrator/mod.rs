use sea_orm_migration::prelude::*;

mod m20260301_add_profiles;
mod m20260301_add_users;
mod m20260302_add_signup_tokens;
mod m20260305_add_login_links;
mod m20260310_add_webhook_events;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_add_users::Migration),
            Box::new(m20260301_add_profiles::Migration),
            Box::new(m20260302_add_signup_tokens::Migration),
            Box::new(m20260305_add_login_links::Migration),
            Box::new(m20260310_add_webhook_events::Migration),
        ]
    }
}
