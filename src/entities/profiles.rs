use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "profiles")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Identity id once an account exists for this payer.
    #[sea_orm(unique)]
    pub user_id: Option<String>,

    #[sea_orm(unique)]
    pub email: String,

    /// `None` means open-ended access.
    pub expires_at: Option<DateTimeUtc>,

    pub disabled: bool,

    pub stripe_customer_id: Option<String>,

    pub created_at: DateTimeUtc,

    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
