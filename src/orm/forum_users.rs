use sea_orm::entity::prelude::*;

/// Denormalized membership: users who opened a thread or posted in a forum.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "forum_users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub forum: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub nickname: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::forums::Entity",
        from = "Column::Forum",
        to = "super::forums::Column::Slug",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Forums,
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::Nickname",
        to = "super::users::Column::Nickname",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Users,
}

impl Related<super::forums::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Forums.def()
    }
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
