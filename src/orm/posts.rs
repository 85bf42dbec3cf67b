use sea_orm::entity::prelude::*;

/// Ids are drawn from `posts_id_seq` by the store before insert so the
/// ancestry path can be written in the same statement as the row.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "posts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,
    pub thread: i32,
    pub forum: String,
    pub author: String,
    #[sea_orm(column_type = "Text")]
    pub message: String,
    pub parent: Option<i64>,
    /// Root-to-self ids, `bigint[]`.
    pub path: Vec<i64>,
    /// Always `path[1]`; indexed for parent_tree pages.
    pub root: i64,
    pub created: DateTimeUtc,
    pub is_edited: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::threads::Entity",
        from = "Column::Thread",
        to = "super::threads::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Threads,
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::Author",
        to = "super::users::Column::Nickname",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Users,
}

impl Related<super::threads::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Threads.def()
    }
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for crate::models::Post {
    fn from(post: Model) -> Self {
        Self {
            id: post.id,
            thread: post.thread,
            forum: post.forum,
            author: post.author,
            message: post.message,
            parent: post.parent,
            path: post.path.into(),
            created: post.created,
            is_edited: post.is_edited,
        }
    }
}
