//! Postgres implementation of the repository contract over sea-orm.
//!
//! Driver errors are classified exactly once, in [`classify`], by the name
//! of the violated constraint (see `migrations/schema.sql`).

use crate::error::{Reference, StoreError, UniqueKey};
use crate::models::{
    Forum, NewForum, NewPost, NewThread, NewUser, Post, Status, Thread, ThreadKey, ThreadPatch,
    User, UserPatch, Vote,
};
use crate::orm::{forum_users, forums, posts, threads, users, votes};
use crate::pagination::{Cursor, PostRange, SortMode};
use crate::path::AncestryPath;
use crate::repository::{Repository, StoreResult, ThreadRange, UserRange};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, Func, OnConflict, Query, SimpleExpr};
use sea_orm::{entity::*, query::*};
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DbBackend, DbErr, FromQueryResult, Order,
    PaginatorTrait, SqlErr, Statement, TransactionTrait, Value,
};
use std::collections::{BTreeSet, HashMap};

/// Rows per INSERT statement; keeps a batch under the bind parameter limit.
const INSERT_CHUNK: usize = 1000;

const FOLDED_NICKNAME: &str = r#"lower("users"."nickname") COLLATE "C""#;

/// Extracts the constraint name, the last quoted token of a Postgres
/// violation message.
fn constraint_name(message: &str) -> Option<&str> {
    message.rsplit('"').nth(1)
}

fn constraint_error(name: &str) -> Option<StoreError> {
    use StoreError::{ReferenceViolation, UniqueViolation};

    Some(match name {
        "users_pkey" | "users_nickname_lower_key" => UniqueViolation(UniqueKey::Nickname),
        "users_email_lower_key" => UniqueViolation(UniqueKey::Email),
        "forums_pkey" | "forums_slug_lower_key" => UniqueViolation(UniqueKey::ForumSlug),
        "threads_slug_lower_key" => UniqueViolation(UniqueKey::ThreadSlug),
        "votes_pkey" => UniqueViolation(UniqueKey::Vote),
        "forums_owner_fkey"
        | "threads_author_fkey"
        | "posts_author_fkey"
        | "votes_nickname_fkey"
        | "forum_users_nickname_fkey" => ReferenceViolation(Reference::User),
        "threads_forum_fkey" | "forum_users_forum_fkey" => ReferenceViolation(Reference::Forum),
        "posts_thread_fkey" | "votes_thread_fkey" => ReferenceViolation(Reference::Thread),
        "posts_parent_fkey" => ReferenceViolation(Reference::ParentPost),
        _ => return None,
    })
}

/// Maps a sea-orm error onto the store taxonomy.
fn classify(err: DbErr) -> StoreError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(message))
        | Some(SqlErr::ForeignKeyConstraintViolation(message)) => constraint_name(&message)
            .and_then(constraint_error)
            .unwrap_or(StoreError::StoreFailure(message)),
        _ => StoreError::StoreFailure(err.to_string()),
    }
}

/// `lower(col) = lower(value)`
fn ci_eq<C: ColumnTrait>(col: C, value: &str) -> SimpleExpr {
    Expr::expr(Func::lower(Expr::col(col))).eq(Func::lower(Expr::val(value.to_owned())))
}

async fn user_by_nickname<C: ConnectionTrait>(
    db: &C,
    nickname: &str,
) -> StoreResult<Option<users::Model>> {
    users::Entity::find()
        .filter(ci_eq(users::Column::Nickname, nickname))
        .one(db)
        .await
        .map_err(classify)
}

async fn forum_by_slug<C: ConnectionTrait>(
    db: &C,
    slug: &str,
) -> StoreResult<Option<forums::Model>> {
    forums::Entity::find()
        .filter(ci_eq(forums::Column::Slug, slug))
        .one(db)
        .await
        .map_err(classify)
}

/// Records forum membership; already known members are skipped.
async fn join_forum<C: ConnectionTrait>(
    db: &C,
    forum: &str,
    nicknames: BTreeSet<String>,
) -> StoreResult<()> {
    if nicknames.is_empty() {
        return Ok(());
    }

    let rows = nicknames.into_iter().map(|nickname| forum_users::ActiveModel {
        forum: Set(forum.to_owned()),
        nickname: Set(nickname),
    });
    forum_users::Entity::insert_many(rows)
        .on_conflict(
            OnConflict::columns([forum_users::Column::Forum, forum_users::Column::Nickname])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await
        .map_err(classify)?;
    Ok(())
}

#[derive(FromQueryResult)]
struct NextId {
    id: i64,
}

/// Draws `count` ids from the post sequence, ascending.
async fn next_post_ids<C: ConnectionTrait>(db: &C, count: usize) -> StoreResult<Vec<i64>> {
    let mut ids: Vec<i64> = NextId::find_by_statement(Statement::from_sql_and_values(
        DbBackend::Postgres,
        "SELECT nextval('posts_id_seq') AS id FROM generate_series(1, $1)",
        [Value::from(count as i64)],
    ))
    .all(db)
    .await
    .map_err(classify)?
    .into_iter()
    .map(|row| row.id)
    .collect();
    ids.sort_unstable();
    Ok(ids)
}

pub struct PostgresRepository {
    db: DatabaseConnection,
}

impl PostgresRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl Repository for PostgresRepository {
    async fn create_user(&self, user: &NewUser) -> StoreResult<User> {
        users::ActiveModel {
            nickname: Set(user.nickname.clone()),
            fullname: Set(user.fullname.clone()),
            email: Set(user.email.clone()),
            about: Set(user.about.clone()),
        }
        .insert(&self.db)
        .await
        .map(Into::into)
        .map_err(classify)
    }

    async fn find_user_by_nickname(&self, nickname: &str) -> StoreResult<Option<User>> {
        Ok(user_by_nickname(&self.db, nickname).await?.map(Into::into))
    }

    async fn find_users_by_nickname_or_email(
        &self,
        nickname: &str,
        email: &str,
    ) -> StoreResult<Vec<User>> {
        let users = users::Entity::find()
            .filter(
                Condition::any()
                    .add(ci_eq(users::Column::Nickname, nickname))
                    .add(ci_eq(users::Column::Email, email)),
            )
            .limit(2)
            .all(&self.db)
            .await
            .map_err(classify)?;
        Ok(users.into_iter().map(Into::into).collect())
    }

    async fn patch_user(&self, nickname: &str, patch: &UserPatch) -> StoreResult<User> {
        let txn = self.db.begin().await.map_err(classify)?;
        let user = user_by_nickname(&txn, nickname)
            .await?
            .ok_or(StoreError::NotFound)?;
        if patch.is_empty() {
            return Ok(user.into());
        }

        let mut user: users::ActiveModel = user.into();
        if let Some(fullname) = &patch.fullname {
            user.fullname = Set(fullname.clone());
        }
        if let Some(email) = &patch.email {
            user.email = Set(email.clone());
        }
        if let Some(about) = &patch.about {
            user.about = Set(about.clone());
        }
        let user = user.update(&txn).await.map_err(classify)?;
        txn.commit().await.map_err(classify)?;
        Ok(user.into())
    }

    async fn create_forum(&self, forum: &NewForum) -> StoreResult<Forum> {
        let owner = user_by_nickname(&self.db, &forum.user)
            .await?
            .ok_or(StoreError::ReferenceViolation(Reference::User))?;

        forums::ActiveModel {
            slug: Set(forum.slug.clone()),
            title: Set(forum.title.clone()),
            owner: Set(owner.nickname),
            threads: Set(0),
            posts: Set(0),
        }
        .insert(&self.db)
        .await
        .map(Into::into)
        .map_err(classify)
    }

    async fn find_forum_by_slug(&self, slug: &str) -> StoreResult<Option<Forum>> {
        Ok(forum_by_slug(&self.db, slug).await?.map(Into::into))
    }

    async fn create_thread(
        &self,
        thread: &NewThread,
        created: DateTime<Utc>,
    ) -> StoreResult<Thread> {
        let txn = self.db.begin().await.map_err(classify)?;
        let forum = forum_by_slug(&txn, &thread.forum)
            .await?
            .ok_or(StoreError::ReferenceViolation(Reference::Forum))?;
        let author = user_by_nickname(&txn, &thread.author)
            .await?
            .ok_or(StoreError::ReferenceViolation(Reference::User))?;

        let thread = threads::ActiveModel {
            slug: Set(thread.slug.clone()),
            forum: Set(forum.slug.clone()),
            author: Set(author.nickname.clone()),
            title: Set(thread.title.clone()),
            message: Set(thread.message.clone()),
            created: Set(created),
            votes: Set(0),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(classify)?;

        forums::Entity::update_many()
            .col_expr(
                forums::Column::Threads,
                Expr::col(forums::Column::Threads).add(1),
            )
            .filter(forums::Column::Slug.eq(forum.slug.clone()))
            .exec(&txn)
            .await
            .map_err(classify)?;
        join_forum(&txn, &forum.slug, BTreeSet::from([author.nickname])).await?;

        txn.commit().await.map_err(classify)?;
        Ok(thread.into())
    }

    async fn find_thread(&self, key: &ThreadKey) -> StoreResult<Option<Thread>> {
        let thread = match key {
            ThreadKey::Id(id) => threads::Entity::find_by_id(*id).one(&self.db).await,
            ThreadKey::Slug(slug) => {
                threads::Entity::find()
                    .filter(ci_eq(threads::Column::Slug, slug))
                    .one(&self.db)
                    .await
            }
        };
        Ok(thread.map_err(classify)?.map(Into::into))
    }

    async fn list_threads(&self, range: &ThreadRange) -> StoreResult<Vec<Thread>> {
        let mut query = threads::Entity::find().filter(threads::Column::Forum.eq(range.forum.clone()));
        if let Some(since) = range.since {
            query = if range.desc {
                query.filter(threads::Column::Created.lte(since))
            } else {
                query.filter(threads::Column::Created.gte(since))
            };
        }
        query = if range.desc {
            query
                .order_by_desc(threads::Column::Created)
                .order_by_desc(threads::Column::Id)
        } else {
            query
                .order_by_asc(threads::Column::Created)
                .order_by_asc(threads::Column::Id)
        };
        if let Some(limit) = range.limit {
            query = query.limit(limit);
        }

        let threads = query.all(&self.db).await.map_err(classify)?;
        Ok(threads.into_iter().map(Into::into).collect())
    }

    async fn patch_thread(&self, id: i32, patch: &ThreadPatch) -> StoreResult<Thread> {
        let thread = threads::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(classify)?
            .ok_or(StoreError::NotFound)?;
        if patch.is_empty() {
            return Ok(thread.into());
        }

        let mut thread: threads::ActiveModel = thread.into();
        if let Some(title) = &patch.title {
            thread.title = Set(title.clone());
        }
        if let Some(message) = &patch.message {
            thread.message = Set(message.clone());
        }
        thread
            .update(&self.db)
            .await
            .map(Into::into)
            .map_err(classify)
    }

    async fn insert_posts(
        &self,
        thread: &Thread,
        batch: &[NewPost],
        created: DateTime<Utc>,
    ) -> StoreResult<Vec<Post>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let txn = self.db.begin().await.map_err(classify)?;

        // Canonical author nicknames, keyed by their folded form.
        let wanted: BTreeSet<String> = batch.iter().map(|p| p.author.to_lowercase()).collect();
        let authors: HashMap<String, String> = users::Entity::find()
            .filter(Expr::expr(Func::lower(Expr::col(users::Column::Nickname))).is_in(wanted.clone()))
            .all(&txn)
            .await
            .map_err(classify)?
            .into_iter()
            .map(|user| (user.nickname.to_lowercase(), user.nickname))
            .collect();
        if authors.len() < wanted.len() {
            return Err(StoreError::ReferenceViolation(Reference::User));
        }

        // Parents must already exist in this very thread.
        let parent_ids: BTreeSet<i64> = batch.iter().filter_map(NewPost::parent_id).collect();
        let parents: HashMap<i64, AncestryPath> = if parent_ids.is_empty() {
            HashMap::new()
        } else {
            posts::Entity::find()
                .filter(posts::Column::Id.is_in(parent_ids.iter().copied()))
                .filter(posts::Column::Thread.eq(thread.id))
                .all(&txn)
                .await
                .map_err(classify)?
                .into_iter()
                .map(|parent| (parent.id, AncestryPath::from(parent.path)))
                .collect()
        };
        if parents.len() < parent_ids.len() {
            return Err(StoreError::ReferenceViolation(Reference::ParentPost));
        }

        let ids = next_post_ids(&txn, batch.len()).await?;
        let mut created_posts = Vec::with_capacity(batch.len());
        for (post, id) in batch.iter().zip(ids) {
            let path = match post.parent_id() {
                Some(parent_id) => parents
                    .get(&parent_id)
                    .ok_or(StoreError::ReferenceViolation(Reference::ParentPost))?
                    .child(id),
                None => AncestryPath::root(id),
            };
            let author = authors
                .get(&post.author.to_lowercase())
                .ok_or(StoreError::ReferenceViolation(Reference::User))?;

            created_posts.push(Post {
                id,
                thread: thread.id,
                forum: thread.forum.clone(),
                author: author.clone(),
                message: post.message.clone(),
                parent: post.parent_id(),
                path,
                created,
                is_edited: false,
            });
        }

        for chunk in created_posts.chunks(INSERT_CHUNK) {
            let rows = chunk.iter().map(|post| posts::ActiveModel {
                id: Set(post.id),
                thread: Set(post.thread),
                forum: Set(post.forum.clone()),
                author: Set(post.author.clone()),
                message: Set(post.message.clone()),
                parent: Set(post.parent),
                path: Set(post.path.ids().to_vec()),
                root: Set(post.path.root_id().unwrap_or(post.id)),
                created: Set(post.created),
                is_edited: Set(false),
            });
            posts::Entity::insert_many(rows)
                .exec_without_returning(&txn)
                .await
                .map_err(classify)?;
        }

        forums::Entity::update_many()
            .col_expr(
                forums::Column::Posts,
                Expr::col(forums::Column::Posts).add(created_posts.len() as i64),
            )
            .filter(forums::Column::Slug.eq(thread.forum.clone()))
            .exec(&txn)
            .await
            .map_err(classify)?;
        join_forum(&txn, &thread.forum, authors.into_values().collect()).await?;

        txn.commit().await.map_err(classify)?;
        Ok(created_posts)
    }

    async fn list_posts(&self, range: &PostRange) -> StoreResult<Vec<Post>> {
        let desc = range.desc;
        let mut query = posts::Entity::find().filter(posts::Column::Thread.eq(range.thread));

        match range.sort {
            SortMode::Flat => {
                if let Some(cursor) = &range.cursor {
                    let since = match cursor {
                        Cursor::Id(id) | Cursor::Root(id) => *id,
                        Cursor::Path(path) => path.leaf_id().unwrap_or_default(),
                    };
                    query = if desc {
                        query.filter(posts::Column::Id.lt(since))
                    } else {
                        query.filter(posts::Column::Id.gt(since))
                    };
                }
                query = query.order_by(posts::Column::Id, if desc { Order::Desc } else { Order::Asc });
                if let Some(limit) = range.limit {
                    query = query.limit(limit);
                }
            }
            SortMode::Tree => {
                if let Some(cursor) = &range.cursor {
                    let since = match cursor {
                        Cursor::Path(path) => path.ids().to_vec(),
                        Cursor::Id(id) | Cursor::Root(id) => vec![*id],
                    };
                    query = if desc {
                        query.filter(posts::Column::Path.lt(since))
                    } else {
                        query.filter(posts::Column::Path.gt(since))
                    };
                }
                query = query.order_by(posts::Column::Path, if desc { Order::Desc } else { Order::Asc });
                if let Some(limit) = range.limit {
                    query = query.limit(limit);
                }
            }
            SortMode::ParentTree => {
                let mut roots = posts::Entity::find()
                    .select_only()
                    .column(posts::Column::Id)
                    .filter(posts::Column::Thread.eq(range.thread))
                    .filter(posts::Column::Parent.is_null());
                if let Some(cursor) = &range.cursor {
                    let since = match cursor {
                        Cursor::Root(id) | Cursor::Id(id) => *id,
                        Cursor::Path(path) => path.root_id().unwrap_or_default(),
                    };
                    roots = if desc {
                        roots.filter(posts::Column::Id.lt(since))
                    } else {
                        roots.filter(posts::Column::Id.gt(since))
                    };
                }
                roots = roots.order_by(posts::Column::Id, if desc { Order::Desc } else { Order::Asc });
                if let Some(limit) = range.limit {
                    roots = roots.limit(limit);
                }

                let roots: Vec<i64> = roots
                    .into_tuple::<i64>()
                    .all(&self.db)
                    .await
                    .map_err(classify)?;
                if roots.is_empty() {
                    return Ok(Vec::new());
                }

                query = query
                    .filter(posts::Column::Root.is_in(roots))
                    .order_by(posts::Column::Root, if desc { Order::Desc } else { Order::Asc })
                    .order_by_asc(posts::Column::Path);
            }
        }

        let posts = query.all(&self.db).await.map_err(classify)?;
        Ok(posts.into_iter().map(Into::into).collect())
    }

    async fn find_post_by_id(&self, id: i64) -> StoreResult<Option<Post>> {
        Ok(posts::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(classify)?
            .map(Into::into))
    }

    async fn patch_post(&self, id: i64, message: &str) -> StoreResult<Post> {
        let post = posts::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(classify)?
            .ok_or(StoreError::NotFound)?;
        if post.message == message {
            return Ok(post.into());
        }

        let mut post: posts::ActiveModel = post.into();
        post.message = Set(message.to_owned());
        post.is_edited = Set(true);
        post.update(&self.db)
            .await
            .map(Into::into)
            .map_err(classify)
    }

    async fn insert_vote(&self, vote: &Vote) -> StoreResult<()> {
        let txn = self.db.begin().await.map_err(classify)?;
        let user = user_by_nickname(&txn, &vote.nickname)
            .await?
            .ok_or(StoreError::ReferenceViolation(Reference::User))?;

        votes::Entity::insert(votes::ActiveModel {
            thread: Set(vote.thread),
            nickname: Set(user.nickname),
            voice: Set(vote.voice.value()),
        })
        .exec_without_returning(&txn)
        .await
        .map_err(classify)?;

        threads::Entity::update_many()
            .col_expr(
                threads::Column::Votes,
                Expr::col(threads::Column::Votes).add(vote.voice.value()),
            )
            .filter(threads::Column::Id.eq(vote.thread))
            .exec(&txn)
            .await
            .map_err(classify)?;

        txn.commit().await.map_err(classify)
    }

    async fn update_vote(&self, vote: &Vote) -> StoreResult<()> {
        let txn = self.db.begin().await.map_err(classify)?;
        let user = user_by_nickname(&txn, &vote.nickname)
            .await?
            .ok_or(StoreError::NotFound)?;
        let existing = votes::Entity::find()
            .filter(votes::Column::Thread.eq(vote.thread))
            .filter(votes::Column::Nickname.eq(user.nickname.clone()))
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(classify)?
            .ok_or(StoreError::NotFound)?;

        let delta = vote.voice.value() - existing.voice;
        if delta != 0 {
            votes::Entity::update_many()
                .col_expr(votes::Column::Voice, Expr::value(vote.voice.value()))
                .filter(votes::Column::Thread.eq(vote.thread))
                .filter(votes::Column::Nickname.eq(user.nickname))
                .exec(&txn)
                .await
                .map_err(classify)?;
            threads::Entity::update_many()
                .col_expr(
                    threads::Column::Votes,
                    Expr::col(threads::Column::Votes).add(delta),
                )
                .filter(threads::Column::Id.eq(vote.thread))
                .exec(&txn)
                .await
                .map_err(classify)?;
        }

        txn.commit().await.map_err(classify)
    }

    async fn list_forum_users(&self, range: &UserRange) -> StoreResult<Vec<User>> {
        let members = Query::select()
            .column(forum_users::Column::Nickname)
            .from(forum_users::Entity)
            .and_where(forum_users::Column::Forum.eq(range.forum.clone()))
            .to_owned();

        let mut query = users::Entity::find().filter(users::Column::Nickname.in_subquery(members));
        if let Some(since) = &range.since {
            let folded = Expr::expr(Expr::cust(FOLDED_NICKNAME));
            let since = Func::lower(Expr::val(since.clone()));
            query = if range.desc {
                query.filter(folded.lt(since))
            } else {
                query.filter(folded.gt(since))
            };
        }
        query = query.order_by(
            Expr::cust(FOLDED_NICKNAME),
            if range.desc { Order::Desc } else { Order::Asc },
        );
        if let Some(limit) = range.limit {
            query = query.limit(limit);
        }

        let users = query.all(&self.db).await.map_err(classify)?;
        Ok(users.into_iter().map(Into::into).collect())
    }

    async fn aggregate_counts(&self) -> StoreResult<Status> {
        let user = users::Entity::find().count(&self.db).await.map_err(classify)?;
        let forum = forums::Entity::find().count(&self.db).await.map_err(classify)?;
        let thread = threads::Entity::find().count(&self.db).await.map_err(classify)?;
        let post = posts::Entity::find().count(&self.db).await.map_err(classify)?;

        Ok(Status {
            user: user as i64,
            forum: forum as i64,
            thread: thread as i64,
            post: post as i64,
        })
    }

    async fn truncate_all(&self) -> StoreResult<()> {
        self.db
            .execute_unprepared(
                "TRUNCATE forum_users, votes, posts, threads, forums, users RESTART IDENTITY CASCADE",
            )
            .await
            .map_err(classify)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_name_is_last_quoted_token() {
        assert_eq!(
            constraint_name(r#"duplicate key value violates unique constraint "users_email_lower_key""#),
            Some("users_email_lower_key")
        );
        assert_eq!(
            constraint_name(
                r#"insert or update on table "posts" violates foreign key constraint "posts_author_fkey""#
            ),
            Some("posts_author_fkey")
        );
        assert_eq!(constraint_name("connection reset"), None);
    }

    #[test]
    fn test_constraints_classify() {
        assert_eq!(
            constraint_error("users_nickname_lower_key"),
            Some(StoreError::UniqueViolation(UniqueKey::Nickname))
        );
        assert_eq!(
            constraint_error("threads_slug_lower_key"),
            Some(StoreError::UniqueViolation(UniqueKey::ThreadSlug))
        );
        assert_eq!(
            constraint_error("forum_users_pkey"),
            None,
            "membership conflicts are absorbed by ON CONFLICT"
        );
        assert_eq!(
            constraint_error("threads_forum_fkey"),
            Some(StoreError::ReferenceViolation(Reference::Forum))
        );
        assert_eq!(
            constraint_error("posts_parent_fkey"),
            Some(StoreError::ReferenceViolation(Reference::ParentPost))
        );
    }

    #[test]
    fn test_non_sql_errors_are_store_failures() {
        let err = classify(DbErr::Custom("pool timed out".to_owned()));
        assert!(matches!(err, StoreError::StoreFailure(_)));
    }
}
