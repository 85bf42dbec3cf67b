//! The storage contract consumed by the core components.
//!
//! Every implementation reports failures as a classified [`StoreError`]:
//! `UniqueViolation` when a natural key is taken, `ReferenceViolation` when a
//! referenced entity is missing, `NotFound` when the row being patched does
//! not exist, and `StoreFailure` for everything else. Lookups by natural key
//! (nickname, email, forum slug, thread slug) are case-insensitive.

use crate::error::StoreError;
use crate::models::{
    Forum, NewForum, NewPost, NewThread, NewUser, Post, Status, Thread, ThreadKey, ThreadPatch,
    User, UserPatch, Vote,
};
use crate::pagination::PostRange;
use chrono::{DateTime, Utc};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Threads of one forum ordered by creation time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ThreadRange {
    /// Canonical forum slug.
    pub forum: String,
    /// Inclusive lower bound, or upper bound when `desc`.
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
    pub desc: bool,
}

/// Members of one forum ordered by lower-cased nickname.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserRange {
    /// Canonical forum slug.
    pub forum: String,
    /// Exclusive nickname cursor.
    pub since: Option<String>,
    pub limit: Option<u64>,
    pub desc: bool,
}

#[async_trait::async_trait]
pub trait Repository: Send + Sync {
    /// Fails with `UniqueViolation(Nickname | Email)` when either is taken.
    async fn create_user(&self, user: &NewUser) -> StoreResult<User>;
    async fn find_user_by_nickname(&self, nickname: &str) -> StoreResult<Option<User>>;
    /// At most one row per predicate, so zero to two users.
    async fn find_users_by_nickname_or_email(
        &self,
        nickname: &str,
        email: &str,
    ) -> StoreResult<Vec<User>>;
    /// Applies the supplied fields only. `NotFound` for an unknown nickname,
    /// `UniqueViolation(Email)` when the new email belongs to someone else.
    async fn patch_user(&self, nickname: &str, patch: &UserPatch) -> StoreResult<User>;

    /// `UniqueViolation(ForumSlug)` or `ReferenceViolation(User)` for the owner.
    async fn create_forum(&self, forum: &NewForum) -> StoreResult<Forum>;
    async fn find_forum_by_slug(&self, slug: &str) -> StoreResult<Option<Forum>>;

    /// Persists `created` verbatim and bumps the forum's thread count.
    /// `UniqueViolation(ThreadSlug)`, `ReferenceViolation(Forum | User)`.
    async fn create_thread(&self, thread: &NewThread, created: DateTime<Utc>)
        -> StoreResult<Thread>;
    async fn find_thread(&self, key: &ThreadKey) -> StoreResult<Option<Thread>>;
    async fn list_threads(&self, range: &ThreadRange) -> StoreResult<Vec<Thread>>;
    async fn patch_thread(&self, id: i32, patch: &ThreadPatch) -> StoreResult<Thread>;

    /// Inserts the whole batch or nothing. Ids are assigned in submission
    /// order and each path is `parent.path + [id]`, computed in the same
    /// transaction. `ReferenceViolation(User)` for an unknown author,
    /// `ReferenceViolation(ParentPost)` for a parent that is missing or
    /// lives in another thread.
    async fn insert_posts(
        &self,
        thread: &Thread,
        posts: &[NewPost],
        created: DateTime<Utc>,
    ) -> StoreResult<Vec<Post>>;
    async fn list_posts(&self, range: &PostRange) -> StoreResult<Vec<Post>>;
    async fn find_post_by_id(&self, id: i64) -> StoreResult<Option<Post>>;
    /// Replaces the message; the edited flag is raised only when it changed.
    async fn patch_post(&self, id: i64, message: &str) -> StoreResult<Post>;

    /// Inserts a new vote and adds its voice to the thread tally.
    /// `UniqueViolation(Vote)` when (thread, nickname) already voted,
    /// `ReferenceViolation(User | Thread)` otherwise.
    async fn insert_vote(&self, vote: &Vote) -> StoreResult<()>;
    /// Replaces the voice of an existing vote, adjusting the tally by the
    /// difference. `NotFound` when there is no vote for the key.
    async fn update_vote(&self, vote: &Vote) -> StoreResult<()>;

    async fn list_forum_users(&self, range: &UserRange) -> StoreResult<Vec<User>>;

    async fn aggregate_counts(&self) -> StoreResult<Status>;
    async fn truncate_all(&self) -> StoreResult<()>;
}
