//! The forum facade the request surface talks to.
//!
//! Composes the registrar, the post store, the paginator and the vote
//! ledger over one shared repository and adds the plain read/patch
//! operations that need no recovery logic of their own.

use crate::error::{Error, Result, StoreError, UniqueKey};
use crate::models::{
    Forum, NewForum, NewPost, NewThread, NewUser, Post, PostDetails, PostPatch, Related, Status,
    Thread, ThreadKey, ThreadPatch, User, UserPatch, Voice,
};
use crate::pagination::{PostPaginator, PostQuery};
use crate::post::PostStore;
use crate::registrar::{Registrar, Registration, UserRegistration};
use crate::repository::{Repository, ThreadRange, UserRange};
use crate::vote::VoteLedger;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Threads of a forum, oldest first unless `desc`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ThreadQuery {
    pub limit: Option<u64>,
    /// Inclusive creation time bound.
    pub since: Option<DateTime<Utc>>,
    pub desc: bool,
}

/// Users active in a forum, by case-folded nickname.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserQuery {
    pub limit: Option<u64>,
    /// Exclusive nickname bound.
    pub since: Option<String>,
    pub desc: bool,
}

pub struct ForumService {
    repo: Arc<dyn Repository>,
    registrar: Registrar,
    posts: PostStore,
    paginator: PostPaginator,
    votes: VoteLedger,
}

impl ForumService {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self {
            registrar: Registrar::new(repo.clone()),
            posts: PostStore::new(repo.clone()),
            paginator: PostPaginator::new(repo.clone()),
            votes: VoteLedger::new(repo.clone()),
            repo,
        }
    }

    pub async fn create_user(&self, user: NewUser) -> Result<UserRegistration> {
        self.registrar.register_user(user).await
    }

    pub async fn get_user(&self, nickname: &str) -> Result<User> {
        self.repo
            .find_user_by_nickname(nickname)
            .await?
            .ok_or_else(|| user_not_found(nickname))
    }

    /// Blank or absent fields keep their current value.
    pub async fn patch_user(&self, nickname: &str, patch: UserPatch) -> Result<User> {
        match self.repo.patch_user(nickname, &patch.normalized()).await {
            Ok(user) => Ok(user),
            Err(StoreError::NotFound) => Err(user_not_found(nickname)),
            Err(StoreError::UniqueViolation(UniqueKey::Email)) => Err(Error::conflict(format!(
                "Can't change profile of {}: email is already registered",
                nickname
            ))),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn create_forum(&self, forum: NewForum) -> Result<Registration<Forum>> {
        self.registrar.register_forum(forum).await
    }

    pub async fn get_forum(&self, slug: &str) -> Result<Forum> {
        self.repo
            .find_forum_by_slug(slug)
            .await?
            .ok_or_else(|| forum_not_found(slug))
    }

    pub async fn create_thread(&self, thread: NewThread) -> Result<Registration<Thread>> {
        self.registrar.register_thread(thread).await
    }

    pub async fn list_forum_threads(&self, slug: &str, query: ThreadQuery) -> Result<Vec<Thread>> {
        let forum = self.get_forum(slug).await?;
        let range = ThreadRange {
            forum: forum.slug,
            since: query.since,
            limit: query.limit.filter(|l| *l > 0),
            desc: query.desc,
        };
        Ok(self.repo.list_threads(&range).await?)
    }

    pub async fn list_forum_users(&self, slug: &str, query: UserQuery) -> Result<Vec<User>> {
        let forum = self.get_forum(slug).await?;
        let range = UserRange {
            forum: forum.slug,
            since: query.since,
            limit: query.limit.filter(|l| *l > 0),
            desc: query.desc,
        };
        Ok(self.repo.list_forum_users(&range).await?)
    }

    pub async fn get_thread(&self, key: &ThreadKey) -> Result<Thread> {
        self.repo
            .find_thread(key)
            .await?
            .ok_or_else(|| thread_not_found(key))
    }

    /// Blank or absent fields keep their current value.
    pub async fn patch_thread(&self, key: &ThreadKey, patch: ThreadPatch) -> Result<Thread> {
        let thread = self.get_thread(key).await?;
        match self.repo.patch_thread(thread.id, &patch.normalized()).await {
            Err(StoreError::NotFound) => Err(thread_not_found(key)),
            other => Ok(other?),
        }
    }

    pub async fn create_posts(&self, key: &ThreadKey, posts: Vec<NewPost>) -> Result<Vec<Post>> {
        self.posts.insert_batch(key, posts).await
    }

    pub async fn list_posts(&self, key: &ThreadKey, query: &PostQuery) -> Result<Vec<Post>> {
        self.paginator.list_posts(key, query).await
    }

    pub async fn vote(&self, key: &ThreadKey, nickname: &str, voice: Voice) -> Result<Thread> {
        self.votes.cast_vote(key, nickname, voice).await
    }

    pub async fn get_post(&self, id: i64, related: Related) -> Result<PostDetails> {
        self.posts.get_post(id, related).await
    }

    pub async fn patch_post(&self, id: i64, patch: PostPatch) -> Result<Post> {
        self.posts.patch_post(id, patch).await
    }

    pub async fn status(&self) -> Result<Status> {
        Ok(self.repo.aggregate_counts().await?)
    }

    pub async fn clear(&self) -> Result<()> {
        log::info!("clearing all forum data");
        Ok(self.repo.truncate_all().await?)
    }
}

fn user_not_found(nickname: &str) -> Error {
    Error::not_found(format!("Can't find user by nickname: {}", nickname))
}

fn forum_not_found(slug: &str) -> Error {
    Error::not_found(format!("Can't find forum with slug: {}", slug))
}

fn thread_not_found(key: &ThreadKey) -> Error {
    Error::not_found(format!("Can't find thread by slug or id: {}", key))
}
