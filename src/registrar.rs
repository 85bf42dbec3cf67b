//! Create-or-fetch for users, forums and threads.
//!
//! A uniqueness collision is not a failure here: the registrar re-reads the
//! row that holds the key and hands it back, so callers can answer with the
//! existing state.

use crate::error::{Error, Reference, Result, StoreError};
use crate::models::{now, Forum, NewForum, NewThread, NewUser, Thread, ThreadKey, User};
use crate::repository::Repository;
use std::sync::Arc;

/// An entity together with whether this call created it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration<T> {
    pub entity: T,
    pub created: bool,
}

impl<T> Registration<T> {
    fn created(entity: T) -> Self {
        Self {
            entity,
            created: true,
        }
    }

    fn existing(entity: T) -> Self {
        Self {
            entity,
            created: false,
        }
    }
}

/// Either nickname or email may collide, so a taken user yields every
/// user matching one of them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserRegistration {
    Created(User),
    Taken(Vec<User>),
}

pub struct Registrar {
    repo: Arc<dyn Repository>,
}

impl Registrar {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    pub async fn register_user(&self, user: NewUser) -> Result<UserRegistration> {
        match self.repo.create_user(&user).await {
            Ok(user) => Ok(UserRegistration::Created(user)),
            Err(StoreError::UniqueViolation(key)) => {
                let taken = self
                    .repo
                    .find_users_by_nickname_or_email(&user.nickname, &user.email)
                    .await?;
                if taken.is_empty() {
                    // The colliding row vanished between the insert and the read.
                    log::warn!("{} collision for {} with no matching user", key, user.nickname);
                    return Err(Error::conflict(format!(
                        "Can't create user {}: {} is already taken",
                        user.nickname, key
                    )));
                }
                Ok(UserRegistration::Taken(taken))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn register_forum(&self, forum: NewForum) -> Result<Registration<Forum>> {
        match self.repo.create_forum(&forum).await {
            Ok(created) => Ok(Registration::created(created)),
            Err(StoreError::UniqueViolation(_)) => self
                .repo
                .find_forum_by_slug(&forum.slug)
                .await?
                .map(Registration::existing)
                .ok_or_else(|| Error::conflict(format!("Forum {} is already taken", forum.slug))),
            Err(StoreError::ReferenceViolation(Reference::User)) => Err(Error::not_found(
                format!("Can't find user with nickname: {}", forum.user),
            )),
            Err(err) => Err(err.into()),
        }
    }

    /// An explicit `created` is persisted verbatim; otherwise the thread is
    /// stamped with the current time.
    pub async fn register_thread(&self, thread: NewThread) -> Result<Registration<Thread>> {
        let created = thread.created.unwrap_or_else(now);

        match self.repo.create_thread(&thread, created).await {
            Ok(created) => Ok(Registration::created(created)),
            Err(StoreError::UniqueViolation(_)) => {
                let slug = thread.slug.clone().unwrap_or_default();
                self.repo
                    .find_thread(&ThreadKey::Slug(slug.clone()))
                    .await?
                    .map(Registration::existing)
                    .ok_or_else(|| Error::conflict(format!("Thread {} is already taken", slug)))
            }
            Err(StoreError::ReferenceViolation(Reference::Forum)) => Err(Error::not_found(
                format!("Can't find thread forum by slug: {}", thread.forum),
            )),
            Err(StoreError::ReferenceViolation(Reference::User)) => Err(Error::not_found(
                format!("Can't find thread author by nickname: {}", thread.author),
            )),
            Err(err) => Err(err.into()),
        }
    }
}
