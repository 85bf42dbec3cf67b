//! In-process implementation of the repository contract.
//!
//! All state sits behind one lock and every operation takes it exactly once,
//! so each call is atomic the same way a single transaction is. Used by the
//! test suites and for running the service without a database.

use crate::error::{Reference, StoreError, UniqueKey};
use crate::models::{
    Forum, NewForum, NewPost, NewThread, NewUser, Post, Status, Thread, ThreadKey, ThreadPatch,
    User, UserPatch, Vote,
};
use crate::pagination::{arrange, PostRange};
use crate::path::AncestryPath;
use crate::repository::{Repository, StoreResult, ThreadRange, UserRange};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

fn fold(key: &str) -> String {
    key.to_lowercase()
}

#[derive(Default)]
struct State {
    /// Keyed by folded nickname.
    users: BTreeMap<String, User>,
    /// Keyed by folded slug.
    forums: BTreeMap<String, Forum>,
    threads: BTreeMap<i32, Thread>,
    posts: BTreeMap<i64, Post>,
    /// Keyed by (thread, folded nickname).
    votes: HashMap<(i32, String), i32>,
    /// (folded forum slug, folded nickname)
    forum_users: BTreeSet<(String, String)>,
    next_thread_id: i32,
    next_post_id: i64,
}

impl State {
    fn user(&self, nickname: &str) -> Option<&User> {
        self.users.get(&fold(nickname))
    }

    fn email_owner(&self, email: &str) -> Option<&User> {
        let email = fold(email);
        self.users.values().find(|u| fold(&u.email) == email)
    }

    fn thread_id(&self, key: &ThreadKey) -> Option<i32> {
        match key {
            ThreadKey::Id(id) => self.threads.get(id).map(|t| t.id),
            ThreadKey::Slug(slug) => {
                let slug = fold(slug);
                self.threads
                    .values()
                    .find(|t| t.slug.as_deref().map(fold).as_deref() == Some(slug.as_str()))
                    .map(|t| t.id)
            }
        }
    }

    fn join_forum(&mut self, forum: &str, nickname: &str) {
        self.forum_users.insert((fold(forum), fold(nickname)));
    }
}

#[derive(Default)]
pub struct MemoryRepository {
    state: RwLock<State>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| StoreError::StoreFailure("memory store lock poisoned".to_owned()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| StoreError::StoreFailure("memory store lock poisoned".to_owned()))
    }
}

#[async_trait::async_trait]
impl Repository for MemoryRepository {
    async fn create_user(&self, user: &NewUser) -> StoreResult<User> {
        let mut state = self.write()?;
        if state.user(&user.nickname).is_some() {
            return Err(StoreError::UniqueViolation(UniqueKey::Nickname));
        }
        if state.email_owner(&user.email).is_some() {
            return Err(StoreError::UniqueViolation(UniqueKey::Email));
        }

        let user = User::from(user.clone());
        state.users.insert(fold(&user.nickname), user.clone());
        Ok(user)
    }

    async fn find_user_by_nickname(&self, nickname: &str) -> StoreResult<Option<User>> {
        Ok(self.read()?.user(nickname).cloned())
    }

    async fn find_users_by_nickname_or_email(
        &self,
        nickname: &str,
        email: &str,
    ) -> StoreResult<Vec<User>> {
        let state = self.read()?;
        let mut users: Vec<User> = Vec::with_capacity(2);
        for user in [state.user(nickname), state.email_owner(email)]
            .into_iter()
            .flatten()
        {
            if !users.contains(user) {
                users.push(user.clone());
            }
        }
        Ok(users)
    }

    async fn patch_user(&self, nickname: &str, patch: &UserPatch) -> StoreResult<User> {
        let mut state = self.write()?;
        let key = fold(nickname);
        if !state.users.contains_key(&key) {
            return Err(StoreError::NotFound);
        }
        if let Some(email) = &patch.email {
            if let Some(owner) = state.email_owner(email) {
                if fold(&owner.nickname) != key {
                    return Err(StoreError::UniqueViolation(UniqueKey::Email));
                }
            }
        }

        let user = state.users.get_mut(&key).ok_or(StoreError::NotFound)?;
        if let Some(fullname) = &patch.fullname {
            user.fullname = fullname.clone();
        }
        if let Some(email) = &patch.email {
            user.email = email.clone();
        }
        if let Some(about) = &patch.about {
            user.about = about.clone();
        }
        Ok(user.clone())
    }

    async fn create_forum(&self, forum: &NewForum) -> StoreResult<Forum> {
        let mut state = self.write()?;
        let owner = state
            .user(&forum.user)
            .ok_or(StoreError::ReferenceViolation(Reference::User))?
            .nickname
            .clone();
        if state.forums.contains_key(&fold(&forum.slug)) {
            return Err(StoreError::UniqueViolation(UniqueKey::ForumSlug));
        }

        let forum = Forum {
            slug: forum.slug.clone(),
            title: forum.title.clone(),
            owner,
            threads: 0,
            posts: 0,
        };
        state.forums.insert(fold(&forum.slug), forum.clone());
        Ok(forum)
    }

    async fn find_forum_by_slug(&self, slug: &str) -> StoreResult<Option<Forum>> {
        Ok(self.read()?.forums.get(&fold(slug)).cloned())
    }

    async fn create_thread(
        &self,
        thread: &NewThread,
        created: DateTime<Utc>,
    ) -> StoreResult<Thread> {
        let mut state = self.write()?;
        let forum = state
            .forums
            .get(&fold(&thread.forum))
            .ok_or(StoreError::ReferenceViolation(Reference::Forum))?
            .slug
            .clone();
        let author = state
            .user(&thread.author)
            .ok_or(StoreError::ReferenceViolation(Reference::User))?
            .nickname
            .clone();
        if let Some(slug) = &thread.slug {
            if state.thread_id(&ThreadKey::Slug(slug.clone())).is_some() {
                return Err(StoreError::UniqueViolation(UniqueKey::ThreadSlug));
            }
        }

        state.next_thread_id += 1;
        let thread = Thread {
            id: state.next_thread_id,
            slug: thread.slug.clone(),
            forum,
            author,
            title: thread.title.clone(),
            message: thread.message.clone(),
            created,
            votes: 0,
        };
        state.threads.insert(thread.id, thread.clone());
        if let Some(forum) = state.forums.get_mut(&fold(&thread.forum)) {
            forum.threads += 1;
        }
        state.join_forum(&thread.forum, &thread.author);
        Ok(thread)
    }

    async fn find_thread(&self, key: &ThreadKey) -> StoreResult<Option<Thread>> {
        let state = self.read()?;
        Ok(state
            .thread_id(key)
            .and_then(|id| state.threads.get(&id))
            .cloned())
    }

    async fn list_threads(&self, range: &ThreadRange) -> StoreResult<Vec<Thread>> {
        let state = self.read()?;
        let forum = fold(&range.forum);
        let mut threads: Vec<Thread> = state
            .threads
            .values()
            .filter(|t| fold(&t.forum) == forum)
            .filter(|t| match range.since {
                None => true,
                Some(since) if range.desc => t.created <= since,
                Some(since) => t.created >= since,
            })
            .cloned()
            .collect();

        threads.sort_by(|a, b| a.created.cmp(&b.created).then(a.id.cmp(&b.id)));
        if range.desc {
            threads.reverse();
        }
        if let Some(limit) = range.limit {
            threads.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        Ok(threads)
    }

    async fn patch_thread(&self, id: i32, patch: &ThreadPatch) -> StoreResult<Thread> {
        let mut state = self.write()?;
        let thread = state.threads.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(title) = &patch.title {
            thread.title = title.clone();
        }
        if let Some(message) = &patch.message {
            thread.message = message.clone();
        }
        Ok(thread.clone())
    }

    async fn insert_posts(
        &self,
        thread: &Thread,
        posts: &[NewPost],
        created: DateTime<Utc>,
    ) -> StoreResult<Vec<Post>> {
        let mut state = self.write()?;
        if !state.threads.contains_key(&thread.id) {
            return Err(StoreError::ReferenceViolation(Reference::Thread));
        }

        // Validate everything before touching state so a failure leaves no trace.
        let mut prepared = Vec::with_capacity(posts.len());
        for post in posts {
            let author = state
                .user(&post.author)
                .ok_or(StoreError::ReferenceViolation(Reference::User))?
                .nickname
                .clone();
            let parent = match post.parent_id() {
                None => None,
                Some(parent_id) => {
                    let parent = state
                        .posts
                        .get(&parent_id)
                        .filter(|parent| parent.thread == thread.id)
                        .ok_or(StoreError::ReferenceViolation(Reference::ParentPost))?;
                    Some((parent.id, parent.path.clone()))
                }
            };
            prepared.push((author, parent, post.message.clone()));
        }

        let mut created_posts = Vec::with_capacity(prepared.len());
        for (author, parent, message) in prepared {
            state.next_post_id += 1;
            let id = state.next_post_id;
            let (parent, path) = match parent {
                Some((parent_id, parent_path)) => (Some(parent_id), parent_path.child(id)),
                None => (None, AncestryPath::root(id)),
            };
            let post = Post {
                id,
                thread: thread.id,
                forum: thread.forum.clone(),
                author,
                message,
                parent,
                path,
                created,
                is_edited: false,
            };
            state.join_forum(&post.forum, &post.author);
            state.posts.insert(id, post.clone());
            created_posts.push(post);
        }

        if let Some(forum) = state.forums.get_mut(&fold(&thread.forum)) {
            forum.posts += created_posts.len() as i64;
        }
        Ok(created_posts)
    }

    async fn list_posts(&self, range: &PostRange) -> StoreResult<Vec<Post>> {
        let state = self.read()?;
        Ok(arrange(
            state
                .posts
                .values()
                .filter(|p| p.thread == range.thread)
                .cloned(),
            range,
        ))
    }

    async fn find_post_by_id(&self, id: i64) -> StoreResult<Option<Post>> {
        Ok(self.read()?.posts.get(&id).cloned())
    }

    async fn patch_post(&self, id: i64, message: &str) -> StoreResult<Post> {
        let mut state = self.write()?;
        let post = state.posts.get_mut(&id).ok_or(StoreError::NotFound)?;
        if post.message != message {
            post.message = message.to_owned();
            post.is_edited = true;
        }
        Ok(post.clone())
    }

    async fn insert_vote(&self, vote: &Vote) -> StoreResult<()> {
        let mut state = self.write()?;
        if state.user(&vote.nickname).is_none() {
            return Err(StoreError::ReferenceViolation(Reference::User));
        }
        if !state.threads.contains_key(&vote.thread) {
            return Err(StoreError::ReferenceViolation(Reference::Thread));
        }
        let key = (vote.thread, fold(&vote.nickname));
        if state.votes.contains_key(&key) {
            return Err(StoreError::UniqueViolation(UniqueKey::Vote));
        }

        state.votes.insert(key, vote.voice.value());
        if let Some(thread) = state.threads.get_mut(&vote.thread) {
            thread.votes += vote.voice.value();
        }
        Ok(())
    }

    async fn update_vote(&self, vote: &Vote) -> StoreResult<()> {
        let mut state = self.write()?;
        let key = (vote.thread, fold(&vote.nickname));
        let old = *state.votes.get(&key).ok_or(StoreError::NotFound)?;
        state.votes.insert(key, vote.voice.value());

        if let Some(thread) = state.threads.get_mut(&vote.thread) {
            thread.votes += vote.voice.value() - old;
        }
        Ok(())
    }

    async fn list_forum_users(&self, range: &UserRange) -> StoreResult<Vec<User>> {
        let state = self.read()?;
        let forum = fold(&range.forum);
        let since = range.since.as_deref().map(fold);

        let mut users: Vec<User> = state
            .forum_users
            .iter()
            .filter(|(f, _)| *f == forum)
            .filter(|(_, nick)| match &since {
                None => true,
                Some(since) if range.desc => nick < since,
                Some(since) => nick > since,
            })
            .filter_map(|(_, nick)| state.users.get(nick).cloned())
            .collect();

        if range.desc {
            users.reverse();
        }
        if let Some(limit) = range.limit {
            users.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        Ok(users)
    }

    async fn aggregate_counts(&self) -> StoreResult<Status> {
        let state = self.read()?;
        Ok(Status {
            user: state.users.len() as i64,
            forum: state.forums.len() as i64,
            thread: state.threads.len() as i64,
            post: state.posts.len() as i64,
        })
    }

    async fn truncate_all(&self) -> StoreResult<()> {
        *self.write()? = State::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{now, Voice};

    fn new_user(nickname: &str, email: &str) -> NewUser {
        NewUser {
            nickname: nickname.to_owned(),
            fullname: nickname.to_uppercase(),
            email: email.to_owned(),
            about: String::new(),
        }
    }

    #[actix_rt::test]
    async fn test_unique_keys_fold_case() {
        let repo = MemoryRepository::new();
        repo.create_user(&new_user("Bob", "bob@example.org"))
            .await
            .unwrap();

        assert_eq!(
            repo.create_user(&new_user("bob", "other@example.org")).await,
            Err(StoreError::UniqueViolation(UniqueKey::Nickname))
        );
        assert_eq!(
            repo.create_user(&new_user("robert", "BOB@example.org")).await,
            Err(StoreError::UniqueViolation(UniqueKey::Email))
        );
        assert_eq!(
            repo.find_user_by_nickname("BOB").await.unwrap().unwrap().nickname,
            "Bob"
        );
    }

    #[actix_rt::test]
    async fn test_vote_update_adjusts_tally_by_difference() {
        let repo = MemoryRepository::new();
        repo.create_user(&new_user("bob", "bob@example.org"))
            .await
            .unwrap();
        repo.create_forum(&NewForum {
            slug: "f".to_owned(),
            title: "F".to_owned(),
            user: "bob".to_owned(),
        })
        .await
        .unwrap();
        let thread = repo
            .create_thread(
                &NewThread {
                    forum: "F".to_owned(),
                    slug: None,
                    author: "BOB".to_owned(),
                    title: "t".to_owned(),
                    message: "m".to_owned(),
                    created: None,
                },
                now(),
            )
            .await
            .unwrap();
        assert_eq!(thread.forum, "f");
        assert_eq!(thread.author, "bob");

        let mut vote = Vote {
            thread: thread.id,
            nickname: "bob".to_owned(),
            voice: Voice::Up,
        };
        assert_eq!(
            repo.update_vote(&vote).await,
            Err(StoreError::NotFound),
            "update before insert must not create a vote"
        );
        repo.insert_vote(&vote).await.unwrap();
        vote.voice = Voice::Down;
        repo.update_vote(&vote).await.unwrap();

        let thread = repo
            .find_thread(&ThreadKey::Id(thread.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(thread.votes, -1);
    }

    #[actix_rt::test]
    async fn test_truncate_restarts_ids() {
        let repo = MemoryRepository::new();
        repo.create_user(&new_user("bob", "bob@example.org"))
            .await
            .unwrap();
        repo.truncate_all().await.unwrap();
        assert_eq!(repo.aggregate_counts().await.unwrap(), Status::default());
    }
}
