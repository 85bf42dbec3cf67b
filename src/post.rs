use crate::error::{Error, Reference, Result, StoreError};
use crate::models::{non_empty, now, NewPost, Post, PostDetails, PostPatch, Related, ThreadKey};
use crate::repository::Repository;
use std::sync::Arc;

/// Batch insertion of replies and single-post reads and edits.
pub struct PostStore {
    repo: Arc<dyn Repository>,
}

impl PostStore {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    /// Inserts the whole batch into the thread named by `key`, or nothing.
    ///
    /// Every post of one batch carries the same creation time. Parents must
    /// already exist in the same thread; a parent elsewhere (or nowhere) is a
    /// structural conflict rather than a missing entity.
    pub async fn insert_batch(&self, key: &ThreadKey, posts: Vec<NewPost>) -> Result<Vec<Post>> {
        let thread = self
            .repo
            .find_thread(key)
            .await?
            .ok_or_else(|| Error::not_found(format!("Can't find post thread by id: {}", key)))?;
        if posts.is_empty() {
            return Ok(Vec::new());
        }

        match self.repo.insert_posts(&thread, &posts, now()).await {
            Ok(created) => {
                log::debug!("inserted {} posts into thread {}", created.len(), thread.id);
                Ok(created)
            }
            Err(StoreError::ReferenceViolation(Reference::User)) => {
                Err(Error::not_found("Can't find post author by nickname"))
            }
            Err(StoreError::StoreFailure(msg)) => Err(StoreError::StoreFailure(msg).into()),
            Err(err) => {
                log::debug!("post batch for thread {} rejected: {}", thread.id, err);
                Err(Error::conflict("Parent post was created in another thread"))
            }
        }
    }

    pub async fn get_post(&self, id: i64, related: Related) -> Result<PostDetails> {
        let post = self.find(id).await?;

        let author = if related.user {
            Some(
                self.repo
                    .find_user_by_nickname(&post.author)
                    .await?
                    .ok_or_else(|| Error::not_found(format!("Can't find user: {}", post.author)))?,
            )
        } else {
            None
        };
        let thread = if related.thread {
            Some(
                self.repo
                    .find_thread(&ThreadKey::Id(post.thread))
                    .await?
                    .ok_or_else(|| Error::not_found(format!("Can't find thread: {}", post.thread)))?,
            )
        } else {
            None
        };
        let forum = if related.forum {
            Some(
                self.repo
                    .find_forum_by_slug(&post.forum)
                    .await?
                    .ok_or_else(|| Error::not_found(format!("Can't find forum: {}", post.forum)))?,
            )
        } else {
            None
        };

        Ok(PostDetails {
            post,
            author,
            thread,
            forum,
        })
    }

    /// A blank or absent message leaves the post untouched.
    pub async fn patch_post(&self, id: i64, patch: PostPatch) -> Result<Post> {
        match non_empty(patch.message) {
            None => self.find(id).await,
            Some(message) => match self.repo.patch_post(id, &message).await {
                Err(StoreError::NotFound) => Err(not_found(id)),
                other => Ok(other?),
            },
        }
    }

    async fn find(&self, id: i64) -> Result<Post> {
        self.repo
            .find_post_by_id(id)
            .await?
            .ok_or_else(|| not_found(id))
    }
}

fn not_found(id: i64) -> Error {
    Error::not_found(format!("Can't find post with id: {}", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewForum, NewThread, NewUser, Thread};
    use crate::pagination::{PostPaginator, PostQuery, SortMode};
    use crate::store::memory::MemoryRepository;

    struct Fixture {
        repo: Arc<MemoryRepository>,
        store: PostStore,
        first: Thread,
        second: Thread,
    }

    async fn fixture() -> Fixture {
        let repo = Arc::new(MemoryRepository::new());
        repo.create_user(&NewUser {
            nickname: "Alice".to_owned(),
            fullname: "Alice".to_owned(),
            email: "alice@example.com".to_owned(),
            about: String::new(),
        })
        .await
        .unwrap();
        repo.create_forum(&NewForum {
            slug: "forum".to_owned(),
            title: "Forum".to_owned(),
            user: "alice".to_owned(),
        })
        .await
        .unwrap();

        let mut threads = Vec::new();
        for slug in ["first", "second"] {
            let thread = NewThread {
                forum: "forum".to_owned(),
                slug: Some(slug.to_owned()),
                author: "alice".to_owned(),
                title: slug.to_owned(),
                message: slug.to_owned(),
                created: None,
            };
            threads.push(repo.create_thread(&thread, now()).await.unwrap());
        }
        let second = threads.pop().unwrap();
        let first = threads.pop().unwrap();

        Fixture {
            store: PostStore::new(repo.clone()),
            repo,
            first,
            second,
        }
    }

    fn reply(parent: Option<i64>, message: &str) -> NewPost {
        NewPost {
            parent,
            author: "alice".to_owned(),
            message: message.to_owned(),
        }
    }

    #[actix_rt::test]
    async fn test_batch_shares_timestamp_and_builds_paths() {
        let f = fixture().await;
        let roots = f
            .store
            .insert_batch(&ThreadKey::Id(f.first.id), vec![reply(None, "a"), reply(None, "b")])
            .await
            .unwrap();
        assert_eq!(roots[0].created, roots[1].created);
        assert!(roots[0].id < roots[1].id);

        let replies = f
            .store
            .insert_batch(
                &ThreadKey::Slug("FIRST".to_owned()),
                vec![reply(Some(roots[0].id), "c"), reply(Some(0), "d")],
            )
            .await
            .unwrap();
        assert_eq!(replies[0].path.ids(), &[roots[0].id, replies[0].id]);
        assert_eq!(replies[0].author, "Alice");
        assert_eq!(replies[1].parent, None);
        assert!(replies[1].path.is_root());

        let forum = f.repo.find_forum_by_slug("forum").await.unwrap().unwrap();
        assert_eq!(forum.posts, 4);
    }

    #[actix_rt::test]
    async fn test_empty_batch_is_noop() {
        let f = fixture().await;
        let created = f
            .store
            .insert_batch(&ThreadKey::Id(f.first.id), Vec::new())
            .await
            .unwrap();
        assert!(created.is_empty());

        let err = f
            .store
            .insert_batch(&ThreadKey::Id(9999), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[actix_rt::test]
    async fn test_cross_thread_parent_rejects_whole_batch() {
        let f = fixture().await;
        let elsewhere = f
            .store
            .insert_batch(&ThreadKey::Id(f.second.id), vec![reply(None, "other")])
            .await
            .unwrap();

        let err = f
            .store
            .insert_batch(
                &ThreadKey::Id(f.first.id),
                vec![reply(None, "fine"), reply(Some(elsewhere[0].id), "bad")],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let paginator = PostPaginator::new(f.repo.clone());
        let posts = paginator
            .list_thread_posts(f.first.id, &PostQuery::default())
            .await
            .unwrap();
        assert!(posts.is_empty(), "no partial insert");

        let err = f
            .store
            .insert_batch(&ThreadKey::Id(f.first.id), vec![reply(Some(424242), "orphan")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[actix_rt::test]
    async fn test_unknown_author_is_not_found() {
        let f = fixture().await;
        let mut post = reply(None, "hi");
        post.author = "mallory".to_owned();
        let err = f
            .store
            .insert_batch(&ThreadKey::Id(f.first.id), vec![reply(None, "ok"), post])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[actix_rt::test]
    async fn test_single_fetch_matches_listing() {
        let f = fixture().await;
        let root = f
            .store
            .insert_batch(&ThreadKey::Id(f.first.id), vec![reply(None, "root")])
            .await
            .unwrap();
        f.store
            .insert_batch(&ThreadKey::Id(f.first.id), vec![reply(Some(root[0].id), "child")])
            .await
            .unwrap();

        let paginator = PostPaginator::new(f.repo.clone());
        for sort in [SortMode::Flat, SortMode::Tree, SortMode::ParentTree] {
            let query = PostQuery {
                sort,
                ..PostQuery::default()
            };
            for listed in paginator.list_thread_posts(f.first.id, &query).await.unwrap() {
                let fetched = f.store.get_post(listed.id, Related::default()).await.unwrap();
                assert_eq!(fetched.post, listed);
            }
        }
    }

    #[actix_rt::test]
    async fn test_related_expansion() {
        let f = fixture().await;
        let post = f
            .store
            .insert_batch(&ThreadKey::Id(f.first.id), vec![reply(None, "root")])
            .await
            .unwrap()
            .remove(0);

        let details = f.store.get_post(post.id, Related::parse("user,forum")).await.unwrap();
        assert_eq!(details.author.unwrap().nickname, "Alice");
        assert_eq!(details.forum.unwrap().slug, "forum");
        assert!(details.thread.is_none());

        let err = f.store.get_post(post.id + 100, Related::default()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[actix_rt::test]
    async fn test_patch_sets_edited_only_on_change() {
        let f = fixture().await;
        let post = f
            .store
            .insert_batch(&ThreadKey::Id(f.first.id), vec![reply(None, "same")])
            .await
            .unwrap()
            .remove(0);

        let unchanged = f
            .store
            .patch_post(post.id, PostPatch { message: Some("same".to_owned()) })
            .await
            .unwrap();
        assert!(!unchanged.is_edited);

        let blank = f
            .store
            .patch_post(post.id, PostPatch { message: Some(String::new()) })
            .await
            .unwrap();
        assert!(!blank.is_edited);

        let edited = f
            .store
            .patch_post(post.id, PostPatch { message: Some("new".to_owned()) })
            .await
            .unwrap();
        assert!(edited.is_edited);
        assert_eq!(edited.message, "new");

        let err = f
            .store
            .patch_post(9999, PostPatch { message: Some("x".to_owned()) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
