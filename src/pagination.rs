use crate::error::{Error, Result};
use crate::models::{Post, ThreadKey};
use crate::path::AncestryPath;
use crate::repository::Repository;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

/// Retrieval mode for posts in a thread.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortMode {
    /// Insertion order, ignoring the reply tree.
    #[default]
    Flat,
    /// Pre-order traversal of the whole reply tree.
    Tree,
    /// Pages of whole root subtrees; `limit` counts roots.
    ParentTree,
}

impl SortMode {
    /// `flat` or an empty value select flat, `tree` selects tree and any
    /// other value selects parent_tree.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            None | Some("") | Some("flat") => SortMode::Flat,
            Some("tree") => SortMode::Tree,
            Some(_) => SortMode::ParentTree,
        }
    }
}

/// A continuation point already resolved to the ordering key of its mode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Cursor {
    /// Flat: the cursor post's id.
    Id(i64),
    /// Tree: the cursor post's full path.
    Path(AncestryPath),
    /// Parent tree: the id of the cursor post's root ancestor.
    Root(i64),
}

/// Resolved listing request handed to the repository.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PostRange {
    pub thread: i32,
    /// `None` is unbounded.
    pub limit: Option<u64>,
    pub cursor: Option<Cursor>,
    pub sort: SortMode,
    pub desc: bool,
}

/// Caller-facing listing parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PostQuery {
    /// Zero or absent is unbounded.
    pub limit: Option<u64>,
    /// Id of a previously seen post.
    pub since: Option<i64>,
    pub sort: SortMode,
    pub desc: bool,
}

pub struct PostPaginator {
    repo: Arc<dyn Repository>,
}

impl PostPaginator {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    /// Lists posts of the thread named by `key`. An unknown thread is
    /// `NotFound`; a known thread with nothing left to show is an empty page.
    pub async fn list_posts(&self, key: &ThreadKey, query: &PostQuery) -> Result<Vec<Post>> {
        let thread = self
            .repo
            .find_thread(key)
            .await?
            .ok_or_else(|| Error::not_found(format!("Can't find thread by slug or id: {}", key)))?;

        self.list_thread_posts(thread.id, query).await
    }

    /// Lists posts of a thread already known to exist.
    pub async fn list_thread_posts(&self, thread: i32, query: &PostQuery) -> Result<Vec<Post>> {
        let cursor = match query.since {
            None => None,
            Some(since) => match self.resolve_cursor(since, query.sort).await? {
                Some(cursor) => Some(cursor),
                // Nothing sorts relative to a post that does not exist.
                None => return Ok(Vec::new()),
            },
        };

        let range = PostRange {
            thread,
            limit: query.limit.filter(|l| *l > 0),
            cursor,
            sort: query.sort,
            desc: query.desc,
        };

        log::debug!("listing posts {:?}", range);
        Ok(self.repo.list_posts(&range).await?)
    }

    async fn resolve_cursor(&self, since: i64, sort: SortMode) -> Result<Option<Cursor>> {
        match sort {
            SortMode::Flat => Ok(Some(Cursor::Id(since))),
            SortMode::Tree => Ok(self
                .repo
                .find_post_by_id(since)
                .await?
                .map(|post| Cursor::Path(post.path))),
            SortMode::ParentTree => Ok(self
                .repo
                .find_post_by_id(since)
                .await?
                .and_then(|post| post.path.root_id())
                .map(Cursor::Root)),
        }
    }
}

fn directed(ordering: Ordering, desc: bool) -> Ordering {
    if desc {
        ordering.reverse()
    } else {
        ordering
    }
}

/// Strictly after the cursor in listing direction.
fn beyond<T: Ord>(key: &T, cursor: &T, desc: bool) -> bool {
    directed(key.cmp(cursor), desc) == Ordering::Greater
}

fn root_of(post: &Post) -> i64 {
    post.path.root_id().unwrap_or(post.id)
}

fn truncate<T>(items: &mut Vec<T>, limit: Option<u64>) {
    if let Some(limit) = limit {
        items.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
    }
}

/// Filters and orders the posts of one thread according to `range`.
///
/// This is the reference semantics of the listing; stores that cannot push
/// the query down (the in-memory store) call it directly.
pub fn arrange(posts: impl IntoIterator<Item = Post>, range: &PostRange) -> Vec<Post> {
    let desc = range.desc;
    let mut posts: Vec<Post> = posts
        .into_iter()
        .filter(|post| post.thread == range.thread)
        .collect();

    match range.sort {
        SortMode::Flat => {
            if let Some(cursor) = &range.cursor {
                let since = match cursor {
                    Cursor::Id(id) | Cursor::Root(id) => *id,
                    Cursor::Path(path) => path.leaf_id().unwrap_or_default(),
                };
                posts.retain(|post| beyond(&post.id, &since, desc));
            }
            posts.sort_by(|a, b| directed(a.id.cmp(&b.id), desc));
            truncate(&mut posts, range.limit);
        }
        SortMode::Tree => {
            if let Some(cursor) = &range.cursor {
                let since = match cursor {
                    Cursor::Path(path) => path.clone(),
                    Cursor::Id(id) | Cursor::Root(id) => AncestryPath::root(*id),
                };
                posts.retain(|post| beyond(&post.path, &since, desc));
            }
            posts.sort_by(|a, b| directed(a.path.cmp(&b.path), desc));
            truncate(&mut posts, range.limit);
        }
        SortMode::ParentTree => {
            let since = range.cursor.as_ref().map(|cursor| match cursor {
                Cursor::Root(id) | Cursor::Id(id) => *id,
                Cursor::Path(path) => path.root_id().unwrap_or_default(),
            });

            let mut roots: Vec<i64> = posts
                .iter()
                .filter(|post| post.parent.is_none())
                .map(|post| post.id)
                .filter(|id| since.map_or(true, |since| beyond(id, &since, desc)))
                .collect();
            roots.sort_by(|a, b| directed(a.cmp(b), desc));
            truncate(&mut roots, range.limit);

            let selected: HashSet<i64> = roots.into_iter().collect();
            posts.retain(|post| selected.contains(&root_of(post)));
            // Roots follow the listing direction, each subtree reads top-down.
            posts.sort_by(|a, b| {
                directed(root_of(a).cmp(&root_of(b)), desc).then_with(|| a.path.cmp(&b.path))
            });
        }
    }

    posts
}
