use crate::error::Error;
use crate::path::AncestryPath;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Current time at the precision the store keeps (microseconds), so values
/// handed back from an insert compare equal to values read back later.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Blank strings in patches and optional keys mean "not supplied".
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub nickname: String,
    pub fullname: String,
    pub email: String,
    pub about: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Forum {
    pub slug: String,
    pub title: String,
    /// Nickname of the owning user.
    #[serde(rename = "user")]
    pub owner: String,
    pub threads: i32,
    pub posts: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    pub forum: String,
    pub author: String,
    pub title: String,
    pub message: String,
    pub created: DateTime<Utc>,
    pub votes: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub thread: i32,
    pub forum: String,
    pub author: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<i64>,
    #[serde(skip)]
    pub path: AncestryPath,
    pub created: DateTime<Utc>,
    #[serde(rename = "isEdited")]
    pub is_edited: bool,
}

#[derive(Clone, Debug)]
pub struct NewUser {
    pub nickname: String,
    pub fullname: String,
    pub email: String,
    pub about: String,
}

impl From<NewUser> for User {
    fn from(user: NewUser) -> Self {
        Self {
            nickname: user.nickname,
            fullname: user.fullname,
            email: user.email,
            about: user.about,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct UserPatch {
    pub fullname: Option<String>,
    pub email: Option<String>,
    pub about: Option<String>,
}

impl UserPatch {
    pub fn normalized(self) -> Self {
        Self {
            fullname: non_empty(self.fullname),
            email: non_empty(self.email),
            about: non_empty(self.about),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fullname.is_none() && self.email.is_none() && self.about.is_none()
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewForum {
    pub slug: String,
    pub title: String,
    /// Nickname of the owning user, matched case-insensitively.
    pub user: String,
}

#[derive(Clone, Debug)]
pub struct NewThread {
    pub forum: String,
    pub slug: Option<String>,
    pub author: String,
    pub title: String,
    pub message: String,
    /// Explicit creation time for imports. Absent means "now".
    pub created: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ThreadPatch {
    pub title: Option<String>,
    pub message: Option<String>,
}

impl ThreadPatch {
    pub fn normalized(self) -> Self {
        Self {
            title: non_empty(self.title),
            message: non_empty(self.message),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.message.is_none()
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewPost {
    /// Parent post id. Zero is treated the same as absent.
    #[serde(default)]
    pub parent: Option<i64>,
    pub author: String,
    pub message: String,
}

impl NewPost {
    pub fn parent_id(&self) -> Option<i64> {
        self.parent.filter(|id| *id != 0)
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct PostPatch {
    pub message: Option<String>,
}

/// Thread lookup key as it appears in `/thread/{slug_or_id}` routes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ThreadKey {
    Id(i32),
    Slug(String),
}

impl ThreadKey {
    /// Numeric keys are ids, anything else is a slug.
    pub fn parse(raw: &str) -> Self {
        match raw.parse::<i32>() {
            Ok(id) => Self::Id(id),
            Err(_) => Self::Slug(raw.to_owned()),
        }
    }
}

impl std::fmt::Display for ThreadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{}", id),
            Self::Slug(slug) => f.write_str(slug),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Voice {
    Up,
    Down,
}

impl Voice {
    pub fn value(self) -> i32 {
        match self {
            Voice::Up => 1,
            Voice::Down => -1,
        }
    }
}

impl TryFrom<i32> for Voice {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Voice::Up),
            -1 => Ok(Voice::Down),
            other => Err(Error::bad_request(format!(
                "Voice must be 1 or -1, got {}",
                other
            ))),
        }
    }
}

/// A vote as the ledger stores it, keyed by (thread, nickname).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vote {
    pub thread: i32,
    pub nickname: String,
    pub voice: Voice,
}

/// Entities inlined next to a single post fetch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Related {
    pub user: bool,
    pub thread: bool,
    pub forum: bool,
}

impl Related {
    /// Parses a comma-separated `related` list. Unknown entries are ignored.
    pub fn parse(raw: &str) -> Self {
        let mut related = Self::default();
        for item in raw.split(',').map(str::trim) {
            match item {
                "user" => related.user = true,
                "thread" => related.thread = true,
                "forum" => related.forum = true,
                _ => {}
            }
        }
        related
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PostDetails {
    pub post: Post,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread: Option<Thread>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forum: Option<Forum>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub user: i64,
    pub forum: i64,
    pub thread: i64,
    pub post: i64,
}
