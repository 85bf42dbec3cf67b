use derive_more::Display;

pub type Result<T> = std::result::Result<T, Error>;

/// Natural keys the store enforces uniqueness on.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum UniqueKey {
    #[display(fmt = "nickname")]
    Nickname,
    #[display(fmt = "email")]
    Email,
    #[display(fmt = "forum slug")]
    ForumSlug,
    #[display(fmt = "thread slug")]
    ThreadSlug,
    #[display(fmt = "vote")]
    Vote,
}

/// Referenced entities the store checks for existence.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum Reference {
    #[display(fmt = "user")]
    User,
    #[display(fmt = "forum")]
    Forum,
    #[display(fmt = "thread")]
    Thread,
    #[display(fmt = "parent post")]
    ParentPost,
}

/// Classified failure surfaced by a repository.
///
/// Classification happens once, inside the store implementation. Business
/// logic branches on these variants and never inspects driver messages.
#[derive(Clone, Debug, Display, PartialEq, Eq)]
pub enum StoreError {
    #[display(fmt = "unique violation on {}", _0)]
    UniqueViolation(UniqueKey),
    #[display(fmt = "missing {}", _0)]
    ReferenceViolation(Reference),
    #[display(fmt = "row not found")]
    NotFound,
    #[display(fmt = "store failure: {}", _0)]
    StoreFailure(String),
}

impl std::error::Error for StoreError {}

/// Failure kinds exposed by the core to its callers.
#[derive(Clone, Debug, Display, PartialEq, Eq)]
pub enum Error {
    /// Malformed input or unparseable query parameter.
    #[display(fmt = "{}", _0)]
    BadRequest(String),
    /// A user, forum, thread or post referenced by key does not exist.
    #[display(fmt = "{}", _0)]
    NotFound(String),
    /// Uniqueness collision or structural conflict.
    #[display(fmt = "{}", _0)]
    Conflict(String),
    /// Unexpected store failure. The message is for logs only.
    #[display(fmt = "{}", _0)]
    Internal(String),
}

impl std::error::Error for Error {}

impl Error {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}

/// Default re-classification at the core boundary. Components that know
/// better (post parent checks, the registrar) match on `StoreError` first.
impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(key) => {
                Error::Conflict(format!("Can't save: {} is already taken", key))
            }
            StoreError::ReferenceViolation(reference) => {
                Error::NotFound(format!("Can't find {}", reference))
            }
            StoreError::NotFound => Error::NotFound("Can't find requested item".to_owned()),
            StoreError::StoreFailure(msg) => {
                log::error!("store failure: {}", msg);
                Error::Internal(msg)
            }
        }
    }
}
