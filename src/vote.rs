use crate::error::{Error, Reference, Result, StoreError};
use crate::models::{Thread, ThreadKey, Vote, Voice};
use crate::repository::Repository;
use std::sync::Arc;

/// Fallback updates attempted after a lost insert race before giving up.
const UPDATE_RETRIES: usize = 3;

/// One vote per (thread, user), the latest voice wins.
///
/// Casting is insert-then-update: a vote already on record makes the insert
/// fail on its key and the voice is updated instead. Two first votes of the
/// same user racing each other are both accepted; whichever update lands
/// last decides the stored voice, and the thread tally always equals the sum
/// of stored voices.
pub struct VoteLedger {
    repo: Arc<dyn Repository>,
}

impl VoteLedger {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    /// Returns the thread with its tally after the vote.
    pub async fn cast_vote(&self, key: &ThreadKey, nickname: &str, voice: Voice) -> Result<Thread> {
        let thread = self.find_thread(key).await?;
        let vote = Vote {
            thread: thread.id,
            nickname: nickname.to_owned(),
            voice,
        };

        match self.repo.insert_vote(&vote).await {
            Ok(()) => {}
            Err(StoreError::UniqueViolation(_)) => self.update(&vote).await?,
            Err(StoreError::ReferenceViolation(Reference::User)) => {
                return Err(Error::not_found(format!(
                    "Can't find user with nickname: {}",
                    nickname
                )))
            }
            Err(StoreError::ReferenceViolation(Reference::Thread)) => {
                return Err(Error::not_found(format!("Can't find thread: {}", key)))
            }
            Err(err) => return Err(err.into()),
        }

        self.find_thread(&ThreadKey::Id(thread.id)).await
    }

    async fn update(&self, vote: &Vote) -> Result<()> {
        for _ in 0..UPDATE_RETRIES {
            match self.repo.update_vote(vote).await {
                Ok(()) => return Ok(()),
                // The competing row is gone again; try inserting once more.
                Err(StoreError::NotFound) => match self.repo.insert_vote(vote).await {
                    Ok(()) => return Ok(()),
                    Err(StoreError::UniqueViolation(_)) => continue,
                    Err(err) => return Err(err.into()),
                },
                Err(err) => return Err(err.into()),
            }
        }

        log::warn!(
            "vote of {} on thread {} kept losing races",
            vote.nickname,
            vote.thread
        );
        Err(Error::conflict("Vote could not be recorded, try again"))
    }

    async fn find_thread(&self, key: &ThreadKey) -> Result<Thread> {
        self.repo
            .find_thread(key)
            .await?
            .ok_or_else(|| Error::not_found(format!("Can't find thread by slug or id: {}", key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{now, NewForum, NewThread, NewUser};
    use crate::store::memory::MemoryRepository;
    use futures_util::future::join_all;

    async fn ledger() -> (VoteLedger, Thread) {
        let repo = Arc::new(MemoryRepository::new());
        for nickname in ["Alice", "Bob"] {
            repo.create_user(&NewUser {
                nickname: nickname.to_owned(),
                fullname: nickname.to_owned(),
                email: format!("{}@example.com", nickname),
                about: String::new(),
            })
            .await
            .unwrap();
        }
        repo.create_forum(&NewForum {
            slug: "forum".to_owned(),
            title: "Forum".to_owned(),
            user: "Alice".to_owned(),
        })
        .await
        .unwrap();
        let thread = repo
            .create_thread(
                &NewThread {
                    forum: "forum".to_owned(),
                    slug: Some("polls".to_owned()),
                    author: "Alice".to_owned(),
                    title: "Poll".to_owned(),
                    message: "Vote!".to_owned(),
                    created: None,
                },
                now(),
            )
            .await
            .unwrap();

        (VoteLedger::new(repo), thread)
    }

    #[actix_rt::test]
    async fn test_latest_vote_wins() {
        let (ledger, thread) = ledger().await;
        let key = ThreadKey::Id(thread.id);

        let after_up = ledger.cast_vote(&key, "alice", Voice::Up).await.unwrap();
        assert_eq!(after_up.votes, 1);
        let after_down = ledger.cast_vote(&key, "ALICE", Voice::Down).await.unwrap();
        assert_eq!(after_down.votes, -1);
        let repeated = ledger.cast_vote(&key, "alice", Voice::Down).await.unwrap();
        assert_eq!(repeated.votes, -1);

        let other = ledger
            .cast_vote(&ThreadKey::Slug("POLLS".to_owned()), "bob", Voice::Down)
            .await
            .unwrap();
        assert_eq!(other.votes, -2);
    }

    #[actix_rt::test]
    async fn test_missing_thread_or_user() {
        let (ledger, _) = ledger().await;
        let err = ledger
            .cast_vote(&ThreadKey::Slug("nope".to_owned()), "alice", Voice::Up)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let err = ledger
            .cast_vote(&ThreadKey::Slug("polls".to_owned()), "carol", Voice::Up)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(msg) if msg.contains("carol")));
    }

    #[actix_rt::test]
    async fn test_concurrent_first_votes_of_one_user() {
        let (ledger, thread) = ledger().await;
        let key = ThreadKey::Id(thread.id);

        let voices = [Voice::Up, Voice::Down, Voice::Up, Voice::Down, Voice::Up];
        let results = join_all(
            voices
                .iter()
                .map(|voice| ledger.cast_vote(&key, "bob", *voice)),
        )
        .await;
        assert!(results.iter().all(|r| r.is_ok()), "{:?}", results);

        // A single stored vote, so the tally is exactly one voice.
        let tally = ledger.find_thread(&key).await.unwrap().votes;
        assert!(tally == 1 || tally == -1, "tally {}", tally);
    }
}
