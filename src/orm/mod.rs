pub mod forum_users;
pub mod forums;
pub mod posts;
pub mod threads;
pub mod users;
pub mod votes;
