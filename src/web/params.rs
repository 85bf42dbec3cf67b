//! Query string parsing shared by the listing routes.
//!
//! Values arrive as raw strings so a malformed one is reported as a bad
//! request naming the parameter instead of a generic deserialize failure.

use crate::error::{Error, Result};
use crate::models::Related;
use crate::pagination::{PostQuery, SortMode};
use crate::service::{ThreadQuery, UserQuery};
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<String>,
    pub since: Option<String>,
    pub desc: Option<String>,
    pub sort: Option<String>,
}

impl ListParams {
    fn limit(&self) -> Result<Option<u64>> {
        match present(&self.limit) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<u64>()
                .map(Some)
                .map_err(|_| Error::bad_request(format!("limit must be a non-negative integer, got {}", raw))),
        }
    }

    fn desc(&self) -> Result<bool> {
        match present(&self.desc) {
            None => Ok(false),
            Some(raw) => raw
                .parse::<bool>()
                .map_err(|_| Error::bad_request(format!("desc must be true or false, got {}", raw))),
        }
    }

    pub fn threads(&self) -> Result<ThreadQuery> {
        let since = match present(&self.since) {
            None => None,
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(raw)
                    .map(|since| since.with_timezone(&Utc))
                    .map_err(|_| Error::bad_request(format!("since must be an RFC 3339 time, got {}", raw)))?,
            ),
        };

        Ok(ThreadQuery {
            limit: self.limit()?,
            since,
            desc: self.desc()?,
        })
    }

    pub fn users(&self) -> Result<UserQuery> {
        Ok(UserQuery {
            limit: self.limit()?,
            since: present(&self.since).map(str::to_owned),
            desc: self.desc()?,
        })
    }

    pub fn posts(&self) -> Result<PostQuery> {
        let since = match present(&self.since) {
            None => None,
            Some(raw) => Some(
                raw.parse::<i64>()
                    .map_err(|_| Error::bad_request(format!("since must be a post id, got {}", raw)))?,
            ),
        };

        Ok(PostQuery {
            limit: self.limit()?,
            since,
            sort: SortMode::parse(self.sort.as_deref()),
            desc: self.desc()?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RelatedParams {
    pub related: Option<String>,
}

impl RelatedParams {
    pub fn related(&self) -> Related {
        self.related.as_deref().map(Related::parse).unwrap_or_default()
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(limit: Option<&str>, since: Option<&str>, desc: Option<&str>) -> ListParams {
        ListParams {
            limit: limit.map(str::to_owned),
            since: since.map(str::to_owned),
            desc: desc.map(str::to_owned),
            sort: None,
        }
    }

    #[test]
    fn test_bad_values_are_rejected() {
        assert!(params(Some("-1"), None, None).posts().is_err());
        assert!(params(Some("ten"), None, None).users().is_err());
        assert!(params(None, None, Some("yes")).threads().is_err());
        assert!(params(None, Some("yesterday"), None).threads().is_err());
        assert!(params(None, Some("abc"), None).posts().is_err());
    }

    #[test]
    fn test_blank_values_are_absent() {
        let query = params(Some(""), Some(""), Some("")).posts().unwrap();
        assert_eq!(query, PostQuery::default());
    }

    #[test]
    fn test_thread_since_is_a_timestamp() {
        let query = params(Some("3"), Some("2017-01-01T00:00:00.000+03:00"), Some("true"))
            .threads()
            .unwrap();
        assert_eq!(query.limit, Some(3));
        assert!(query.desc);
        assert_eq!(
            query.since.unwrap().to_rfc3339(),
            "2016-12-31T21:00:00+00:00"
        );
    }
}
