//! 스토리지 URI 검사
//!
//! `scheme://authority/database?options` 형식만 받습니다.
//! 데이터베이스 이름이 비어 있으면 에러입니다.

use std::fmt;

use crate::error::StorageError;

/// 검증된 스토리지 URI
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageUri {
    raw: String,
    scheme_end: usize,
    database: String,
}

impl StorageUri {
    /// URI를 파싱하고 검증합니다.
    pub fn parse(uri: &str) -> Result<Self, StorageError> {
        let raw = uri.trim();
        let invalid = |reason: &str| StorageError::InvalidUri {
            uri: raw.to_owned(),
            reason: reason.to_owned(),
        };

        let Some(scheme_end) = raw.find("://") else {
            return Err(invalid("missing scheme"));
        };
        let scheme = &raw[..scheme_end];
        if scheme.is_empty()
            || !scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        {
            return Err(invalid("invalid scheme"));
        }

        let rest = &raw[scheme_end + 3..];
        let path = match rest.find('/') {
            Some(i) => &rest[i + 1..],
            None => "",
        };
        let database = path.split(['?', '#']).next().unwrap_or_default();
        if database.is_empty() {
            return Err(invalid("empty database name"));
        }
        if database.contains('/') {
            return Err(invalid("database name must not contain '/'"));
        }

        Ok(Self {
            raw: raw.to_owned(),
            scheme_end,
            database: database.to_owned(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn scheme(&self) -> &str {
        &self.raw[..self.scheme_end]
    }

    pub fn database(&self) -> &str {
        &self.database
    }
}

impl fmt::Display for StorageUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mongodb_uri() {
        let uri = StorageUri::parse("mongodb://127.0.0.1:27017/gauntlet?w=1").unwrap();
        assert_eq!(uri.scheme(), "mongodb");
        assert_eq!(uri.database(), "gauntlet");
        assert_eq!(uri.as_str(), "mongodb://127.0.0.1:27017/gauntlet?w=1");
    }

    #[test]
    fn parses_memory_uri() {
        let uri = StorageUri::parse(" memory://local/test ").unwrap();
        assert_eq!(uri.scheme(), "memory");
        assert_eq!(uri.database(), "test");
    }

    #[test]
    fn rejects_empty_database() {
        for uri in [
            "mongodb://127.0.0.1:27017",
            "mongodb://127.0.0.1:27017/",
            "mongodb://127.0.0.1:27017/?w=1",
        ] {
            let err = StorageUri::parse(uri).unwrap_err();
            assert!(err.to_string().contains("empty database name"), "{uri}: {err}");
        }
    }

    #[test]
    fn rejects_missing_scheme() {
        let err = StorageUri::parse("127.0.0.1:27017/db").unwrap_err();
        assert!(err.to_string().contains("missing scheme"));
        assert!(StorageUri::parse("://host/db").is_err());
    }
}
