use colored::Colorize;
use std::fmt::{self, Display, Formatter};

/// Errors surfaced by loading, searching, or downloading from the catalog.
#[derive(Debug)]
pub struct CatalogError {
    kind: CatalogErrorKind,
}

impl CatalogError {
    /// The remote tree-listing or raw-content request failed.
    pub fn remote_fetch_failed(err: reqwest::Error) -> Self {
        Self {
            kind: CatalogErrorKind::RemoteFetchFailed(err),
        }
    }

    /// A response body did not parse as the expected JSON shape.
    pub fn malformed_response(detail: impl Into<String>) -> Self {
        Self {
            kind: CatalogErrorKind::MalformedResponse(detail.into()),
        }
    }

    /// Reading or writing the on-disk cache failed.
    pub fn cache_io(err: std::io::Error) -> Self {
        Self {
            kind: CatalogErrorKind::CacheIo(err),
        }
    }

    /// The requested UID is not present in the loaded index.
    pub fn not_found(uid: impl Into<String>) -> Self {
        Self {
            kind: CatalogErrorKind::NotFound(uid.into()),
        }
    }
}

#[derive(Debug)]
enum CatalogErrorKind {
    RemoteFetchFailed(reqwest::Error),
    MalformedResponse(String),
    CacheIo(std::io::Error),
    NotFound(String),
}

impl Display for CatalogError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let msg = match &self.kind {
            CatalogErrorKind::RemoteFetchFailed(err) => {
                format!("{} {err}", "CATALOG REMOTE FETCH FAILED:".underline())
            }
            CatalogErrorKind::MalformedResponse(detail) => {
                format!("{} {detail}", "CATALOG MALFORMED RESPONSE:".underline())
            }
            CatalogErrorKind::CacheIo(err) => {
                format!("{} {err}", "CATALOG CACHE IO ERROR:".underline())
            }
            CatalogErrorKind::NotFound(uid) => {
                format!("{} no entry with UID {uid}", "CATALOG NOT FOUND:".underline())
            }
        };
        f.write_str(&msg)
    }
}

impl std::error::Error for CatalogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            CatalogErrorKind::RemoteFetchFailed(err) => Some(err),
            CatalogErrorKind::CacheIo(err) => Some(err),
            CatalogErrorKind::MalformedResponse(_) | CatalogErrorKind::NotFound(_) => None,
        }
    }
}

impl From<reqwest::Error> for CatalogError {
    fn from(err: reqwest::Error) -> Self {
        Self::remote_fetch_failed(err)
    }
}

impl From<std::io::Error> for CatalogError {
    fn from(err: std::io::Error) -> Self {
        Self::cache_io(err)
    }
}
