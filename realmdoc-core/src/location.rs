//! Store locations and the classification step that precedes opening.
//!
//! Classification is pure: it looks at the shape of the input (scheme,
//! host, extension) and never touches the filesystem. Whether a local path
//! exists, is a regular file, or lives in an accessible directory is decided
//! later by [`Document::open_local`](crate::Document::open_local).

use std::path::{Path, PathBuf};

use url::Url;

use crate::settings::OpenerSettings;

/// Why an input was not accepted as a store location.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    #[error("expected a .{expected} file")]
    WrongExtension { expected: String },

    #[error("path has no file extension")]
    MissingExtension,

    #[error("unsupported URL scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("sync URL has no host")]
    MissingHost,

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Result of classifying a user-supplied target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// A filesystem path carrying the store extension.
    Local(PathBuf),
    /// A sync URL with a host.
    Remote(SyncUrl),
    /// Neither; no document should be opened.
    Rejected(RejectReason),
}

/// Classifies `input` as a local store path, a sync URL, or neither.
pub fn classify(input: &str, settings: &OpenerSettings) -> Classification {
    let input = input.trim();

    match Url::parse(input) {
        // Single-letter schemes are Windows drive prefixes, not URLs.
        Ok(url) if url.scheme().len() > 1 => {
            if url.scheme() == "file" {
                return match url.to_file_path() {
                    Ok(path) => classify_path(path, settings),
                    Err(()) => Classification::Rejected(RejectReason::InvalidUrl(input.to_string())),
                };
            }
            if settings.is_sync_scheme(url.scheme()) {
                return match SyncUrl::from_url(url, settings) {
                    Ok(sync_url) => Classification::Remote(sync_url),
                    Err(reason) => Classification::Rejected(reason),
                };
            }
            Classification::Rejected(RejectReason::UnsupportedScheme(url.scheme().to_string()))
        }
        _ => classify_path(PathBuf::from(input), settings),
    }
}

fn classify_path(path: PathBuf, settings: &OpenerSettings) -> Classification {
    match check_extension(&path, &settings.store_extension) {
        Ok(()) => Classification::Local(path),
        Err(reason) => Classification::Rejected(reason),
    }
}

/// Checks that `path` ends in `.{extension}` (case-insensitive).
pub fn check_extension(path: &Path, extension: &str) -> Result<(), RejectReason> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case(extension) => Ok(()),
        Some(_) => Err(RejectReason::WrongExtension {
            expected: extension.to_string(),
        }),
        None => Err(RejectReason::MissingExtension),
    }
}

/// A sync store address, guaranteed to carry a host.
///
/// The auth server derived from it is computed once at parse time: the
/// secure scheme maps to `https`, anything else to `http`, and host and port
/// are copied verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncUrl {
    url: Url,
    secure: bool,
    derived_auth_server: Url,
}

impl SyncUrl {
    /// Parses `input` as a sync URL.
    pub fn parse(input: &str, settings: &OpenerSettings) -> Result<Self, RejectReason> {
        let url = Url::parse(input).map_err(|e| RejectReason::InvalidUrl(e.to_string()))?;
        Self::from_url(url, settings)
    }

    /// Validates an already parsed URL as a sync URL.
    pub fn from_url(url: Url, settings: &OpenerSettings) -> Result<Self, RejectReason> {
        if !settings.is_sync_scheme(url.scheme()) {
            return Err(RejectReason::UnsupportedScheme(url.scheme().to_string()));
        }
        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host,
            _ => return Err(RejectReason::MissingHost),
        };

        let secure = settings.is_secure_scheme(url.scheme());
        let scheme = if secure { "https" } else { "http" };
        let auth = match url.port() {
            Some(port) => format!("{}://{}:{}", scheme, host, port),
            None => format!("{}://{}", scheme, host),
        };
        let derived_auth_server =
            Url::parse(&auth).map_err(|e| RejectReason::InvalidUrl(e.to_string()))?;

        Ok(Self {
            url,
            secure,
            derived_auth_server,
        })
    }

    /// The sync URL as supplied.
    pub fn as_url(&self) -> &Url {
        &self.url
    }

    /// The sync URL as a string.
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Whether the URL uses the secure sync scheme.
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Host of the sync server.
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Explicit port of the sync server, if any.
    pub fn port(&self) -> Option<u16> {
        self.url.port()
    }

    /// Path of the store on the sync server.
    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Auth server address derived from the sync URL.
    pub fn derived_auth_server(&self) -> &Url {
        &self.derived_auth_server
    }
}

impl std::fmt::Display for SyncUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Where a document's store lives. Fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    Local(PathBuf),
    Remote { sync_url: SyncUrl, auth_server: Url },
}

impl StoreLocation {
    /// Builds a remote location, deriving the auth server when not given.
    pub fn remote(sync_url: SyncUrl, auth_server: Option<Url>) -> Self {
        let auth_server = auth_server.unwrap_or_else(|| sync_url.derived_auth_server().clone());
        StoreLocation::Remote {
            sync_url,
            auth_server,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, StoreLocation::Remote { .. })
    }

    /// Name shown to the user: the full sync address for remote stores, the
    /// file name without extension for local ones.
    pub fn display_name(&self) -> String {
        match self {
            StoreLocation::Remote { sync_url, .. } => sync_url.as_str().to_string(),
            StoreLocation::Local(path) => path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        }
    }
}
