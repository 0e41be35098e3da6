use crate::error::CoreError;
use std::fmt;
use url::Url;

/// The origin every replayed request is redirected to.
///
/// Only the scheme and authority (host plus explicit port) of the parsed URL
/// are kept; any path, query, or credentials on the input are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    origin: Url,
    authority: String,
}

impl Target {
    /// Parse a target such as `https://replay.test` or `http://127.0.0.1:8080`.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let parsed = Url::parse(raw).map_err(|source| CoreError::TargetParse {
            target: raw.to_string(),
            source,
        })?;

        match parsed.scheme() {
            "http" | "https" => {}
            other => {
                return Err(CoreError::InvalidTarget {
                    target: raw.to_string(),
                    reason: format!("unsupported scheme '{other}'"),
                });
            }
        }

        let host = match parsed.host_str() {
            Some(h) if !h.is_empty() => h.to_string(),
            _ => {
                return Err(CoreError::InvalidTarget {
                    target: raw.to_string(),
                    reason: "missing host".into(),
                });
            }
        };

        let authority = match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host,
        };

        let mut origin = parsed;
        origin.set_path("/");
        origin.set_query(None);
        origin.set_fragment(None);
        // Both only fail for cannot-be-a-base URLs, which http(s) never are.
        let _ = origin.set_username("");
        let _ = origin.set_password(None);

        Ok(Self { origin, authority })
    }

    pub fn scheme(&self) -> &str {
        self.origin.scheme()
    }

    /// Host with explicit port, as sent in the `Host` header.
    pub fn host(&self) -> &str {
        &self.authority
    }

    /// Root URL of the target (`scheme://authority/`).
    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Move a logged URL onto this target.
    ///
    /// Relative references resolve against the target root. Scheme, host and
    /// port come from the target; path, query and fragment are kept as logged
    /// after WHATWG normalization: dot segments collapse, `%2e` counts as a
    /// dot and `\` becomes `/`.
    pub fn rewrite(&self, raw: &str) -> Result<Url, url::ParseError> {
        let logged = Url::options().base_url(Some(&self.origin)).parse(raw)?;

        let mut rewritten = self.origin.clone();
        rewritten.set_path(logged.path());
        rewritten.set_query(logged.query());
        rewritten.set_fragment(logged.fragment());
        Ok(rewritten)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme(), self.authority)
    }
}

impl std::str::FromStr for Target {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Target::parse(s)
    }
}
