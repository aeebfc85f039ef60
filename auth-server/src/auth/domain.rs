// auth-server/src/auth/domain.rs
//! Host/port normalization for domain binding.
//!
//! Accepts bare hosts, `host:port`, `[ipv6]:port` and full URLs. Never fails:
//! input that cannot be understood yields an empty host, which matches nothing.

use std::fmt;

use url::Url;

const LOCALHOST: &str = "localhost";

/// Hosts collapsed to `localhost`
const LOOPBACK_ALIASES: [&str; 4] = ["localhost", "127.0.0.1", "::1", "[::1]"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalDomain {
    pub host: String,
    /// Only set for non-default ports
    pub port: Option<u16>,
}

impl CanonicalDomain {
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if input.is_empty() {
            return Self::default();
        }

        parse_with_url(input)
            .unwrap_or_else(|| parse_manually(input))
            .normalized()
    }

    pub fn is_localhost(&self) -> bool {
        self.host == LOCALHOST
    }

    /// Host equality is mandatory; port equality too unless the host is localhost.
    /// An empty host never matches.
    pub fn matches(&self, other: &CanonicalDomain) -> bool {
        if self.host.is_empty() || other.host.is_empty() || self.host != other.host {
            return false;
        }
        self.is_localhost() || self.port == other.port
    }

    fn normalized(mut self) -> Self {
        self.host = self.host.trim_end_matches('.').to_lowercase();
        if LOOPBACK_ALIASES.contains(&self.host.as_str()) {
            self.host = LOCALHOST.to_string();
        }
        self
    }
}

impl fmt::Display for CanonicalDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // IPv6 literals keep their brackets so the port stays unambiguous
        if self.host.contains(':') {
            write!(f, "[{}]", self.host)?;
        } else {
            write!(f, "{}", self.host)?;
        }
        match self.port {
            Some(port) => write!(f, ":{}", port),
            None => Ok(()),
        }
    }
}

/// `canonicalize("Example.COM:443") == "example.com"`
pub fn canonicalize(input: &str) -> String {
    CanonicalDomain::parse(input).to_string()
}

pub fn domains_match(expected: &str, actual: &str) -> bool {
    CanonicalDomain::parse(expected).matches(&CanonicalDomain::parse(actual))
}

// Bare hosts are read as https, so :443 is the default port for them.
fn parse_with_url(input: &str) -> Option<CanonicalDomain> {
    let url = if input.contains("://") {
        Url::parse(input).ok()?
    } else {
        Url::parse(&format!("https://{}", input)).ok()?
    };

    let host = url.host_str()?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    Some(CanonicalDomain {
        host: host.to_string(),
        port: url.port(),
    })
}

fn parse_manually(input: &str) -> CanonicalDomain {
    let rest = match input.split_once("://") {
        Some((_, rest)) => rest,
        None => input,
    };
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let authority = match authority.rsplit_once('@') {
        Some((_, host)) => host,
        None => authority,
    };

    if let Some(inner) = authority.strip_prefix('[') {
        return match inner.split_once(']') {
            Some((host, tail)) => CanonicalDomain {
                host: host.to_string(),
                port: tail.strip_prefix(':').and_then(parse_port),
            },
            None => CanonicalDomain::default(),
        };
    }

    match authority.rsplit_once(':') {
        // A remaining ':' means an unbracketed IPv6 literal, not a port
        Some((host, port)) if !host.contains(':') && is_numeric(port) => CanonicalDomain {
            host: host.to_string(),
            port: parse_port(port),
        },
        _ => CanonicalDomain {
            host: authority.to_string(),
            port: None,
        },
    }
}

fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn parse_port(s: &str) -> Option<u16> {
    if is_numeric(s) {
        s.parse().ok()
    } else {
        None
    }
}
