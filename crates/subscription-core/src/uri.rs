//! Minimal SIP URI parsing
//!
//! Only the pieces the subscription manager needs are extracted: scheme,
//! user part, host part and port. Parameters and headers after the host are
//! accepted and ignored.
//!
//! A subscribed resource is addressed through the user part of the request
//! URI. A short lowercase tag followed by `-` may prefix the identifier so a
//! mailbox can be referred to as `vm-1234` as well as `1234`.

use std::fmt;
use std::str::FromStr;

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag_no_case, take_while1},
    character::complete::{char, digit1},
    combinator::{map, map_res, opt, recognize},
    sequence::{delimited, preceded, terminated, tuple},
    IResult,
};

use crate::error::{Result, SubscriptionError};

/// Parsed `sip:` / `sips:` URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SipUri {
    scheme: String,
    user: Option<String>,
    password: Option<String>,
    host: String,
    port: Option<u16>,
}

fn scheme(input: &str) -> IResult<&str, &str> {
    terminated(alt((tag_no_case("sips"), tag_no_case("sip"))), char(':'))(input)
}

// userinfo = user [ ":" password ] "@"
fn userinfo(input: &str) -> IResult<&str, (&str, Option<&str>)> {
    terminated(
        tuple((is_not(":@"), opt(preceded(char(':'), is_not("@"))))),
        char('@'),
    )(input)
}

fn is_host_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_'
}

// host = hostname / IPv4address / IPv6reference
fn host(input: &str) -> IResult<&str, &str> {
    alt((
        recognize(delimited(char('['), is_not("]"), char(']'))),
        take_while1(is_host_char),
    ))(input)
}

fn port(input: &str) -> IResult<&str, u16> {
    preceded(char(':'), map_res(digit1, |digits: &str| digits.parse::<u16>()))(input)
}

fn sip_uri(input: &str) -> IResult<&str, SipUri> {
    map(
        tuple((scheme, opt(userinfo), host, opt(port))),
        |(scheme, userinfo, host, port)| SipUri {
            scheme: scheme.to_ascii_lowercase(),
            user: userinfo.map(|(user, _)| user.to_string()),
            password: userinfo.and_then(|(_, password)| password.map(str::to_string)),
            host: host.to_string(),
            port,
        },
    )(input)
}

impl SipUri {
    /// Parse a URI in addr-spec (`sip:user@host`) or name-addr
    /// (`"Name" <sip:user@host>;tag=x`) form.
    pub fn parse(input: &str) -> Result<Self> {
        let addr = strip_angle_brackets(input.trim());
        match sip_uri(addr) {
            Ok((_rest, uri)) => Ok(uri),
            Err(_) => Err(SubscriptionError::InvalidUri(input.to_string())),
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// User part without any password component
    pub fn user_part(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn host_part(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Identifier of the subscribed resource.
    ///
    /// The user part with an optional `[a-z]*-` prefix removed. Returns
    /// `None` when the URI has no user part.
    pub fn resource_key(&self) -> Option<&str> {
        let user = self.user.as_deref().filter(|user| !user.is_empty())?;
        Some(strip_tag_prefix(user))
    }
}

fn strip_tag_prefix(user: &str) -> &str {
    match user.split_once('-') {
        Some((prefix, rest))
            if !rest.is_empty() && prefix.bytes().all(|b| b.is_ascii_lowercase()) =>
        {
            rest
        }
        _ => user,
    }
}

/// Content of the first `<...>` pair, or the input unchanged.
pub fn strip_angle_brackets(text: &str) -> &str {
    if let Some(start) = text.find('<') {
        let inner = &text[start + 1..];
        if let Some(end) = inner.find('>') {
            let candidate = &inner[..end];
            if !candidate.contains('<') {
                return candidate;
            }
        }
    }
    text
}

impl FromStr for SipUri {
    type Err = SubscriptionError;

    fn from_str(s: &str) -> Result<Self> {
        SipUri::parse(s)
    }
}

impl fmt::Display for SipUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.scheme)?;
        if let Some(user) = &self.user {
            write!(f, "{}", user)?;
            if let Some(password) = &self.password {
                write!(f, ":{}", password)?;
            }
            write!(f, "@")?;
        }
        write!(f, "{}", self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        Ok(())
    }
}
