//! Request verbs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// HTTP verb of a request envelope. Fixed once the envelope is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestMethod {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
    /// `PUT`
    Put,
    /// `HEAD`
    Head,
    /// `OPTIONS`
    Options,
    /// `TRACE`
    Trace,
}

impl RequestMethod {
    /// Upper-case wire name of the verb.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Put => "PUT",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Trace => "TRACE",
        }
    }

    /// Whether a request body is meaningful for this verb.
    pub const fn allows_body(&self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch | Self::Delete)
    }
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestMethod {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "PUT" => Ok(Self::Put),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            "TRACE" => Ok(Self::Trace),
            _ => Err(ConfigurationError::UnknownMethod(s.to_owned())),
        }
    }
}

impl From<RequestMethod> for http::Method {
    fn from(method: RequestMethod) -> Self {
        match method {
            RequestMethod::Get => http::Method::GET,
            RequestMethod::Post => http::Method::POST,
            RequestMethod::Patch => http::Method::PATCH,
            RequestMethod::Delete => http::Method::DELETE,
            RequestMethod::Put => http::Method::PUT,
            RequestMethod::Head => http::Method::HEAD,
            RequestMethod::Options => http::Method::OPTIONS,
            RequestMethod::Trace => http::Method::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("patch".parse::<RequestMethod>().unwrap(), RequestMethod::Patch);
        assert_eq!("TRACE".parse::<RequestMethod>().unwrap(), RequestMethod::Trace);
        assert!("FETCH".parse::<RequestMethod>().is_err());
    }

    #[test]
    fn test_into_http_method() {
        let method: http::Method = RequestMethod::Options.into();
        assert_eq!(method, http::Method::OPTIONS);
        assert_eq!(RequestMethod::Delete.to_string(), "DELETE");
    }
}
