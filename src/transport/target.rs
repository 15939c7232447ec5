//! Request target descriptor.

use std::fmt;

use url::Url;

/// Where a logical request goes: a base URL plus ordered query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    url: Url,
    query: Vec<(String, String)>,
}

impl Target {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            query: Vec::new(),
        }
    }

    /// Parse a URL string into a target.
    pub fn parse(url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new(Url::parse(url)?))
    }

    /// Append a query parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn base(&self) -> &Url {
        &self.url
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// Final URL with the query parameters encoded.
    pub fn to_url(&self) -> Url {
        let mut url = self.url.clone();
        if !self.query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(self.query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        url
    }

    /// Final URL with the `application_id` parameter masked, for logs.
    pub fn redacted(&self) -> String {
        let mut url = self.url.clone();
        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &self.query {
                if k == "application_id" {
                    pairs.append_pair(k, "***");
                } else {
                    pairs.append_pair(k, v);
                }
            }
        }
        url.to_string()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}
