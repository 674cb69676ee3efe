//! Launch parameters from the entry URL (`?token=...&showToken=1`)

use url::Url;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchParams {
    /// Secure token carried by the link
    pub token: Option<String>,
    /// Legacy flag: show the "token created" notice once
    pub show_token: bool,
}

impl LaunchParams {
    pub fn new(token: Option<String>, show_token: bool) -> Self {
        Self {
            token: token.filter(|t| !t.trim().is_empty()),
            show_token,
        }
    }

    /// Parse an entry URL; unknown query parameters are ignored
    pub fn from_url(raw: &str) -> Result<Self, url::ParseError> {
        let url = Url::parse(raw)?;
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "token" if !value.trim().is_empty() => params.token = Some(value.into_owned()),
                "showToken" => params.show_token = value == "1" || value == "true",
                _ => {}
            }
        }
        Ok(params)
    }
}
