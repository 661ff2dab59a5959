//! Request signing for the stream source.
//!
//! The stream source authenticates with OAuth 1.0a (HMAC-SHA1). Consumer and
//! access credentials come from the environment:
//!
//! | Variable                  | Meaning                |
//! |---------------------------|------------------------|
//! | `SP_TWITTER_KEY`          | consumer key           |
//! | `SP_TWITTER_SECRET`       | consumer secret        |
//! | `SP_TWITTER_ACCESSTOKEN`  | access token           |
//! | `SP_TWITTER_ACCESSSECRET` | access token secret    |

use reqwest::RequestBuilder;
use reqwest::header::AUTHORIZATION;

use crate::error::{AppError, Result};

pub const CONSUMER_KEY_ENV: &str = "SP_TWITTER_KEY";
pub const CONSUMER_SECRET_ENV: &str = "SP_TWITTER_SECRET";
pub const ACCESS_TOKEN_ENV: &str = "SP_TWITTER_ACCESSTOKEN";
pub const ACCESS_SECRET_ENV: &str = "SP_TWITTER_ACCESSSECRET";

/// Form parameters of a filter request. Signed along with the URL.
#[derive(Debug, Clone, oauth::Request)]
pub struct FilterParams<'a> {
    pub track: &'a str,
}

/// Adds credentials to an outgoing stream request.
pub trait RequestSigner: Send + Sync {
    /// Sign a POST of `params` to `url` that `request` already carries.
    fn sign(
        &self,
        request: RequestBuilder,
        url: &str,
        params: &FilterParams<'_>,
    ) -> Result<RequestBuilder>;
}

/// Sends requests as built.
#[derive(Debug, Clone, Default)]
pub struct Unsigned;

impl RequestSigner for Unsigned {
    fn sign(
        &self,
        request: RequestBuilder,
        _url: &str,
        _params: &FilterParams<'_>,
    ) -> Result<RequestBuilder> {
        Ok(request)
    }
}

/// OAuth 1.0a HMAC-SHA1 signer.
pub struct OAuth1Signer {
    token: oauth::Token<String, String>,
}

impl OAuth1Signer {
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        access_token: impl Into<String>,
        access_secret: impl Into<String>,
    ) -> Self {
        Self {
            token: oauth::Token::from_parts(
                consumer_key.into(),
                consumer_secret.into(),
                access_token.into(),
                access_secret.into(),
            ),
        }
    }

    /// Read credentials from the environment.
    ///
    /// Returns `None` when none of the variables is set and an error when only
    /// some are.
    pub fn from_env() -> Result<Option<Self>> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>> {
        let names = [
            CONSUMER_KEY_ENV,
            CONSUMER_SECRET_ENV,
            ACCESS_TOKEN_ENV,
            ACCESS_SECRET_ENV,
        ];
        let values: Vec<Option<String>> = names
            .iter()
            .map(|name| lookup(name).filter(|value| !value.trim().is_empty()))
            .collect();

        if values.iter().all(Option::is_none) {
            return Ok(None);
        }
        let missing: Vec<&str> = names
            .iter()
            .zip(&values)
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(AppError::config(format!(
                "incomplete stream credentials, missing {}",
                missing.join(", ")
            )));
        }

        let mut values = values.into_iter().flatten();
        match (values.next(), values.next(), values.next(), values.next()) {
            (Some(key), Some(secret), Some(token), Some(token_secret)) => {
                Ok(Some(Self::new(key, secret, token, token_secret)))
            }
            _ => Err(AppError::config("incomplete stream credentials")),
        }
    }
}

impl std::fmt::Debug for OAuth1Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth1Signer").finish_non_exhaustive()
    }
}

impl RequestSigner for OAuth1Signer {
    fn sign(
        &self,
        request: RequestBuilder,
        url: &str,
        params: &FilterParams<'_>,
    ) -> Result<RequestBuilder> {
        let authorization = oauth::post(url, params, &self.token, oauth::HMAC_SHA1);
        Ok(request.header(AUTHORIZATION, authorization))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const URL: &str = "http://localhost/1.1/statuses/filter.json";

    fn signed(signer: &dyn RequestSigner) -> reqwest::Request {
        let client = reqwest::Client::new();
        let params = FilterParams { track: "rust,go" };
        let builder = client.post(URL).form(&[("track", params.track)]);
        signer.sign(builder, URL, &params).unwrap().build().unwrap()
    }

    fn lookup(vars: &[(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<&str, &str> = vars.iter().copied().collect();
        move |name| vars.get(name).map(|value| value.to_string())
    }

    #[test]
    fn oauth1_sets_authorization_header() {
        let signer = OAuth1Signer::new("ck", "cs", "at", "as");
        let request = signed(&signer);

        let header = request
            .headers()
            .get(AUTHORIZATION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(header.starts_with("OAuth "));
        assert!(header.contains("oauth_consumer_key=\"ck\""));
        assert!(header.contains("oauth_token=\"at\""));
        assert!(header.contains("oauth_signature_method=\"HMAC-SHA1\""));
        assert!(header.contains("oauth_signature="));
    }

    #[test]
    fn unsigned_leaves_headers_alone() {
        let request = signed(&Unsigned);
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn no_credentials_means_unsigned() {
        assert!(OAuth1Signer::from_lookup(lookup(&[])).unwrap().is_none());
    }

    #[test]
    fn all_credentials_build_signer() {
        let signer = OAuth1Signer::from_lookup(lookup(&[
            (CONSUMER_KEY_ENV, "ck"),
            (CONSUMER_SECRET_ENV, "cs"),
            (ACCESS_TOKEN_ENV, "at"),
            (ACCESS_SECRET_ENV, "as"),
        ]))
        .unwrap();
        assert!(signer.is_some());
    }

    #[test]
    fn partial_credentials_rejected() {
        let err = OAuth1Signer::from_lookup(lookup(&[
            (CONSUMER_KEY_ENV, "ck"),
            (ACCESS_TOKEN_ENV, "at"),
            (ACCESS_SECRET_ENV, " "),
        ]))
        .unwrap_err();

        let message = err.to_string();
        assert!(message.contains(CONSUMER_SECRET_ENV));
        assert!(message.contains(ACCESS_SECRET_ENV));
    }

    #[test]
    fn debug_hides_credentials() {
        let signer = OAuth1Signer::new("ck", "secret-consumer", "at", "secret-access");
        let debug = format!("{signer:?}");
        assert!(!debug.contains("secret"));
    }
}
