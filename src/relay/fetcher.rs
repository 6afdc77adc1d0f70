use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, Url};
use serde::Deserialize;

use crate::relay::error::{fetch_failed, RelayResult};
use crate::relay::types::Platform;

pub const API_URL_ENV: &str = "POPUP_OAUTH_RELAY_API_URL";
pub const API_TOKEN_ENV: &str = "POPUP_OAUTH_RELAY_API_TOKEN";

/// Source of single-use authorization URLs.
///
/// Implementations must not retry: the URL is single-use and asking again is
/// the caller's decision.
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait AuthorizationUrlFetcher: Send + Sync {
    async fn authorization_url(&self, platform: &Platform) -> RelayResult<String>;
}

#[derive(Deserialize)]
struct AuthorizeResponse {
    #[serde(default)]
    url: Option<String>,
}

/// Fetches authorization URLs from `GET {base}/social-accounts/oauth/{platform}/authorize`.
#[derive(Clone, Debug)]
pub struct RestAuthorizationUrlFetcher {
    http: Client,
    base_url: Url,
    bearer_token: Option<String>,
}

impl RestAuthorizationUrlFetcher {
    pub fn with_base_url(base_url: &str) -> RelayResult<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|err| fetch_failed(format!("Invalid API base URL '{base_url}': {err}")))?;
        if parsed.cannot_be_a_base() {
            return Err(fetch_failed(format!(
                "API base URL '{base_url}' cannot carry a path"
            )));
        }

        Ok(Self {
            http: Client::new(),
            base_url: parsed,
            bearer_token: None,
        })
    }

    /// Reads the base URL (and optional bearer token) from the environment.
    pub fn from_env() -> RelayResult<Self> {
        let base_url = std::env::var(API_URL_ENV)
            .map_err(|_| fetch_failed(format!("{API_URL_ENV} is not set")))?;
        let fetcher = Self::with_base_url(&base_url)?;
        Ok(match std::env::var(API_TOKEN_ENV) {
            Ok(token) if !token.is_empty() => fetcher.with_bearer_token(token),
            _ => fetcher,
        })
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn authorize_endpoint(&self, platform: &Platform) -> RelayResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| fetch_failed("API base URL cannot carry a path"))?;
            segments.pop_if_empty().extend([
                "social-accounts",
                "oauth",
                platform.as_str(),
                "authorize",
            ]);
        }
        Ok(url)
    }

    fn headers(&self) -> RelayResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = &self.bearer_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|err| fetch_failed(format!("Invalid bearer token header: {err}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl AuthorizationUrlFetcher for RestAuthorizationUrlFetcher {
    async fn authorization_url(&self, platform: &Platform) -> RelayResult<String> {
        let url = self.authorize_endpoint(platform)?;
        let response = self
            .http
            .get(url)
            .headers(self.headers()?)
            .send()
            .await
            .map_err(|err| fetch_failed(format!("Network error requesting authorization URL: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_failed(format!(
                "Backend returned HTTP status {} for platform {platform}",
                status.as_u16()
            )));
        }

        let body: AuthorizeResponse = response
            .json()
            .await
            .map_err(|err| fetch_failed(format!("Invalid authorization response: {err}")))?;

        match body.url {
            Some(url) if !url.trim().is_empty() => Ok(url),
            _ => Err(fetch_failed("No authorization URL received")),
        }
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::relay::error::RelayError;
    use crate::test_support::try_start_mock_server;
    use httpmock::prelude::*;
    use serde_json::json;

    fn platform(value: &str) -> Platform {
        Platform::new(value).unwrap()
    }

    #[tokio::test(flavor = "current_thread")]
    async fn returns_url_from_backend() {
        let Some(server) = try_start_mock_server() else {
            eprintln!("Skipping returns_url_from_backend: unable to start mock server");
            return;
        };
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/social-accounts/oauth/twitter/authorize")
                .header("authorization", "Bearer session-token");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({ "url": "https://provider.example/authorize?x=1" }));
        });

        let fetcher = RestAuthorizationUrlFetcher::with_base_url(&server.url("/api/"))
            .unwrap()
            .with_bearer_token("session-token");
        let url = fetcher.authorization_url(&platform("twitter")).await.unwrap();

        assert_eq!(url, "https://provider.example/authorize?x=1");
        mock.assert();
    }

    #[tokio::test(flavor = "current_thread")]
    async fn missing_url_field_is_fetch_failure() {
        let Some(server) = try_start_mock_server() else {
            eprintln!("Skipping missing_url_field_is_fetch_failure: unable to start mock server");
            return;
        };
        server.mock(|when, then| {
            when.method(GET)
                .path("/social-accounts/oauth/facebook/authorize");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({ "message": "ok" }));
        });

        let fetcher = RestAuthorizationUrlFetcher::with_base_url(&server.base_url()).unwrap();
        let error = fetcher
            .authorization_url(&platform("facebook"))
            .await
            .unwrap_err();

        assert!(matches!(error, RelayError::FetchFailed { .. }));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn non_success_status_is_fetch_failure() {
        let Some(server) = try_start_mock_server() else {
            eprintln!("Skipping non_success_status_is_fetch_failure: unable to start mock server");
            return;
        };
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/social-accounts/oauth/linkedin/authorize");
            then.status(401)
                .header("content-type", "application/json")
                .json_body(json!({ "url": "https://ignored.example" }));
        });

        let fetcher = RestAuthorizationUrlFetcher::with_base_url(&server.base_url()).unwrap();
        let error = fetcher
            .authorization_url(&platform("linkedin"))
            .await
            .unwrap_err();

        assert_eq!(error.code(), "relay/fetch-failed");
        assert!(error.to_string().contains("401"));
        mock.assert_hits(1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn empty_url_is_fetch_failure() {
        let Some(server) = try_start_mock_server() else {
            eprintln!("Skipping empty_url_is_fetch_failure: unable to start mock server");
            return;
        };
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/social-accounts/oauth/tiktok/authorize");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({ "url": "  " }));
        });

        let fetcher = RestAuthorizationUrlFetcher::with_base_url(&server.base_url()).unwrap();
        let error = fetcher
            .authorization_url(&platform("tiktok"))
            .await
            .unwrap_err();

        assert_eq!(
            error,
            RelayError::FetchFailed {
                message: "No authorization URL received".into()
            }
        );
        mock.assert();
    }

    #[tokio::test(flavor = "current_thread")]
    async fn unreachable_backend_is_fetch_failure() {
        let Ok(listener) = std::net::TcpListener::bind("127.0.0.1:0") else {
            eprintln!("Skipping unreachable_backend_is_fetch_failure: unable to bind a port");
            return;
        };
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let fetcher =
            RestAuthorizationUrlFetcher::with_base_url(&format!("http://127.0.0.1:{port}")).unwrap();
        let error = fetcher
            .authorization_url(&platform("twitter"))
            .await
            .unwrap_err();

        assert_eq!(error.code(), "relay/fetch-failed");
        assert!(error.to_string().contains("Network error"));
    }

    #[test]
    fn platform_is_encoded_as_single_segment() {
        let fetcher = RestAuthorizationUrlFetcher::with_base_url("https://api.example/v1").unwrap();
        let url = fetcher.authorize_endpoint(&platform("a/b")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example/v1/social-accounts/oauth/a%2Fb/authorize"
        );
    }

    #[test]
    fn rejects_unparseable_base_url() {
        assert!(RestAuthorizationUrlFetcher::with_base_url("not a url").is_err());
        assert!(RestAuthorizationUrlFetcher::with_base_url("mailto:someone@example.com").is_err());
    }
}
