use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::warn;

use autoresponder_core::domain::TokenPair;
use autoresponder_core::platform::PlatformError;

use crate::client::WebexClient;

const TOKEN_ENDPOINT: &str = "access_token";

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    refresh_token: String,
}

impl TokenResponse {
    fn into_pair(self) -> Result<TokenPair, PlatformError> {
        if self.access_token.is_empty() || self.refresh_token.is_empty() {
            return Err(PlatformError::Decode(
                "token endpoint returned an empty access or refresh token".to_owned(),
            ));
        }
        Ok(TokenPair {
            access_token: self.access_token.into(),
            refresh_token: self.refresh_token.into(),
        })
    }
}

impl WebexClient {
    pub async fn grant_authorization_code(&self, code: &str) -> Result<TokenPair, PlatformError> {
        self.request_tokens(&[
            ("grant_type", "authorization_code"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
        ])
        .await
    }

    pub async fn grant_refresh_token(
        &self,
        refresh_token: &SecretString,
    ) -> Result<TokenPair, PlatformError> {
        self.request_tokens(&[
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
            ("refresh_token", refresh_token.expose_secret()),
        ])
        .await
    }

    async fn request_tokens(&self, form: &[(&str, &str)]) -> Result<TokenPair, PlatformError> {
        let request = self.http.post(self.url(TOKEN_ENDPOINT)).form(form);
        let response = self.execute(TOKEN_ENDPOINT, request).await.map_err(|error| {
            if matches!(error, PlatformError::Status { status: 401, .. }) {
                warn!(
                    event_name = "webex.oauth.unauthorized",
                    "token endpoint rejected the client credentials"
                );
            }
            error
        })?;

        response
            .json::<TokenResponse>()
            .await
            .map_err(|error| PlatformError::Decode(format!("{TOKEN_ENDPOINT}: {error}")))?
            .into_pair()
    }
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};
    use secrecy::ExposeSecret;
    use serde_json::json;

    use autoresponder_core::platform::PlatformError;

    use crate::client::tests::client_for;

    #[tokio::test]
    async fn authorization_code_grant_posts_form() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/access_token")
            .match_header("content-type", "application/x-www-form-urlencoded")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                Matcher::UrlEncoded("client_id".into(), "client-123".into()),
                Matcher::UrlEncoded("client_secret".into(), "shh-secret".into()),
                Matcher::UrlEncoded("code".into(), "CODE-1".into()),
                Matcher::UrlEncoded(
                    "redirect_uri".into(),
                    "https://bot.example.com/oauth".into(),
                ),
            ]))
            .with_status(200)
            .with_body(json!({"access_token": "acc-1", "refresh_token": "ref-1"}).to_string())
            .create_async()
            .await;
        let client = client_for(&server.url());

        let tokens = client.grant_authorization_code("CODE-1").await.expect("tokens");

        assert_eq!(tokens.access_token.expose_secret(), "acc-1");
        assert_eq!(tokens.refresh_token.expose_secret(), "ref-1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn refresh_grant_sends_refresh_token() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/access_token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), "ref-1".into()),
            ]))
            .with_status(200)
            .with_body(json!({"access_token": "acc-2", "refresh_token": "ref-2"}).to_string())
            .create_async()
            .await;
        let client = client_for(&server.url());

        let tokens =
            client.grant_refresh_token(&"ref-1".to_owned().into()).await.expect("refreshed");

        assert_eq!(tokens.access_token.expose_secret(), "acc-2");
        assert_eq!(tokens.refresh_token.expose_secret(), "ref-2");
    }

    #[tokio::test]
    async fn missing_refresh_token_is_a_decode_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/access_token")
            .with_status(200)
            .with_body(json!({"access_token": "acc-1"}).to_string())
            .create_async()
            .await;
        let client = client_for(&server.url());

        let error = client.grant_authorization_code("CODE-1").await.expect_err("incomplete");

        assert!(matches!(error, PlatformError::Decode(_)));
    }

    #[tokio::test]
    async fn unauthorized_client_surfaces_status() {
        let mut server = Server::new_async().await;
        server.mock("POST", "/access_token").with_status(401).create_async().await;
        let client = client_for(&server.url());

        let error = client.grant_authorization_code("CODE-1").await.expect_err("rejected");

        assert_eq!(
            error,
            PlatformError::Status { endpoint: "access_token".to_owned(), status: 401 }
        );
    }
}
