//! Integration tests for the OAuth2 provider against a mock identity service.

#[cfg(test)]
mod integration_tests {
    use crate::{OAuth2Provider, OAuth2ProviderConfig, PkceChallenge, UserInfoMapping};
    use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
    use std::collections::HashMap;
    use std::time::Duration;
    use vouch_identity_core::{CallbackRequest, ClaimValue, IdentityError, Provider};
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup_mock_oauth_server() -> (MockServer, OAuth2ProviderConfig) {
        let mock_server = MockServer::start().await;

        let provider_config = OAuth2ProviderConfig {
            provider_id: "mock_provider".to_string(),
            client_id: "mock_client_id".to_string(),
            client_secret: "mock_secret".to_string(),
            authorization_endpoint: format!("{}/authorize", mock_server.uri()),
            token_endpoint: format!("{}/token", mock_server.uri()),
            userinfo_endpoint: Some(format!("{}/userinfo", mock_server.uri())),
            scopes: vec!["openid".to_string(), "email".to_string()],
            auth_params: HashMap::new(),
            use_pkce: false,
            use_id_token_claims: true,
            user_info_mapping: UserInfoMapping::oidc(),
            http_timeout_seconds: 5,
        };

        (mock_server, provider_config)
    }

    fn callback(code: &str) -> CallbackRequest {
        CallbackRequest {
            code: code.to_string(),
            redirect_uri: "https://vouch.example.com/auth".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_full_oauth2_flow() {
        let (mock_server, provider_config) = setup_mock_oauth_server().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=good_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "mock_access_token",
                "token_type": "Bearer",
                "expires_in": 3600,
                "scope": "openid email"
            })))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header("Authorization", "Bearer mock_access_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sub": "12345",
                "email": "test@example.com",
                "email_verified": true,
                "name": "Test User",
                "groups": ["admins"]
            })))
            .mount(&mock_server)
            .await;

        let provider = OAuth2Provider::new(provider_config).unwrap();
        provider.configure().unwrap();

        let identity = provider.get_user_info(&callback("good_code")).await.unwrap();

        assert_eq!(identity.user.username, "test@example.com");
        assert_eq!(identity.user.team_memberships, vec!["admins"]);
        assert_eq!(
            identity.tokens.access_token.as_deref(),
            Some("mock_access_token")
        );
        assert_eq!(identity.tokens.id_token, None);
        assert_eq!(
            identity.custom_claims.get("name"),
            Some(&ClaimValue::String("Test User".to_string()))
        );
    }

    #[tokio::test]
    async fn test_pkce_verifier_is_sent_with_exchange() {
        let (mock_server, mut provider_config) = setup_mock_oauth_server().await;
        provider_config.use_pkce = true;

        let pkce = PkceChallenge::new();

        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains(format!(
                "code_verifier={}",
                pkce.code_verifier
            )))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "at"})),
            )
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"email": "pkce@example.com"})),
            )
            .mount(&mock_server)
            .await;

        let provider = OAuth2Provider::new(provider_config).unwrap();
        assert!(provider.uses_pkce());

        let auth_url = provider
            .authorization_url("state", "https://cb", Some(&pkce.code_challenge))
            .unwrap();
        assert!(auth_url.contains(&format!("code_challenge={}", pkce.code_challenge)));

        let mut request = callback("code");
        request.code_verifier = Some(pkce.code_verifier.clone());
        let identity = provider.get_user_info(&request).await.unwrap();
        assert_eq!(identity.user.username, "pkce@example.com");
    }

    #[tokio::test]
    async fn test_token_exchange_error() {
        let (mock_server, provider_config) = setup_mock_oauth_server().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "The authorization code is invalid"
            })))
            .mount(&mock_server)
            .await;

        let provider = OAuth2Provider::new(provider_config).unwrap();
        let err = provider.get_user_info(&callback("bad")).await.unwrap_err();

        match err {
            IdentityError::ProviderError(msg) => assert!(msg.contains("invalid_grant")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_userinfo_failure() {
        let (mock_server, provider_config) = setup_mock_oauth_server().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "at"})),
            )
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
            .mount(&mock_server)
            .await;

        let provider = OAuth2Provider::new(provider_config).unwrap();
        let err = provider.get_user_info(&callback("c")).await.unwrap_err();
        assert!(matches!(err, IdentityError::ProviderError(_)));
    }

    #[tokio::test]
    async fn test_provider_timeout() {
        let (mock_server, mut provider_config) = setup_mock_oauth_server().await;
        provider_config.http_timeout_seconds = 1;

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "at"}))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&mock_server)
            .await;

        let provider = OAuth2Provider::new(provider_config).unwrap();
        let err = provider.get_user_info(&callback("c")).await.unwrap_err();
        assert!(matches!(err, IdentityError::Timeout));
    }

    #[tokio::test]
    async fn test_id_token_claims_merged_under_userinfo() {
        let (mock_server, provider_config) = setup_mock_oauth_server().await;

        let payload = URL_SAFE_NO_PAD.encode(
            serde_json::json!({
                "sub": "from-id-token",
                "email": "id@example.com",
                "hd": "example.com"
            })
            .to_string(),
        );
        let id_token = format!("eyJhbGciOiJSUzI1NiJ9.{payload}.signature");

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at",
                "id_token": id_token
            })))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "email": "userinfo@example.com"
            })))
            .mount(&mock_server)
            .await;

        let provider = OAuth2Provider::new(provider_config).unwrap();
        let identity = provider.get_user_info(&callback("c")).await.unwrap();

        // userinfo wins on conflict, ID token fills the gaps
        assert_eq!(identity.user.username, "userinfo@example.com");
        assert_eq!(identity.user.id.as_deref(), Some("from-id-token"));
        assert_eq!(
            identity.custom_claims.get("hd"),
            Some(&ClaimValue::String("example.com".to_string()))
        );
        assert_eq!(identity.tokens.id_token.as_deref(), Some(id_token.as_str()));
    }

    #[tokio::test]
    async fn test_github_style_provider() {
        let mock_server = MockServer::start().await;

        let mut provider_config = OAuth2ProviderConfig::github();
        provider_config.client_id = "gh_client".to_string();
        provider_config.token_endpoint = format!("{}/login/oauth/access_token", mock_server.uri());
        provider_config.userinfo_endpoint = Some(format!("{}/user", mock_server.uri()));

        Mock::given(method("POST"))
            .and(path("/login/oauth/access_token"))
            .and(header("Accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "gho_token",
                "token_type": "bearer",
                "scope": "read:user"
            })))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "login": "octocat",
                "id": 1,
                "name": "The Octocat",
                "teams": ["org/core"]
            })))
            .mount(&mock_server)
            .await;

        let provider = OAuth2Provider::new(provider_config).unwrap();
        let identity = provider.get_user_info(&callback("c")).await.unwrap();

        assert_eq!(identity.user.username, "octocat");
        assert_eq!(identity.user.team_memberships, vec!["org/core"]);
        assert_eq!(provider.provider_id(), "github");
    }
}
