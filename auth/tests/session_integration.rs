mod common;

use async_trait::async_trait;
use claims::{assert_err, assert_matches, assert_none, assert_ok, assert_some_eq};
use common::{MockIdentityClient, scopes};
use graph_auth::auth::{
    AcquirerSettings, AuthenticationProvider, ConnectOptions, GraphAuthProvider, GraphSession,
    GRAPH_HOST, InteractiveAuthenticationProvider, InteractiveOptions, ProviderSettings,
    RequestInformation, extract_bearer_token,
};
use graph_auth::common::{AuthError, AuthResult};
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

/// Writes a fixed raw `Authorization` value, whatever it is.
struct RawHeaderProvider(&'static str);

#[async_trait]
impl AuthenticationProvider for RawHeaderProvider {
    async fn authenticate_request(
        &self,
        request: &mut RequestInformation,
        _cancel: &CancellationToken,
    ) -> AuthResult<()> {
        request.set_header(AUTHORIZATION, HeaderValue::from_static(self.0));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "raw"
    }
}

fn token_options(token: &str) -> ConnectOptions {
    ConnectOptions {
        token: Some(Zeroizing::new(token.to_string())),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_get_token_before_connect_is_not_connected() {
    let session = GraphSession::default();
    assert!(!session.is_connected().await);

    let err = assert_err!(session.get_token(&CancellationToken::new()).await);
    assert_matches!(err, AuthError::NotConnected);
    assert!(err.guidance().contains("Connect first"));
}

#[tokio::test]
async fn test_unconnected_session_sends_requests_anonymously() {
    let session = GraphSession::default();
    assert_eq!(session.provider().await.name(), "anonymous");

    let mut request =
        RequestInformation::parse(Method::GET, "https://graph.microsoft.com/v1.0/me").unwrap();
    assert_ok!(
        session
            .authenticate_request(&mut request, &CancellationToken::new())
            .await
    );
    assert_none!(request.authorization());
}

#[tokio::test]
async fn test_connect_get_token_disconnect() {
    let session = GraphSession::default();
    let cancel = CancellationToken::new();

    assert_ok!(session.connect(&token_options("abc")).await);
    assert!(session.is_connected().await);
    assert_eq!(assert_ok!(session.get_token(&cancel).await), "abc");

    assert!(session.disconnect().await);
    assert!(!session.disconnect().await);
    assert_matches!(session.get_token(&cancel).await, Err(AuthError::NotConnected));
}

#[tokio::test]
async fn test_reconnect_replaces_provider() {
    let session = GraphSession::default();
    let cancel = CancellationToken::new();

    assert_ok!(session.connect(&token_options("first")).await);
    assert_ok!(session.connect(&token_options("second")).await);
    assert_eq!(assert_ok!(session.get_token(&cancel).await), "second");
}

#[tokio::test]
async fn test_invalid_connect_keeps_previous_provider() {
    let session = GraphSession::default();
    assert_ok!(session.connect(&token_options("kept")).await);

    let incomplete = ConnectOptions {
        tenant_id: Some("tenant".to_string()),
        client_secret: Some(Zeroizing::new("secret".to_string())),
        ..Default::default()
    };
    assert_matches!(
        session.connect(&incomplete).await,
        Err(AuthError::Configuration(_))
    );
    assert_eq!(
        assert_ok!(session.get_token(&CancellationToken::new()).await),
        "kept"
    );
}

#[tokio::test]
async fn test_get_token_runs_interactive_provider() {
    let client = Arc::new(MockIdentityClient::with_silent_token("from-cache"));
    let options = InteractiveOptions::new(scopes()).unwrap().with_broker(false);
    let provider =
        InteractiveAuthenticationProvider::new(options, client.clone(), AcquirerSettings::default());

    let session = GraphSession::default();
    session
        .connect_with(GraphAuthProvider::Interactive(provider))
        .await;

    assert_eq!(
        assert_ok!(session.get_token(&CancellationToken::new()).await),
        "from-cache"
    );
    assert_eq!(MockIdentityClient::count(&client.silent_calls), 1);
}

#[tokio::test]
async fn test_get_token_on_custom_graph_host() {
    let client = Arc::new(MockIdentityClient::with_silent_token("gov-token"));
    let options = InteractiveOptions::new(scopes()).unwrap().with_broker(false);
    let provider =
        InteractiveAuthenticationProvider::new(options, client.clone(), AcquirerSettings::default())
            .with_graph_host("graph.microsoft.us");

    let session = GraphSession::new(ProviderSettings {
        graph_host: "graph.microsoft.us".to_string(),
        ..ProviderSettings::default()
    });
    session
        .connect_with(GraphAuthProvider::Interactive(provider))
        .await;

    assert_eq!(
        assert_ok!(session.get_token(&CancellationToken::new()).await),
        "gov-token"
    );
    assert_eq!(MockIdentityClient::count(&client.silent_calls), 1);
}

#[tokio::test]
async fn test_extract_bearer_token_prefix_handling() {
    let cancel = CancellationToken::new();

    assert_some_eq!(
        assert_ok!(
            extract_bearer_token(&RawHeaderProvider("bearer xyz"), GRAPH_HOST, &cancel).await
        ),
        "xyz".to_string()
    );
    assert_none!(assert_ok!(
        extract_bearer_token(&RawHeaderProvider("Bearer "), GRAPH_HOST, &cancel).await
    ));
    assert_none!(assert_ok!(
        extract_bearer_token(&RawHeaderProvider("Basic dXNlcg=="), GRAPH_HOST, &cancel).await
    ));
}
