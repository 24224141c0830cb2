use super::identity_client::IdentityClient;
use super::provider::{AuthenticationProvider, is_allowed_host, require_host, set_bearer_token};
use super::request::RequestInformation;
use super::token_acquirer::{AcquirerSettings, TokenAcquirer};
use super::types::{GRAPH_HOST, InteractiveOptions};
use crate::common::AuthResult;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Signs a user in (silently when possible) and attaches their token to Graph requests.
///
/// Only requests whose host equals the configured Graph host receive a token;
/// everything else passes through untouched so a reused pipeline never leaks
/// the bearer token to an unrelated endpoint.
pub struct InteractiveAuthenticationProvider {
    options: InteractiveOptions,
    acquirer: Arc<TokenAcquirer>,
    graph_host: String,
}

impl InteractiveAuthenticationProvider {
    pub fn new(
        options: InteractiveOptions,
        client: Arc<dyn IdentityClient>,
        mut settings: AcquirerSettings,
    ) -> Self {
        settings.use_broker = options.use_broker;
        Self {
            options,
            acquirer: Arc::new(TokenAcquirer::new(client, settings)),
            graph_host: GRAPH_HOST.to_string(),
        }
    }

    pub fn with_graph_host(mut self, graph_host: impl Into<String>) -> Self {
        self.graph_host = graph_host.into();
        self
    }

    pub fn options(&self) -> &InteractiveOptions {
        &self.options
    }

    pub fn acquirer(&self) -> &Arc<TokenAcquirer> {
        &self.acquirer
    }
}

#[async_trait]
impl AuthenticationProvider for InteractiveAuthenticationProvider {
    async fn authenticate_request(
        &self,
        request: &mut RequestInformation,
        cancel: &CancellationToken,
    ) -> AuthResult<()> {
        let host = require_host(request)?;
        if !is_allowed_host(host, &self.graph_host) {
            log::trace!("Not attaching credentials to request for host {host}");
            return Ok(());
        }

        let token = self
            .acquirer
            .acquire_token(
                &self.options.scopes,
                self.options.tenant_id.as_deref(),
                self.options.username.as_deref(),
                cancel,
            )
            .await?;

        set_bearer_token(request, &token.access_token)
    }

    fn name(&self) -> &'static str {
        "interactive"
    }
}
