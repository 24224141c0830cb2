use super::provider::{AUTHENTICATION_SCHEME, AuthenticationProvider};
use super::request::RequestInformation;
use crate::common::AuthResult;
use reqwest::Method;
use tokio_util::sync::CancellationToken;

/// Throwaway target on `graph_host` used to read back what a provider would attach.
pub fn token_probe_url(graph_host: &str) -> String {
    format!("https://{}/test", graph_host.trim().trim_end_matches('/'))
}

/// Returns the bearer token `provider` attaches to requests for `graph_host`, if any.
///
/// Goes through [`AuthenticationProvider::authenticate_request`] rather than a
/// separate token API, so the result always matches what real requests carry.
pub async fn extract_bearer_token(
    provider: &dyn AuthenticationProvider,
    graph_host: &str,
    cancel: &CancellationToken,
) -> AuthResult<Option<String>> {
    let mut request = RequestInformation::parse(Method::GET, &token_probe_url(graph_host))?;
    provider.authenticate_request(&mut request, cancel).await?;
    Ok(request.authorization().and_then(strip_bearer).map(str::to_string))
}

/// Strips a case-insensitive `Bearer ` prefix. Headers no longer than the prefix yield `None`.
pub fn strip_bearer(header: &str) -> Option<&str> {
    let prefix_len = AUTHENTICATION_SCHEME.len() + 1;
    if header.len() <= prefix_len {
        return None;
    }
    let (scheme, rest) = header.split_at_checked(AUTHENTICATION_SCHEME.len())?;
    if scheme.eq_ignore_ascii_case(AUTHENTICATION_SCHEME) {
        rest.strip_prefix(' ')
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_url_follows_graph_host() {
        assert_eq!(token_probe_url("graph.microsoft.com"), "https://graph.microsoft.com/test");
        assert_eq!(token_probe_url(" graph.microsoft.us/ "), "https://graph.microsoft.us/test");
    }

    #[test]
    fn test_strip_bearer() {
        assert_eq!(strip_bearer("Bearer abc"), Some("abc"));
        assert_eq!(strip_bearer("bearer abc"), Some("abc"));
        assert_eq!(strip_bearer("Bearer "), None);
        assert_eq!(strip_bearer("Bearer"), None);
        assert_eq!(strip_bearer("Basic dXNlcjpwYXNz"), None);
    }
}
