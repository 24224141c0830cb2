//! Exit codes and operator-facing error output for `bgraph`.

use crate::config::ConfigError;
use graph_auth::common::{AuthError, AuthErrorKind};

pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_CONFIGURATION: i32 = 2;
pub const EXIT_INTERACTION_REQUIRED: i32 = 3;
pub const EXIT_CANCELLED: i32 = 4;
pub const EXIT_AUTHENTICATION_FAILED: i32 = 5;
pub const EXIT_NETWORK: i32 = 6;
pub const EXIT_NOT_CONNECTED: i32 = 7;
pub const EXIT_CACHE: i32 = 8;

fn auth_error(err: &anyhow::Error) -> Option<&AuthError> {
    err.chain().find_map(|cause| cause.downcast_ref::<AuthError>())
}

/// Status code for a failed command, by error kind.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(auth) = auth_error(err) {
        return match auth.kind() {
            AuthErrorKind::Configuration => EXIT_CONFIGURATION,
            AuthErrorKind::InteractionRequired => EXIT_INTERACTION_REQUIRED,
            AuthErrorKind::Cancelled => EXIT_CANCELLED,
            AuthErrorKind::AuthenticationFailed => EXIT_AUTHENTICATION_FAILED,
            AuthErrorKind::Network => EXIT_NETWORK,
            AuthErrorKind::NotConnected => EXIT_NOT_CONNECTED,
            AuthErrorKind::Cache => EXIT_CACHE,
        };
    }
    if err
        .chain()
        .any(|cause| cause.downcast_ref::<ConfigError>().is_some())
    {
        return EXIT_CONFIGURATION;
    }
    EXIT_FAILURE
}

/// The lines printed to stderr for a failed command.
pub fn render(err: &anyhow::Error) -> String {
    let mut out = format!("error: {err:#}");
    if let Some(auth) = auth_error(err) {
        out.push_str("\nhint: ");
        out.push_str(auth.guidance());
    }
    out
}

pub fn report(err: &anyhow::Error) {
    eprintln!("{}", render(err));
}
