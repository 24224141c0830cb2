pub mod errors;

pub use errors::{AuthError, AuthErrorKind, AuthResult, CancellationReason};
