pub mod broker;
pub mod credentials;
pub mod entra_client;
pub mod identity_client;
pub mod interactive_provider;
pub mod persistent_cache;
pub mod provider;
pub mod request;
pub mod resolver;
pub mod session;
pub mod static_provider;
pub mod token_acquirer;
pub mod token_cache;
pub mod token_extract;
pub mod types;

pub use broker::WindowHandle;
pub use credentials::{
    AzureCliCredential, ClientSecretCredential, CredentialAuthenticationProvider,
    DefaultCredentialChain, EnvironmentCredential, IMDS_TOKEN_ENDPOINT, ManagedIdentityCredential,
    TokenCredential,
};
pub use entra_client::{DeviceCodeCallback, DeviceCodeInfo, EntraClientConfig, EntraPublicClient};
pub use identity_client::{IdentityClient, InteractiveRequest, SilentTarget};
pub use interactive_provider::InteractiveAuthenticationProvider;
pub use persistent_cache::{
    AppTokenEntry, CACHE_FILE_NAME, CacheSnapshot, FileTokenCacheStore, TokenCacheStore,
};
pub use provider::{AUTHENTICATION_SCHEME, AuthenticationProvider, set_bearer_token};
pub use request::RequestInformation;
pub use resolver::{ConnectOptions, ConnectionMode, GraphAuthProvider, ProviderSettings};
pub use session::GraphSession;
pub use static_provider::{AnonymousProvider, StaticTokenProvider};
pub use token_acquirer::{AcquirerSettings, CacheState, TokenAcquirer, select_account};
pub use token_cache::MemoryTokenCache;
pub use token_extract::{extract_bearer_token, strip_bearer, token_probe_url};
pub use types::{
    Account, CachedToken, DEFAULT_CLIENT_ID, DEFAULT_CREDENTIAL_SCOPE, DEFAULT_INTERACTIVE_TIMEOUT,
    GRAPH_HOST, InteractiveOptions, TokenCacheKey,
};
