//! OAuth 2.0 for the portal's integrations.
//!
//! Implements the authorization code flow:
//! 1. Admin saves client credentials in settings
//! 2. GET /api/integrations/:name/oauth/url returns the provider URL with a CSRF state
//! 3. Admin authorizes on the provider's site
//! 4. Provider redirects to /api/integrations/:name/oauth/callback
//! 5. Code is exchanged for tokens, which are stored encrypted
//! 6. API calls use the access token and refresh it when it expires

mod exchange;
mod flow;
mod provider;
mod state_manager;
mod tokens;

pub use exchange::TokenGrant;
pub use flow::{
    AuthorizationFlow, CallbackParams, ConnectionState, DisconnectOptions, DisconnectOutcome,
    MANUAL_TEST_STATE,
};
pub use provider::{quickbooks_app_base, ClientAuth, ProviderEndpoints};
pub use state_manager::{StateEntry, StateManager};
pub use tokens::TokenManager;
