//! SAML router configuration.

use axum::{routing::get, Router};

use super::metadata::idp_metadata;
use super::sso::{login_process, login_process_path, sso_post, sso_redirect};
use super::state::{PrincipalResolver, SamlState, SessionStore};

/// Path of the metadata endpoint.
pub const METADATA_PATH: &str = "/metadata";

/// Creates the SAML router.
///
/// | Method   | Path                | Handler          |
/// |----------|---------------------|------------------|
/// | GET/POST | `{sso_path}`        | `sso_redirect` / `sso_post` |
/// | GET      | `{sso_path}/login`  | `login_process`  |
/// | GET      | `/metadata`         | `idp_metadata`   |
///
/// ```rust,ignore
/// let state = SamlState::new(idp, sessions, principals);
/// let app = saml_router(&idp.config().sso_path).with_state(state);
/// ```
pub fn saml_router<S: SessionStore, P: PrincipalResolver>(sso_path: &str) -> Router<SamlState<S, P>> {
    Router::new()
        .route(sso_path, get(sso_redirect::<S, P>).post(sso_post::<S, P>))
        .route(&login_process_path(sso_path), get(login_process::<S, P>))
        .route(METADATA_PATH, get(idp_metadata::<S, P>))
}
