//! SAML endpoint handlers.
//!
//! - **SSO** - receives `AuthnRequest`s over HTTP-Redirect or HTTP-POST
//! - **Login continuation** - answers the parked request once the user
//!   is logged in
//! - **Metadata** - serves the IdP metadata
//!
//! Sessions and authentication belong to the host application, which
//! plugs them in through [`SessionStore`] and [`PrincipalResolver`].
//!
//! # Example
//!
//! ```rust,ignore
//! use idp_saml::endpoints::{saml_router, SamlState};
//!
//! let app = axum::Router::new()
//!     .merge(saml_router(&idp.config().sso_path))
//!     .with_state(SamlState::new(idp, Arc::new(sessions), Arc::new(principals)));
//! ```

mod metadata;
mod router;
mod sso;
mod state;

pub use metadata::*;
pub use router::*;
pub use sso::*;
pub use state::*;
