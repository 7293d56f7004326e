//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, JSON 404 fallback)
//!     → mount.rs (dispatch by path + method)
//!     → request.rs (ApiRequest: params, query, headers, body)
//!     → handler (script or built-in) on the blocking pool
//!     → response.rs (envelope, status, headers)
//!     → Send to client
//! ```

pub mod builtin;
pub mod mount;
pub mod request;
pub mod response;
pub mod server;

pub use builtin::{builtin_routes, ServerInfo};
pub use mount::Mounter;
pub use request::{ApiRequest, X_REQUEST_ID};
pub use response::{ApiResponse, Envelope};
pub use server::ApiServer;
