pub mod auth;
pub mod request_id;
pub mod validated;

pub use auth::AuthUser;
pub use request_id::{make_span_with_request_id, request_id_middleware, RequestId};
pub use validated::{OptionalJson, ValidatedJson, ValidatedPath, ValidatedQuery};
