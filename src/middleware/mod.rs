pub mod auth;
pub mod request;
pub mod response;

pub use auth::{bearer_token, operator_gateway};
pub use request::{JsonBody, QueryParams};
pub use response::{ApiResponse, ApiResult};
