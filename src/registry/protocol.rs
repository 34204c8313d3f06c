//! Registry HTTP surface: endpoint paths and the plain-text error bodies the
//! client maps back to [`ChatError`](crate::error::ChatError) variants.

pub use crate::transport::protocol::{ALIVE_TOKEN, ENDPOINT_HEALTH, StatusResponse};

pub const ENDPOINT_USERS: &str = "/v1/users";
pub const ENDPOINT_USER: &str = "/v1/users/:name";

pub const ILLEGAL_USER_NAME: &str = "Illegal user name";
pub const ILLEGAL_ADDRESS: &str = "Illegal address";
pub const USER_ALREADY_REGISTERED: &str = "User already registered";
