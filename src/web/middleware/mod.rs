//! Tower layers wrapped around the whole router.

pub mod request_id;
pub mod security_headers;
