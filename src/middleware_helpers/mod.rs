pub mod admin_key;
pub mod request_id;

pub use admin_key::require_admin_key;
pub use request_id::request_id_middleware;
