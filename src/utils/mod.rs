pub mod id;
pub mod jwt;
pub mod password;
pub mod token;

pub use id::{parse_id, RawId};
pub use jwt::encode_token;
pub use password::{hash_password, verify_password};
