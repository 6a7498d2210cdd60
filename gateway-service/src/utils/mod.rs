pub mod password;
pub mod token;
pub mod validation;

pub use password::{
    hash_password, hash_password_blocking, verify_password, verify_password_blocking, Password,
};
pub use token::{InviteSecret, SecretHasher};
pub use validation::{normalize_email, ValidatedJson};
