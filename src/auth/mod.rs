pub mod account_key;
pub mod password;
pub mod resolver;
pub mod token;

pub use account_key::AccountKeyService;
pub use resolver::CredentialResolver;
pub use token::{Claims, TokenCodec};
