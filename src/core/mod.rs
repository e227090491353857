pub mod sharetoken;
pub mod token;

pub use sharetoken::{ContractRelayKeys, ShareToken};
pub use token::{KeyStrategy, KeyTriple, Token};
