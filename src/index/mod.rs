pub mod bootstrap;
pub mod store;
pub mod tree;

pub use store::TokenStore;
pub use tree::{Pruned, TokenTree};
