//! Credential storage, access tokens, and the token refresher.

mod credential;
mod endpoint;
mod refresher;
mod secret;
mod token;

pub use credential::*;
pub use endpoint::*;
pub use refresher::*;
pub use secret::*;
pub use token::*;
