//! Threat-intelligence cloud API client core: API-key token lifecycle, bounded transport
//! retries, and cursor pagination shared by blocking and async callers.
//!
//! Resource clients talk to a [`session::Session`] (blocking) or [`session::AsyncSession`]
//! (async). Each session attaches a bearer token from the shared
//! [`auth::TokenRefresher`], sends the request through a retrying transport, performs a
//! single re-authentication on `401`, and maps error statuses into typed
//! [`error::StatusError`] values. List endpoints are traversed with [`pagination`].

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
#[cfg(feature = "reqwest")] pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod obs;
pub mod pagination;
pub mod retry;
pub mod session;
pub mod view;

#[doc(hidden)]
pub mod _preludet {
	//! Convenience re-exports for integration tests.

	pub use crate::_prelude::*;
}

mod _prelude {
	pub use std::{
		collections::VecDeque,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
		time::Duration as StdDuration,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::Error as ReqwestError;
	pub use serde::{Deserialize, Serialize, de::DeserializeOwned};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
