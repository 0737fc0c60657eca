//! Anti-forgery token acquisition.
//!
//! The backend issues the token by setting the `XSRF-TOKEN` cookie from a
//! dedicated endpoint. [`TokenBroker`] is the single coordinator that talks to
//! that endpoint: concurrent callers share one in-flight acquisition and all
//! observe its outcome.
//!
//! # Example
//!
//! ```no_run
//! use xsrf_session::{ApiClient, ClientConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ApiClient::new(ClientConfig::new("http://localhost:8000/api")?)?;
//! if let Some(token) = client.broker().ensure_fresh_token().await? {
//!     println!("token header value has {} bytes", token.header_value().len());
//! }
//! # Ok(())
//! # }
//! ```

mod broker;
mod error;
mod token;

pub use broker::TokenBroker;
pub use error::TokenAcquisitionError;
pub use token::CsrfToken;
