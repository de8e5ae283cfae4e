//! iptime-client - session client for the ipTIME router CGI admin interface.
//!
//! ipTIME consumer routers expose no machine API. Administration happens the
//! way a browser does it: a form POST against `login_handler.cgi` opens a
//! cookie session, and a single multiplexed CGI endpoint (`timepro.cgi`)
//! renders every admin page and accepts every admin action. This crate logs
//! in, keeps the session cookie, scrapes the HTML/JavaScript the router
//! renders, and replays the admin forms.
//!
//! ## Components
//!
//! - [`RouterConfig`] - connection settings, immutable once built
//! - [`RouterClient`] - one cookie session: login, logout, raw CGI requests
//! - [`PortForwardManager`] - scrape and mutate the port-forward table
//! - [`SystemInfo`] - firmware/model scrape off the expert-info page
//!
//! ## Failure contract
//!
//! Public operations mirror how forgiving the admin UI itself is: transport
//! and status failures are logged and collapse into `false`, `None` or an
//! empty list. Callers stay on the happy path; the logs carry the details.
//!
//! ## Example
//!
//! ```no_run
//! use iptime_client::{PortForwardManager, RouterClient, RouterConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = RouterConfig::new("192.168.0.1", "admin", "secret");
//!     let client = RouterClient::new(config).unwrap();
//!     if client.login().await {
//!         let rules = PortForwardManager::new(&client).list_rules().await;
//!         println!("{} rules", rules.len());
//!         client.logout().await;
//!     }
//! }
//! ```

pub mod config;
pub mod error;
pub mod portforward;
pub mod session;
pub mod sysinfo;

#[cfg(test)]
mod testutil;

pub use config::RouterConfig;
pub use error::{ClientError, Result};
pub use portforward::{ForwardRule, NewRule, PortForwardManager, RuleSelector, RuleUpdate};
pub use session::RouterClient;
pub use sysinfo::SystemInfo;
