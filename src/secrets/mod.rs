//! Secret and link lifecycle.
//!
//! ```text
//!   create ──► SecretStore writes secret ──► LinkIssuer writes link ──► token
//!                                   (one transaction)
//!
//!   token ──► LinkResolver ──► metadata (never content)
//!   token + password? ──► ConsumptionEngine ──► content
//! ```
//!
//! State of a secret as seen through a token:
//!
//! - `Active` → `Consumed` on the first successful reveal of a one-time secret
//! - `Active` → `Expired` once the clock passes `expires_at`
//! - `Active` → `Active` on reveals of a repeatable secret
//!
//! Both `Consumed` and `Expired` are terminal.

pub mod consume;
pub mod issuer;
pub mod resolver;
pub mod service;
pub mod store;

pub use consume::ConsumptionEngine;
pub use issuer::LinkIssuer;
pub use resolver::LinkResolver;
pub use service::{CreatedSecret, SecretService};
pub use store::SecretStore;
