mod ids;
mod options;

pub use ids::{ConnectionId, SubscriptionId};
pub use options::{BlockRef, DiagnosticOptions, ForkParams, TokenInfo};
