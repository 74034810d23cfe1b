//! # metacheck-link
//!
//! Chain client for metacheck, speaking JSON-RPC over a
//! [`LogicalConnection`](metacheck_live::LogicalConnection) instead of a socket.
//!
//! - [`RpcClient`]: request/response and subscription routing
//! - [`ChainClient`]: typed chain operations (follow, metadata, runtime calls,
//!   dev block production and storage writes, transaction broadcast)
//! - [`ChainApi`]: metadata-aware layer producing and watching transactions
//! - [`MetadataCodec`] and [`Signer`]: seams for metadata decoding and signing
//!
//! ```rust,no_run
//! use metacheck_link::{ChainClient, LinkTimeouts};
//! # async fn example(mux: std::sync::Arc<metacheck_live::SubscriptionMultiplexer>) -> metacheck_link::Result<()> {
//! let client = ChainClient::connect(&mux, LinkTimeouts::default()).await?;
//! let finalized = client.finalized_block().await?;
//! let metadata = client.metadata(Some(&finalized)).await?;
//! println!("{} metadata bytes at {}", metadata.len(), finalized);
//! client.destroy().await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod chain;
pub mod codec;
pub mod error;
pub mod rpc_client;
pub mod scale;
pub mod signer;
pub mod timeouts;
pub mod tx;

pub use api::{ChainApi, Transaction};
pub use chain::{ChainClient, ChainProperties, RuntimeVersion};
pub use codec::{ExtensionContext, MetadataCodec, RuntimeApi, RuntimeMetadata};
pub use error::{LinkError, Result};
pub use rpc_client::{RpcClient, Subscription};
pub use signer::{SignedExtension, SignedExtensions, Signer};
pub use timeouts::LinkTimeouts;
pub use tx::{TxEvent, TxWatch};
