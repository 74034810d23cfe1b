//! Chain diagnostic session: a chain client over one logical connection,
//! with a funded test account on the fork.

use crate::digester::MetadataDigester;
use crate::error::{DiagnosticError, Result};
use metacheck_link::{ChainApi, ChainClient, LinkTimeouts, MetadataCodec, Signer};
use metacheck_live::SubscriptionMultiplexer;
use parity_scale_codec::Encode;
use std::sync::Arc;

/// The test account's free balance, in multiples of the existential deposit.
pub const FUNDING_MULTIPLIER: u128 = 1_000;

/// `AccountInfo.flags` with the new-logic bit set.
const ACCOUNT_FLAGS: u128 = 1 << 127;

/// Caller-supplied implementations of the algorithmic seams.
#[derive(Clone)]
pub struct Toolkit {
    pub codec: Arc<dyn MetadataCodec>,
    pub digester: Arc<dyn MetadataDigester>,
    pub signer: Arc<dyn Signer>,
}

impl Toolkit {
    pub fn new(
        codec: Arc<dyn MetadataCodec>,
        digester: Arc<dyn MetadataDigester>,
        signer: Arc<dyn Signer>,
    ) -> Self {
        Self {
            codec,
            digester,
            signer,
        }
    }
}

/// A ready session: the base client plus the metadata-aware API over it.
pub struct DiagnosticClient {
    pub client: Arc<ChainClient>,
    pub api: ChainApi,
}

impl DiagnosticClient {
    /// Connect, fund the signer's account and produce one block.
    ///
    /// On failure everything opened so far is released before returning.
    pub async fn open(
        multiplexer: &Arc<SubscriptionMultiplexer>,
        toolkit: &Toolkit,
        timeouts: LinkTimeouts,
    ) -> Result<Self> {
        let client = Arc::new(ChainClient::connect(multiplexer, timeouts).await?);

        match fund_test_account(&client, toolkit).await {
            Ok(api) => Ok(Self { client, api }),
            Err(e) => {
                client.destroy().await;
                Err(e)
            },
        }
    }

    /// Disconnect the session's logical connection. Idempotent.
    pub async fn destroy(&self) {
        self.client.destroy().await;
    }
}

async fn fund_test_account(client: &Arc<ChainClient>, toolkit: &Toolkit) -> Result<ChainApi> {
    let api = ChainApi::load(Arc::clone(client), Arc::clone(&toolkit.codec)).await?;

    let account = toolkit.signer.public_key();
    let key = api.account_storage_key(&account)?;
    let existential_deposit = api.constant_u128("Balances", "ExistentialDeposit")?;
    let info = encode_account_info(existential_deposit)?;

    client.set_storage(&[(key, Some(info))]).await?;
    let block = client.new_block().await?;
    log::debug!(
        "[metacheck-core] Funded 0x{} with {} x ED, new block {:?}",
        hex::encode(&account),
        FUNDING_MULTIPLIER,
        block
    );
    Ok(api)
}

/// `frame_system::AccountInfo` with `pallet_balances::AccountData`.
#[derive(Debug, Encode)]
struct AccountInfo {
    nonce: u32,
    consumers: u32,
    providers: u32,
    sufficients: u32,
    data: AccountData,
}

#[derive(Debug, Encode)]
struct AccountData {
    free: u128,
    reserved: u128,
    frozen: u128,
    flags: u128,
}

/// Encoded `AccountInfo` for the test account: one nonce, one consumer and
/// one provider, funded with [`FUNDING_MULTIPLIER`] existential deposits.
pub fn encode_account_info(existential_deposit: u128) -> Result<Vec<u8>> {
    let free = existential_deposit
        .checked_mul(FUNDING_MULTIPLIER)
        .ok_or_else(|| {
            DiagnosticError::Session(format!(
                "existential deposit {} too large to fund",
                existential_deposit
            ))
        })?;

    let info = AccountInfo {
        nonce: 1,
        consumers: 1,
        providers: 1,
        sufficients: 0,
        data: AccountData {
            free,
            reserved: 0,
            frozen: 0,
            flags: ACCOUNT_FLAGS,
        },
    };
    Ok(info.encode())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_info_layout() {
        let info = encode_account_info(10).unwrap();
        assert_eq!(info.len(), 80);
        assert_eq!(&info[0..4], &1u32.to_le_bytes());
        assert_eq!(&info[8..12], &1u32.to_le_bytes());
        assert_eq!(&info[12..16], &0u32.to_le_bytes());
        assert_eq!(&info[16..32], &10_000u128.to_le_bytes());
        assert!(info[32..64].iter().all(|b| *b == 0));
        assert_eq!(info[79], 0x80);
        assert!(info[64..79].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_account_info_overflow() {
        assert!(matches!(
            encode_account_info(u128::MAX),
            Err(DiagnosticError::Session(_))
        ));
    }
}
