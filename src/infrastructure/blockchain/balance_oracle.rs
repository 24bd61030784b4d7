//! Output-asset balance reads from associated token accounts

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::program_pack::Pack;
use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account::get_associated_token_address;
use tracing::debug;

use crate::domain::result::BalanceOracle;
use crate::shared::errors::SurfaceError;

pub struct SplBalanceOracle {
    rpc_client: Arc<RpcClient>,
}

impl SplBalanceOracle {
    pub fn new(rpc_client: Arc<RpcClient>) -> Self {
        Self { rpc_client }
    }
}

pub(crate) fn parse_pubkey(label: &str, value: &str) -> Result<Pubkey, SurfaceError> {
    Pubkey::from_str(value).map_err(|e| SurfaceError::Encoding(format!("invalid {} {}: {}", label, value, e)))
}

/// Token amount held in a raw SPL token account.
pub(crate) fn token_amount(data: &[u8]) -> Result<u64, SurfaceError> {
    spl_token::state::Account::unpack(data)
        .map(|account| account.amount)
        .map_err(|e| SurfaceError::Encoding(format!("not a token account: {}", e)))
}

#[async_trait]
impl BalanceOracle for SplBalanceOracle {
    async fn balance(&self, asset: &str, owner: &str) -> Result<u64, SurfaceError> {
        let mint = parse_pubkey("mint", asset)?;
        let owner = parse_pubkey("owner", owner)?;
        let ata = get_associated_token_address(&owner, &mint);

        let account = self
            .rpc_client
            .get_account_with_commitment(&ata, self.rpc_client.commitment())
            .await
            .map_err(|e| SurfaceError::Submission(format!("balance query failed: {}", e)))?
            .value;

        match account {
            Some(account) => token_amount(&account.data),
            None => {
                debug!("No token account {} yet, balance is zero", ata);
                Ok(0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::program_option::COption;
    use spl_token::state::{Account, AccountState};

    #[test]
    fn test_token_amount_from_account_data() {
        let account = Account {
            mint: Pubkey::new_unique(),
            owner: Pubkey::new_unique(),
            amount: 4_200_000,
            delegate: COption::None,
            state: AccountState::Initialized,
            is_native: COption::None,
            delegated_amount: 0,
            close_authority: COption::None,
        };
        let mut data = vec![0u8; Account::LEN];
        Account::pack(account, &mut data).unwrap();

        assert_eq!(token_amount(&data).unwrap(), 4_200_000);
        assert!(token_amount(&data[..10]).is_err());
    }

    #[test]
    fn test_bad_pubkey_is_encoding_error() {
        assert!(matches!(parse_pubkey("mint", "nope"), Err(SurfaceError::Encoding(_))));
    }
}
