use super::nonce::fetch_nonce;
use crate::account::contracts::ISimpleAccount;
use crate::account::SmartAccount;
use crate::backend::{AccountBackend, GasEstimate, Sponsorship};
use crate::chain::ChainClient;
use crate::error::Result;
use crate::retry::{with_retry, RetryPolicy};
use crate::types::{OperationCall, UserOperation};
use alloy_primitives::{Address, Bytes};
use alloy_sol_types::SolCall;

/// Assembles unsigned UserOperations for a smart account
#[derive(Clone)]
pub struct UserOpBuilder {
    chain: ChainClient,
    entry_point: Address,
    retry: RetryPolicy,
}

impl UserOpBuilder {
    pub fn new(chain: ChainClient, entry_point: Address, retry: RetryPolicy) -> Self {
        Self {
            chain,
            entry_point,
            retry,
        }
    }

    /// Build the operation for `call`: sender, nonce, initCode, call data and
    /// fees. Gas fields stay zero until [`apply_gas`] or
    /// [`apply_sponsorship`] fills them.
    pub async fn build(
        &self,
        account: &SmartAccount,
        call: &OperationCall,
        backend: &dyn AccountBackend,
    ) -> Result<UserOperation> {
        let sender = account.address;
        let key = backend.nonce_key();

        let nonce = with_retry(&self.retry, "EntryPoint.getNonce", || {
            fetch_nonce(&self.chain, self.entry_point, sender, key)
        })
        .await?;

        let code = with_retry(&self.retry, "eth_getCode", || self.chain.get_code(sender)).await?;
        let init_code = if code.is_empty() {
            log::debug!("account {} not deployed, attaching initCode", sender);
            account.init_code()
        } else {
            Bytes::new()
        };

        let fees = with_retry(&self.retry, "fee data", || backend.fee_data()).await?;

        Ok(UserOperation {
            sender,
            nonce,
            init_code,
            call_data: execute_call_data(call),
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
            ..Default::default()
        })
    }
}

/// `execute(target, value, data)` on the smart account
pub fn execute_call_data(call: &OperationCall) -> Bytes {
    ISimpleAccount::executeCall {
        dest: call.target,
        value: call.value,
        func: call.call_data.clone(),
    }
    .abi_encode()
    .into()
}

pub fn apply_gas(op: &mut UserOperation, gas: &GasEstimate) {
    op.pre_verification_gas = gas.pre_verification_gas;
    op.verification_gas_limit = gas.verification_gas_limit;
    op.call_gas_limit = gas.call_gas_limit;
}

/// Attach the paymaster data; gas and fee values from the paymaster win over
/// whatever the operation already carries
pub fn apply_sponsorship(op: &mut UserOperation, sponsorship: &Sponsorship) {
    op.paymaster_and_data = sponsorship.paymaster_and_data.clone();
    if let Some(gas) = &sponsorship.gas {
        apply_gas(op, gas);
    }
    if let Some(fees) = &sponsorship.fees {
        op.max_fee_per_gas = fees.max_fee_per_gas;
        op.max_priority_fee_per_gas = fees.max_priority_fee_per_gas;
    }
}
