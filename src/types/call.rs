//! Operation encoding
//!
//! An [`OperationCall`] is the chain-agnostic description of one contract
//! invocation. Domain wrappers build one per call and hand it to the dispatcher.

use crate::error::{Error, Result};
use alloy_dyn_abi::{DynSolType, DynSolValue, FunctionExt, JsonAbiExt, Specifier};
use alloy_json_abi::Function;
use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;

/// A single contract invocation: target, method, ABI-encoded arguments and value
#[derive(Debug, Clone, PartialEq)]
pub struct OperationCall {
    pub target: Address,
    /// Method name, e.g. `buyShares`
    pub method: String,
    /// Selector-prefixed ABI call data
    pub call_data: Bytes,
    /// Wei attached to the call
    pub value: U256,
    /// Arguments in display form, kept for observability records
    pub arguments: Vec<String>,
    function: Option<Function>,
}

impl OperationCall {
    /// Encode `signature` (e.g. `"function buy(uint256 outcome, uint256 amount)"`
    /// or `"buy(uint256,uint256)"`) with dynamic argument values
    pub fn encode(target: Address, signature: &str, args: &[DynSolValue]) -> Result<Self> {
        let function = parse_function(signature)?;
        let call_data = function
            .abi_encode_input(args)
            .map_err(|e| Error::InvalidCall(format!("{}: {}", function.name, e)))?;

        Ok(Self {
            target,
            method: function.name.clone(),
            call_data: call_data.into(),
            value: U256::ZERO,
            arguments: args.iter().map(display_value).collect(),
            function: Some(function),
        })
    }

    /// Encode `signature` with arguments given as strings, coerced against the
    /// parameter types (`"1000000"` for a `uint256`, `"0xabc…"` for an address)
    pub fn encode_str(target: Address, signature: &str, args: &[&str]) -> Result<Self> {
        let function = parse_function(signature)?;
        if function.inputs.len() != args.len() {
            return Err(Error::InvalidCall(format!(
                "{} expects {} arguments, got {}",
                function.name,
                function.inputs.len(),
                args.len()
            )));
        }

        let values = function
            .inputs
            .iter()
            .zip(args)
            .map(|(param, raw)| {
                let ty: DynSolType = param
                    .resolve()
                    .map_err(|e| Error::InvalidCall(format!("{}: {}", param.ty, e)))?;
                ty.coerce_str(raw).map_err(|e| {
                    Error::InvalidCall(format!("argument {:?} as {}: {}", raw, param.ty, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Self::encode(target, signature, &values)
    }

    /// Build from a typed `sol!` call
    pub fn from_sol<C: SolCall>(target: Address, call: &C) -> Self {
        let method = C::SIGNATURE
            .split('(')
            .next()
            .unwrap_or(C::SIGNATURE)
            .to_string();

        Self {
            target,
            method,
            call_data: call.abi_encode().into(),
            value: U256::ZERO,
            arguments: Vec::new(),
            function: parse_function(C::SIGNATURE).ok(),
        }
    }

    /// Wrap call data that was encoded elsewhere
    pub fn raw(target: Address, method: impl Into<String>, call_data: Bytes) -> Self {
        Self {
            target,
            method: method.into(),
            call_data,
            value: U256::ZERO,
            arguments: Vec::new(),
            function: None,
        }
    }

    /// Attach wei to the call
    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    /// Decode the return data of a read-only invocation
    ///
    /// Returns an empty list when the method signature is unknown.
    pub fn decode_output(&self, data: &[u8]) -> Result<Vec<DynSolValue>> {
        match &self.function {
            Some(function) => function
                .abi_decode_output(data, true)
                .map_err(|e| Error::InvalidCall(format!("{} output: {}", self.method, e))),
            None => Ok(Vec::new()),
        }
    }
}

fn parse_function(signature: &str) -> Result<Function> {
    let signature = signature.trim();
    let full = if signature.starts_with("function ") {
        signature.to_string()
    } else {
        format!("function {}", signature)
    };
    Function::parse(&full)
        .map_err(|e| Error::InvalidCall(format!("invalid method signature {:?}: {}", signature, e)))
}

/// Display form of a dynamic value; integers print in decimal
pub(crate) fn display_value(value: &DynSolValue) -> String {
    match value {
        DynSolValue::Bool(b) => b.to_string(),
        DynSolValue::Int(i, _) => i.to_string(),
        DynSolValue::Uint(u, _) => u.to_string(),
        DynSolValue::Address(a) => a.to_checksum(None),
        DynSolValue::FixedBytes(word, size) => {
            format!("0x{}", alloy_primitives::hex::encode(&word[..*size]))
        }
        DynSolValue::Bytes(b) => format!("0x{}", alloy_primitives::hex::encode(b)),
        DynSolValue::String(s) => s.clone(),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            let parts: Vec<String> = items.iter().map(display_value).collect();
            format!("[{}]", parts.join(","))
        }
        other => format!("{:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const MARKET: Address = address!("4D97DCd97eC945f40cF65F87097ACe5EA0476045");

    #[test]
    fn test_encode_selector_and_arguments() {
        let call = OperationCall::encode(
            MARKET,
            "buyShares(uint256 outcome, uint256 amount)",
            &[
                DynSolValue::Uint(U256::from(1), 256),
                DynSolValue::Uint(U256::from(1_000_000), 256),
            ],
        )
        .unwrap();

        assert_eq!(call.method, "buyShares");
        assert_eq!(call.call_data.len(), 4 + 64);
        assert_eq!(call.arguments, vec!["1", "1000000"]);
        let selector = alloy_primitives::keccak256("buyShares(uint256,uint256)");
        assert_eq!(&call.call_data[..4], &selector[..4]);
    }

    #[test]
    fn test_encode_str_coerces_types() {
        let call = OperationCall::encode_str(
            MARKET,
            "function approve(address spender, uint256 amount)",
            &["0x4D97DCd97eC945f40cF65F87097ACe5EA0476045", "1000000"],
        )
        .unwrap();

        assert_eq!(&call.call_data[..4], &[0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(call.call_data.len(), 68);
    }

    #[test]
    fn test_bad_arguments_are_caller_errors() {
        let err = OperationCall::encode_str(MARKET, "approve(address,uint256)", &["nope", "1"])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCall(_)));

        let err = OperationCall::encode_str(MARKET, "approve(address,uint256)", &["1"])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCall(_)));

        let err = OperationCall::encode(MARKET, "not a signature", &[]).unwrap_err();
        assert!(matches!(err, Error::InvalidCall(_)));
    }

    #[test]
    fn test_from_sol_keeps_method_name() {
        use crate::account::contracts::ISimpleAccountFactory;

        let call = OperationCall::from_sol(
            MARKET,
            &ISimpleAccountFactory::getAddressCall {
                owner: MARKET,
                salt: U256::ZERO,
            },
        );
        assert_eq!(call.method, "getAddress");
        assert_eq!(call.call_data.len(), 4 + 64);
        assert!(call.arguments.is_empty());
    }

    #[test]
    fn test_decode_output() {
        let call = OperationCall::encode(
            MARKET,
            "function balanceOf(address owner) returns (uint256)",
            &[DynSolValue::Address(MARKET)],
        )
        .unwrap();

        let mut data = [0u8; 32];
        data[31] = 42;
        let out = call.decode_output(&data).unwrap();
        assert_eq!(out, vec![DynSolValue::Uint(U256::from(42), 256)]);
    }
}
