//! Unsigned transaction assembly
//!
//! Builds plain value transfers and contract invocations. Contract calls are
//! described by a [`ContractCallSpec`] whose parameters are checked against the
//! registry ABI before anything is encoded.

use crate::config::GasConfig;
use crate::contracts::{ContractDescriptor, ContractRegistry};
use crate::units;
use crate::{Error, Result};
use alloy::dyn_abi::{DynSolValue, JsonAbiExt};
use alloy::json_abi::{Function, Param};
use alloy::primitives::{Address, Bytes, U256};
use alloy::rpc::types::TransactionRequest;
use serde::Serialize;
use std::sync::Arc;

/// A transaction ready for signing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnsignedTransaction {
    pub from: Address,
    pub to: Address,
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_limit: U256,
    pub value: U256,
    pub data: Bytes,
    /// EIP-155 chain id; `None` signs without replay protection
    pub chain_id: Option<u64>,
}

impl UnsignedTransaction {
    /// Request form for `eth_call` / `eth_estimateGas`
    pub fn to_request(&self) -> TransactionRequest {
        TransactionRequest::default()
            .from(self.from)
            .to(self.to)
            .value(self.value)
            .input(self.data.clone().into())
    }
}

/// A typed contract argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiValue {
    Address(Address),
    Uint(U256),
}

impl AbiValue {
    fn kind(&self) -> &'static str {
        match self {
            AbiValue::Address(_) => "address",
            AbiValue::Uint(_) => "uint",
        }
    }
}

impl From<Address> for AbiValue {
    fn from(address: Address) -> Self {
        AbiValue::Address(address)
    }
}

impl From<U256> for AbiValue {
    fn from(value: U256) -> Self {
        AbiValue::Uint(value)
    }
}

/// A method invocation against a registry contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCallSpec {
    /// Registry name of the contract
    pub contract: String,
    pub method: String,
    pub params: Vec<AbiValue>,
}

impl ContractCallSpec {
    pub fn new(
        contract: impl Into<String>,
        method: impl Into<String>,
        params: Vec<AbiValue>,
    ) -> Self {
        Self {
            contract: contract.into(),
            method: method.into(),
            params,
        }
    }

    /// `balanceOf(owner)`
    pub fn balance_of(contract: impl Into<String>, owner: Address) -> Self {
        Self::new(contract, "balanceOf", vec![AbiValue::Address(owner)])
    }

    /// `transfer(to, amount)`
    pub fn transfer(contract: impl Into<String>, to: Address, amount: U256) -> Self {
        Self::new(
            contract,
            "transfer",
            vec![AbiValue::Address(to), AbiValue::Uint(amount)],
        )
    }
}

/// A call resolved against the registry and encoded
#[derive(Debug, Clone)]
pub struct EncodedCall<'a> {
    pub contract: &'a ContractDescriptor,
    pub function: &'a Function,
    /// Selector followed by the encoded arguments
    pub data: Bytes,
}

/// Assembles unsigned transactions for one chain
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    registry: Arc<ContractRegistry>,
    gas: GasConfig,
    chain_id: u64,
}

impl TransactionBuilder {
    pub fn new(registry: Arc<ContractRegistry>, gas: GasConfig, chain_id: u64) -> Self {
        Self {
            registry,
            gas,
            chain_id,
        }
    }

    pub fn registry(&self) -> &ContractRegistry {
        &self.registry
    }

    pub fn gas(&self) -> &GasConfig {
        &self.gas
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// A plain value transfer of `amount_eth` (decimal ether) to `to`
    pub fn build_transfer(
        &self,
        from: Address,
        to: Address,
        amount_eth: &str,
        nonce: u64,
    ) -> Result<UnsignedTransaction> {
        let value = units::parse_ether(amount_eth)?;
        Ok(UnsignedTransaction {
            from,
            to,
            nonce,
            gas_price: self.gas.gas_price_wei(),
            gas_limit: U256::from(self.gas.transfer_gas_limit),
            value,
            data: Bytes::new(),
            chain_id: Some(self.chain_id),
        })
    }

    /// A contract method invocation.
    ///
    /// `gas_price` and `gas_limit` fall back to the configured defaults.
    pub fn build_contract_call(
        &self,
        from: Address,
        spec: &ContractCallSpec,
        value: U256,
        nonce: u64,
        gas_price: Option<U256>,
        gas_limit: Option<U256>,
    ) -> Result<UnsignedTransaction> {
        let call = self.encode_call(spec)?;
        Ok(UnsignedTransaction {
            from,
            to: call.contract.address,
            nonce,
            gas_price: gas_price.unwrap_or_else(|| self.gas.gas_price_wei()),
            gas_limit: gas_limit.unwrap_or_else(|| U256::from(self.gas.contract_gas_limit)),
            value,
            data: call.data,
            chain_id: Some(self.chain_id),
        })
    }

    /// Resolve `spec` in the registry and ABI-encode it
    pub fn encode_call(&self, spec: &ContractCallSpec) -> Result<EncodedCall<'_>> {
        let contract = self.registry.get(&spec.contract)?;
        let overloads = contract.functions(&spec.method)?;

        let mut last_error = None;
        for function in overloads {
            match encode_args(function, &spec.params) {
                Ok(args) => {
                    let data = function
                        .abi_encode_input(&args)
                        .map_err(|e| Error::InvalidArgument(format!("ABI encoding failed: {}", e)))?;
                    return Ok(EncodedCall {
                        contract,
                        function,
                        data: Bytes::from(data),
                    });
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.unwrap_or_else(|| Error::UnknownMethod {
            contract: spec.contract.clone(),
            method: spec.method.clone(),
        }))
    }
}

/// Check `params` against `function`'s inputs and convert them
fn encode_args(function: &Function, params: &[AbiValue]) -> Result<Vec<DynSolValue>> {
    if function.inputs.len() != params.len() {
        return Err(Error::InvalidArgument(format!(
            "{} expects {} argument(s), got {}",
            function.signature(),
            function.inputs.len(),
            params.len()
        )));
    }

    function
        .inputs
        .iter()
        .zip(params)
        .enumerate()
        .map(|(i, (input, param))| encode_arg(function, i, input, param))
        .collect()
}

fn encode_arg(function: &Function, index: usize, input: &Param, param: &AbiValue) -> Result<DynSolValue> {
    let mismatch = || {
        Error::InvalidArgument(format!(
            "{} argument {} is {}, got {}",
            function.signature(),
            index,
            input.ty,
            param.kind()
        ))
    };

    match param {
        AbiValue::Address(address) if input.ty == "address" => Ok(DynSolValue::Address(*address)),
        AbiValue::Uint(value) => {
            let bits = uint_bits(&input.ty).ok_or_else(mismatch)?;
            if value.bit_len() > bits {
                return Err(Error::InvalidArgument(format!(
                    "{} argument {} does not fit in {}",
                    function.signature(),
                    index,
                    input.ty
                )));
            }
            Ok(DynSolValue::Uint(*value, bits))
        }
        _ => Err(mismatch()),
    }
}

/// Bit width of a `uintN` type name
pub(crate) fn uint_bits(ty: &str) -> Option<usize> {
    let width = ty.strip_prefix("uint")?;
    if width.is_empty() {
        return Some(256);
    }
    let bits: usize = width.parse().ok()?;
    (bits % 8 == 0 && (8..=256).contains(&bits)).then_some(bits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::ERC20_ABI;
    use std::str::FromStr;

    const FROM: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
    const TO: &str = "0x3535353535353535353535353535353535353535";

    fn builder() -> TransactionBuilder {
        let registry = ContractRegistry::builtin().unwrap();
        TransactionBuilder::new(Arc::new(registry), GasConfig::default(), 1)
    }

    fn addr(s: &str) -> Address {
        Address::from_str(s).unwrap()
    }

    #[test]
    fn test_build_transfer() {
        let tx = builder()
            .build_transfer(addr(FROM), addr(TO), "1.5", 7)
            .unwrap();
        assert_eq!(tx.value, U256::from(1_500_000_000_000_000_000u128));
        assert_eq!(tx.gas_limit, U256::from(21_000u64));
        assert_eq!(tx.gas_price, U256::from(11_000_000_000u64));
        assert_eq!(tx.nonce, 7);
        assert_eq!(tx.chain_id, Some(1));
        assert!(tx.data.is_empty());
    }

    #[test]
    fn test_build_transfer_rejects_bad_amount() {
        assert!(matches!(
            builder().build_transfer(addr(FROM), addr(TO), "one", 0),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_build_erc20_transfer() {
        let spec = ContractCallSpec::transfer("bbi", addr(TO), U256::from(1000u64));
        let tx = builder()
            .build_contract_call(addr(FROM), &spec, U256::ZERO, 3, None, None)
            .unwrap();

        assert_eq!(tx.to, crate::contracts::builtin::BBI_ADDRESS);
        assert_eq!(tx.gas_limit, U256::from(180_000u64));
        assert_eq!(tx.gas_price, U256::from(11_000_000_000u64));

        let expected = format!(
            "a9059cbb{:0>64}{:0>64}",
            "3535353535353535353535353535353535353535",
            "3e8"
        );
        assert_eq!(alloy::hex::encode(&tx.data), expected);
    }

    #[test]
    fn test_explicit_gas_overrides_defaults() {
        let spec = ContractCallSpec::balance_of("bbi", addr(FROM));
        let tx = builder()
            .build_contract_call(
                addr(FROM),
                &spec,
                U256::ZERO,
                0,
                Some(U256::from(5u64)),
                Some(U256::from(60_000u64)),
            )
            .unwrap();
        assert_eq!(tx.gas_price, U256::from(5u64));
        assert_eq!(tx.gas_limit, U256::from(60_000u64));
    }

    #[test]
    fn test_balance_of_encoding() {
        let b = builder();
        let call = b
            .encode_call(&ContractCallSpec::balance_of("bbi", addr(FROM)))
            .unwrap();
        assert_eq!(&call.data[..4], &[0x70, 0xa0, 0x82, 0x31]);
        assert_eq!(call.data.len(), 36);
        assert_eq!(&call.data[16..], addr(FROM).as_slice());
    }

    #[test]
    fn test_unknown_contract_and_method() {
        let b = builder();
        assert!(matches!(
            b.encode_call(&ContractCallSpec::new("nope", "transfer", vec![])),
            Err(Error::ContractNotFound(_))
        ));
        assert!(matches!(
            b.encode_call(&ContractCallSpec::new("bbi", "mint", vec![])),
            Err(Error::UnknownMethod { .. })
        ));
    }

    #[test]
    fn test_argument_mismatch() {
        let b = builder();
        // Wrong arity
        let spec = ContractCallSpec::new("bbi", "transfer", vec![AbiValue::Address(addr(TO))]);
        assert!(matches!(b.encode_call(&spec), Err(Error::InvalidArgument(_))));

        // Wrong kinds
        let spec = ContractCallSpec::new(
            "bbi",
            "transfer",
            vec![AbiValue::Uint(U256::from(1u64)), AbiValue::Address(addr(TO))],
        );
        assert!(matches!(b.encode_call(&spec), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_overload_resolution() {
        let abi = r#"[
            {"type":"function","name":"set","stateMutability":"nonpayable",
             "inputs":[{"name":"a","type":"address"}],"outputs":[]},
            {"type":"function","name":"set","stateMutability":"nonpayable",
             "inputs":[{"name":"v","type":"uint8"}],"outputs":[]}
        ]"#;
        let descriptor =
            crate::contracts::ContractDescriptor::from_abi_json("multi", Address::ZERO, abi)
                .unwrap();
        let b = TransactionBuilder::new(
            Arc::new(ContractRegistry::from_descriptors([descriptor])),
            GasConfig::default(),
            1,
        );

        let by_uint = b
            .encode_call(&ContractCallSpec::new("multi", "set", vec![U256::from(7u64).into()]))
            .unwrap();
        assert_eq!(by_uint.function.signature(), "set(uint8)");

        let by_addr = b
            .encode_call(&ContractCallSpec::new("multi", "set", vec![addr(TO).into()]))
            .unwrap();
        assert_eq!(by_addr.function.signature(), "set(address)");

        // 256 does not fit in uint8 and no other overload takes a uint
        assert!(matches!(
            b.encode_call(&ContractCallSpec::new("multi", "set", vec![U256::from(256u64).into()])),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_uint_bits() {
        assert_eq!(uint_bits("uint"), Some(256));
        assert_eq!(uint_bits("uint256"), Some(256));
        assert_eq!(uint_bits("uint8"), Some(8));
        assert_eq!(uint_bits("uint7"), None);
        assert_eq!(uint_bits("int256"), None);
        assert_eq!(uint_bits("uint264"), None);
    }

    #[test]
    fn test_to_request_carries_call_fields() {
        let registry = ContractRegistry::from_descriptors([
            crate::contracts::ContractDescriptor::from_abi_json("t", addr(TO), ERC20_ABI).unwrap(),
        ]);
        let b = TransactionBuilder::new(Arc::new(registry), GasConfig::default(), 1);
        let tx = b
            .build_contract_call(
                addr(FROM),
                &ContractCallSpec::balance_of("t", addr(FROM)),
                U256::ZERO,
                0,
                None,
                None,
            )
            .unwrap();
        let req = tx.to_request();
        assert_eq!(req.from, Some(addr(FROM)));
        assert_eq!(req.input.input().unwrap(), &tx.data);
    }
}
