//! Receipt normalization
//!
//! Backends hand back receipts in different shapes: node receipts with raw
//! `topics`/`data` logs, or receipts whose logs a backend already decoded into
//! `event`/`args`. [`normalize`] turns either into a [`NormalizedReceipt`]
//! holding only the events the caller registered, decoded the same way.

use crate::diagnostics::{DiagnosticKind, DiagnosticSink};
use crate::error::{Error, Result};
use crate::types::{display_value, parse_u256, EventFields, NormalizedReceipt, RawLog, RawReceipt};
use alloy_dyn_abi::{DynSolValue, EventExt};
use alloy_json_abi::Event;
use alloy_primitives::{hex, Address, Bytes, B256};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Which contract must have emitted a registered event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Emitter {
    /// The contract a dispatch calls, filled in by [`EventRegistry::bound_to`]
    Target,
    At(Address),
    Any,
}

#[derive(Debug, Clone)]
struct KnownEvent {
    event: Event,
    selector: B256,
    emitter: Emitter,
}

impl KnownEvent {
    fn emitted_by(&self, address: Option<Address>) -> bool {
        match (self.emitter, address) {
            (Emitter::At(bound), Some(actual)) => bound == actual,
            // backend-decoded logs may omit the emitter
            _ => true,
        }
    }
}

/// Events a caller wants back from a receipt
#[derive(Debug, Clone, Default)]
pub struct EventRegistry {
    events: Vec<KnownEvent>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry of human-readable event signatures, e.g.
    /// `"event SharesBought(address indexed buyer, uint256 outcome, uint256 amount)"`
    pub fn parse(signatures: &[&str]) -> Result<Self> {
        signatures
            .iter()
            .try_fold(Self::new(), |registry, sig| registry.with_event(sig))
    }

    /// Register an event of the called contract
    ///
    /// The dispatcher binds it to the call's target; logs with the same
    /// signature from other contracts are dropped.
    pub fn with_event(self, signature: &str) -> Result<Self> {
        Ok(self.with(parse_event(signature)?, None))
    }

    /// Register an event that only counts when `address` emitted it
    pub fn with_event_at(self, signature: &str, address: Address) -> Result<Self> {
        Ok(self.with(parse_event(signature)?, Some(address)))
    }

    /// Register an event that counts whichever contract emitted it
    pub fn with_event_from_any(self, signature: &str) -> Result<Self> {
        Ok(self.push(parse_event(signature)?, Emitter::Any))
    }

    /// Register an already parsed ABI event, bound to `address` or to the
    /// called contract when `None`
    pub fn with(self, event: Event, address: Option<Address>) -> Self {
        let emitter = address.map_or(Emitter::Target, Emitter::At);
        self.push(event, emitter)
    }

    fn push(mut self, event: Event, emitter: Emitter) -> Self {
        let selector = event.selector();
        self.events.push(KnownEvent {
            event,
            selector,
            emitter,
        });
        self
    }

    /// Bind events registered for the called contract to `target`
    pub fn bound_to(mut self, target: Address) -> Self {
        for known in &mut self.events {
            if known.emitter == Emitter::Target {
                known.emitter = Emitter::At(target);
            }
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn by_topic(&self, topic0: &B256, address: Address) -> Option<&KnownEvent> {
        self.events
            .iter()
            .filter(|known| !known.event.anonymous && &known.selector == topic0)
            .find(|known| known.emitted_by(Some(address)))
    }

    fn by_name(&self, name: &str, address: Option<Address>) -> Option<&KnownEvent> {
        self.events
            .iter()
            .filter(|known| known.event.name == name)
            .find(|known| known.emitted_by(address))
    }
}

fn parse_event(signature: &str) -> Result<Event> {
    let signature = signature.trim();
    let full = if signature.starts_with("event ") {
        signature.to_string()
    } else {
        format!("event {}", signature)
    };
    Event::parse(&full)
        .map_err(|e| Error::InvalidParameter(format!("invalid event signature {:?}: {}", signature, e)))
}

/// Normalize `receipt` against `registry`
///
/// Logs of unknown events are dropped, as are logs from a contract other than
/// the one an event is bound to. Events not yet bound with
/// [`EventRegistry::bound_to`] match any emitter. Logs of known events that fail to
/// decode are reported to `diagnostics` and dropped. Occurrences of the same
/// event keep their emission order; the output is fully ordered, so
/// normalizing the same receipt twice serializes identically.
pub fn normalize(
    receipt: &RawReceipt,
    registry: &EventRegistry,
    diagnostics: &DiagnosticSink,
) -> NormalizedReceipt {
    let mut events: BTreeMap<String, Vec<EventFields>> = BTreeMap::new();

    for (index, log) in receipt.logs.iter().enumerate() {
        let decoded = match log {
            RawLog::Raw {
                address,
                topics,
                data,
            } => {
                let Some(known) = topics
                    .first()
                    .and_then(|topic0| registry.by_topic(topic0, *address))
                else {
                    continue;
                };
                decode_raw(&known.event, topics, data).map(|f| (known, f))
            }
            RawLog::Decoded {
                address,
                event,
                args,
            } => {
                let Some(known) = registry.by_name(event, *address) else {
                    continue;
                };
                fields_from_args(&known.event, args).map(|f| (known, f))
            }
        };

        match decoded {
            Ok((known, fields)) => events
                .entry(known.event.name.clone())
                .or_default()
                .push(fields),
            Err(e) => diagnostics.report(
                DiagnosticKind::EventDecode,
                format!("log {} of {}: {}", index, receipt.transaction_hash, e),
            ),
        }
    }

    NormalizedReceipt {
        transaction_hash: receipt.transaction_hash,
        status: receipt.status,
        events,
    }
}

fn param_key(name: &str, position: usize) -> String {
    if name.is_empty() {
        position.to_string()
    } else {
        name.to_string()
    }
}

fn decode_raw(event: &Event, topics: &[B256], data: &Bytes) -> Result<EventFields> {
    let decoded = event
        .decode_log_parts(topics.iter().copied(), data, true)
        .map_err(|e| Error::InvalidParameter(format!("{}: {}", event.name, e)))?;

    let mut indexed = decoded.indexed.iter();
    let mut body = decoded.body.iter();
    let mut fields = EventFields::new();

    for (position, param) in event.inputs.iter().enumerate() {
        let value = if param.indexed {
            indexed.next()
        } else {
            body.next()
        };
        let value = value.ok_or_else(|| {
            Error::InvalidParameter(format!("{}: missing value for {}", event.name, param.name))
        })?;
        fields.insert(param_key(&param.name, position), sol_to_json(value));
    }

    Ok(fields)
}

fn fields_from_args(event: &Event, args: &Map<String, Value>) -> Result<EventFields> {
    let mut fields = EventFields::new();

    for (position, param) in event.inputs.iter().enumerate() {
        let key = param_key(&param.name, position);
        let value = args
            .get(&key)
            .or_else(|| args.get(&position.to_string()))
            .ok_or_else(|| {
                Error::InvalidParameter(format!("{}: argument {} missing", event.name, key))
            })?;
        fields.insert(key, json_to_canonical(value));
    }

    Ok(fields)
}

/// Canonical JSON for a decoded Solidity value: integers as decimal strings,
/// checksummed addresses, `0x` hex bytes
fn sol_to_json(value: &DynSolValue) -> Value {
    match value {
        DynSolValue::Bool(b) => Value::Bool(*b),
        DynSolValue::String(s) => Value::String(s.clone()),
        DynSolValue::Bytes(b) => Value::String(format!("0x{}", hex::encode(b))),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            Value::Array(items.iter().map(sol_to_json).collect())
        }
        other => Value::String(display_value(other)),
    }
}

/// Bring backend-decoded values to the same canonical form as
/// [`sol_to_json`]
fn json_to_canonical(value: &Value) -> Value {
    match value {
        Value::Number(n) => Value::String(n.to_string()),
        Value::String(s) => match s.parse::<Address>() {
            Ok(address) if s.len() == 42 => Value::String(address.to_checksum(None)),
            _ => Value::String(s.clone()),
        },
        Value::Array(items) => Value::Array(items.iter().map(json_to_canonical).collect()),
        Value::Object(obj) => match big_number(obj) {
            Some(decimal) => Value::String(decimal),
            None => Value::Object(
                obj.iter()
                    .map(|(k, v)| (k.clone(), json_to_canonical(v)))
                    .collect(),
            ),
        },
        other => other.clone(),
    }
}

/// `{"type": "BigNumber", "hex": "0x..."}` as produced by JS clients
fn big_number(obj: &Map<String, Value>) -> Option<String> {
    if obj.get("type").and_then(Value::as_str) != Some("BigNumber") {
        return None;
    }
    let hex = obj
        .get("hex")
        .or_else(|| obj.get("_hex"))
        .and_then(Value::as_str)?;
    parse_u256(hex).ok().map(|v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReceiptStatus;
    use alloy_primitives::{address, U256};
    use serde_json::json;

    const MARKET: Address = address!("4D97DCd97eC945f40cF65F87097ACe5EA0476045");
    const BUYER: Address = address!("9406Cc6185a346906296840746125a0E44976454");
    const BOUGHT: &str =
        "event SharesBought(address indexed buyer, uint256 indexed outcome, uint256 amount)";

    fn word(v: U256) -> B256 {
        B256::from(v.to_be_bytes::<32>())
    }

    fn bought_log(outcome: u64, amount: u64) -> RawLog {
        let event = parse_event(BOUGHT).unwrap();
        RawLog::Raw {
            address: MARKET,
            topics: vec![event.selector(), BUYER.into_word(), word(U256::from(outcome))],
            data: Bytes::from(word(U256::from(amount)).to_vec()),
        }
    }

    fn receipt(logs: Vec<RawLog>) -> RawReceipt {
        RawReceipt {
            transaction_hash: B256::repeat_byte(0xab),
            status: ReceiptStatus::Success,
            logs,
        }
    }

    #[test]
    fn test_decodes_registered_event_and_drops_others() {
        let unrelated = RawLog::Raw {
            address: MARKET,
            topics: vec![B256::repeat_byte(0x99)],
            data: Bytes::new(),
        };
        let registry = EventRegistry::parse(&[BOUGHT]).unwrap();
        let out = normalize(
            &receipt(vec![unrelated, bought_log(1, 500)]),
            &registry,
            &DiagnosticSink::new(),
        );

        assert_eq!(out.events.len(), 1);
        let bought = out.events_named("SharesBought");
        assert_eq!(bought.len(), 1);
        assert_eq!(bought[0]["buyer"], json!(BUYER.to_checksum(None)));
        assert_eq!(bought[0]["outcome"], json!("1"));
        assert_eq!(bought[0]["amount"], json!("500"));
    }

    #[test]
    fn test_same_event_accumulates_in_order() {
        let registry = EventRegistry::parse(&[BOUGHT]).unwrap();
        let out = normalize(
            &receipt(vec![bought_log(0, 1), bought_log(1, 2), bought_log(0, 3)]),
            &registry,
            &DiagnosticSink::new(),
        );

        let amounts: Vec<&Value> = out
            .events_named("SharesBought")
            .iter()
            .map(|f| &f["amount"])
            .collect();
        assert_eq!(amounts, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_address_binding_filters_emitter() {
        let registry = EventRegistry::new()
            .with_event_at(BOUGHT, Address::repeat_byte(0x01))
            .unwrap();
        let out = normalize(&receipt(vec![bought_log(1, 1)]), &registry, &DiagnosticSink::new());
        assert!(out.events.is_empty());
    }

    #[test]
    fn test_bound_registry_ignores_same_event_from_other_contract() {
        let mut foreign = bought_log(1, 7);
        if let RawLog::Raw { address, .. } = &mut foreign {
            *address = Address::repeat_byte(0x99);
        }
        let logs = vec![foreign, bought_log(1, 500)];

        let bound = EventRegistry::parse(&[BOUGHT]).unwrap().bound_to(MARKET);
        let out = normalize(&receipt(logs.clone()), &bound, &DiagnosticSink::new());
        let bought = out.events_named("SharesBought");
        assert_eq!(bought.len(), 1);
        assert_eq!(bought[0]["amount"], json!("500"));

        let any = EventRegistry::new()
            .with_event_from_any(BOUGHT)
            .unwrap()
            .bound_to(MARKET);
        let out = normalize(&receipt(logs), &any, &DiagnosticSink::new());
        assert_eq!(out.events_named("SharesBought").len(), 2);
    }

    #[test]
    fn test_decode_failure_goes_to_diagnostics() {
        let event = parse_event(BOUGHT).unwrap();
        let truncated = RawLog::Raw {
            address: MARKET,
            topics: vec![event.selector(), BUYER.into_word(), word(U256::from(1))],
            data: Bytes::from(vec![0x01]),
        };
        let (sink, mut rx) = DiagnosticSink::channel();
        let registry = EventRegistry::parse(&[BOUGHT]).unwrap();

        let out = normalize(&receipt(vec![truncated, bought_log(2, 9)]), &registry, &sink);

        assert_eq!(out.events_named("SharesBought").len(), 1);
        let diag = rx.try_recv().unwrap();
        assert_eq!(diag.kind, DiagnosticKind::EventDecode);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_pre_decoded_logs_match_raw_decoding() {
        let decoded = RawLog::Decoded {
            address: Some(MARKET),
            event: "SharesBought".into(),
            args: json!({
                "0": BUYER.to_string().to_lowercase(),
                "buyer": BUYER.to_string().to_lowercase(),
                "outcome": 1,
                "amount": { "type": "BigNumber", "hex": "0x01f4" }
            })
            .as_object()
            .cloned()
            .unwrap(),
        };
        let registry = EventRegistry::parse(&[BOUGHT]).unwrap();
        let sink = DiagnosticSink::new();

        let from_decoded = normalize(&receipt(vec![decoded]), &registry, &sink);
        let from_raw = normalize(&receipt(vec![bought_log(1, 500)]), &registry, &sink);
        assert_eq!(from_decoded, from_raw);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let registry = EventRegistry::parse(&[
            BOUGHT,
            "event Claimed(address indexed user, uint256 amount)",
        ])
        .unwrap();
        let raw = receipt(vec![bought_log(1, 10), bought_log(0, 20)]);
        let sink = DiagnosticSink::new();

        let first = serde_json::to_string(&normalize(&raw, &registry, &sink)).unwrap();
        let second = serde_json::to_string(&normalize(&raw, &registry, &sink)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_signature_rejected() {
        assert!(EventRegistry::parse(&["event Broken(uint256"]).is_err());
    }
}
