use {
    near_sdk::{
        collections::UnorderedSet,
        env,
        ext_contract,
        json_types::Base64VecU8,
        near,
        require,
        serde::Serialize,
        serde_json,
        AccountId,
        Gas,
        NearToken,
        PanicOnDefault,
        Promise,
        PromiseError,
        PromiseOrValue,
    },
};

pub mod byte_utils;
pub mod payload;
pub mod state;

use crate::payload::{CallResult, GovernanceCall};
use crate::state::ParsedVAA;

// Wormhole core interface, the attestation collaborator that owns
// guardian sets and quorum math.
#[ext_contract(ext_wormhole)]
pub trait Wormhole {
    fn verify_vaa(&self, vaa: String) -> u32;
}

/// Prepaid gas for the quorum verification call on the core contract.
const VERIFY_CALL_GAS: Gas = Gas::from_tgas(20);
/// Default budget for a single governance call when the batch omits one.
const CALL_CALL_GAS: Gas = Gas::from_tgas(5);
/// Reserved for collecting per-call outcomes after the batch settles.
const AGGREGATE_CALL_GAS: Gas = Gas::from_tgas(10);
/// Floor for the whole delivery pipeline.
const MIN_DELIVERY_GAS: Gas = Gas::from_tgas(150);

const EMITTER_ADDRESS_LEN: usize = 32;
/// Storage headroom the attached deposit must cover before a sequence is recorded.
const SEQUENCE_STORAGE_BUFFER: u64 = 64;

#[must_use]
#[derive(Serialize, Debug, Clone)]
#[serde(crate = "near_sdk::serde")]
pub struct RelayerEvent {
    standard: String,
    event:    String,
    data:     String,
    seq:      u64,
    block:    u64,
}

impl RelayerEvent {
    fn to_json_string(&self) -> String {
        // Events cannot fail to serialize so fine to panic on error
        #[allow(clippy::redundant_closure)]
        serde_json::to_string(self)
            .ok()
            .unwrap_or_else(|| env::abort())
    }

    fn new(event: &str, data: String, seq: u64) -> Self {
        Self {
            standard: "governor-relayer".to_string(),
            event: event.to_string(),
            data,
            seq,
            block: env::block_height(),
        }
    }

    pub(crate) fn emit(self) {
        env::log_str(&format!("EVENT_JSON:{}", self.to_json_string()));
    }
}

#[near(contract_state)]
#[derive(PanicOnDefault)]
pub struct GovernorRelayer {
    owner: AccountId,
    wormhole_core: AccountId,
    foreign_governor_chain: u16,
    foreign_governor_address: Vec<u8>,
    dups: UnorderedSet<u64>,
}

impl GovernorRelayer {
    /// Emitter and replay gate. Panics reject the whole delivery; on success
    /// the sequence is recorded before any batch execution is scheduled.
    fn admit(&mut self, vaa: &ParsedVAA) {
        if vaa.emitter_chain != self.foreign_governor_chain
            || vaa.emitter_address != self.foreign_governor_address
        {
            env::panic_str("WrongEmitter");
        }

        if !self.dups.insert(&vaa.sequence) {
            env::panic_str("AlreadyProcessed");
        }
    }

    fn dispatch(call: GovernanceCall) -> Promise {
        Promise::new(call.contract_id).function_call(
            call.method_name,
            call.args,
            NearToken::from_yoctonear(call.deposit.0),
            call.gas.map(Gas::from_tgas).unwrap_or(CALL_CALL_GAS),
        )
    }
}

#[near]
impl GovernorRelayer {
    /// Initializes the relay with its trust root: the attestation core to
    /// delegate quorum checks to and the only (chain, address) pair whose
    /// governance batches will be executed.
    #[init]
    pub fn new(
        owner_id: AccountId,
        wormhole_core: AccountId,
        foreign_governor_chain: u16,
        foreign_governor_address: Vec<u8>,
    ) -> Self {
        require!(
            foreign_governor_address.len() == EMITTER_ADDRESS_LEN,
            "InvalidEmitterAddress"
        );

        Self {
            owner: owner_id,
            wormhole_core,
            foreign_governor_chain,
            foreign_governor_address,
            dups: UnorderedSet::new(b"d".to_vec()),
        }
    }

    pub fn change_owner(&mut self, new_owner: AccountId) {
        require!(env::predecessor_account_id() == self.owner, "Unauthorized");

        RelayerEvent::new("owner_changed", new_owner.to_string(), 0).emit();
        self.owner = new_owner;
    }

    /// Owner-gated trust-root update; the normal lifecycle sets it once in `new`.
    pub fn set_foreign_governor(&mut self, chain: u16, address: Vec<u8>) {
        require!(env::predecessor_account_id() == self.owner, "Unauthorized");
        require!(address.len() == EMITTER_ADDRESS_LEN, "InvalidEmitterAddress");

        RelayerEvent::new("governor_changed", hex::encode(&address), 0).emit();
        self.foreign_governor_chain = chain;
        self.foreign_governor_address = address;
    }

    /// Canonical byte encoding of a call batch. Pure codec: no authorization,
    /// no state. Used off-chain to build the payload a foreign governor emits.
    pub fn to_bytes(&self, calls: Vec<GovernanceCall>) -> Vec<u8> {
        payload::encode_batch(&calls)
    }

    /// Delivers a hex-encoded VAA: parse, delegate quorum verification,
    /// admit, decode and execute the embedded call batch. Resolves to one
    /// `CallResult` per call, in batch order.
    #[payable]
    pub fn delivery(&mut self, vaa: String) -> Promise {
        if env::prepaid_gas() < MIN_DELIVERY_GAS {
            env::panic_str("NotEnoughGas");
        }
        if env::attached_deposit()
            < env::storage_byte_cost().saturating_mul(u128::from(SEQUENCE_STORAGE_BUFFER))
        {
            env::panic_str("StorageDepositUnderflow");
        }

        let h = hex::decode(&vaa).unwrap_or_else(|_| env::panic_str("invalidVaa"));
        // Reject malformed envelopes before paying for quorum verification.
        ParsedVAA::parse(&h);

        env::log_str(&format!(
            "governor/{}#{}: delivery  prepaid_gas: {}  used_gas: {}",
            file!(),
            line!(),
            serde_json::to_string(&env::prepaid_gas()).unwrap(),
            serde_json::to_string(&env::used_gas()).unwrap()
        ));

        ext_wormhole::ext(self.wormhole_core.clone())
            .with_static_gas(VERIFY_CALL_GAS)
            .verify_vaa(vaa)
            .then(
                Self::ext(env::current_account_id())
                    .with_attached_deposit(env::attached_deposit())
                    .with_unused_gas_weight(1)
                    .on_verify_complete(Base64VecU8::from(h), env::predecessor_account_id()),
            )
    }

    /// Resumes after the attestation core ruled on the guardian quorum.
    /// Commits the sequence in this receipt, so a later failure inside the
    /// batch cannot un-process the VAA.
    #[private]
    #[payable]
    pub fn on_verify_complete(
        &mut self,
        vaa: Base64VecU8,
        refund_to: AccountId,
        #[callback_result] gov_idx: Result<u32, PromiseError>,
    ) -> Promise {
        if gov_idx.is_err() {
            env::panic_str("VaaVerificationFailed");
        }

        let vaa = ParsedVAA::parse(&vaa.0);

        let storage_used = env::storage_usage();
        self.admit(&vaa);

        let required_cost = env::storage_byte_cost()
            .saturating_mul(u128::from(env::storage_usage() - storage_used));
        let mut deposit = env::attached_deposit();
        if required_cost > deposit {
            env::panic_str("DepositUnderflowForSequence");
        }
        deposit = deposit.saturating_sub(required_cost);
        if deposit.as_yoctonear() > 1 {
            Promise::new(refund_to).transfer(deposit);
        }

        RelayerEvent::new(
            "sequence_committed",
            hex::encode(&vaa.emitter_address),
            vaa.sequence,
        )
        .emit();

        Self::ext(env::current_account_id())
            .with_unused_gas_weight(1)
            .execute_batch(Base64VecU8::from(vaa.payload))
    }

    /// Decodes the authenticated payload and dispatches every call. Runs in
    /// its own receipt: a malformed payload aborts here without touching the
    /// already-committed sequence.
    #[private]
    pub fn execute_batch(&mut self, payload: Base64VecU8) -> PromiseOrValue<Vec<CallResult>> {
        let calls = payload::decode_batch(&payload.0);
        let count = calls.len() as u32;

        env::log_str(&format!(
            "governor/{}#{}: execute_batch: {} calls",
            file!(),
            line!(),
            count
        ));

        let mut batch: Option<Promise> = None;
        for call in calls {
            let p = Self::dispatch(call);
            batch = Some(match batch {
                Some(joined) => joined.and(p),
                None => p,
            });
        }

        match batch {
            Some(batch) => PromiseOrValue::Promise(
                batch.then(
                    Self::ext(env::current_account_id())
                        .with_static_gas(AGGREGATE_CALL_GAS)
                        .on_batch_complete(count),
                ),
            ),
            // An empty batch is a valid delivery; nothing to execute.
            None => PromiseOrValue::Value(Vec::new()),
        }
    }

    /// Joins the settled batch. `CallResult[i]` corresponds to call `i`
    /// no matter in which order the receipts resolved; a failed call is
    /// captured in place and does not disturb its neighbours.
    #[private]
    pub fn on_batch_complete(&self, count: u32) -> Vec<CallResult> {
        require!(
            env::promise_results_count() == u64::from(count),
            "WrongResultCount"
        );

        (0..u64::from(count))
            .map(|i| CallResult::from_promise(env::promise_result(i)))
            .collect()
    }

    pub fn foreign_governor_chain(&self) -> u16 {
        self.foreign_governor_chain
    }

    pub fn foreign_governor_address(&self) -> Vec<u8> {
        self.foreign_governor_address.clone()
    }

    pub fn processed_count(&self) -> u64 {
        self.dups.len()
    }

    pub fn storage_footprint(&self) -> u64 {
        env::storage_usage()
    }

    pub fn version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_owned()
    }
}
