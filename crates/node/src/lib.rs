// Path: crates/node/src/lib.rs
#![forbid(unsafe_code)]

//! # Veil Node
//!
//! The runtime assembly: owns every long-lived component (identity core,
//! audit log, index, inbox, engines, gate, transport) as explicit fields
//! with explicit initialization and teardown, and wires the end-to-end
//! request lifecycle — receive → assess → contract → plan → capsule →
//! egress → transfer — writing audit events at each stage.

pub mod connectors;
pub mod pipeline;
pub mod retry;
pub mod sync;

use std::path::Path;
use std::sync::Arc;
use tracing::info;
use veil_audit::{AuditEventType, AuditFile, AuditLog};
use veil_consent::contract::UserChoices;
use veil_consent::{apply_forced_defaults, assess, ContractEngine, ReceiveOutcome, RequestInbox};
use veil_crypto::key_store::FileKeyStore;
use veil_egress::EgressGate;
use veil_identity::IdentityCore;
use veil_index::labeler::ontology::Ontology;
use veil_index::labeler::Labeler;
use veil_index::odx::OdxStore;
use veil_transport::{SessionManager, TransferManager};
use veil_types::config::NodeConfig;
use veil_types::error::{ConfigError, CoreError, ProtocolError};
use veil_types::event::CanonicalEvent;
use veil_types::odx::TimeResolution;
use veil_types::plan::QueryPlan;
use veil_types::request::DataRequest;
use veil_types::session::TransportKind;
use veil_vm::{DataMap, NetworkGuard, PlanExecutor, PlanValue};

use crate::connectors::ConnectorRegistry;
use crate::pipeline::IndexPipeline;
use crate::sync::SyncPool;

pub use veil_telemetry::init_tracing;

/// What a fulfilled request produced.
#[derive(Debug, Clone)]
pub struct FulfillmentReport {
    /// The fulfilled request.
    pub request_id: String,
    /// The signed contract.
    pub contract_id: String,
    /// The executed plan.
    pub plan_id: String,
    /// The sealed capsule.
    pub capsule_id: String,
    /// The session the capsule left through.
    pub session_id: String,
    /// The completed transfer.
    pub transfer_id: String,
}

/// The long-lived runtime value owning all node state.
pub struct VeilNode {
    config: NodeConfig,
    audit: Arc<AuditLog>,
    identity: Arc<IdentityCore>,
    pipeline: IndexPipeline,
    inbox: RequestInbox,
    engine: ContractEngine,
    executor: PlanExecutor,
    gate: Arc<EgressGate>,
    sessions: SessionManager,
    transfers: TransferManager,
    registry: ConnectorRegistry,
    sync_pool: SyncPool,
}

impl VeilNode {
    /// Loads a TOML configuration file; an absent file yields defaults.
    pub fn load_config(path: &Path) -> Result<NodeConfig, ConfigError> {
        if !path.exists() {
            return Ok(NodeConfig::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Invalid(format!("config read failed: {}", e)))?;
        toml::from_str(&raw).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Initializes the runtime: key store, audit chain, identity, index,
    /// consent path, VM, gate, and transport — wired so that the VM's
    /// network guard interlocks the gate.
    pub fn init(
        config: NodeConfig,
        data_dir: &Path,
        key_passphrase: &str,
    ) -> Result<Self, CoreError> {
        let store = Arc::new(
            FileKeyStore::open(&data_dir.join("keys"), key_passphrase)
                .map_err(CoreError::Crypto)?,
        );

        // The audit log is keyed by the node DID, which needs the identity
        // core. Derive the DID against a throwaway log, then rebuild both
        // against the real one.
        let bootstrap_audit = Arc::new(AuditLog::new("did:veil:node:bootstrap"));
        let identity = Arc::new(
            IdentityCore::new(store, config.identity.clone(), bootstrap_audit)
                .map_err(CoreError::Config)?,
        );
        let node_did = identity.node_did().map_err(CoreError::Crypto)?;

        let audit = match &config.audit_path {
            Some(path) => {
                let file = AuditFile::open(Path::new(path)).map_err(CoreError::Integrity)?;
                Arc::new(
                    AuditLog::with_file(node_did.as_str(), file).map_err(CoreError::Integrity)?,
                )
            }
            None => Arc::new(AuditLog::new(node_did.as_str())),
        };

        // Re-bind identity to the real audit log.
        let store = Arc::new(
            FileKeyStore::open(&data_dir.join("keys"), key_passphrase)
                .map_err(CoreError::Crypto)?,
        );
        let identity = Arc::new(
            IdentityCore::new(store, config.identity.clone(), audit.clone())
                .map_err(CoreError::Config)?,
        );

        let odx = Arc::new(OdxStore::new(
            config.index.min_privacy_floor,
            config.index.timezone_offset_minutes,
        ));
        let pipeline = IndexPipeline::new(
            Labeler::new(Arc::new(Ontology::v1())),
            odx,
            config.index.timezone_offset_minutes,
        );

        let gate = Arc::new(EgressGate::new());
        let executor = PlanExecutor::new(NetworkGuard::new());
        gate.add_interlock(executor.guard());

        let inbox = RequestInbox::new(config.inbox.clone());
        let engine = ContractEngine::new(identity.clone(), audit.clone());
        let sessions =
            SessionManager::new(identity.clone(), audit.clone(), config.transport.clone());
        let transfers = TransferManager::with_deadline(
            gate.clone(),
            audit.clone(),
            config.transport.chunk_bytes,
            config.transport.chunk_deadline_ms,
        );
        let sync_pool = SyncPool::new(config.sync.clone());

        info!(node = %node_did, "veil node initialized");
        Ok(Self {
            config,
            audit,
            identity,
            pipeline,
            inbox,
            engine,
            executor,
            gate,
            sessions,
            transfers,
            registry: ConnectorRegistry::new(),
            sync_pool,
        })
    }

    /// The egress gate (for allowlist administration).
    pub fn gate(&self) -> &Arc<EgressGate> {
        &self.gate
    }

    /// The audit log.
    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    /// The identity core.
    pub fn identity(&self) -> &Arc<IdentityCore> {
        &self.identity
    }

    /// The request inbox.
    pub fn inbox(&self) -> &RequestInbox {
        &self.inbox
    }

    /// The indexing pipeline.
    pub fn pipeline(&self) -> &IndexPipeline {
        &self.pipeline
    }

    /// The contract engine.
    pub fn engine(&self) -> &ContractEngine {
        &self.engine
    }

    /// The session manager.
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// The connector registry.
    pub fn registry_mut(&mut self) -> &mut ConnectorRegistry {
        &mut self.registry
    }

    /// Ingests already-normalized events into the index.
    pub fn ingest_events(&self, events: &[CanonicalEvent]) -> Result<usize, CoreError> {
        self.pipeline.ingest_batch(events)
    }

    /// One background sync pass: drains every connector and indexes what
    /// came back.
    pub async fn sync_once(&self) -> Result<usize, CoreError> {
        let events = self.sync_pool.run_pass(&self.registry).await;
        self.pipeline.ingest_batch(&events)
    }

    fn receive_outcome_to_error(outcome: ReceiveOutcome, request_id: &str) -> CoreError {
        match outcome {
            ReceiveOutcome::Accepted => {
                CoreError::Validation("accepted outcome is not an error".into())
            }
            ReceiveOutcome::Expired => {
                ProtocolError::Expired(format!("request {}", request_id)).into()
            }
            ReceiveOutcome::ReplayDetected => {
                ProtocolError::ReplayDetected(request_id.to_string()).into()
            }
            ReceiveOutcome::InvalidSignature => ProtocolError::InvalidSignature.into(),
            ReceiveOutcome::MissingPolicyStamp => ProtocolError::MissingPolicyStamp.into(),
            ReceiveOutcome::InvalidPolicyStamp => ProtocolError::InvalidPolicyStamp.into(),
            ReceiveOutcome::InboxFull => ProtocolError::InboxFull.into(),
        }
    }

    /// Builds the VM input from the ODX slice the contract selected.
    fn plan_input(&self, draft: &veil_types::contract::ContractDraft) -> DataMap {
        let entries = self.pipeline.odx().query_selected(
            &draft.selected_labels,
            TimeResolution::Day,
            draft.time_window,
        );
        let mut data = DataMap::new();
        for entry in entries {
            let key = match &entry.geo_bucket {
                Some(geo) => format!("{}|{}|{}", entry.facet_key, entry.time_bucket, geo),
                None => format!("{}|{}", entry.facet_key, entry.time_bucket),
            };
            data.insert(key, PlanValue::Integer(entry.count as i64));
        }
        data
    }

    /// Runs the full request lifecycle and returns the fulfillment report.
    ///
    /// The capsule leaves through `destination`, which must already be on
    /// the gate's allowlist.
    #[allow(clippy::too_many_arguments)]
    pub async fn handle_request(
        &self,
        request: DataRequest,
        choices: UserChoices,
        plan: QueryPlan,
        remote_node_id: &str,
        remote_public_key_sec1: &[u8],
        destination: &str,
        now_ms: u64,
    ) -> Result<FulfillmentReport, CoreError> {
        let request_id = request.request_id.clone();
        let requester_id = request.requester_id.clone();

        // 1. Inbox: signature, policy stamp, replay, expiry, capacity.
        let outcome = self.inbox.receive(request.clone(), now_ms);
        if outcome != ReceiveOutcome::Accepted {
            return Err(Self::receive_outcome_to_error(outcome, &request_id));
        }
        self.audit
            .append(
                AuditEventType::RequestReceived,
                "request accepted into the inbox",
                serde_json::json!({ "request_id": request_id, "requester_id": requester_id }),
            )
            .map_err(CoreError::Integrity)?;

        // 2. Sensitivity gate over everything the request could touch.
        let assessment = assess(&request.grantable_labels(), request.output_mode);

        // 3. Contract: build, apply forced defaults, sign.
        let draft = self.engine.build_draft(&request, &choices, now_ms)?;
        let draft = apply_forced_defaults(draft, &assessment);
        let output_mode = draft.output_mode;
        let signed = self.engine.sign(draft, now_ms)?;
        let contract_id = signed.draft.contract_id.clone();

        // 4. Plan must govern this contract.
        if plan.contract_id != signed.draft.contract_id && plan.contract_id != request_id {
            return Err(CoreError::Validation(format!(
                "plan {} does not reference contract {}",
                plan.plan_id, contract_id
            )));
        }

        // 5. Execute over the selected ODX slice.
        let input = self.plan_input(&signed.draft);
        let output = self
            .executor
            .execute(&plan, output_mode, input, now_ms)
            .await
            .map_err(|failure| failure.error)?;
        self.audit
            .append(
                AuditEventType::PlanExecuted,
                "plan executed inside the VM",
                serde_json::json!({
                    "plan_id": plan.plan_id,
                    "contract_id": contract_id,
                    "export_requested": output.export_requested,
                }),
            )
            .map_err(CoreError::Integrity)?;

        // 6. Session + capsule.
        let (session, session_key) = self.sessions.establish(
            &requester_id,
            remote_node_id,
            remote_public_key_sec1,
            TransportKind::Direct,
            now_ms,
        )?;
        let payload = serde_json::to_vec(
            &output
                .data
                .iter()
                .map(|(k, v)| (k.clone(), v.to_string()))
                .collect::<std::collections::BTreeMap<_, _>>(),
        )
        .map_err(|e| CoreError::Validation(e.to_string()))?;

        let pairwise = self.identity.pairwise_identity(&requester_id);
        let capsule = veil_transport::seal_capsule(
            &veil_transport::capsule::SealRequest {
                plan_id: &plan.plan_id,
                plan_hash: &veil_crypto::hash::sha256_hex(&plan.canonical_bytes()),
                contract_id: &contract_id,
                node_id: &pairwise.did,
                requester_id: &requester_id,
                ttl_ms: now_ms + output.capsule_ttl_secs * 1_000,
                now_ms,
            },
            &payload,
            &session_key,
            &pairwise.keypair,
        )?;
        self.audit
            .append(
                AuditEventType::CapsuleCreated,
                "capsule sealed",
                serde_json::json!({
                    "capsule_id": capsule.header.capsule_id,
                    "contract_id": contract_id,
                    "ttl_ms": capsule.header.ttl_ms,
                }),
            )
            .map_err(CoreError::Integrity)?;

        // 7. Transfer through the gate.
        self.sessions.set_transferring(&session.session_id, true)?;
        let transfer_id =
            self.transfers
                .begin(&capsule, &session.session_id, &session_key, destination)?;
        self.transfers.transmit(&transfer_id)?;
        self.sessions.set_transferring(&session.session_id, false)?;

        Ok(FulfillmentReport {
            request_id,
            contract_id,
            plan_id: plan.plan_id.clone(),
            capsule_id: capsule.header.capsule_id,
            session_id: session.session_id,
            transfer_id,
        })
    }

    /// Crypto-shreds the session key behind an expired capsule.
    pub fn expire_capsule(&self, session_id: &str, capsule_id: &str) -> Result<(), CoreError> {
        self.sessions.crypto_shred(session_id, capsule_id)
    }

    /// Rotates pairwise identities and session keys that are past policy.
    pub fn rotate_due(&self, now_ms: u64) -> (Vec<String>, Vec<String>) {
        (
            self.identity.rotate_due(now_ms),
            self.identity.expire_session_keys(now_ms),
        )
    }

    /// Explicit teardown: cancels sync, destroys every session key, and
    /// verifies the audit chain one last time.
    pub fn shutdown(self) -> Result<(), CoreError> {
        self.sync_pool.cancel();
        let shredded = self.identity.expire_session_keys(u64::MAX);
        info!(session_keys = shredded.len(), "node shut down");
        self.audit.verify_integrity().map_err(CoreError::Integrity)
    }

    /// The effective configuration.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// True while a plan is executing (the gate blocks non-metadata then).
    pub fn vm_busy(&self) -> bool {
        self.executor.guard().executing()
    }

    /// Gate statistics passthrough.
    pub fn gate_stats(&self) -> veil_egress::GateStats {
        self.gate.stats()
    }
}
