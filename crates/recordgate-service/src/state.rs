//! Shared service state and the read path

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::{Mutex, RwLock};
use recordgate_core::{Context, DataFlavour, Error, JsonLinesSerialiser, LeafResource, RecordCounter, User};
use recordgate_policy::PolicyEngine;
use recordgate_reader::{
    BackendConfig, BackendResourceReader, CapacityLimiter, DataReader, DataReaderRequest,
    LocalFileSystem, ReaderDescriptor, ResourceReader, SerialisedDataReader,
};
use recordgate_telemetry::{
    AuditEvent, AuditLog, AuditSeverity, AuditTrail, PersistenceConfig, ReadOutcome, ReadStatus,
    ReaderMetrics,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::ServiceConfig;

/// Reader serving JSON-lines records from the local filesystem
pub type ServiceReader = SerialisedDataReader<Value, BackendResourceReader<LocalFileSystem>>;

/// Application state shared across all requests
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<ServiceConfig>,

    /// The data reader
    pub reader: Arc<ServiceReader>,

    /// Policy engine compiling rules per resource
    pub policy_engine: Arc<RwLock<PolicyEngine>>,

    /// Audit trail of read outcomes
    pub audit: Arc<Mutex<AuditSink>>,

    /// In-process reader metrics
    pub metrics: ReaderMetrics,

    /// Prometheus metrics handle for rendering
    pub metrics_handle: PrometheusHandle,
}

/// Where read outcomes are recorded
pub enum AuditSink {
    Disabled,
    Memory(AuditTrail),
    Persistent(AuditLog),
}

impl AuditSink {
    fn record(&mut self, outcome: ReadOutcome) {
        match self {
            AuditSink::Disabled => {}
            AuditSink::Memory(trail) => {
                trail.add_event(AuditEvent::new(outcome));
            }
            AuditSink::Persistent(log) => {
                if let Err(e) = log.record(outcome) {
                    error!("Failed to persist audit event: {}", e);
                }
            }
        }
    }

    fn trail(&self) -> Option<&AuditTrail> {
        match self {
            AuditSink::Disabled => None,
            AuditSink::Memory(trail) => Some(trail),
            AuditSink::Persistent(log) => Some(log.trail()),
        }
    }
}

/// Body of a read request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadRequest {
    /// Resource identifier: a URI or a plain path
    pub resource: String,
    pub data_type: String,
    pub format: String,
    pub user: String,
    #[serde(default)]
    pub roles: Vec<String>,
    pub purpose: String,

    /// Additional context fields
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

/// Enforced bytes of a completed read
#[derive(Debug)]
pub struct ReadResult {
    pub body: Vec<u8>,
    pub records_processed: i64,
    pub records_returned: i64,
    pub message: Option<String>,
}

/// Audit trail summary served at `/audit`
#[derive(Debug, Serialize)]
pub struct AuditSummary {
    pub enabled: bool,
    pub events: usize,
    pub head: Option<String>,
    pub verified: bool,
    pub recent: Vec<AuditEntry>,
}

#[derive(Debug, Serialize)]
pub struct AuditEntry {
    pub id: String,
    pub time: Option<String>,
    pub severity: AuditSeverity,
    #[serde(flatten)]
    pub outcome: ReadOutcome,
}

impl AppState {
    /// Initialize application state from configuration
    pub fn new(config: ServiceConfig, metrics_handle: PrometheusHandle) -> Result<Self> {
        info!("Initializing application state");

        let backend = LocalFileSystem::new(BackendConfig::from(config.backend.clone()))?;
        info!(backend = ?backend.effective_config(), "Local filesystem backend ready");

        let mut reader = SerialisedDataReader::new(
            ReaderDescriptor::new(&config.reader.id, "local-fs"),
            BackendResourceReader::new(backend),
        )
        .with_capacity(CapacityLimiter::new(config.reader.max_concurrent_reads));
        for flavour in &config.reader.flavours {
            reader.add_serialiser(
                DataFlavour::new(&flavour.data_type, &flavour.format),
                Arc::new(JsonLinesSerialiser::new()),
            );
        }
        info!(
            reader = %reader.descriptor(),
            max_concurrent_reads = config.reader.max_concurrent_reads,
            flavours = reader.serialisers().len(),
            "Data reader ready"
        );

        let mut policy_engine = Self::load_policy_engine(&config)?;
        policy_engine.canonicalise_resources(|prefix| reader.resource_reader().canonical_id(prefix));
        info!("Loaded {} policies from: {}", policy_engine.policies().len(), config.policy_path);

        let retention = config.telemetry.audit_retention;
        let audit = match (config.telemetry.audit, &config.telemetry.audit_path) {
            (false, _) => AuditSink::Disabled,
            (true, None) => AuditSink::Memory(AuditTrail::new().with_retention(retention)),
            (true, Some(path)) => AuditSink::Persistent(
                AuditLog::open(PersistenceConfig::new(path).with_retention(retention))
                    .map_err(|e| anyhow::anyhow!("Failed to open audit log: {}", e))?,
            ),
        };

        Ok(Self {
            config: Arc::new(config),
            reader: Arc::new(reader),
            policy_engine: Arc::new(RwLock::new(policy_engine)),
            audit: Arc::new(Mutex::new(audit)),
            metrics: ReaderMetrics::new(),
            metrics_handle,
        })
    }

    /// Load policy engine from configuration
    fn load_policy_engine(config: &ServiceConfig) -> Result<PolicyEngine> {
        let mut engine = PolicyEngine::new();

        let policy_path = Path::new(&config.policy_path);
        if policy_path.is_file() {
            engine.load_policy(policy_path)?;
        } else if policy_path.is_dir() {
            let mut paths: Vec<_> = std::fs::read_dir(policy_path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.extension().is_some_and(|ext| ext == "yaml" || ext == "yml"))
                .collect();
            paths.sort();

            for path in paths {
                if let Err(e) = engine.load_policy(&path) {
                    warn!("Failed to load policy {:?}: {}", path, e);
                }
            }
        } else {
            info!("Policy path does not exist, using empty policy engine: {}", config.policy_path);
        }

        Ok(engine)
    }

    /// Serve one read to completion. Blocks on storage I/O.
    ///
    /// The identifier is canonicalised first; policy lookup and the open both
    /// use that one form, so no alias of a covered resource escapes its rules.
    pub fn read(&self, request: ReadRequest) -> recordgate_core::Result<ReadResult> {
        let user = request
            .roles
            .iter()
            .fold(User::new(&request.user), |user, role| user.with_role(role));
        let context = request
            .context
            .iter()
            .fold(Context::new(&request.purpose), |context, (key, value)| context.with(key, value));

        let processed = RecordCounter::new();
        let returned = RecordCounter::new();

        let result = self
            .reader
            .resource_reader()
            .canonical_id(&request.resource)
            .and_then(|id| {
                debug!(resource = %request.resource, canonical = %id, "Resolved resource");
                let resource = LeafResource::new(id, &request.data_type, &request.format);
                let rules = self.policy_engine.read().rules_for(&resource);
                let data_request = DataReaderRequest::new(resource, rules, user, context);
                self.reader.read(data_request, processed.clone(), returned.clone())
            })
            .and_then(|response| {
                let mut body = Vec::new();
                response.write(&mut body)?;
                Ok((body, response.message().map(str::to_string)))
            });

        let outcome = ReadOutcome::completed(
            &request.resource,
            &self.reader.descriptor().id,
            &request.user,
            &request.purpose,
            &processed,
            &returned,
        );
        let outcome = match &result {
            Ok(_) => outcome,
            Err(e @ Error::NoCapacity { .. }) => outcome.with_error(ReadStatus::Refused, e),
            Err(e) => outcome.with_error(ReadStatus::Failed, e),
        };
        debug!(resource = %outcome.resource, status = ?outcome.status, "Read finished");
        self.metrics.record_outcome(&outcome);
        self.audit.lock().record(outcome);

        let (body, message) = result?;
        Ok(ReadResult {
            body,
            records_processed: processed.get(),
            records_returned: returned.get(),
            message,
        })
    }

    /// Summarise the audit trail, newest events first
    pub fn audit_summary(&self, limit: usize) -> AuditSummary {
        let audit = self.audit.lock();
        let Some(trail) = audit.trail() else {
            return AuditSummary {
                enabled: false,
                events: 0,
                head: None,
                verified: true,
                recent: Vec::new(),
            };
        };

        let recent = trail
            .events()
            .iter()
            .rev()
            .take(limit)
            .map(|event| AuditEntry {
                id: event.id.clone(),
                time: chrono::DateTime::from_timestamp_millis(event.timestamp_ms as i64)
                    .map(|t| t.to_rfc3339()),
                severity: event.severity,
                outcome: event.outcome.clone(),
            })
            .collect();

        AuditSummary {
            enabled: true,
            events: trail.recorded(),
            head: trail.head().map(str::to_string),
            verified: trail.verify(),
            recent,
        }
    }
}
