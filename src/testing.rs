//! In-memory fakes of the domain ports, shared by unit tests.

use crate::domain::ports::{
    AttachRequest, CommandRunner, ComputeApi, DiskSpec, InstanceMetadata, OperationError,
    OperationErrorEntry, OperationHandle, OperationStatus,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;

const PROJECT: &str = "test-project";
const ZONE: &str = "us-central1-a";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComputeCall {
    Insert(String),
    Poll(String),
    Attach(String),
}

/// Compute API fake with scripted operation progress
#[derive(Default)]
pub struct FakeCompute {
    pending_polls: usize,
    failing_operations: HashSet<String>,
    failing_attaches: HashSet<String>,
    attach_gate: Option<Semaphore>,
    polls: Mutex<HashMap<String, usize>>,
    calls: Mutex<Vec<ComputeCall>>,
    inserted: Mutex<Vec<DiskSpec>>,
    attached: Mutex<Vec<(String, AttachRequest)>>,
}

impl FakeCompute {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every operation reports RUNNING `n` times before DONE
    pub fn with_pending_polls(self: Arc<Self>, n: usize) -> Arc<Self> {
        Self::rebuild(self, |f| f.pending_polls = n)
    }

    /// The insert operation for `disk` finishes with an error block
    pub fn fail_operation_for(self: Arc<Self>, disk: &str) -> Arc<Self> {
        let op = insert_operation_name(disk);
        Self::rebuild(self, |f| {
            f.failing_operations.insert(op);
        })
    }

    /// attachDisk for `disk` is rejected
    pub fn fail_attach_for(self: Arc<Self>, disk: &str) -> Arc<Self> {
        let disk = disk.to_string();
        Self::rebuild(self, |f| {
            f.failing_attaches.insert(disk);
        })
    }

    /// attachDisk calls park until `open_attach_gate`
    pub fn with_attach_gate(self: Arc<Self>) -> Arc<Self> {
        Self::rebuild(self, |f| f.attach_gate = Some(Semaphore::new(0)))
    }

    pub fn open_attach_gate(&self) {
        if let Some(gate) = &self.attach_gate {
            gate.add_permits(1);
        }
    }

    fn rebuild(this: Arc<Self>, apply: impl FnOnce(&mut Self)) -> Arc<Self> {
        let mut inner = Arc::try_unwrap(this)
            .unwrap_or_else(|_| panic!("fake configured after being shared"));
        apply(&mut inner);
        Arc::new(inner)
    }

    pub fn calls(&self) -> Vec<ComputeCall> {
        self.calls.lock().clone()
    }

    pub fn inserted(&self) -> Vec<DiskSpec> {
        self.inserted.lock().clone()
    }

    pub fn attached(&self) -> Vec<(String, AttachRequest)> {
        self.attached.lock().clone()
    }

    pub fn disk_url(name: &str) -> String {
        format!(
            "https://www.googleapis.com/compute/v1/projects/{}/zones/{}/disks/{}",
            PROJECT, ZONE, name
        )
    }
}

fn insert_operation_name(disk: &str) -> String {
    format!("op-insert-{}", disk)
}

#[async_trait]
impl ComputeApi for FakeCompute {
    async fn insert_disk(&self, spec: &DiskSpec) -> Result<OperationStatus> {
        self.calls.lock().push(ComputeCall::Insert(spec.name.clone()));
        self.inserted.lock().push(spec.clone());
        Ok(OperationStatus {
            name: insert_operation_name(&spec.name),
            status: "PENDING".into(),
            target_link: Self::disk_url(&spec.name),
            error: None,
        })
    }

    async fn get_zone_operation(&self, operation: &OperationHandle) -> Result<OperationStatus> {
        self.calls.lock().push(ComputeCall::Poll(operation.name.clone()));

        if self.failing_operations.contains(&operation.name) {
            return Ok(OperationStatus {
                name: operation.name.clone(),
                status: "DONE".into(),
                error: Some(OperationError {
                    errors: vec![OperationErrorEntry {
                        code: "QUOTA_EXCEEDED".into(),
                        message: "disk quota exceeded".into(),
                    }],
                }),
                ..Default::default()
            });
        }

        let mut polls = self.polls.lock();
        let seen = polls.entry(operation.name.clone()).or_insert(0);
        *seen += 1;
        let status = if *seen > self.pending_polls { "DONE" } else { "RUNNING" };
        Ok(OperationStatus {
            name: operation.name.clone(),
            status: status.into(),
            ..Default::default()
        })
    }

    async fn attach_disk(&self, instance: &str, request: &AttachRequest) -> Result<OperationStatus> {
        if let Some(gate) = &self.attach_gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| Error::Internal(e.to_string()))?;
        }

        self.calls
            .lock()
            .push(ComputeCall::Attach(request.device_name.clone()));
        self.attached
            .lock()
            .push((instance.to_string(), request.clone()));

        if self.failing_attaches.contains(&request.device_name) {
            return Err(Error::ComputeApi {
                status: 400,
                message: "disk already attached".into(),
            });
        }
        Ok(OperationStatus {
            name: format!("op-attach-{}", request.device_name),
            status: "PENDING".into(),
            ..Default::default()
        })
    }

    fn project(&self) -> &str {
        PROJECT
    }

    fn zone(&self) -> &str {
        ZONE
    }
}

/// Metadata fake returning fixed values
pub struct FakeMetadata;

#[async_trait]
impl InstanceMetadata for FakeMetadata {
    async fn zone(&self) -> Result<String> {
        Ok(ZONE.into())
    }

    async fn project_id(&self) -> Result<String> {
        Ok(PROJECT.into())
    }

    async fn instance_name(&self) -> Result<String> {
        Ok("node-1".into())
    }
}

/// Records every command line; fails those whose program is listed
#[derive(Default)]
pub struct RecordingRunner {
    failing_programs: HashSet<String>,
    commands: Mutex<Vec<Vec<String>>>,
}

impl RecordingRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(programs: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            failing_programs: programs.iter().map(|p| p.to_string()).collect(),
            commands: Mutex::new(Vec::new()),
        })
    }

    pub fn commands(&self) -> Vec<Vec<String>> {
        self.commands.lock().clone()
    }

    /// Commands whose program is `program`
    pub fn invocations(&self, program: &str) -> Vec<Vec<String>> {
        self.commands
            .lock()
            .iter()
            .filter(|argv| argv.first().map(String::as_str) == Some(program))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, argv: &[String]) -> Result<()> {
        self.commands.lock().push(argv.to_vec());
        match argv.first() {
            Some(program) if self.failing_programs.contains(program) => Err(Error::Command {
                command: argv.join(" "),
                reason: "exit status: 1".into(),
            }),
            _ => Ok(()),
        }
    }
}
