//! In-memory process engine.
//!
//! Steps of a process run one after another. `WORKER` steps are queued until
//! a client polls them and reports a result; every other step type finishes
//! on the spot (`FAIL` fails the process, the rest pass their input through).

use crate::error::ApiError;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use unmeshedcore::{
    JsonMap, ProcessActionDetail, ProcessActionResponse, ProcessData, ProcessDefinition,
    ProcessRequestData, ProcessSearchRequest, ProcessStatus, StepData, StepId,
    StepQueueNameData, StepSize, StepStatus, StepType, WorkRequest, WorkResponse,
};

const DEFAULT_NAMESPACE: &str = "default";
/// Unanswered hand-outs go back on their queue after this long
const DEFAULT_IN_FLIGHT_LEASE_MILLIS: i64 = 10 * 60 * 1000;

type DefinitionKey = (String, String);

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn namespace_or_default(namespace: &str) -> String {
    if namespace.trim().is_empty() {
        DEFAULT_NAMESPACE.to_string()
    } else {
        namespace.to_string()
    }
}

/// One process execution
struct ProcessRun {
    data: ProcessData,
    definition: ProcessDefinition,
    /// Index of the next step definition to start
    cursor: usize,
    /// Step id -> index of its step definition
    positions: HashMap<u64, usize>,
}

impl ProcessRun {
    fn record_mut(&mut self, step_id: u64) -> Option<&mut StepData> {
        self.data.step_records.iter_mut().find(|s| s.id == step_id)
    }

    fn set_step_status(&mut self, step_id: u64, status: StepStatus) {
        if let Some(step) = self.data.steps.iter_mut().find(|s| s.id == step_id) {
            step.status = status;
        }
        if let Some(record) = self.record_mut(step_id) {
            record.status = status;
        }
    }

    fn snapshot(&self, include_steps: bool) -> ProcessData {
        let mut data = self.data.clone();
        if !include_steps {
            data.step_records.clear();
        }
        data
    }
}

#[derive(Default)]
pub struct Engine {
    definitions: BTreeMap<DefinitionKey, BTreeMap<u32, ProcessDefinition>>,
    processes: BTreeMap<u64, ProcessRun>,
    /// Step id -> process id
    step_index: HashMap<u64, u64>,
    queues: HashMap<DefinitionKey, VecDeque<WorkRequest>>,
    /// Handed out and not yet answered, by step id
    in_flight: HashMap<u64, WorkRequest>,
    in_flight_lease_millis: Option<i64>,
    /// Work handed out again once its due time (epoch millis) has passed
    delayed: Vec<(i64, WorkRequest)>,
    clients: HashSet<StepQueueNameData>,
    next_id: u64,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_in_flight_lease(mut self, lease: std::time::Duration) -> Self {
        self.in_flight_lease_millis = Some(lease.as_millis() as i64);
        self
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    // Definitions

    pub fn create_definition(
        &mut self,
        mut definition: ProcessDefinition,
    ) -> Result<ProcessDefinition, ApiError> {
        if definition.name.trim().is_empty() {
            return Err(ApiError::BadRequest("Process definition name is required".to_string()));
        }
        definition.namespace = namespace_or_default(&definition.namespace);
        let key = (definition.namespace.clone(), definition.name.clone());
        if self.definitions.get(&key).is_some_and(|v| !v.is_empty()) {
            return Err(ApiError::Conflict(format!(
                "Process definition {}/{} already exists",
                key.0, key.1
            )));
        }

        let version = definition.version.unwrap_or(1).max(1);
        definition.version = Some(version);
        tracing::info!("Created process definition {}/{} v{}", key.0, key.1, version);
        self.definitions
            .entry(key)
            .or_default()
            .insert(version, definition.clone());
        Ok(definition)
    }

    /// Store a new version numbered one past the latest
    pub fn update_definition(
        &mut self,
        mut definition: ProcessDefinition,
    ) -> Result<ProcessDefinition, ApiError> {
        definition.namespace = namespace_or_default(&definition.namespace);
        let key = (definition.namespace.clone(), definition.name.clone());
        let versions = self
            .definitions
            .get_mut(&key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| definition_not_found(&key.0, &key.1))?;

        let version = versions.keys().next_back().copied().unwrap_or(0) + 1;
        definition.version = Some(version);
        versions.insert(version, definition.clone());
        tracing::info!("Added version {} of process definition {}/{}", version, key.0, key.1);
        Ok(definition)
    }

    pub fn definition(
        &self,
        namespace: &str,
        name: &str,
        version: Option<u32>,
    ) -> Result<ProcessDefinition, ApiError> {
        let versions = self
            .definitions
            .get(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| definition_not_found(namespace, name))?;
        let found = match version {
            Some(v) => versions.get(&v),
            None => versions.values().next_back(),
        };
        found.cloned().ok_or_else(|| match version {
            Some(v) => ApiError::NotFound(format!(
                "Process definition {}/{} has no version {}",
                namespace, name, v
            )),
            None => definition_not_found(namespace, name),
        })
    }

    pub fn versions(&self, namespace: &str, name: &str) -> Result<Vec<u32>, ApiError> {
        self.definitions
            .get(&(namespace.to_string(), name.to_string()))
            .filter(|v| !v.is_empty())
            .map(|v| v.keys().copied().collect())
            .ok_or_else(|| definition_not_found(namespace, name))
    }

    /// Latest version of every definition
    pub fn all_definitions(&self) -> Vec<ProcessDefinition> {
        self.definitions
            .values()
            .filter_map(|versions| versions.values().next_back().cloned())
            .collect()
    }

    /// Delete whole definitions, or only the listed versions with `version_only`
    pub fn delete_definitions(&mut self, definitions: &[ProcessDefinition], version_only: bool) -> usize {
        let mut deleted = 0;
        for definition in definitions {
            let key = (
                namespace_or_default(&definition.namespace),
                definition.name.clone(),
            );
            let Some(versions) = self.definitions.get_mut(&key) else {
                continue;
            };
            match (version_only, definition.version) {
                (true, Some(version)) => {
                    if versions.remove(&version).is_some() {
                        deleted += 1;
                    }
                }
                (true, None) => {}
                (false, _) => {
                    deleted += versions.len();
                    versions.clear();
                }
            }
            if versions.is_empty() {
                self.definitions.remove(&key);
            }
        }
        tracing::info!("Deleted {} process definition versions", deleted);
        deleted
    }

    // Executions

    pub fn start_process(&mut self, request: ProcessRequestData) -> Result<u64, ApiError> {
        let namespace = namespace_or_default(&request.namespace);
        let definition = self.definition(&namespace, &request.name, request.version)?;
        let process_id = self.next_id();
        let now = now_millis();

        tracing::info!(
            "Starting process {} for {}/{} v{}",
            process_id,
            namespace,
            request.name,
            definition.version.unwrap_or(1)
        );

        self.processes.insert(
            process_id,
            ProcessRun {
                data: ProcessData {
                    process_id,
                    namespace,
                    name: request.name,
                    version: definition.version.unwrap_or(1),
                    request_id: request.request_id,
                    correlation_id: request.correlation_id,
                    status: ProcessStatus::Running,
                    input: request.input,
                    created: now,
                    updated: now,
                    ..Default::default()
                },
                definition,
                cursor: 0,
                positions: HashMap::new(),
            },
        );
        self.advance(process_id);
        Ok(process_id)
    }

    pub fn process(&self, process_id: u64, include_steps: bool) -> Result<ProcessData, ApiError> {
        self.processes
            .get(&process_id)
            .map(|run| run.snapshot(include_steps))
            .ok_or_else(|| process_not_found(process_id))
    }

    pub fn step(&self, step_id: u64) -> Result<StepData, ApiError> {
        self.step_index
            .get(&step_id)
            .and_then(|pid| self.processes.get(pid))
            .and_then(|run| run.data.step_records.iter().find(|s| s.id == step_id))
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("Step {} not found", step_id)))
    }

    /// Newest first, without step records
    pub fn search(&self, request: &ProcessSearchRequest) -> Vec<ProcessData> {
        self.processes
            .values()
            .rev()
            .map(|run| &run.data)
            .filter(|p| request.namespace.as_ref().map_or(true, |ns| &p.namespace == ns))
            .filter(|p| request.names.is_empty() || request.names.contains(&p.name))
            .filter(|p| request.process_ids.is_empty() || request.process_ids.contains(&p.process_id))
            .filter(|p| {
                request.correlation_ids.is_empty()
                    || p.correlation_id
                        .as_ref()
                        .is_some_and(|c| request.correlation_ids.contains(c))
            })
            .filter(|p| {
                request.request_ids.is_empty()
                    || p.request_id
                        .as_ref()
                        .is_some_and(|r| request.request_ids.contains(r))
            })
            .filter(|p| request.statuses.is_empty() || request.statuses.contains(&p.status))
            .filter(|p| request.start_time_epoch.map_or(true, |start| p.created >= start))
            .filter(|p| request.end_time_epoch.map_or(true, |end| p.created <= end))
            .skip(request.offset as usize)
            .take(request.limit as usize)
            .map(|p| {
                let mut p = p.clone();
                p.step_records.clear();
                p
            })
            .collect()
    }

    /// Run a process again from its first step, optionally on another version
    pub fn rerun(&mut self, process_id: u64, version: Option<u32>) -> Result<ProcessData, ApiError> {
        let (namespace, name, current) = {
            let run = self
                .processes
                .get(&process_id)
                .ok_or_else(|| process_not_found(process_id))?;
            (run.data.namespace.clone(), run.data.name.clone(), run.data.version)
        };
        let definition = self.definition(&namespace, &name, Some(version.unwrap_or(current)))?;

        self.drop_pending_work(process_id);
        let step_ids: Vec<u64> = self
            .step_index
            .iter()
            .filter(|(_, pid)| **pid == process_id)
            .map(|(sid, _)| *sid)
            .collect();
        for step_id in step_ids {
            self.step_index.remove(&step_id);
        }

        if let Some(run) = self.processes.get_mut(&process_id) {
            tracing::info!("Rerunning process {} on version {}", process_id, definition.version.unwrap_or(1));
            run.data.version = definition.version.unwrap_or(1);
            run.data.status = ProcessStatus::Running;
            run.data.output = JsonMap::new();
            run.data.steps.clear();
            run.data.step_records.clear();
            run.data.updated = now_millis();
            run.definition = definition;
            run.cursor = 0;
            run.positions.clear();
        }
        self.advance(process_id);
        self.process(process_id, true)
    }

    pub fn terminate(&mut self, process_ids: &[u64], reason: Option<&str>) -> ProcessActionResponse {
        self.bulk(process_ids, |engine, pid, run_status| {
            if run_status != ProcessStatus::Running {
                return Err(format!("Process {} is not running", pid));
            }
            engine.drop_pending_work(pid);
            if let Some(run) = engine.processes.get_mut(&pid) {
                let open: Vec<u64> = run
                    .data
                    .steps
                    .iter()
                    .filter(|s| matches!(s.status, StepStatus::Scheduled | StepStatus::Running | StepStatus::Pending))
                    .map(|s| s.id)
                    .collect();
                for step_id in open {
                    run.set_step_status(step_id, StepStatus::Cancelled);
                }
                run.data.status = ProcessStatus::Terminated;
                if let Some(reason) = reason {
                    run.data
                        .output
                        .insert("reason".to_string(), reason.into());
                }
            }
            Ok(match reason {
                Some(reason) => format!("Terminated: {}", reason),
                None => "Terminated".to_string(),
            })
        })
    }

    /// Continue failed or stopped processes from the step that did not finish
    pub fn resume(&mut self, process_ids: &[u64]) -> ProcessActionResponse {
        self.bulk(process_ids, |engine, pid, run_status| {
            if !run_status.is_failure() {
                return Err(format!("Process {} cannot be resumed from {}", pid, run_status.as_str()));
            }
            if let Some(run) = engine.processes.get_mut(&pid) {
                let unfinished = run
                    .data
                    .step_records
                    .last()
                    .filter(|s| s.status != StepStatus::Completed)
                    .and_then(|s| run.positions.get(&s.id).copied());
                if let Some(position) = unfinished {
                    run.cursor = position;
                }
                run.data.status = ProcessStatus::Running;
                run.data.output = JsonMap::new();
            }
            engine.advance(pid);
            Ok("Resumed".to_string())
        })
    }

    pub fn review(&mut self, process_ids: &[u64], reason: Option<&str>) -> ProcessActionResponse {
        self.bulk(process_ids, |engine, pid, run_status| {
            if !run_status.is_failure() {
                return Err(format!("Process {} cannot be reviewed from {}", pid, run_status.as_str()));
            }
            if let Some(run) = engine.processes.get_mut(&pid) {
                run.data.status = ProcessStatus::Reviewed;
            }
            Ok(match reason {
                Some(reason) => format!("Reviewed: {}", reason),
                None => "Reviewed".to_string(),
            })
        })
    }

    fn bulk<F>(&mut self, process_ids: &[u64], mut action: F) -> ProcessActionResponse
    where
        F: FnMut(&mut Self, u64, ProcessStatus) -> Result<String, String>,
    {
        let mut response = ProcessActionResponse::default();
        for &pid in process_ids {
            let Some(status) = self.processes.get(&pid).map(|run| run.data.status) else {
                response.details.push(ProcessActionDetail {
                    id: pid,
                    message: String::new(),
                    error: Some(format!("Process {} not found", pid)),
                });
                continue;
            };
            match action(self, pid, status) {
                Ok(message) => {
                    if let Some(run) = self.processes.get_mut(&pid) {
                        run.data.updated = now_millis();
                    }
                    response.count += 1;
                    response.details.push(ProcessActionDetail {
                        id: pid,
                        message,
                        error: None,
                    });
                }
                Err(error) => response.details.push(ProcessActionDetail {
                    id: pid,
                    message: String::new(),
                    error: Some(error),
                }),
            }
        }
        response
    }

    // Worker protocol

    pub fn register_queues(&mut self, queues: &[StepQueueNameData]) {
        for queue in queues {
            tracing::debug!("Client serves {}/{}", queue.namespace, queue.name);
            self.clients.insert(queue.clone());
        }
    }

    pub fn registered_queues(&self) -> usize {
        self.clients.len()
    }

    /// Hand out up to `size` queued items per requested queue
    pub fn poll(&mut self, sizes: &[StepSize]) -> Vec<WorkRequest> {
        self.release_delayed();
        let now = now_millis();
        self.expire_in_flight(now);
        let mut out = Vec::new();

        for size in sizes {
            let queue = &size.step_queue_name_data;
            let key = (namespace_or_default(&queue.namespace), queue.name.clone());
            let Some(pending) = self.queues.get_mut(&key) else {
                continue;
            };
            for _ in 0..size.size {
                let Some(mut request) = pending.pop_front() else {
                    break;
                };
                request.polled = now;
                request.updated = now;
                out.push(request);
            }
        }

        for request in &out {
            if let Some(run) = self
                .step_index
                .get(&request.step_id)
                .and_then(|pid| self.processes.get_mut(pid))
            {
                run.set_step_status(request.step_id, StepStatus::Running);
                if let Some(record) = run.record_mut(request.step_id) {
                    record.start = now;
                }
            }
            self.in_flight.insert(request.step_id, request.clone());
        }

        if !out.is_empty() {
            tracing::debug!("Handed out {} work items", out.len());
        }
        out
    }

    /// Apply step results; returns how many were accepted
    pub fn submit_results(&mut self, results: Vec<WorkResponse>) -> usize {
        let mut accepted = 0;
        for result in results {
            if self.apply_result(result) {
                accepted += 1;
            }
        }
        accepted
    }

    fn apply_result(&mut self, result: WorkResponse) -> bool {
        let Some(&pid) = self.step_index.get(&result.step_id) else {
            tracing::warn!("Result for unknown step {}", result.step_id);
            return false;
        };
        // Only the first answer to a hand-out counts
        let Some(mut request) = self.in_flight.remove(&result.step_id) else {
            tracing::debug!("Ignoring result for step {} that is not handed out", result.step_id);
            return false;
        };
        let Some(run) = self.processes.get_mut(&pid) else {
            return false;
        };
        if run.data.status != ProcessStatus::Running {
            tracing::debug!("Ignoring result for step {} of finished process {}", result.step_id, pid);
            return false;
        }
        if run
            .record_mut(result.step_id)
            .is_some_and(|record| is_final(record.status))
        {
            tracing::debug!("Ignoring result for finished step {}", result.step_id);
            return false;
        }

        let now = now_millis();
        let optional = run
            .positions
            .get(&result.step_id)
            .and_then(|i| run.definition.steps.get(*i))
            .is_some_and(|s| s.optional);
        run.set_step_status(result.step_id, result.status);
        if let Some(record) = run.record_mut(result.step_id) {
            record.output = result.output.clone();
            if result.status != StepStatus::Running {
                record.end = now;
            }
        }
        run.data.updated = now;

        match result.status {
            StepStatus::Completed | StepStatus::Skipped => {
                self.advance(pid);
            }
            StepStatus::Running => {
                let delay = result.reschedule_after_seconds.unwrap_or(0) as i64 * 1000;
                request.run_count += 1;
                self.delayed.push((now + delay, request));
            }
            StepStatus::Failed | StepStatus::TimedOut | StepStatus::Cancelled => {
                if optional {
                    self.advance(pid);
                } else {
                    run.data.status = if result.status == StepStatus::TimedOut {
                        ProcessStatus::TimedOut
                    } else {
                        ProcessStatus::Failed
                    };
                    run.data.output = result.output;
                    tracing::info!("Process {} failed at step {}", pid, result.step_id);
                }
            }
            StepStatus::Pending | StepStatus::Scheduled | StepStatus::Paused => {}
        }
        true
    }

    fn release_delayed(&mut self) {
        let now = now_millis();
        let (due, later): (Vec<_>, Vec<_>) = self.delayed.drain(..).partition(|(at, _)| *at <= now);
        self.delayed = later;
        for (_, request) in due {
            let key = (request.step_namespace.clone(), request.step_name.clone());
            self.queues.entry(key).or_default().push_back(request);
        }
    }

    /// Drop hand-outs of processes that stopped running and requeue the ones
    /// whose lease ran out
    fn expire_in_flight(&mut self, now: i64) {
        let lease = self.in_flight_lease_millis.unwrap_or(DEFAULT_IN_FLIGHT_LEASE_MILLIS);
        let processes = &self.processes;
        let stale: Vec<u64> = self
            .in_flight
            .iter()
            .filter(|(_, w)| {
                let running = processes
                    .get(&w.process_id)
                    .is_some_and(|run| run.data.status == ProcessStatus::Running);
                !running || now - w.polled >= lease
            })
            .map(|(step_id, _)| *step_id)
            .collect();

        for step_id in stale {
            let Some(mut request) = self.in_flight.remove(&step_id) else {
                continue;
            };
            let running = self
                .processes
                .get(&request.process_id)
                .is_some_and(|run| run.data.status == ProcessStatus::Running);
            if running {
                tracing::warn!("Step {} was not answered in time, handing it out again", step_id);
                request.run_count += 1;
                let key = (request.step_namespace.clone(), request.step_name.clone());
                self.queues.entry(key).or_default().push_back(request);
            }
        }
    }

    fn drop_pending_work(&mut self, process_id: u64) {
        for queue in self.queues.values_mut() {
            queue.retain(|w| w.process_id != process_id);
        }
        self.delayed.retain(|(_, w)| w.process_id != process_id);
        self.in_flight.retain(|_, w| w.process_id != process_id);
    }

    /// Start steps until one has to wait for a worker or the process ends
    fn advance(&mut self, process_id: u64) {
        loop {
            let Some(run) = self.processes.get_mut(&process_id) else {
                return;
            };
            if run.data.status != ProcessStatus::Running {
                return;
            }

            let now = now_millis();
            let Some(step) = run.definition.steps.get(run.cursor).cloned() else {
                run.data.status = ProcessStatus::Completed;
                run.data.output = run
                    .data
                    .step_records
                    .last()
                    .map(|s| s.output.clone())
                    .unwrap_or_default();
                run.data.updated = now;
                tracing::info!("Process {} completed", process_id);
                return;
            };
            let position = run.cursor;
            run.cursor += 1;

            self.next_id += 1;
            let step_id = self.next_id;

            let mut input = run.data.input.clone();
            input.extend(step.input.clone());
            let namespace = namespace_or_default(&step.namespace);

            let mut record = StepData {
                id: step_id,
                process_id,
                step_ref: step.step_ref.clone(),
                name: step.name.clone(),
                namespace: namespace.clone(),
                step_type: step.step_type,
                status: StepStatus::Scheduled,
                input: input.clone(),
                schedule: now,
                ..Default::default()
            };

            let waits_for_worker = match step.step_type {
                StepType::Worker => true,
                StepType::Fail => {
                    record.status = StepStatus::Failed;
                    record.output.insert(
                        "error".to_string(),
                        format!("Step {} failed the process", step.step_ref).into(),
                    );
                    record.start = now;
                    record.end = now;
                    run.data.status = ProcessStatus::Failed;
                    run.data.output = record.output.clone();
                    false
                }
                _ => {
                    record.status = StepStatus::Completed;
                    record.output = input.clone();
                    record.start = now;
                    record.end = now;
                    false
                }
            };

            run.positions.insert(step_id, position);
            run.data.steps.push(StepId {
                id: step_id,
                process_id,
                step_ref: record.step_ref.clone(),
                status: record.status,
            });
            run.data.step_records.push(record);
            run.data.updated = now;
            self.step_index.insert(step_id, process_id);

            if waits_for_worker {
                let request = WorkRequest {
                    process_id,
                    step_id,
                    step_execution_id: step_id,
                    run_count: 1,
                    step_name: step.name.clone(),
                    step_namespace: namespace.clone(),
                    step_ref: step.step_ref,
                    input_param: input,
                    is_optional: step.optional,
                    scheduled: now,
                    updated: now,
                    ..Default::default()
                };
                tracing::debug!("Queued step {} of process {} on {}/{}", step_id, process_id, namespace, step.name);
                self.queues
                    .entry((namespace, step.name))
                    .or_default()
                    .push_back(request);
                return;
            }
        }
    }
}

fn is_final(status: StepStatus) -> bool {
    matches!(
        status,
        StepStatus::Completed
            | StepStatus::Failed
            | StepStatus::TimedOut
            | StepStatus::Cancelled
            | StepStatus::Skipped
    )
}

fn definition_not_found(namespace: &str, name: &str) -> ApiError {
    ApiError::NotFound(format!("Process definition {}/{} not found", namespace, name))
}

fn process_not_found(process_id: u64) -> ApiError {
    ApiError::NotFound(format!("Process {} not found", process_id))
}
