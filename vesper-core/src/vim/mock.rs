//! In-memory endpoint double for tests.
//!
//! `MockVimSession` keeps a scripted inventory and a scripted task table.
//! Task submissions record what was asked and, when scripted, enqueue the
//! terminal update onto the fake stream. Creating a filter re-delivers the
//! task's current state, mirroring the endpoint's initial filter sync, so
//! tests are free of submit-vs-subscribe races.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::config::EndpointConfig;
use crate::error::{Result, VesperError};
use crate::vim::session::{VimConnector, VimSession};
use crate::vim::types::{
    AboutInfo, CloneSpec, DatastoreRecord, FilterKey, HostRecord, ManagedObjectRef, NetworkObject,
    PowerState, TaskKey, TaskResult, TaskState, TaskUpdate, TemplateRecord, UpdateBatch,
    VirtualMachineRecord, VmConfigSpec,
};

/// Scripted outcome for the next submission of an operation.
#[derive(Debug, Clone)]
pub enum TaskScript {
    Succeed(Option<TaskResult>),
    Fail(String),
    /// Never complete; the waiter is expected to time out.
    Hang,
}

/// One recorded task submission.
#[derive(Debug, Clone)]
pub struct Submission {
    pub operation: String,
    pub task: TaskKey,
    pub target: Option<ManagedObjectRef>,
}

#[derive(Default)]
struct StreamState {
    pending: VecDeque<UpdateBatch>,
    /// Latest observed state per task, replayed on filter creation.
    tasks: HashMap<TaskKey, TaskUpdate>,
    /// filter key -> task key
    filters: HashMap<String, TaskKey>,
    destroyed_filters: Vec<String>,
    cancelled: bool,
}

pub struct MockVimSession {
    about: AboutInfo,
    vms: RwLock<Vec<VirtualMachineRecord>>,
    hosts: RwLock<Vec<HostRecord>>,
    datastores: RwLock<Vec<DatastoreRecord>>,
    templates: RwLock<Vec<TemplateRecord>>,
    networks: RwLock<Vec<NetworkObject>>,
    power_states: RwLock<HashMap<String, PowerState>>,
    vm_folder: ManagedObjectRef,
    resource_pool: ManagedObjectRef,

    scripts: Mutex<HashMap<String, VecDeque<TaskScript>>>,
    submissions: Mutex<Vec<Submission>>,
    clone_specs: Mutex<Vec<CloneSpec>>,
    config_specs: Mutex<Vec<VmConfigSpec>>,

    stream: Mutex<StreamState>,
    notify: Notify,
    task_seq: AtomicU64,
    filter_seq: AtomicU64,
    version_seq: AtomicU64,
    fail_next_wait: AtomicBool,
    logouts: AtomicUsize,
}

impl MockVimSession {
    pub fn new() -> Self {
        Self {
            about: AboutInfo {
                full_name: "VMware vCenter Server 8.0.1 (mock)".to_string(),
                api_type: "VirtualCenter".to_string(),
                api_version: "8.0.1.0".to_string(),
            },
            vms: RwLock::new(Vec::new()),
            hosts: RwLock::new(Vec::new()),
            datastores: RwLock::new(Vec::new()),
            templates: RwLock::new(Vec::new()),
            networks: RwLock::new(Vec::new()),
            power_states: RwLock::new(HashMap::new()),
            vm_folder: ManagedObjectRef::new("Folder", "group-v3"),
            resource_pool: ManagedObjectRef::new("ResourcePool", "resgroup-8"),
            scripts: Mutex::new(HashMap::new()),
            submissions: Mutex::new(Vec::new()),
            clone_specs: Mutex::new(Vec::new()),
            config_specs: Mutex::new(Vec::new()),
            stream: Mutex::new(StreamState::default()),
            notify: Notify::new(),
            task_seq: AtomicU64::new(0),
            filter_seq: AtomicU64::new(0),
            version_seq: AtomicU64::new(0),
            fail_next_wait: AtomicBool::new(false),
            logouts: AtomicUsize::new(0),
        }
    }

    // --- inventory setup ---------------------------------------------------

    pub fn add_vm(&self, record: VirtualMachineRecord) {
        self.vms.write().unwrap().push(record);
    }

    pub fn add_host(&self, record: HostRecord) {
        self.hosts.write().unwrap().push(record);
    }

    pub fn add_datastore(&self, record: DatastoreRecord) {
        self.datastores.write().unwrap().push(record);
    }

    pub fn add_template(&self, record: TemplateRecord) {
        self.templates.write().unwrap().push(record);
    }

    pub fn add_network(&self, network: NetworkObject) {
        self.networks.write().unwrap().push(network);
    }

    pub fn set_power_state(&self, vm: &ManagedObjectRef, state: PowerState) {
        self.power_states
            .write()
            .unwrap()
            .insert(vm.id.clone(), state);
    }

    /// Script the outcome of the next submission of `operation`
    /// (e.g. "CloneVM_Task"). Multiple scripts for one operation queue up.
    pub fn script_task(&self, operation: &str, script: TaskScript) {
        self.scripts
            .lock()
            .unwrap()
            .entry(operation.to_string())
            .or_default()
            .push_back(script);
    }

    // --- stream control ----------------------------------------------------

    fn next_version(&self) -> String {
        format!("v{}", self.version_seq.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Push one update onto the fake stream, remembering it for filter sync.
    pub fn push_update(&self, update: TaskUpdate) {
        let version = self.next_version();
        {
            let mut stream = self.stream.lock().unwrap();
            stream.tasks.insert(update.task.clone(), update.clone());
            stream.pending.push_back(UpdateBatch {
                version,
                updates: vec![update],
            });
        }
        self.notify.notify_waiters();
    }

    /// Push a multi-update batch verbatim (no filter-sync bookkeeping),
    /// for tests exercising batch semantics directly.
    pub fn push_raw_batch(&self, updates: Vec<TaskUpdate>) {
        let version = self.next_version();
        self.stream
            .lock()
            .unwrap()
            .pending
            .push_back(UpdateBatch { version, updates });
        self.notify.notify_waiters();
    }

    /// Make the next wait_for_updates call fail with a transport error.
    pub fn fail_next_wait(&self) {
        self.fail_next_wait.store(true, Ordering::SeqCst);
    }

    // --- assertions --------------------------------------------------------

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn submissions_of(&self, operation: &str) -> Vec<Submission> {
        self.submissions()
            .into_iter()
            .filter(|s| s.operation == operation)
            .collect()
    }

    pub fn recorded_clone_specs(&self) -> Vec<CloneSpec> {
        self.clone_specs.lock().unwrap().clone()
    }

    pub fn recorded_config_specs(&self) -> Vec<VmConfigSpec> {
        self.config_specs.lock().unwrap().clone()
    }

    pub fn active_filter_count(&self) -> usize {
        self.stream.lock().unwrap().filters.len()
    }

    pub fn destroyed_filters(&self) -> Vec<String> {
        self.stream.lock().unwrap().destroyed_filters.clone()
    }

    pub fn logout_count(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }

    // --- internals ---------------------------------------------------------

    fn submit(&self, operation: &str, target: Option<&ManagedObjectRef>) -> TaskKey {
        let key = TaskKey::new(format!("task-{}", self.task_seq.fetch_add(1, Ordering::SeqCst) + 1));
        self.submissions.lock().unwrap().push(Submission {
            operation: operation.to_string(),
            task: key.clone(),
            target: target.cloned(),
        });

        let script = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(operation)
            .and_then(|queue| queue.pop_front());
        match script {
            Some(TaskScript::Succeed(result)) => self.push_update(TaskUpdate {
                task: key.clone(),
                state: TaskState::Success,
                result,
                error_message: None,
            }),
            Some(TaskScript::Fail(message)) => self.push_update(TaskUpdate {
                task: key.clone(),
                state: TaskState::Error,
                result: None,
                error_message: Some(message),
            }),
            Some(TaskScript::Hang) | None => {}
        }
        key
    }
}

impl Default for MockVimSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VimSession for MockVimSession {
    async fn about(&self) -> Result<AboutInfo> {
        Ok(self.about.clone())
    }

    async fn logout(&self) -> Result<()> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_virtual_machines(&self) -> Result<Vec<VirtualMachineRecord>> {
        Ok(self.vms.read().unwrap().clone())
    }

    async fn find_vm_by_uuid(&self, uuid: &str) -> Result<Option<VirtualMachineRecord>> {
        Ok(self
            .vms
            .read()
            .unwrap()
            .iter()
            .find(|vm| vm.uuid == uuid)
            .cloned())
    }

    async fn list_hosts(&self) -> Result<Vec<HostRecord>> {
        Ok(self.hosts.read().unwrap().clone())
    }

    async fn list_datastores(&self) -> Result<Vec<DatastoreRecord>> {
        Ok(self.datastores.read().unwrap().clone())
    }

    async fn list_templates(&self) -> Result<Vec<TemplateRecord>> {
        Ok(self.templates.read().unwrap().clone())
    }

    async fn find_template(&self, id_or_name: &str) -> Result<Option<TemplateRecord>> {
        Ok(self
            .templates
            .read()
            .unwrap()
            .iter()
            .find(|t| t.uuid == id_or_name || t.name == id_or_name)
            .cloned())
    }

    async fn find_datastore(&self, name: &str) -> Result<Option<DatastoreRecord>> {
        Ok(self
            .datastores
            .read()
            .unwrap()
            .iter()
            .find(|ds| ds.name == name)
            .cloned())
    }

    async fn find_network(&self, name: &str) -> Result<Option<NetworkObject>> {
        Ok(self
            .networks
            .read()
            .unwrap()
            .iter()
            .find(|n| n.name() == name)
            .cloned())
    }

    async fn datacenter_vm_folder(&self, _obj: &ManagedObjectRef) -> Result<ManagedObjectRef> {
        Ok(self.vm_folder.clone())
    }

    async fn default_resource_pool(&self, _obj: &ManagedObjectRef) -> Result<ManagedObjectRef> {
        Ok(self.resource_pool.clone())
    }

    async fn vm_power_state(&self, vm: &ManagedObjectRef) -> Result<PowerState> {
        if let Some(state) = self.power_states.read().unwrap().get(&vm.id) {
            return Ok(*state);
        }
        Ok(self
            .vms
            .read()
            .unwrap()
            .iter()
            .find(|record| record.moref == *vm)
            .map(|record| record.power_state)
            .unwrap_or(PowerState::PoweredOff))
    }

    async fn clone_vm_task(
        &self,
        template: &ManagedObjectRef,
        _name: &str,
        spec: &CloneSpec,
    ) -> Result<TaskKey> {
        self.clone_specs.lock().unwrap().push(spec.clone());
        Ok(self.submit("CloneVM_Task", Some(template)))
    }

    async fn create_vm_task(
        &self,
        folder: &ManagedObjectRef,
        _resource_pool: &ManagedObjectRef,
        spec: &VmConfigSpec,
    ) -> Result<TaskKey> {
        self.config_specs.lock().unwrap().push(spec.clone());
        Ok(self.submit("CreateVM_Task", Some(folder)))
    }

    async fn reconfigure_vm_task(
        &self,
        vm: &ManagedObjectRef,
        spec: &VmConfigSpec,
    ) -> Result<TaskKey> {
        self.config_specs.lock().unwrap().push(spec.clone());
        Ok(self.submit("ReconfigVM_Task", Some(vm)))
    }

    async fn power_on_vm_task(&self, vm: &ManagedObjectRef) -> Result<TaskKey> {
        Ok(self.submit("PowerOnVM_Task", Some(vm)))
    }

    async fn power_off_vm_task(&self, vm: &ManagedObjectRef) -> Result<TaskKey> {
        Ok(self.submit("PowerOffVM_Task", Some(vm)))
    }

    async fn search_datastore_task(
        &self,
        datastore: &ManagedObjectRef,
        _pattern: &str,
    ) -> Result<TaskKey> {
        Ok(self.submit("SearchDatastoreSubFolders_Task", Some(datastore)))
    }

    async fn create_task_filter(&self, task: &TaskKey) -> Result<FilterKey> {
        let key = format!(
            "session[mock]filter-{}",
            self.filter_seq.fetch_add(1, Ordering::SeqCst) + 1
        );
        let replay = {
            let mut stream = self.stream.lock().unwrap();
            stream.filters.insert(key.clone(), task.clone());
            stream.tasks.get(task).cloned()
        };
        // Initial filter sync: re-deliver the current state of the task so a
        // subscriber that registered after completion still observes it.
        if let Some(update) = replay {
            self.push_raw_batch(vec![update]);
        }
        Ok(FilterKey::new(key))
    }

    async fn destroy_filter(&self, filter: &FilterKey) -> Result<()> {
        let mut stream = self.stream.lock().unwrap();
        stream.filters.remove(filter.as_str());
        stream.destroyed_filters.push(filter.as_str().to_string());
        Ok(())
    }

    async fn wait_for_updates(
        &self,
        _version: &str,
        max_wait: Duration,
    ) -> Result<Option<UpdateBatch>> {
        if self.fail_next_wait.swap(false, Ordering::SeqCst) {
            return Err(VesperError::transport("update stream reset by mock"));
        }
        let deadline = tokio::time::Instant::now() + max_wait;
        loop {
            // Register for wakeups before inspecting the queue so a push that
            // lands in between still wakes us.
            let notified = self.notify.notified();
            {
                let mut stream = self.stream.lock().unwrap();
                if stream.cancelled {
                    stream.cancelled = false;
                    return Ok(None);
                }
                if let Some(batch) = stream.pending.pop_front() {
                    return Ok(Some(batch));
                }
            }
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep_until(deadline) => return Ok(None),
            }
        }
    }

    async fn cancel_wait(&self) -> Result<()> {
        self.stream.lock().unwrap().cancelled = true;
        self.notify.notify_waiters();
        Ok(())
    }
}

/// Connector handing out one shared mock session.
pub struct MockVimConnector {
    session: Arc<MockVimSession>,
    connects: AtomicUsize,
    reject_logins: AtomicBool,
}

impl MockVimConnector {
    pub fn new(session: Arc<MockVimSession>) -> Self {
        Self {
            session,
            connects: AtomicUsize::new(0),
            reject_logins: AtomicBool::new(false),
        }
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn reject_logins(&self) {
        self.reject_logins.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl VimConnector for MockVimConnector {
    async fn connect(&self, endpoint: &EndpointConfig) -> Result<Arc<dyn VimSession>> {
        if self.reject_logins.load(Ordering::SeqCst) {
            return Err(VesperError::AuthenticationFailed {
                endpoint: endpoint.display_name(),
            });
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.session.clone())
    }
}
