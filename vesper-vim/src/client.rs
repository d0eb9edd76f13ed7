//! reqwest-based VI/JSON transport.
//!
//! Every call is a POST of `{base}/{Type}/{moId}/{method}` with a JSON body
//! and the `vmware-api-session-id` header. Inventory queries go through a
//! container view that is always destroyed afterwards, even when property
//! retrieval fails, so no view state is leaked on the endpoint.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use vesper_core::config::EndpointConfig;
use vesper_core::error::{Result, VesperError};
use vesper_core::vim::session::{VimConnector, VimSession};
use vesper_core::vim::types::{
    AboutInfo, CloneSpec, DatastoreRecord, FilterKey, HostRecord, ManagedObjectRef, NetworkObject,
    PowerState, TaskKey, TemplateRecord, UpdateBatch, VirtualMachineRecord, VmConfigSpec,
};

use crate::wire;

const SESSION_HEADER: &str = "vmware-api-session-id";
const VIM_RELEASE: &str = "8.0.1.0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const VM_PATH_SET: &[&str] = &[
    "summary",
    "config.hardware.device",
    "config.annotation",
    "config.guestId",
    "parent",
    "resourcePool",
    "datastore",
    "runtime.host",
];

/// Connector producing VI/JSON sessions.
#[derive(Debug, Default)]
pub struct VimHttpConnector;

impl VimHttpConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl VimConnector for VimHttpConnector {
    async fn connect(&self, endpoint: &EndpointConfig) -> Result<Arc<dyn VimSession>> {
        let session = VimHttpSession::login(endpoint).await?;
        Ok(Arc::new(session))
    }
}

/// Managed-object ids of the service content singletons we drive.
#[derive(Debug, Clone)]
struct ServiceContent {
    session_manager: String,
    property_collector: String,
    view_manager: String,
    root_folder: ManagedObjectRef,
    about: AboutInfo,
}

pub struct VimHttpSession {
    http: reqwest::Client,
    base: Url,
    session_id: String,
    content: ServiceContent,
    endpoint_name: String,
}

impl VimHttpSession {
    pub async fn login(endpoint: &EndpointConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(endpoint.insecure_tls)
            .build()
            .map_err(|e| VesperError::transport(format!("failed to build HTTP client: {}", e)))?;

        let base = Url::parse(&format!(
            "https://{}:{}/sdk/vim25/{}/",
            endpoint.host, endpoint.port, VIM_RELEASE
        ))
        .map_err(|e| VesperError::Config {
            message: format!("invalid endpoint address: {}", e),
        })?;
        let endpoint_name = endpoint.display_name();

        // Service content is readable before authentication and names the
        // singletons (session manager, property collector, view manager).
        let content_url = join(&base, "ServiceInstance/ServiceInstance/RetrieveServiceContent")?;
        let response = http
            .post(content_url)
            .json(&json!({}))
            .send()
            .await
            .map_err(|e| transport_error("RetrieveServiceContent", e))?;
        let content_value = read_body("RetrieveServiceContent", response, &endpoint_name).await?;
        let content = parse_service_content(&content_value)?;

        let login_url = join(
            &base,
            &format!("SessionManager/{}/Login", content.session_manager),
        )?;
        let response = http
            .post(login_url)
            .json(&json!({
                "userName": endpoint.username,
                "password": endpoint.password,
            }))
            .send()
            .await
            .map_err(|e| transport_error("Login", e))?;

        if response.status() == StatusCode::UNAUTHORIZED
            || response.status() == StatusCode::FORBIDDEN
        {
            return Err(VesperError::AuthenticationFailed {
                endpoint: endpoint_name,
            });
        }
        let session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| VesperError::AuthenticationFailed {
                endpoint: endpoint_name.clone(),
            })?;
        // Drain the body; the UserSession payload itself is not needed.
        let _ = read_body("Login", response, &endpoint_name).await?;

        debug!("logged in to {}", endpoint_name);
        Ok(Self {
            http,
            base,
            session_id,
            content,
            endpoint_name,
        })
    }

    /// POST one method invocation and return its JSON result.
    async fn invoke(&self, kind: &str, id: &str, method: &str, body: Value) -> Result<Value> {
        self.invoke_with_timeout(kind, id, method, body, REQUEST_TIMEOUT)
            .await
    }

    async fn invoke_with_timeout(
        &self,
        kind: &str,
        id: &str,
        method: &str,
        body: Value,
        timeout: Duration,
    ) -> Result<Value> {
        let url = join(&self.base, &format!("{}/{}/{}", kind, id, method))?;
        let response = self
            .http
            .post(url)
            .timeout(timeout)
            .header(SESSION_HEADER, &self.session_id)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(method, e))?;
        read_body(method, response, &self.endpoint_name).await
    }

    async fn retrieve_container(
        &self,
        kind: &str,
        path_set: &[&str],
    ) -> Result<Vec<(ManagedObjectRef, HashMap<String, Value>)>> {
        let view_value = self
            .invoke(
                "ViewManager",
                &self.content.view_manager,
                "CreateContainerView",
                json!({
                    "container": wire::moref_value(&self.content.root_folder),
                    "type": [kind],
                    "recursive": true,
                }),
            )
            .await?;
        let view = wire::moref_from_value(&view_value).ok_or_else(|| {
            VesperError::internal("CreateContainerView returned no view reference")
        })?;

        let retrieved = self
            .invoke(
                "PropertyCollector",
                &self.content.property_collector,
                "RetrievePropertiesEx",
                json!({
                    "specSet": [{
                        "_typeName": "PropertyFilterSpec",
                        "propSet": [{
                            "_typeName": "PropertySpec",
                            "type": kind,
                            "pathSet": path_set,
                        }],
                        "objectSet": [{
                            "_typeName": "ObjectSpec",
                            "obj": wire::moref_value(&view),
                            "skip": true,
                            "selectSet": [{
                                "_typeName": "TraversalSpec",
                                "name": "view",
                                "type": "ContainerView",
                                "path": "view",
                                "skip": false,
                            }],
                        }],
                    }],
                    "options": {"_typeName": "RetrieveOptions"},
                }),
            )
            .await;

        // Views are server-side state; release them even when retrieval failed.
        if let Err(e) = self.invoke("ContainerView", &view.id, "DestroyView", json!({})).await {
            warn!("failed to destroy container view {}: {}", view.id, e);
        }

        Ok(wire::object_contents(&retrieved?))
    }

    async fn retrieve_object(
        &self,
        moref: &ManagedObjectRef,
        path_set: &[&str],
    ) -> Result<HashMap<String, Value>> {
        let retrieved = self
            .invoke(
                "PropertyCollector",
                &self.content.property_collector,
                "RetrievePropertiesEx",
                json!({
                    "specSet": [{
                        "_typeName": "PropertyFilterSpec",
                        "propSet": [{
                            "_typeName": "PropertySpec",
                            "type": moref.kind,
                            "pathSet": path_set,
                        }],
                        "objectSet": [{
                            "_typeName": "ObjectSpec",
                            "obj": wire::moref_value(moref),
                            "skip": false,
                        }],
                    }],
                    "options": {"_typeName": "RetrieveOptions"},
                }),
            )
            .await?;
        wire::object_contents(&retrieved)
            .into_iter()
            .next()
            .map(|(_, props)| props)
            .ok_or_else(|| VesperError::not_found(format!("object {}", moref)))
    }

    async fn object_property(
        &self,
        moref: &ManagedObjectRef,
        property: &str,
    ) -> Result<Value> {
        let mut props = self.retrieve_object(moref, &[property]).await?;
        props.remove(property).ok_or_else(|| {
            VesperError::not_found(format!("property '{}' of {}", property, moref))
        })
    }

    async fn host_names(&self) -> Result<HashMap<String, String>> {
        let hosts = self.retrieve_container("HostSystem", &["name"]).await?;
        Ok(hosts
            .into_iter()
            .filter_map(|(moref, props)| {
                let name = props.get("name")?.as_str()?.to_string();
                Some((moref.id, name))
            })
            .collect())
    }

    async fn parsed_vms(&self) -> Result<Vec<wire::ParsedVm>> {
        let host_names = self.host_names().await?;
        let objects = self.retrieve_container("VirtualMachine", VM_PATH_SET).await?;
        Ok(objects
            .iter()
            .filter_map(|(moref, props)| wire::parse_vm(moref, props, &host_names))
            .collect())
    }

    async fn datastores_by_id(&self) -> Result<HashMap<String, DatastoreRecord>> {
        let records = self.list_datastores().await?;
        Ok(records
            .into_iter()
            .map(|record| (record.moref.id.clone(), record))
            .collect())
    }

    /// Host owning `obj`: the VM's runtime host, or the first host mounting
    /// a datastore.
    async fn owning_host(&self, obj: &ManagedObjectRef) -> Result<ManagedObjectRef> {
        match obj.kind.as_str() {
            "VirtualMachine" => {
                let value = self.object_property(obj, "runtime.host").await?;
                wire::moref_from_value(&value)
                    .ok_or_else(|| VesperError::not_found(format!("host of {}", obj)))
            }
            "Datastore" => {
                let mounts = self.object_property(obj, "host").await?;
                mounts
                    .as_array()
                    .and_then(|mounts| mounts.first())
                    .and_then(|mount| mount.get("key"))
                    .and_then(wire::moref_from_value)
                    .ok_or_else(|| {
                        VesperError::not_found(format!("host mounting datastore {}", obj))
                    })
            }
            other => Err(VesperError::internal(format!(
                "cannot resolve owning host of a {}",
                other
            ))),
        }
    }

    async fn submit_task(
        &self,
        kind: &str,
        id: &str,
        method: &str,
        body: Value,
    ) -> Result<TaskKey> {
        let value = self.invoke(kind, id, method, body).await?;
        let task = wire::moref_from_value(&value).ok_or_else(|| {
            VesperError::internal(format!("{} returned no task reference", method))
        })?;
        debug!("{} submitted as {}", method, task.id);
        Ok(TaskKey::new(task.id))
    }
}

#[async_trait]
impl VimSession for VimHttpSession {
    async fn about(&self) -> Result<AboutInfo> {
        Ok(self.content.about.clone())
    }

    async fn logout(&self) -> Result<()> {
        self.invoke(
            "SessionManager",
            &self.content.session_manager,
            "Logout",
            json!({}),
        )
        .await?;
        debug!("logged out of {}", self.endpoint_name);
        Ok(())
    }

    async fn list_virtual_machines(&self) -> Result<Vec<VirtualMachineRecord>> {
        Ok(self
            .parsed_vms()
            .await?
            .into_iter()
            .filter(|parsed| !parsed.record.is_template)
            .map(|parsed| parsed.record)
            .collect())
    }

    async fn find_vm_by_uuid(&self, uuid: &str) -> Result<Option<VirtualMachineRecord>> {
        Ok(self
            .parsed_vms()
            .await?
            .into_iter()
            .find(|parsed| parsed.record.uuid == uuid)
            .map(|parsed| parsed.record))
    }

    async fn list_hosts(&self) -> Result<Vec<HostRecord>> {
        let objects = self
            .retrieve_container(
                "HostSystem",
                &[
                    "name",
                    "summary",
                    "runtime.connectionState",
                    "runtime.powerState",
                    "vm",
                ],
            )
            .await?;
        Ok(objects
            .iter()
            .filter_map(|(moref, props)| wire::parse_host(moref, props))
            .collect())
    }

    async fn list_datastores(&self) -> Result<Vec<DatastoreRecord>> {
        let objects = self.retrieve_container("Datastore", &["summary"]).await?;
        Ok(objects
            .iter()
            .filter_map(|(moref, props)| wire::parse_datastore(moref, props))
            .collect())
    }

    async fn list_templates(&self) -> Result<Vec<TemplateRecord>> {
        let datastores = self.datastores_by_id().await?;
        Ok(self
            .parsed_vms()
            .await?
            .iter()
            .filter(|parsed| parsed.record.is_template)
            .map(|parsed| wire::template_record(parsed, &datastores))
            .collect())
    }

    async fn find_template(&self, id_or_name: &str) -> Result<Option<TemplateRecord>> {
        Ok(self
            .list_templates()
            .await?
            .into_iter()
            .find(|template| template.uuid == id_or_name || template.name == id_or_name))
    }

    async fn find_datastore(&self, name: &str) -> Result<Option<DatastoreRecord>> {
        Ok(self
            .list_datastores()
            .await?
            .into_iter()
            .find(|record| record.name == name))
    }

    async fn find_network(&self, name: &str) -> Result<Option<NetworkObject>> {
        // The Network view covers distributed portgroups too; the returned
        // reference kind tells the variants apart.
        let objects = self.retrieve_container("Network", &["name"]).await?;
        let Some((moref, _)) = objects.into_iter().find(|(_, props)| {
            props.get("name").and_then(Value::as_str) == Some(name)
        }) else {
            return Ok(None);
        };

        if moref.kind != "DistributedVirtualPortgroup" {
            return Ok(Some(NetworkObject::Standard {
                moref,
                name: name.to_string(),
            }));
        }

        let config = self.object_property(&moref, "config").await?;
        let portgroup_key = config
            .get("key")
            .and_then(Value::as_str)
            .unwrap_or(&moref.id)
            .to_string();
        let switch = config
            .get("distributedVirtualSwitch")
            .and_then(wire::moref_from_value)
            .ok_or_else(|| {
                VesperError::not_found(format!("switch of portgroup '{}'", name))
            })?;
        let switch_uuid = self
            .object_property(&switch, "uuid")
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string();

        Ok(Some(NetworkObject::DistributedPortgroup {
            moref,
            name: name.to_string(),
            portgroup_key,
            switch_uuid,
        }))
    }

    async fn datacenter_vm_folder(&self, obj: &ManagedObjectRef) -> Result<ManagedObjectRef> {
        // Walk parents up to the owning datacenter, then take its VM folder.
        let mut current = obj.clone();
        for _ in 0..16 {
            if current.kind == "Datacenter" {
                let folder = self.object_property(&current, "vmFolder").await?;
                return wire::moref_from_value(&folder).ok_or_else(|| {
                    VesperError::not_found(format!("VM folder of {}", current))
                });
            }
            let parent = self.object_property(&current, "parent").await?;
            current = wire::moref_from_value(&parent)
                .ok_or_else(|| VesperError::not_found(format!("parent of {}", current)))?;
        }
        Err(VesperError::internal(format!(
            "no datacenter above {} within 16 hops",
            obj
        )))
    }

    async fn default_resource_pool(&self, obj: &ManagedObjectRef) -> Result<ManagedObjectRef> {
        let host = self.owning_host(obj).await?;
        let compute = self.object_property(&host, "parent").await?;
        let compute = wire::moref_from_value(&compute)
            .ok_or_else(|| VesperError::not_found(format!("compute resource of {}", host)))?;
        let pool = self.object_property(&compute, "resourcePool").await?;
        wire::moref_from_value(&pool)
            .ok_or_else(|| VesperError::not_found(format!("resource pool of {}", compute)))
    }

    async fn vm_power_state(&self, vm: &ManagedObjectRef) -> Result<PowerState> {
        let value = self.object_property(vm, "runtime.powerState").await?;
        Ok(match value.as_str() {
            Some("poweredOn") => PowerState::PoweredOn,
            Some("suspended") => PowerState::Suspended,
            _ => PowerState::PoweredOff,
        })
    }

    async fn clone_vm_task(
        &self,
        template: &ManagedObjectRef,
        name: &str,
        spec: &CloneSpec,
    ) -> Result<TaskKey> {
        self.submit_task(
            "VirtualMachine",
            &template.id,
            "CloneVM_Task",
            wire::clone_body(&spec.folder, name, spec),
        )
        .await
    }

    async fn create_vm_task(
        &self,
        folder: &ManagedObjectRef,
        resource_pool: &ManagedObjectRef,
        spec: &VmConfigSpec,
    ) -> Result<TaskKey> {
        self.submit_task(
            "Folder",
            &folder.id,
            "CreateVM_Task",
            json!({
                "config": wire::config_spec_value(spec),
                "pool": wire::moref_value(resource_pool),
            }),
        )
        .await
    }

    async fn reconfigure_vm_task(
        &self,
        vm: &ManagedObjectRef,
        spec: &VmConfigSpec,
    ) -> Result<TaskKey> {
        self.submit_task(
            "VirtualMachine",
            &vm.id,
            "ReconfigVM_Task",
            json!({ "spec": wire::config_spec_value(spec) }),
        )
        .await
    }

    async fn power_on_vm_task(&self, vm: &ManagedObjectRef) -> Result<TaskKey> {
        self.submit_task("VirtualMachine", &vm.id, "PowerOnVM_Task", json!({}))
            .await
    }

    async fn power_off_vm_task(&self, vm: &ManagedObjectRef) -> Result<TaskKey> {
        self.submit_task("VirtualMachine", &vm.id, "PowerOffVM_Task", json!({}))
            .await
    }

    async fn search_datastore_task(
        &self,
        datastore: &ManagedObjectRef,
        pattern: &str,
    ) -> Result<TaskKey> {
        let name = self.object_property(datastore, "summary.name").await?;
        let name = name.as_str().unwrap_or_default().to_string();
        let browser = self.object_property(datastore, "browser").await?;
        let browser = wire::moref_from_value(&browser)
            .ok_or_else(|| VesperError::not_found(format!("browser of {}", datastore)))?;
        self.submit_task(
            "HostDatastoreBrowser",
            &browser.id,
            "SearchDatastoreSubFolders_Task",
            json!({
                "datastorePath": format!("[{}]", name),
                "searchSpec": {
                    "_typeName": "HostDatastoreBrowserSearchSpec",
                    "matchPattern": [pattern],
                },
            }),
        )
        .await
    }

    async fn create_task_filter(&self, task: &TaskKey) -> Result<FilterKey> {
        let value = self
            .invoke(
                "PropertyCollector",
                &self.content.property_collector,
                "CreateFilter",
                json!({
                    "spec": {
                        "_typeName": "PropertyFilterSpec",
                        "propSet": [{
                            "_typeName": "PropertySpec",
                            "type": "Task",
                            "pathSet": ["info.state", "info.error", "info.result"],
                        }],
                        "objectSet": [{
                            "_typeName": "ObjectSpec",
                            "obj": {
                                "_typeName": "ManagedObjectReference",
                                "type": "Task",
                                "value": task.as_str(),
                            },
                            "skip": false,
                        }],
                    },
                    "partialUpdates": false,
                }),
            )
            .await?;
        let filter = wire::moref_from_value(&value)
            .ok_or_else(|| VesperError::internal("CreateFilter returned no filter reference"))?;
        Ok(FilterKey::new(filter.id))
    }

    async fn destroy_filter(&self, filter: &FilterKey) -> Result<()> {
        self.invoke(
            "PropertyFilter",
            filter.as_str(),
            "DestroyPropertyFilter",
            json!({}),
        )
        .await?;
        Ok(())
    }

    async fn wait_for_updates(
        &self,
        version: &str,
        max_wait: Duration,
    ) -> Result<Option<UpdateBatch>> {
        let value = self
            .invoke_with_timeout(
                "PropertyCollector",
                &self.content.property_collector,
                "WaitForUpdatesEx",
                json!({
                    "version": version,
                    "options": {
                        "_typeName": "WaitOptions",
                        "maxWaitSeconds": max_wait.as_secs(),
                    },
                }),
                // The server holds the call open up to max_wait; pad the
                // client-side timeout so it is the server that truncates.
                max_wait + REQUEST_TIMEOUT,
            )
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(wire::parse_update_set(&value))
    }

    async fn cancel_wait(&self) -> Result<()> {
        self.invoke(
            "PropertyCollector",
            &self.content.property_collector,
            "CancelWaitForUpdates",
            json!({}),
        )
        .await?;
        Ok(())
    }
}

fn join(base: &Url, path: &str) -> Result<Url> {
    base.join(path).map_err(|e| VesperError::Config {
        message: format!("invalid request path '{}': {}", path, e),
    })
}

fn transport_error(method: &str, error: reqwest::Error) -> VesperError {
    VesperError::transport(format!("{}: {}", method, error))
}

/// Turn a response into its JSON body, mapping endpoint faults onto the
/// error taxonomy. Empty bodies (Logout, DestroyView) become `Null`.
async fn read_body(
    method: &str,
    response: reqwest::Response,
    endpoint_name: &str,
) -> Result<Value> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| transport_error(method, e))?;

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(VesperError::AuthenticationFailed {
            endpoint: endpoint_name.to_string(),
        });
    }
    if !status.is_success() {
        let message = fault_message(&text).unwrap_or_else(|| format!("HTTP {}", status));
        return Err(VesperError::RemoteTask {
            operation: method.to_string(),
            message,
        });
    }
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| {
        VesperError::transport(format!("{}: malformed response body: {}", method, e))
    })
}

fn fault_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("localizedMessage")
        .or_else(|| value.get("faultstring"))
        .or_else(|| path_get(&value, &["faultCause", "localizedMessage"]))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn path_get<'a>(value: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for segment in segments {
        current = current.get(segment)?;
    }
    Some(current)
}

fn parse_service_content(value: &Value) -> Result<ServiceContent> {
    let singleton = |name: &str| -> Result<String> {
        value
            .get(name)
            .and_then(wire::moref_from_value)
            .map(|moref| moref.id)
            .ok_or_else(|| {
                VesperError::transport(format!("service content is missing '{}'", name))
            })
    };
    let root_folder = value
        .get("rootFolder")
        .and_then(wire::moref_from_value)
        .ok_or_else(|| VesperError::transport("service content is missing 'rootFolder'"))?;
    let about = value
        .get("about")
        .ok_or_else(|| VesperError::transport("service content is missing 'about'"))?;

    Ok(ServiceContent {
        session_manager: singleton("sessionManager")?,
        property_collector: singleton("propertyCollector")?,
        view_manager: singleton("viewManager")?,
        root_folder,
        about: AboutInfo {
            full_name: about
                .get("fullName")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            api_type: about
                .get("apiType")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            api_version: about
                .get("apiVersion")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        },
    })
}
