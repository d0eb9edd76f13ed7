//! Placement resolution for new VMs.
//!
//! Maps a provisioning request to the concrete folder, resource pool,
//! datastore and network the VM will be created into. Resolution fails
//! closed: every referenced object is looked up before any mutating call is
//! submitted, so a half-specified operation never reaches the endpoint.

use tracing::debug;

use crate::config::ProvisionConfig;
use crate::error::{Result, VesperError};
use crate::types::{ImageSource, ProvisioningRequest};
use crate::vim::session::VimSession;
use crate::vim::types::{DatastoreRecord, ManagedObjectRef, NetworkObject, TemplateRecord};

/// Fully resolved placement for one provisioning request.
#[derive(Debug, Clone)]
pub struct PlacementResult {
    pub folder: ManagedObjectRef,
    pub resource_pool: ManagedObjectRef,
    pub datastore: DatastoreRecord,
    pub network: NetworkObject,
    /// Populated on the template path; the clone target.
    pub template: Option<TemplateRecord>,
}

pub struct PlacementResolver<'a> {
    session: &'a dyn VimSession,
    defaults: &'a ProvisionConfig,
}

impl<'a> PlacementResolver<'a> {
    pub fn new(session: &'a dyn VimSession, defaults: &'a ProvisionConfig) -> Self {
        Self { session, defaults }
    }

    pub async fn resolve(
        &self,
        request: &ProvisioningRequest,
        source: &ImageSource,
    ) -> Result<PlacementResult> {
        let (folder, resource_pool, datastore, template) = match source {
            ImageSource::Template { template_id } => {
                let template = self
                    .session
                    .find_template(template_id)
                    .await?
                    .ok_or_else(|| {
                        VesperError::not_found(format!("template '{}'", template_id))
                    })?;

                // Templates parked directly under a host have a non-folder
                // parent; fall back to the datacenter's default VM folder.
                let folder = match &template.parent {
                    Some(parent) if parent.is_folder() => parent.clone(),
                    _ => self.session.datacenter_vm_folder(&template.moref).await?,
                };

                let resource_pool = match &template.resource_pool {
                    Some(pool) => pool.clone(),
                    None => self.session.default_resource_pool(&template.moref).await?,
                };

                let datastore = match &request.datastore_name {
                    Some(name) => self.lookup_datastore(name).await?,
                    None => self.template_primary_datastore(&template)?,
                };

                (folder, resource_pool, datastore, Some(template))
            }
            ImageSource::BootMedia { .. } => {
                // Validation has already required an explicit datastore for
                // this path; the resolver still fails closed if it is gone.
                let name = request.datastore_name.as_deref().ok_or_else(|| {
                    VesperError::validation(
                        "datastore_name",
                        "required when installing from boot media",
                    )
                })?;
                let datastore = self.lookup_datastore(name).await?;
                let folder = self.session.datacenter_vm_folder(&datastore.moref).await?;
                let resource_pool = self
                    .session
                    .default_resource_pool(&datastore.moref)
                    .await?;
                (folder, resource_pool, datastore, None)
            }
        };

        let network_name = request
            .network_name
            .as_deref()
            .unwrap_or(&self.defaults.default_network);
        let network = self
            .session
            .find_network(network_name)
            .await?
            .ok_or_else(|| VesperError::not_found(format!("network '{}'", network_name)))?;

        debug!(
            "placement resolved: folder={} pool={} datastore={} network={}",
            folder,
            resource_pool,
            datastore.name,
            network.name()
        );

        Ok(PlacementResult {
            folder,
            resource_pool,
            datastore,
            network,
            template,
        })
    }

    async fn lookup_datastore(&self, name: &str) -> Result<DatastoreRecord> {
        let datastore = self
            .session
            .find_datastore(name)
            .await?
            .ok_or_else(|| VesperError::not_found(format!("datastore '{}'", name)))?;
        if !datastore.accessible {
            return Err(VesperError::not_found(format!(
                "datastore '{}' (inaccessible)",
                name
            )));
        }
        Ok(datastore)
    }

    fn template_primary_datastore(&self, template: &TemplateRecord) -> Result<DatastoreRecord> {
        let datastore = template.datastores.first().cloned().ok_or_else(|| {
            VesperError::not_found(format!(
                "datastore backing template '{}'",
                template.name
            ))
        })?;
        if !datastore.accessible {
            return Err(VesperError::not_found(format!(
                "datastore '{}' backing template '{}' (inaccessible)",
                datastore.name, template.name
            )));
        }
        Ok(datastore)
    }
}
