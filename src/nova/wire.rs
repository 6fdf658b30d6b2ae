//! Wire types for the Nova-compatible compute API.
//!
//! The create payload mirrors the `POST /servers` document: empty
//! collections and absent options are omitted entirely so the provider
//! applies its defaults, and user data travels base64-encoded.

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::compute::{BootVolume, NetworkAttachment, ServerSpec};

#[derive(Debug, Serialize)]
pub(crate) struct CreateServerBody {
    pub(crate) server: CreateServer,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateServer {
    name: String,
    #[serde(rename = "flavorRef")]
    flavor_ref: String,
    #[serde(rename = "imageRef", skip_serializing_if = "Option::is_none")]
    image_ref: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    availability_zone: String,
    config_drive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_data: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    security_groups: Vec<SecurityGroupRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    networks: Vec<NetworkRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    block_device_mapping_v2: Vec<BlockDeviceMapping>,
    #[serde(skip_serializing_if = "Option::is_none")]
    key_name: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    metadata: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SecurityGroupRef {
    name: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct NetworkRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct BlockDeviceMapping {
    boot_index: u32,
    uuid: String,
    source_type: &'static str,
    destination_type: &'static str,
}

/// Body of the forced-deletion action; `forceDelete` serialises to null.
#[derive(Debug, Default, Serialize)]
pub(crate) struct ForceDeleteBody {
    #[serde(rename = "forceDelete")]
    pub(crate) force_delete: (),
}

#[derive(Debug, Deserialize)]
pub(crate) struct ServerEnvelope {
    pub(crate) server: ServerDocument,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ServerDocument {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) status: Option<String>,
}

impl From<&NetworkAttachment> for NetworkRef {
    fn from(attachment: &NetworkAttachment) -> Self {
        match attachment {
            NetworkAttachment::Network(id) => Self {
                uuid: Some(id.clone()),
                port: None,
            },
            NetworkAttachment::Port(id) => Self {
                uuid: None,
                port: Some(id.clone()),
            },
        }
    }
}

impl From<&BootVolume> for BlockDeviceMapping {
    fn from(volume: &BootVolume) -> Self {
        Self {
            boot_index: volume.boot_index,
            uuid: volume.volume_id.clone(),
            source_type: BootVolume::SOURCE_TYPE,
            destination_type: BootVolume::DESTINATION_TYPE,
        }
    }
}

impl From<&ServerSpec> for CreateServerBody {
    fn from(spec: &ServerSpec) -> Self {
        let user_data = if spec.user_data.is_empty() {
            None
        } else {
            Some(STANDARD.encode(&spec.user_data))
        };
        Self {
            server: CreateServer {
                name: spec.name.clone(),
                flavor_ref: spec.flavor_ref.clone(),
                image_ref: spec.image_ref.clone(),
                availability_zone: spec.availability_zone.clone(),
                config_drive: spec.config_drive,
                user_data,
                security_groups: spec
                    .security_groups
                    .iter()
                    .map(|name| SecurityGroupRef { name: name.clone() })
                    .collect(),
                networks: spec.networks.iter().map(NetworkRef::from).collect(),
                block_device_mapping_v2: spec
                    .boot_volume
                    .iter()
                    .map(BlockDeviceMapping::from)
                    .collect(),
                key_name: spec.key_name.clone(),
                metadata: spec.metadata.clone(),
            },
        }
    }
}
