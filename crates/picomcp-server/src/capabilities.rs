//! Capability advertisement.
//!
//! Every flag corresponds 1:1 to a dispatcher method set; tasks appear only
//! when the task engine is enabled.

use picomcp_protocol::types::initialization::{
    ListChangedCapability, ResourcesCapability, ServerCapabilities, TasksCapability,
};

use crate::config::ServerConfig;

/// Build the capability bag advertised at initialize.
pub fn server_capabilities(config: &ServerConfig) -> ServerCapabilities {
    ServerCapabilities {
        tools: Some(ListChangedCapability {
            list_changed: Some(true),
        }),
        resources: Some(ResourcesCapability {
            list_changed: Some(true),
            subscribe: Some(true),
        }),
        prompts: Some(ListChangedCapability {
            list_changed: Some(true),
        }),
        roots: Some(ListChangedCapability {
            list_changed: Some(true),
        }),
        logging: Some(serde_json::json!({})),
        completions: Some(serde_json::json!({})),
        tasks: if config.tasks.enabled {
            Some(TasksCapability {
                list: Some(true),
                cancel: Some(true),
            })
        } else {
            None
        },
    }
}
