//! Effective settings for a session: the config file overlaid with the
//! editor's variables.

use tsbridge_client::{RpcOptions, ServerCommand, ServerSettings, locale_from_env};
use tsbridge_config::{BridgeConfig, HOST_VARS, ServerConfig, SignConfig};
use tsbridge_editor::{EditorHost, HostError, SignDefinition};

/// Overlay the editor's `tsbridge#*` variables onto `config`.
///
/// Returns how many variables were applied.
pub async fn apply_host_vars(
    host: &dyn EditorHost,
    config: &mut BridgeConfig,
) -> Result<usize, HostError> {
    let mut applied = 0;
    for name in HOST_VARS {
        if let Some(value) = host.get_var(name).await?
            && config.apply_var(name, &value)
        {
            applied += 1;
        }
    }
    Ok(applied)
}

#[must_use]
pub fn server_settings(config: &ServerConfig) -> ServerSettings {
    let command = ServerCommand::new(config.resolved_path()).args(config.options.iter().cloned());
    ServerSettings {
        command,
        locale: config.locale.clone().or_else(locale_from_env),
        version: config.version_override(),
        rpc: RpcOptions {
            request_timeout: config.request_timeout(),
        },
    }
}

#[must_use]
pub fn sign_definitions(signs: &[SignConfig]) -> Vec<SignDefinition> {
    signs
        .iter()
        .map(|s| SignDefinition {
            name: s.name.clone(),
            text: s.text.clone(),
            texthl: s.texthl.clone(),
        })
        .collect()
}
