//! Config file round trips and how settings reach the server launch.

use serde_json::json;
use tsbridge_config::{
    BridgeConfig, EvictionPolicy, VAR_SERVER_OPTIONS, VAR_SERVER_PATH, persist_server_path_to,
};
use tsbridge_engine::server_settings;

#[test]
fn persisted_server_path_is_loaded_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "# local overrides\n[diagnostics]\neviction = \"on-buffer-close\"\n",
    )
    .unwrap();

    persist_server_path_to(&path, "/opt/ts/bin/tsserver").unwrap();

    let config = BridgeConfig::load_from(&path).unwrap();
    assert_eq!(config.server.path, "/opt/ts/bin/tsserver");
    assert_eq!(config.diagnostics.eviction, EvictionPolicy::OnBufferClose);
    assert!(
        std::fs::read_to_string(&path)
            .unwrap()
            .starts_with("# local overrides")
    );
}

#[test]
fn editor_variables_shape_the_launch_command() {
    let mut config: BridgeConfig = toml::from_str(
        r#"
        [server]
        path = "tsserver"
        request_timeout_ms = 0
        version = "2.3.4"
        locale = "ja"
        "#,
    )
    .unwrap();
    assert!(config.apply_var(VAR_SERVER_PATH, &json!("/usr/local/bin/tsserver")));
    assert!(config.apply_var(VAR_SERVER_OPTIONS, &json!(["--useSingleInferredProject"])));

    let settings = server_settings(&config.server);
    assert_eq!(settings.command.program, "/usr/local/bin/tsserver");
    assert_eq!(settings.command.args, vec!["--useSingleInferredProject"]);
    assert_eq!(settings.locale.as_deref(), Some("ja"));
    assert_eq!(settings.version.map(|v| v.to_string()).as_deref(), Some("2.3.4"));
    assert_eq!(settings.rpc.request_timeout, None);
}
