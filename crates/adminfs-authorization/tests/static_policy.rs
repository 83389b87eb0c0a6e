//! Gate behaviour against the configured static authority.

use adminfs_authorization::{AuthorizationGate, Decision, StaticAuthority};
use adminfs_core::{AdminConfig, CallerId};
use std::sync::Arc;

fn gate_from(config_text: &str) -> AuthorizationGate {
    let config = AdminConfig::from_toml(config_text).unwrap();
    config.validate().unwrap();
    AuthorizationGate::new(
        Arc::new(StaticAuthority::from_config(&config.authority)),
        config.action_id.as_str(),
    )
}

#[tokio::test]
async fn default_configuration_denies_everyone() {
    let gate = gate_from("");
    assert_eq!(gate.action_id(), "org.adminfs.commands");
    assert_eq!(gate.check(&CallerId::new(":1.42")).await, Decision::Denied);
}

#[tokio::test]
async fn allow_list_admits_only_listed_callers() {
    let gate = gate_from(
        r#"
        [authority]
        allow = [":1.42"]
        "#,
    );
    assert!(gate.require(&CallerId::new(":1.42")).await.is_ok());
    let err = gate.require(&CallerId::new(":1.43")).await.unwrap_err();
    assert!(err.is_access_denied());
}
