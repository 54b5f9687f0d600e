// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

fn user(roles: Value) -> anyhow::Result<AuthenticatedUser> {
    Ok(serde_json::from_value(json!({ "roles": roles }))?)
}

#[test]
fn string_roles_match_exactly() -> anyhow::Result<()> {
    let config = RolesConfig::default();
    assert!(config.is_admin(&user(json!(["user", "admin"]))?));
    assert!(!config.is_admin(&user(json!(["user"]))?));
    assert!(!config.is_admin(&user(json!(["administrators"]))?));
    Ok(())
}

#[test]
fn object_roles_use_property() -> anyhow::Result<()> {
    let config = RolesConfig { property: Some("name".into()), admin_role: "root".into() };
    assert!(config.is_admin(&user(json!([{ "name": "root" }]))?));
    assert!(!config.is_admin(&user(json!([{ "name": "admin" }]))?));
    assert!(!config.is_admin(&user(json!(["root"]))?));
    Ok(())
}

#[test]
fn no_roles_is_not_admin() -> anyhow::Result<()> {
    assert!(!RolesConfig::default().is_admin(&user(json!([]))?));
    assert!(!RolesConfig::default().is_admin(&AuthenticatedUser::default()));
    Ok(())
}

#[test]
fn roles_config_deserializes_with_defaults() -> anyhow::Result<()> {
    let config: RolesConfig = serde_json::from_value(json!({ "property": "name" }))?;
    assert_eq!(config.admin_role, "admin");
    assert_eq!(config.property.as_deref(), Some("name"));
    Ok(())
}
