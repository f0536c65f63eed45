//! Bundle contexts: validity, properties, services and installs

mod common;

use bllvm_framework::framework::ServiceObject;
use bllvm_framework::{BundleId, BundleState, FrameworkConfig, FrameworkError, StartOptions, StopOptions};
use common::*;
use std::collections::BTreeMap;
use std::sync::Arc;

#[test]
fn test_context_is_invalid_after_stop() {
    let fixture = FrameworkFixture::new();
    fixture.script("ctx");
    let id = fixture.install(&with_activator(manifest("org.example.ctx", "1.0.0"), "ctx"));
    assert!(fixture.framework.bundle_context(id).is_none());

    fixture.framework.start(id, StartOptions::default()).unwrap();
    let context = fixture.framework.bundle_context(id).unwrap();
    assert!(context.is_valid());
    assert_eq!(context.bundle().unwrap().state, BundleState::Active);

    fixture.framework.stop(id, StopOptions::default()).unwrap();
    assert!(!context.is_valid());
    assert!(fixture.framework.bundle_context(id).is_none());
    assert!(matches!(context.bundles(), Err(FrameworkError::InvalidContext(_))));
    assert!(matches!(
        context.install("mem:late", Some(content(&manifest("org.example.late", "1.0.0")))),
        Err(FrameworkError::InvalidContext(_))
    ));

    // A new start hands out a fresh context
    fixture.framework.start(id, StartOptions::default()).unwrap();
    let fresh = fixture.framework.bundle_context(id).unwrap();
    assert!(fresh.is_valid());
    assert!(!Arc::ptr_eq(&context, &fresh));
}

#[test]
fn test_property_comes_from_config() {
    let mut config = FrameworkConfig::default();
    config
        .properties
        .insert("org.example.mode".to_string(), "production".to_string());
    let fixture = FrameworkFixture::with_config(config);

    let context = fixture.framework.system_context();
    assert_eq!(context.property("org.example.mode").unwrap().as_deref(), Some("production"));
    assert_eq!(context.property("org.example.missing").unwrap(), None);
}

#[test]
fn test_system_context_lives_until_shutdown() {
    let fixture = FrameworkFixture::new();
    let system = fixture.framework.system_context();
    assert_eq!(system.bundle_id(), BundleId::SYSTEM);
    assert!(Arc::ptr_eq(&system, &fixture.framework.bundle_context(BundleId::SYSTEM).unwrap()));

    let id = system
        .install("mem:via-system", Some(content(&manifest("org.example.via", "1.0.0"))))
        .unwrap();
    assert_eq!(system.get_bundle(id).unwrap().unwrap().symbolic_name, "org.example.via");

    fixture.framework.shutdown();
    assert!(!system.is_valid());
    assert!(matches!(system.bundles(), Err(FrameworkError::InvalidContext(_))));
}

#[test]
fn test_install_through_bundle_context() {
    let fixture = FrameworkFixture::new();
    let script = fixture.script("installer");
    let child = manifest("org.example.child", "1.0.0");
    let child_content = content(&child);
    script.set_on_start(move |ctx| {
        ctx.install("mem:child", Some(child_content.clone()))?;
        Ok(())
    });
    let parent = fixture.install(&with_activator(manifest("org.example.parent", "1.0.0"), "installer"));
    fixture.framework.start(parent, StartOptions::default()).unwrap();

    let child = fixture.framework.bundle_by_location("mem:child").unwrap();
    assert_eq!(child.symbolic_name, "org.example.child");
    assert_eq!(child.state, BundleState::Installed);
}

#[test]
fn test_services_are_visible_and_released() {
    let fixture = FrameworkFixture::new();
    let script = fixture.script("provider");
    script.set_on_start(|ctx| {
        let mut properties = BTreeMap::new();
        properties.insert("ranking".to_string(), "10".to_string());
        let object: ServiceObject = Arc::new(String::from("hello"));
        ctx.register_service("org.example.Greeter", properties, object)?;
        Ok(())
    });
    let id = fixture.install(&with_activator(manifest("org.example.provider", "1.0.0"), "provider"));
    fixture.framework.start(id, StartOptions::default()).unwrap();

    let system = fixture.framework.system_context();
    let references = system.service_references("org.example.Greeter").unwrap();
    assert_eq!(references.len(), 1);
    assert_eq!(references[0].bundle, id);
    assert_eq!(references[0].properties["ranking"], "10");
    let object = system.service(&references[0]).unwrap().unwrap();
    assert_eq!(object.downcast_ref::<String>().map(String::as_str), Some("hello"));

    fixture.framework.stop(id, StopOptions::default()).unwrap();
    assert!(system.service_references("org.example.Greeter").unwrap().is_empty());
    assert!(system.service(&references[0]).unwrap().is_none());
}

#[test]
fn test_registration_can_unregister_early() {
    let fixture = FrameworkFixture::new();
    let system = fixture.framework.system_context();
    let registration = system
        .register_service("org.example.Clock", BTreeMap::new(), Arc::new(42u64))
        .unwrap();
    assert_eq!(registration.reference().bundle, BundleId::SYSTEM);
    assert_eq!(fixture.framework.services().len(), 1);

    assert!(registration.unregister());
    assert!(!registration.unregister());
    assert!(fixture.framework.services().is_empty());
}

#[test]
fn test_context_drives_lifecycle_of_other_bundles() {
    let fixture = FrameworkFixture::new();
    let script = fixture.script("manager");
    let managed = fixture.install(&manifest("org.example.managed", "1.0.0"));
    script.set_on_start(move |ctx| {
        ctx.framework()?.start(managed, StartOptions::default())?;
        Ok(())
    });
    let id = fixture.install(&with_activator(manifest("org.example.manager", "1.0.0"), "manager"));
    fixture.framework.start(id, StartOptions::default()).unwrap();

    assert_eq!(fixture.framework.state(managed), Some(BundleState::Active));
}
