//! Resolution through the framework: provider choice, failures, batches

mod common;

use bllvm_framework::framework::api::BundleEventKind;
use bllvm_framework::{BundleId, BundleState, FrameworkError, StartOptions};
use common::*;
use proptest::prelude::*;

fn xyz(fixture: &FrameworkFixture, order: &[&str]) -> (BundleId, BundleId) {
    let mut x = None;
    let mut z = None;
    for name in order {
        match *name {
            "x" => x = Some(fixture.install(&importing(manifest("org.example.x", "1.0.0"), "c", "0.0.0"))),
            "y" => {
                fixture.install(&exporting(manifest("org.example.y", "1.0.0"), "c", "1.0.0"));
            }
            "z" => z = Some(fixture.install(&exporting(manifest("org.example.z", "1.0.0"), "c", "2.0.0"))),
            _ => unreachable!(),
        }
    }
    (x.unwrap(), z.unwrap())
}

#[test]
fn test_highest_version_provider_is_chosen() {
    for order in [["x", "y", "z"], ["z", "y", "x"], ["y", "x", "z"]] {
        for _ in 0..3 {
            let fixture = FrameworkFixture::new();
            let (x, z) = xyz(&fixture, &order);
            let report = fixture.framework.resolve_bundles(None).unwrap();
            assert!(report.failed.is_empty());

            let wires = fixture.framework.wiring(x).unwrap();
            assert_eq!(wires.len(), 1);
            let z_revision = fixture.framework.bundle(z).unwrap().current_revision;
            assert_eq!(wires[0].exporter, z_revision);
        }
    }
}

#[test]
fn test_version_range_limits_providers() {
    let fixture = FrameworkFixture::new();
    let x = fixture.install(&importing(manifest("org.example.x", "1.0.0"), "c", "[1.0,2.0)"));
    let y = fixture.install(&exporting(manifest("org.example.y", "1.0.0"), "c", "1.5.0"));
    fixture.install(&exporting(manifest("org.example.z", "1.0.0"), "c", "2.0.0"));

    fixture.framework.start(x, StartOptions::default()).unwrap();
    let y_revision = fixture.framework.bundle(y).unwrap().current_revision;
    assert_eq!(fixture.framework.wiring(x).unwrap()[0].exporter, y_revision);
}

#[test]
fn test_transitive_resolution_on_start() {
    let fixture = FrameworkFixture::new();
    let a = fixture.install(&exporting(manifest("org.example.a", "1.0.0"), "pkg.a", "1.0.0"));
    let b = fixture.install(&exporting(
        importing(manifest("org.example.b", "1.0.0"), "pkg.a", "1.0"),
        "pkg.b",
        "1.0.0",
    ));
    let c = fixture.install(&importing(manifest("org.example.c", "1.0.0"), "pkg.b", "1.0"));

    fixture.framework.start(c, StartOptions::default()).unwrap();
    assert_eq!(fixture.framework.state(a), Some(BundleState::Resolved));
    assert_eq!(fixture.framework.state(b), Some(BundleState::Resolved));
    assert_eq!(fixture.framework.state(c), Some(BundleState::Active));
    assert_eq!(
        fixture.events.kinds_for(a),
        vec![BundleEventKind::Installed, BundleEventKind::Resolved]
    );
}

#[test]
fn test_failure_names_requirement_and_wires_nothing() {
    let fixture = FrameworkFixture::new();
    let provider = fixture.install(&exporting(manifest("org.example.p", "1.0.0"), "pkg.p", "1.0.0"));
    let needy = fixture.install(&importing(
        importing(manifest("org.example.needy", "1.0.0"), "pkg.p", "1.0"),
        "pkg.absent",
        "1.0",
    ));

    let err = fixture.framework.start(needy, StartOptions::default()).unwrap_err();
    let FrameworkError::Resolution(err) = err else {
        panic!("expected a resolution error");
    };
    assert_eq!(err.bundle, "org.example.needy:1.0.0");
    assert!(err.requirement.contains("pkg.absent"));
    assert!(!err.unsatisfied.is_empty());

    // No partial wiring of the failed revision
    assert!(fixture.framework.wiring(needy).unwrap().is_empty());
    assert_eq!(fixture.framework.state(needy), Some(BundleState::Installed));
    // The provider itself was resolvable and is marked so
    assert_eq!(fixture.framework.state(provider), Some(BundleState::Resolved));
}

#[test]
fn test_resolve_all_reports_failures() {
    let fixture = FrameworkFixture::new();
    let good = fixture.install(&manifest("org.example.good", "1.0.0"));
    let bad = fixture.install(&importing(manifest("org.example.bad", "1.0.0"), "pkg.none", "1.0"));

    let report = fixture.framework.resolve_bundles(None).unwrap();
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].bundle, "org.example.bad:1.0.0");
    assert_eq!(fixture.framework.state(good), Some(BundleState::Resolved));
    assert_eq!(fixture.framework.state(bad), Some(BundleState::Installed));

    // Re-resolving is a no-op
    let again = fixture.framework.resolve_bundles(Some(&[good])).unwrap();
    assert!(again.wires.is_empty());
    assert_eq!(fixture.framework.state(good), Some(BundleState::Resolved));
}

#[test]
fn test_optional_import_may_stay_unwired() {
    let fixture = FrameworkFixture::new();
    let mut bundle = manifest("org.example.opt", "1.0.0");
    bundle.imports.push(
        bllvm_framework::framework::Requirement::package(
            "pkg.maybe",
            bllvm_framework::framework::VersionRange::any(),
        )
        .optional(),
    );
    let id = fixture.install(&bundle);

    fixture.framework.start(id, StartOptions::default()).unwrap();
    assert!(fixture.framework.wiring(id).unwrap().is_empty());
}

#[test]
fn test_self_import_does_not_hold_revision() {
    let fixture = FrameworkFixture::new();
    let bundle = importing(
        exporting(manifest("org.example.selfish", "1.0.0"), "pkg.self", "1.0.0"),
        "pkg.self",
        "1.0",
    );
    let id = fixture.install(&bundle);
    fixture.framework.start(id, StartOptions::default()).unwrap();
    let wires = fixture.framework.wiring(id).unwrap();
    assert_eq!(wires.len(), 1);
    assert_eq!(wires[0].exporter, wires[0].importer);
    assert!(fixture.framework.dependents(id).unwrap().is_empty());

    let v2 = importing(
        exporting(manifest("org.example.selfish", "1.1.0"), "pkg.self", "1.1.0"),
        "pkg.self",
        "1.0",
    );
    fixture.framework.update(id, Some(content(&v2))).unwrap();
    let info = fixture.framework.bundle(id).unwrap();
    assert_eq!(info.current_revision, info.latest_revision);
    assert_eq!(info.state, BundleState::Active);
}

proptest! {
    #[test]
    fn test_provider_choice_is_deterministic(
        versions in prop::collection::vec((0u32..3, 0u32..3), 1..6),
    ) {
        let expected_index = {
            let best = versions.iter().max().copied();
            versions.iter().position(|v| Some(*v) == best)
        };

        let mut chosen = Vec::new();
        for _ in 0..2 {
            let fixture = FrameworkFixture::new();
            let mut providers = Vec::new();
            for (i, (major, minor)) in versions.iter().enumerate() {
                let name = format!("org.example.p{}", i);
                let version = format!("{}.{}.0", major, minor);
                providers.push(fixture.install(&exporting(manifest(&name, "1.0.0"), "pkg.c", &version)));
            }
            let consumer = fixture.install(&importing(manifest("org.example.consumer", "1.0.0"), "pkg.c", "0.0.0"));
            fixture.framework.start(consumer, StartOptions::default()).unwrap();

            let exporter = fixture.framework.wiring(consumer).unwrap()[0].exporter;
            let index = providers
                .iter()
                .position(|p| fixture.framework.bundle(*p).unwrap().current_revision == exporter);
            chosen.push(index);
        }

        prop_assert_eq!(chosen[0], expected_index);
        prop_assert_eq!(chosen[0], chosen[1]);
    }
}
