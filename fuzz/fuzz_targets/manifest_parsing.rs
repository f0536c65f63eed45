#![no_main]
use bllvm_framework::framework::BundleManifest;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bundle content must parse or fail with an error, never panic
    let Ok(manifest) = BundleManifest::from_bytes(data) else {
        return;
    };
    let _metadata = manifest.to_metadata();

    // Whatever parsed must serialize and parse back
    if let Ok(text) = manifest.to_toml_string() {
        let reparsed = BundleManifest::from_bytes(text.as_bytes());
        assert!(reparsed.is_ok(), "re-parse failed for {:?}", text);
    }
});
