#![no_main]
use bllvm_framework::framework::{Version, VersionRange};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(version) = text.parse::<Version>() {
        // Display output is canonical
        let again: Version = version.to_string().parse().expect("canonical version parses");
        assert_eq!(version, again);
    }

    if let Ok(range) = text.parse::<VersionRange>() {
        let again: VersionRange = range.to_string().parse().expect("canonical range parses");
        assert_eq!(range, again);
        let floor = Version::default();
        let _ = range.includes(&floor);
    }
});
