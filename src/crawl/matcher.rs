use std::path::Path;

const VEX_FILE_NAMES: [&str; 2] = ["openvex.json", "vex.json"];
const VEX_FILE_SUFFIXES: [&str; 2] = [".openvex.json", ".vex.json"];

/// Reports whether a file name looks like a published VEX document.
///
/// Matching is case-sensitive and only looks at the base name. Callers are
/// expected to have filtered out directories.
pub fn is_vex_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    VEX_FILE_NAMES.contains(&name) || VEX_FILE_SUFFIXES.iter().any(|s| name.ends_with(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_known_names() {
        for name in [
            "openvex.json",
            "vex.json",
            "trivy.openvex.json",
            "CVE-2024-1234.vex.json",
            "nested/dir/vex.json",
        ] {
            assert!(is_vex_file(Path::new(name)), "{name} should match");
        }
    }

    #[test]
    fn test_rejects_other_names() {
        for name in [
            "VEX.json",
            "OpenVEX.json",
            "a.VEX.json",
            "vex.jsonl",
            "vex.json.bak",
            "myvex.json",
            "openvex.yaml",
            "package.json",
            "vex.json/other.txt",
            "",
        ] {
            assert!(!is_vex_file(Path::new(name)), "{name} should not match");
        }
    }
}
