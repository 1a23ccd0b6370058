//! Module path resolution for `import`.

use std::path::PathBuf;

/// Resolve an import spec to a path: the literal spelling first, then with
/// a `.ry` extension, relative to the current working directory. Found
/// paths are canonicalized; the absolute path is the module cache key, so
/// two spellings of one file import it once. When nothing exists the
/// literal path comes back unchanged and the VM's file-open error carries
/// the user's spelling.
pub fn find_module_path(spec: &str) -> PathBuf {
    let direct = PathBuf::from(spec);
    if direct.is_file() {
        return direct.canonicalize().unwrap_or(direct);
    }

    let with_extension = PathBuf::from(format!("{}.ry", spec));
    if with_extension.is_file() {
        return with_extension.canonicalize().unwrap_or(with_extension);
    }

    direct
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_paths_come_back_verbatim() {
        assert_eq!(
            find_module_path("no/such/module"),
            PathBuf::from("no/such/module")
        );
    }

    #[test]
    fn extension_is_appended_when_needed() {
        let dir = std::env::temp_dir().join("ry_modules_test");
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("helper.ry");
        std::fs::write(&file, "var x = 1").unwrap();

        let spec = dir.join("helper");
        let resolved = find_module_path(spec.to_str().unwrap());
        assert_eq!(resolved, file.canonicalize().unwrap());

        std::fs::remove_file(&file).ok();
    }
}
