//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

pub fn r#false() -> bool {
    false
}

// ============================================================================
// [build] Section Defaults
// ============================================================================

pub mod build {
    use std::path::PathBuf;

    pub fn root() -> Option<PathBuf> {
        None
    }

    pub fn pages() -> PathBuf {
        "pages".into()
    }

    pub fn data() -> PathBuf {
        "data".into()
    }

    pub fn output() -> PathBuf {
        "public".into()
    }

    pub fn cache() -> PathBuf {
        ".inkwell-cache.json".into()
    }

    pub fn entry_file() -> String {
        "entry.js".into()
    }

    pub fn lib_dir() -> PathBuf {
        "lib".into()
    }
}

// ============================================================================
// [scripts] Section Defaults
// ============================================================================

pub mod scripts {
    use std::path::PathBuf;

    pub fn pre_generate() -> PathBuf {
        "hooks/pre-generate.rhai".into()
    }

    pub fn post_generate() -> PathBuf {
        "hooks/post-generate.rhai".into()
    }

    pub fn watchdog_ms() -> u64 {
        3000
    }

    pub fn max_operations() -> u64 {
        0
    }
}

// ============================================================================
// [watch] Section Defaults
// ============================================================================

pub mod watch {
    pub fn debounce_ms() -> u64 {
        300
    }
}
