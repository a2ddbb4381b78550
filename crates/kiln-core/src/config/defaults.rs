//! Default configuration values

use crate::platform::Os;

use super::types::Toolchain;

/// Default build file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "kiln.toml";

/// Default build file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "kiln.yaml";

/// Get list of build file names to search for, in priority order
pub fn config_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_CONFIG_TOML,
        DEFAULT_CONFIG_YAML,
        ".kiln.toml",
        ".kiln.yaml",
    ]
}

/// Compiler and linker defaults for an OS
pub fn default_toolchain(os: Os) -> Toolchain {
    let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

    match os {
        Os::Linux => Toolchain {
            cpp: strings(&["g++", "-std=c++17", "-Wall", "-Werror", "-g"]),
            cpp_flags: Vec::new(),
            link: strings(&["g++", "-std=c++17", "-Wall", "-Werror", "-g"]),
            link_libs: Vec::new(),
            obj_prefix: "objs/".to_string(),
            obj_suffix: ".o".to_string(),
            exe_suffix: String::new(),
        },
        Os::MacOs => Toolchain {
            cpp: strings(&["clang++", "-std=c++17", "-Wall", "-Werror", "-g"]),
            cpp_flags: Vec::new(),
            link: strings(&["clang++", "-std=c++17", "-Wall", "-Werror", "-g"]),
            link_libs: Vec::new(),
            obj_prefix: "objs/".to_string(),
            obj_suffix: ".o".to_string(),
            exe_suffix: String::new(),
        },
        Os::Windows => Toolchain {
            cpp: strings(&[
                "cl.exe", "/nologo", "/EHsc", "/Z7", "/std:c++17", "/W4", "/WX", "/MD",
            ]),
            cpp_flags: Vec::new(),
            link: strings(&[
                "link.exe",
                "/nologo",
                "/SUBSYSTEM:CONSOLE",
                "/DEBUG:FASTLINK",
                "/INCREMENTAL:NO",
            ]),
            link_libs: Vec::new(),
            obj_prefix: "objs/".to_string(),
            obj_suffix: ".obj".to_string(),
            exe_suffix: ".exe".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_searched_first() {
        assert_eq!(config_file_names()[0], "kiln.toml");
    }

    #[test]
    fn test_windows_suffixes() {
        let toolchain = default_toolchain(Os::Windows);
        assert_eq!(toolchain.obj_suffix, ".obj");
        assert_eq!(toolchain.exe_suffix, ".exe");
        assert_eq!(toolchain.cpp[0], "cl.exe");
    }

    #[test]
    fn test_unix_compilers() {
        assert_eq!(default_toolchain(Os::Linux).cpp[0], "g++");
        assert_eq!(default_toolchain(Os::MacOs).cpp[0], "clang++");
        assert_eq!(default_toolchain(Os::MacOs).exe_suffix, "");
    }
}
