// SPDX-License-Identifier: MIT

pub const PROJECT_CONFIG_FILE: &str = "funcship.toml";

/// Per-function descriptor defaults supplied by the project file. Any
/// field may be overridden on the command line.
#[derive(Debug, Clone, Default, serde::Deserialize, serde::Serialize)]
pub struct FunctionDefaults {
    pub handler: Option<String>,
    pub role: Option<String>,
    pub runtime: Option<String>,
    pub memory_size: Option<u32>,
    pub timeout: Option<u32>,
    pub description: Option<String>,
}

/// Project-level defaults read from `funcship.toml` at the project root.
#[derive(Debug, Clone, Default, serde::Deserialize, serde::Serialize)]
pub struct ProjectConfig {
    pub region: Option<String>,
    pub profile: Option<String>,
    pub qualifier: Option<String>,
    /// Relative paths are resolved against the project root.
    pub virtual_env: Option<String>,
    pub libraries: Option<Vec<String>>,
    #[serde(default)]
    pub functions: std::collections::HashMap<String, FunctionDefaults>,
}

impl ProjectConfig {
    /// `Ok(None)` when the project carries no configuration file.
    pub fn load(project_root: &std::path::Path) -> anyhow::Result<Option<Self>> {
        let path = project_root.join(PROJECT_CONFIG_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let conf: Self = toml::from_str(&std::fs::read_to_string(&path)?)
            .map_err(|err| anyhow::anyhow!("cannot parse {}: {}", path.display(), err))?;
        Ok(Some(conf))
    }
}

pub fn default_conf() -> String {
    String::from(
        r##"#region = "eu-west-1"
#profile = "default"
#qualifier = "dev"
#virtual_env = ".venv"
#libraries = ["shared"]

#[functions.my-function]
#handler = "handler.handle"
#role = "arn:aws:iam::123456789012:role/lambda-exec"
#runtime = "python3.12"
#memory_size = 256
#timeout = 30
#description = "Example function"
"##,
    )
}
