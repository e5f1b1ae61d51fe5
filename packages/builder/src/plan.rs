// ABOUTME: Ordered build steps for one bridge image and their Dockerfile rendering
// ABOUTME: Cacheable steps come first; secrets and the repo clone are applied to the running container

use bridgekit_config::constants::{
    BRIDGE_INSTALL_ROOT, BRIDGE_PORT, BRIDGE_TRANSPORT, BRIDGE_WORKSPACE, GITHUB_TOKEN,
};
use crate::error::{BuildError, Result};
use bridgekit_config::TransportKind;
use bridgekit_core::{Provisioning, Secret, SkillRepo};
pub use bridgekit_core::WORKSPACE_DIR;
use std::io;
use std::path::Path;

/// Root skill repositories are installed under
pub const INSTALL_ROOT: &str = "/opt/skills";

/// Where the package cache volume is mounted at run time
pub const CACHE_DIR: &str = "/root/.cache";

/// Server binary location inside the image
pub const SERVER_PATH: &str = "/opt/bridgekit/bridgekit-server";

/// Server binary file name inside the build context
const SERVER_CONTEXT_NAME: &str = "bridgekit-server";

/// Always installed so skill and repo clones work
const REQUIRED_PACKAGES: &[&str] = &["ca-certificates", "git"];

#[derive(Debug, Clone, PartialEq)]
pub enum BuildStep {
    BaseImage(String),
    /// One batched install of every package
    AptInstall(Vec<String>),
    CloneSkill(SkillRepo),
    Run(String),
    CacheVolume,
    ServerCode,
    SecretEnv(String),
    CloneRepo { url: String, authenticated: bool },
    Expose { port: u16, transport: TransportKind },
    Entrypoint,
}

impl BuildStep {
    /// Steps that depend only on packages and setup, never on secrets or the repo
    pub fn is_cacheable(&self) -> bool {
        matches!(
            self,
            BuildStep::BaseImage(_)
                | BuildStep::AptInstall(_)
                | BuildStep::CloneSkill(_)
                | BuildStep::Run(_)
                | BuildStep::CacheVolume
                | BuildStep::ServerCode
        )
    }

    /// Steps applied to the created container rather than baked into the image
    ///
    /// Secret values therefore never reach the image or its build output.
    pub fn is_runtime(&self) -> bool {
        matches!(self, BuildStep::SecretEnv(_) | BuildStep::CloneRepo { .. })
    }
}

/// Build plan for one bridge
#[derive(Debug, Clone)]
pub struct BuildPlan {
    id: String,
    port: u16,
    base_image: String,
    steps: Vec<BuildStep>,
    secrets: Vec<Secret>,
    has_repo: bool,
}

impl BuildPlan {
    pub fn new(
        id: &str,
        repo_url: &str,
        provisioning: &Provisioning,
        port: u16,
        transport: TransportKind,
    ) -> Result<Self> {
        if let Some(secret) = provisioning
            .secrets
            .iter()
            .find(|s| !Secret::is_valid_name(&s.name))
        {
            return Err(BuildError::Configuration(format!(
                "Invalid secret name {:?}: expected [A-Za-z_][A-Za-z0-9_]*",
                secret.name
            )));
        }

        let mut steps = vec![BuildStep::BaseImage(provisioning.base_image.clone())];

        let mut packages: Vec<String> = provisioning
            .apt_packages
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .chain(REQUIRED_PACKAGES.iter().map(|p| p.to_string()))
            .collect();
        packages.sort();
        packages.dedup();
        steps.push(BuildStep::AptInstall(packages));

        for skill in &provisioning.skill_repos {
            steps.push(BuildStep::CloneSkill(skill.clone()));
        }
        for command in &provisioning.setup_commands {
            steps.push(BuildStep::Run(command.clone()));
        }

        steps.push(BuildStep::CacheVolume);
        steps.push(BuildStep::ServerCode);

        for secret in &provisioning.secrets {
            steps.push(BuildStep::SecretEnv(secret.name.clone()));
        }

        let repo_url = repo_url.trim();
        let has_repo = !repo_url.is_empty();
        if has_repo {
            let authenticated = provisioning.secrets.iter().any(|s| s.name == GITHUB_TOKEN)
                && repo_url.starts_with("https://github.com/");
            steps.push(BuildStep::CloneRepo {
                url: repo_url.to_string(),
                authenticated,
            });
        }

        steps.push(BuildStep::Expose { port, transport });
        steps.push(BuildStep::Entrypoint);

        Ok(Self {
            id: id.to_string(),
            port,
            base_image: provisioning.base_image.clone(),
            steps,
            secrets: provisioning.secrets.clone(),
            has_repo,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn base_image(&self) -> &str {
        &self.base_image
    }

    pub fn steps(&self) -> &[BuildStep] {
        &self.steps
    }

    pub fn image_tag(&self) -> String {
        image_tag(&self.id)
    }

    pub fn container_name(&self) -> String {
        container_name(&self.id)
    }

    /// No-op command run in the started container to surface misconfiguration early
    pub fn validation_command(&self) -> Vec<String> {
        if self.has_repo {
            vec![SERVER_PATH.to_string(), "--check".to_string()]
        } else {
            vec!["test".to_string(), "-x".to_string(), SERVER_PATH.to_string()]
        }
    }

    /// `NAME=value` pairs set on the container at create time
    pub fn runtime_env(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter_map(|step| match step {
                BuildStep::SecretEnv(name) => self
                    .secrets
                    .iter()
                    .find(|s| &s.name == name)
                    .map(|s| format!("{}={}", s.name, s.value)),
                _ => None,
            })
            .collect()
    }

    /// Command cloning the target repository inside the started container
    ///
    /// The token is expanded by the container's shell from its environment, so the
    /// command line itself carries no secret.
    pub fn clone_command(&self) -> Option<Vec<String>> {
        self.steps.iter().find_map(|step| match step {
            BuildStep::CloneRepo { url, authenticated } => {
                let source = if *authenticated {
                    let rest = url.trim_start_matches("https://");
                    format!(
                        "\"https://x-access-token:${{{}}}@{}\"",
                        GITHUB_TOKEN,
                        escape_env_value(rest)
                    )
                } else {
                    shell_quote(url)
                };
                let script = format!(
                    "mkdir -p {ws} && GIT_TERMINAL_PROMPT=0 git clone --depth 1 {} {ws}",
                    source,
                    ws = WORKSPACE_DIR
                );
                Some(vec!["sh".to_string(), "-c".to_string(), script])
            }
            _ => None,
        })
    }

    /// Every non-empty secret value, for scrubbing forwarded output
    pub fn secret_values(&self) -> Vec<String> {
        self.secrets
            .iter()
            .filter(|s| !s.value.is_empty())
            .map(|s| s.value.clone())
            .collect()
    }

    pub fn to_dockerfile(&self) -> String {
        let lines: Vec<String> = self.steps.iter().filter_map(render).collect();
        let mut dockerfile = lines.join("\n");
        dockerfile.push('\n');
        dockerfile
    }
}

/// Dockerfile lines for an image step; runtime steps render nothing
fn render(step: &BuildStep) -> Option<String> {
    let line = match step {
        BuildStep::BaseImage(image) => format!(
            "FROM {}\nENV DEBIAN_FRONTEND=noninteractive\nSHELL [\"/bin/sh\", \"-c\"]",
            image
        ),
        BuildStep::AptInstall(packages) => format!(
            "RUN apt-get update && apt-get install -y --no-install-recommends {} && rm -rf /var/lib/apt/lists/*",
            packages.join(" ")
        ),
        BuildStep::CloneSkill(skill) => {
            let mut line = format!(
                "RUN git clone --depth 1 {} {}",
                shell_quote(&skill.git_repo),
                shell_quote(&skill.container_path)
            );
            for command in &skill.setup_commands {
                line.push_str(&format!(
                    "\nRUN cd {} && {}",
                    shell_quote(&skill.container_path),
                    command
                ));
            }
            line
        }
        BuildStep::Run(command) => format!("RUN {}", command),
        BuildStep::CacheVolume => format!(
            "ENV XDG_CACHE_HOME={dir} PIP_CACHE_DIR={dir}/pip npm_config_cache={dir}/npm CARGO_HOME={dir}/cargo",
            dir = CACHE_DIR
        ),
        BuildStep::ServerCode => format!("COPY {} {}", SERVER_CONTEXT_NAME, SERVER_PATH),
        BuildStep::SecretEnv(_) | BuildStep::CloneRepo { .. } => return None,
        BuildStep::Expose { port, transport } => format!(
            "ENV {}={} {}={} {}={} {}={}\nEXPOSE {}\nWORKDIR {}",
            BRIDGE_PORT,
            port,
            BRIDGE_WORKSPACE,
            WORKSPACE_DIR,
            BRIDGE_INSTALL_ROOT,
            INSTALL_ROOT,
            BRIDGE_TRANSPORT,
            transport,
            port,
            WORKSPACE_DIR
        ),
        BuildStep::Entrypoint => format!("ENTRYPOINT [\"{}\"]", SERVER_PATH),
    };
    Some(line)
}

/// Tar build context holding the Dockerfile and the server binary
pub fn build_context(dockerfile: &str, server_binary: &Path) -> io::Result<Vec<u8>> {
    let binary = std::fs::read(server_binary)?;

    let mut archive = tar::Builder::new(Vec::new());

    let mut header = tar::Header::new_gnu();
    header.set_size(dockerfile.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    archive.append_data(&mut header, "Dockerfile", dockerfile.as_bytes())?;

    let mut header = tar::Header::new_gnu();
    header.set_size(binary.len() as u64);
    header.set_mode(0o755);
    header.set_cksum();
    archive.append_data(&mut header, SERVER_CONTEXT_NAME, binary.as_slice())?;

    archive.into_inner()
}

/// Image tag of the bridge with the given id
pub fn image_tag(id: &str) -> String {
    format!("bridgekit/{}:latest", sanitize(id))
}

/// Container name of the bridge with the given id
pub fn container_name(id: &str) -> String {
    format!("bridgekit-{}", sanitize(id))
}

/// Docker names allow lowercase alphanumerics plus `_.-`
fn sanitize(id: &str) -> String {
    let cleaned: String = id
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches(|c| c == '-' || c == '.');
    if trimmed.is_empty() {
        "bridge".to_string()
    } else {
        trimmed.to_string()
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

fn escape_env_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('$', "\\$")
        .replace('`', "\\`")
        .replace('\n', "\\n")
}
