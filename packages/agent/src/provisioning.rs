// ABOUTME: Convergence predicate and monotone merge for discovery
// ABOUTME: Provisioning only ever grows, so the rebuild loop cannot oscillate

use bridgekit_core::{AnalyzedSkill, BridgeAnalysis, Provisioning, SkillRepo};

/// Packages every rebuilt bridge carries regardless of analysis
pub const ALWAYS_INSTALLED: &[&str] = &["git"];

/// True when the current provisioning lacks something the analysis requires
pub fn check_provisioning_needs(
    current: &Provisioning,
    analysis: &BridgeAnalysis,
    required_base_image: &str,
) -> bool {
    if current.base_image != required_base_image {
        return true;
    }

    let missing_package = required_packages(analysis).any(|p| !current.has_package(p));
    let missing_skill = analysis
        .skill_repos
        .iter()
        .any(|skill| !current.has_skill(&skill.name));

    missing_package || missing_skill
}

/// Union of the current provisioning and everything the analysis asks for
///
/// Nothing already present is removed or reordered. Secrets carry over unchanged.
pub fn calculate_new_provisioning(
    current: &Provisioning,
    analysis: &BridgeAnalysis,
    required_base_image: &str,
) -> Provisioning {
    let mut next = current.clone();
    next.base_image = required_base_image.to_string();

    let additions = ALWAYS_INSTALLED
        .iter()
        .copied()
        .chain(required_packages(analysis));
    for package in additions {
        if !next.has_package(package) {
            next.apt_packages.push(package.to_string());
        }
    }

    for skill in &analysis.skill_repos {
        if !next.has_skill(&skill.name) {
            next.skill_repos.push(to_skill_repo(skill));
        }
    }

    next
}

/// Expand a GitHub `owner/repo` shorthand into a clone URL
pub fn resolve_skill_url(git_repo: &str) -> String {
    let trimmed = git_repo.trim();
    let is_url = trimmed.contains("://") || trimmed.starts_with("git@");
    let parts: Vec<&str> = trimmed.split('/').collect();

    if !is_url && parts.len() == 2 && parts.iter().all(|p| !p.is_empty()) {
        let repo = parts[1].trim_end_matches(".git");
        format!("https://github.com/{}/{}.git", parts[0], repo)
    } else {
        trimmed.to_string()
    }
}

fn to_skill_repo(skill: &AnalyzedSkill) -> SkillRepo {
    SkillRepo {
        name: skill.name.clone(),
        git_repo: resolve_skill_url(&skill.git_repo),
        container_path: skill.container_path.clone(),
        setup_commands: skill.setup_commands.clone(),
    }
}

/// Packages the analysis needs, including those its skills need
fn required_packages(analysis: &BridgeAnalysis) -> impl Iterator<Item = &str> {
    analysis
        .apt_packages
        .iter()
        .chain(analysis.skill_repos.iter().flat_map(|s| s.apt_packages.iter()))
        .map(String::as_str)
        .filter(|p| !p.trim().is_empty())
}
