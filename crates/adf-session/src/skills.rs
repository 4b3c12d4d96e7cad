//! Skill discovery and loading.
//!
//! A skill is a directory holding a `SKILL.md` file: `---` frontmatter with
//! `name` and `description`, followed by markdown instructions. Loading is
//! two-level. [`SkillLoader::scan`] reads only the frontmatter of every
//! skill, cheap enough to list in a system prompt; [`SkillLoader::load`]
//! reads the full instructions of one skill on demand.
//!
//! Search paths are tried in order and the first skill with a given name
//! wins, so project skills shadow user skills.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

pub const SKILL_FILE: &str = "SKILL.md";

/// Frontmatter of one skill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkillMetadata {
    pub name: String,
    /// When to use the skill.
    pub description: String,
    /// Directory containing `SKILL.md` (and any scripts or references).
    pub skill_path: PathBuf,
}

impl SkillMetadata {
    /// `- **name**: description`
    pub fn to_prompt_line(&self) -> String {
        format!("- **{}**: {}", self.name, self.description)
    }
}

/// Full instructions of one skill.
#[derive(Debug, Clone, Serialize)]
pub struct SkillContent {
    pub metadata: SkillMetadata,
    /// `SKILL.md` body after the frontmatter, trimmed.
    pub instructions: String,
}

#[derive(Debug, Clone)]
pub struct SkillLoader {
    paths: Vec<PathBuf>,
}

impl SkillLoader {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    /// `{project_root}/.claude/skills`, then `~/.claude/skills`.
    pub fn default_paths(project_root: &Path) -> Vec<PathBuf> {
        let mut paths = vec![project_root.join(".claude").join("skills")];
        if let Some(home) = std::env::var_os("HOME").map(PathBuf::from) {
            paths.push(home.join(".claude").join("skills"));
        }
        paths
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Metadata of every discoverable skill. Missing search paths are
    /// skipped; so are skills without frontmatter or without a name.
    pub fn scan(&self) -> Vec<SkillMetadata> {
        let mut skills: Vec<SkillMetadata> = Vec::new();
        for base in &self.paths {
            let Ok(entries) = fs::read_dir(base) else {
                continue;
            };
            let mut dirs: Vec<PathBuf> = entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect();
            dirs.sort();

            for dir in dirs {
                let skill_md = dir.join(SKILL_FILE);
                let Ok(content) = fs::read_to_string(&skill_md) else {
                    continue;
                };
                let Some(meta) = parse_metadata(&content, &dir) else {
                    debug!("Skipping {}: no frontmatter name", skill_md.display());
                    continue;
                };
                if skills.iter().any(|s| s.name == meta.name) {
                    debug!(
                        "Skill {} at {} shadowed by an earlier path",
                        meta.name,
                        dir.display()
                    );
                    continue;
                }
                skills.push(meta);
            }
        }
        skills
    }

    /// Full instructions of the named skill, if it exists.
    pub fn load(&self, name: &str) -> Option<SkillContent> {
        let metadata = self.scan().into_iter().find(|s| s.name == name)?;
        let content = fs::read_to_string(metadata.skill_path.join(SKILL_FILE)).ok()?;
        let instructions = split_frontmatter(&content)
            .map_or(content.as_str(), |(_, body)| body)
            .trim()
            .to_string();
        Some(SkillContent {
            metadata,
            instructions,
        })
    }

    /// Prompt block listing all skills, or `None` when there are none.
    pub fn prompt_section(&self) -> Option<String> {
        let skills = self.scan();
        if skills.is_empty() {
            return None;
        }
        let lines: Vec<String> = skills.iter().map(SkillMetadata::to_prompt_line).collect();
        Some(format!(
            "## Available Skills\n\nLoad a skill with load_skill before following it.\n\n{}",
            lines.join("\n")
        ))
    }
}

/// Split `---` frontmatter from the body. `None` if there is none.
fn split_frontmatter(content: &str) -> Option<(&str, &str)> {
    let rest = content.strip_prefix("---")?;
    let rest = rest.trim_start_matches([' ', '\t', '\r']).strip_prefix('\n')?;
    // Closing delimiter on its own line; handles an empty block too.
    let (frontmatter, after) = if let Some(after) = rest.strip_prefix("---") {
        ("", after)
    } else {
        let close = rest.find("\n---")?;
        (rest.get(..close)?, rest.get(close + 4..)?)
    };
    let body = match after.find('\n') {
        Some(nl) => after.get(nl + 1..).unwrap_or_default(),
        None => "",
    };
    Some((frontmatter, body))
}

/// Minimal frontmatter parsing: `key: value` pairs, optionally quoted, with
/// `>` / `|` block values continued on indented lines.
fn parse_metadata(content: &str, dir: &Path) -> Option<SkillMetadata> {
    let (frontmatter, _) = split_frontmatter(content)?;
    let name = frontmatter_value(frontmatter, "name")?;
    if name.is_empty() {
        return None;
    }
    let description = frontmatter_value(frontmatter, "description").unwrap_or_default();
    Some(SkillMetadata {
        name,
        description,
        skill_path: dir.to_path_buf(),
    })
}

fn frontmatter_value(frontmatter: &str, key: &str) -> Option<String> {
    let mut lines = frontmatter.lines().peekable();
    while let Some(line) = lines.next() {
        if line.starts_with([' ', '\t']) {
            continue;
        }
        let Some((k, v)) = line.split_once(':') else {
            continue;
        };
        if k.trim() != key {
            continue;
        }
        let v = v.trim();
        if v.is_empty() || v.starts_with('>') || v.starts_with('|') {
            let mut parts = Vec::new();
            while let Some(next) = lines.peek() {
                if !next.starts_with([' ', '\t']) && !next.trim().is_empty() {
                    break;
                }
                let part = next.trim();
                if !part.is_empty() {
                    parts.push(part);
                }
                lines.next();
            }
            let sep = if v.starts_with('|') { "\n" } else { " " };
            return Some(parts.join(sep));
        }
        return Some(unquote(v).to_string());
    }
    None
}

fn unquote(v: &str) -> &str {
    for q in ['"', '\''] {
        if let Some(inner) = v.strip_prefix(q).and_then(|s| s.strip_suffix(q)) {
            return inner;
        }
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_skill(base: &Path, dir: &str, content: &str) {
        let dir = base.join(dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(SKILL_FILE), content).unwrap();
    }

    #[test]
    fn scan_reads_frontmatter() {
        let root = tempfile::tempdir().unwrap();
        write_skill(
            root.path(),
            "lineage",
            "---\nname: lineage\ndescription: Trace dataset lineage\n---\n# Lineage\nSteps.",
        );
        let loader = SkillLoader::new(vec![root.path().to_path_buf()]);
        let skills = loader.scan();
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].name, "lineage");
        assert_eq!(skills[0].description, "Trace dataset lineage");
        assert_eq!(skills[0].skill_path, root.path().join("lineage"));
        assert_eq!(
            skills[0].to_prompt_line(),
            "- **lineage**: Trace dataset lineage"
        );
    }

    #[test]
    fn first_path_wins_on_name_clash() {
        let project = tempfile::tempdir().unwrap();
        let user = tempfile::tempdir().unwrap();
        write_skill(project.path(), "a", "---\nname: shared\ndescription: project\n---\nP");
        write_skill(user.path(), "b", "---\nname: shared\ndescription: user\n---\nU");
        write_skill(user.path(), "c", "---\nname: only-user\ndescription: u\n---\nU");

        let loader = SkillLoader::new(vec![
            project.path().to_path_buf(),
            user.path().to_path_buf(),
        ]);
        let skills = loader.scan();
        assert_eq!(skills.len(), 2);
        let shared = skills.iter().find(|s| s.name == "shared").unwrap();
        assert_eq!(shared.description, "project");
        assert_eq!(loader.load("shared").unwrap().instructions, "P");
    }

    #[test]
    fn invalid_skills_are_skipped() {
        let root = tempfile::tempdir().unwrap();
        write_skill(root.path(), "no-frontmatter", "# Just markdown");
        write_skill(root.path(), "no-name", "---\ndescription: x\n---\nbody");
        fs::create_dir_all(root.path().join("no-file")).unwrap();
        let loader = SkillLoader::new(vec![
            root.path().to_path_buf(),
            root.path().join("missing"),
        ]);
        assert!(loader.scan().is_empty());
        assert!(loader.prompt_section().is_none());
    }

    #[test]
    fn load_strips_frontmatter_and_trims() {
        let root = tempfile::tempdir().unwrap();
        write_skill(
            root.path(),
            "s",
            "---\nname: \"quoted\"\ndescription: 'single'\n---\n\n# Title\n\nDo things.\n\n",
        );
        let loader = SkillLoader::new(vec![root.path().to_path_buf()]);
        let content = loader.load("quoted").unwrap();
        assert_eq!(content.metadata.description, "single");
        assert_eq!(content.instructions, "# Title\n\nDo things.");
        assert!(loader.load("missing").is_none());
    }

    #[test]
    fn folded_description() {
        let root = tempfile::tempdir().unwrap();
        write_skill(
            root.path(),
            "f",
            "---\nname: folded\ndescription: >\n  Use when tracing\n  linked services.\n---\nbody",
        );
        let loader = SkillLoader::new(vec![root.path().to_path_buf()]);
        assert_eq!(
            loader.scan()[0].description,
            "Use when tracing linked services."
        );
    }

    #[test]
    fn prompt_section_lists_skills() {
        let root = tempfile::tempdir().unwrap();
        write_skill(root.path(), "a", "---\nname: a\ndescription: first\n---\n");
        write_skill(root.path(), "b", "---\nname: b\ndescription: second\n---\n");
        let loader = SkillLoader::new(vec![root.path().to_path_buf()]);
        let section = loader.prompt_section().unwrap();
        assert!(section.ends_with("- **a**: first\n- **b**: second"));
    }

    #[test]
    fn default_paths_put_project_first() {
        let paths = SkillLoader::default_paths(Path::new("/proj"));
        assert_eq!(paths[0], PathBuf::from("/proj/.claude/skills"));
    }
}
