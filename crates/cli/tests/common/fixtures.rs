//! Test project generators for integration tests
//!
//! Projects are generated at runtime with deterministic content (seeded
//! ChaCha8) so every run sees the same tree.

use anyhow::{Context, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

/// Test project sizes for different test scenarios
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectSize {
    /// 5 files, 1 directory (quick sanity checks)
    Tiny,
    /// 20 files, 3 directories
    Small,
    /// 100 files, 8 directories
    Medium,
}

impl ProjectSize {
    pub fn file_count(&self) -> usize {
        match self {
            ProjectSize::Tiny => 5,
            ProjectSize::Small => 20,
            ProjectSize::Medium => 100,
        }
    }

    pub fn dir_count(&self) -> usize {
        match self {
            ProjectSize::Tiny => 1,
            ProjectSize::Small => 3,
            ProjectSize::Medium => 8,
        }
    }
}

/// Project template configuration
#[derive(Debug, Clone)]
pub struct ProjectTemplate {
    pub size: ProjectSize,
    /// Add a few binary files
    pub include_binary: bool,
    /// Add content the default exclusion patterns cover
    /// (`node_modules/`, `*.log`, `.env`, `__pycache__/`)
    pub include_excluded: bool,
    pub seed: u64,
}

impl ProjectTemplate {
    pub fn rust_project(size: ProjectSize) -> Self {
        Self {
            size,
            include_binary: false,
            include_excluded: false,
            seed: 42,
        }
    }

    /// A project mixing code, binaries and excluded content
    pub fn mixed_project(size: ProjectSize) -> Self {
        Self {
            size,
            include_binary: true,
            include_excluded: true,
            seed: 7,
        }
    }
}

/// Test project with automatic cleanup
pub struct TestProject {
    root: PathBuf,
    template: ProjectTemplate,
    pub files: Vec<PathBuf>,
    _temp_dir: TempDir,
}

impl TestProject {
    pub fn new(template: ProjectTemplate) -> Result<Self> {
        let temp_dir = TempDir::new().context("Failed to create temp directory")?;
        let root = temp_dir.path().canonicalize()?;
        let files = generate_project(&root, &template)?;

        Ok(Self {
            root,
            template,
            files,
            _temp_dir: temp_dir,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Absolute path of a project-relative file
    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    pub fn read(&self, rel: &str) -> Result<String> {
        fs::read_to_string(self.root.join(rel)).with_context(|| format!("Failed to read {}", rel))
    }

    /// Overwrite (or create) files with new content
    pub fn modify_files(&mut self, paths: &[&str], content: &str) -> Result<()> {
        for path in paths {
            let full_path = self.root.join(path);
            if let Some(parent) = full_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&full_path, content).with_context(|| format!("Failed to modify file: {}", path))?;
            if !self.files.contains(&full_path) {
                self.files.push(full_path);
            }
        }
        Ok(())
    }

    /// Add new generated files at the project root
    pub fn add_files(&mut self, count: usize) -> Result<Vec<PathBuf>> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.template.seed.wrapping_add(self.files.len() as u64));
        let mut new_files = Vec::new();

        for i in 0..count {
            let file_path = self.root.join(format!("added_file_{}.rs", i));
            fs::write(&file_path, generate_rust_code(1024, &mut rng))?;
            new_files.push(file_path.clone());
            self.files.push(file_path);
        }

        Ok(new_files)
    }

    pub fn delete_files(&mut self, paths: &[&str]) -> Result<()> {
        for path in paths {
            let full_path = self.root.join(path);
            if full_path.exists() {
                fs::remove_file(&full_path).with_context(|| format!("Failed to delete file: {}", path))?;
                self.files.retain(|f| f != &full_path);
            }
        }
        Ok(())
    }

    /// Every regular file under the root (outside `.git`), keyed by relative path
    pub fn state(&self) -> Result<BTreeMap<String, Vec<u8>>> {
        let mut state = BTreeMap::new();
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.file_name() != ".git");
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&self.root)?
                .to_string_lossy()
                .replace('\\', "/");
            state.insert(rel, fs::read(entry.path())?);
        }
        Ok(state)
    }
}

/// Generate a project from template
fn generate_project(root: &Path, template: &ProjectTemplate) -> Result<Vec<PathBuf>> {
    let mut rng = ChaCha8Rng::seed_from_u64(template.seed);
    let directories = generate_directories(root, template.size)?;
    let mut files = Vec::new();

    let binary_count = if template.include_binary { 2 } else { 0 };
    let text_count = template.size.file_count() / 4;
    let code_count = template.size.file_count() - text_count - binary_count;

    for i in 0..code_count {
        let dir = &directories[rng.gen_range(0..directories.len())];
        let (ext, content) = if rng.gen_bool(0.5) {
            ("rs", generate_rust_code(rng.gen_range(256..2048), &mut rng))
        } else {
            ("py", generate_python_code(rng.gen_range(256..2048), &mut rng))
        };
        let path = dir.join(format!("file_{}.{}", i, ext));
        fs::write(&path, content)?;
        files.push(path);
    }

    for i in 0..text_count {
        let dir = &directories[rng.gen_range(0..directories.len())];
        let path = dir.join(format!("doc_{}.md", i));
        fs::write(&path, generate_markdown(rng.gen_range(128..1024), &mut rng))?;
        files.push(path);
    }

    for i in 0..binary_count {
        let path = root.join(format!("asset_{}.bin", i));
        let mut data = vec![0u8; 2048];
        rng.fill(&mut data[..]);
        fs::write(&path, data)?;
        files.push(path);
    }

    if template.include_excluded {
        generate_excluded(root)?;
    }

    Ok(files)
}

fn generate_directories(root: &Path, size: ProjectSize) -> Result<Vec<PathBuf>> {
    const NAMES: [&str; 8] = ["src", "tests", "docs", "scripts", "lib", "data", "src/util", "src/model"];

    let mut directories = vec![root.to_path_buf()];
    for name in NAMES.iter().take(size.dir_count()) {
        let dir = root.join(name);
        fs::create_dir_all(&dir)?;
        directories.push(dir);
    }
    Ok(directories)
}

/// Content the default exclusion patterns must keep out of checkpoints
fn generate_excluded(root: &Path) -> Result<()> {
    let modules = root.join("node_modules").join("left-pad");
    fs::create_dir_all(&modules)?;
    fs::write(modules.join("index.js"), "module.exports = s => s;\n")?;

    let cache = root.join("src").join("__pycache__");
    fs::create_dir_all(&cache)?;
    fs::write(cache.join("mod.cpython-311.pyc"), [0x42u8, 0x0d, 0x0d, 0x0a])?;

    fs::write(root.join("debug.log"), "started\n")?;
    fs::write(root.join(".env"), "SECRET=hunter2\n")?;
    Ok(())
}

fn generate_rust_code(size: usize, rng: &mut ChaCha8Rng) -> Vec<u8> {
    let snippets = [
        "use std::collections::HashMap;\n",
        "fn process(input: &str) -> String { input.to_uppercase() }\n",
        "pub struct Data { field: String }\n",
        "impl Default for Data { fn default() -> Self { Self { field: String::new() } } }\n",
        "#[derive(Debug, Clone)]\npub enum State { Idle, Busy(u32) }\n",
        "const LIMIT: usize = 1024;\n",
    ];
    fill_from(&snippets, size, rng)
}

fn generate_python_code(size: usize, rng: &mut ChaCha8Rng) -> Vec<u8> {
    let snippets = [
        "import os\n",
        "def process(value):\n    return value * 2\n",
        "class Handler:\n    def __init__(self):\n        self.items = []\n",
        "LIMIT = 1024\n",
    ];
    fill_from(&snippets, size, rng)
}

fn generate_markdown(size: usize, rng: &mut ChaCha8Rng) -> Vec<u8> {
    let snippets = [
        "# Notes\n\n",
        "Lorem ipsum dolor sit amet, consectetur adipiscing elit.\n",
        "- item one\n- item two\n",
        "```\ncargo run\n```\n",
    ];
    fill_from(&snippets, size, rng)
}

fn fill_from(snippets: &[&str], size: usize, rng: &mut ChaCha8Rng) -> Vec<u8> {
    let mut content = Vec::with_capacity(size + 128);
    while content.len() < size {
        content.extend_from_slice(snippets[rng.gen_range(0..snippets.len())].as_bytes());
    }
    content
}
