// ABOUTME: In-memory container engine for tests
// ABOUTME: Interprets a handful of shell builtins against a fake per-container filesystem

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Read;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::bridge::{join_container_path, split_container_path};
use crate::providers::{
    ContainerInfo, ContainerSpec, ContainerStatus, ExecRequest, ExecResult, Provider,
    ProviderCapabilities, ProviderError, Result,
};

const DEFAULT_DIRS: &[&str] = &["/", "/root", "/tmp", "/work", "/workspace"];

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub id: String,
    pub name: String,
    pub spec: ContainerSpec,
    pub status: ContainerStatus,
    pub files: BTreeMap<String, String>,
    pub dirs: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct ExecRecord {
    pub container: String,
    pub argv: Vec<String>,
    pub working_dir: Option<String>,
    pub env_vars: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct BuildRecord {
    pub tag: String,
    pub dockerfile: String,
    pub files: Vec<String>,
}

#[derive(Default)]
struct Engine {
    containers: Vec<FakeContainer>,
    next_id: u64,
    responses: HashMap<String, ExecResult>,
    executed: Vec<ExecRecord>,
    builds: Vec<BuildRecord>,
    copies: usize,
}

impl Engine {
    fn find(&self, key: &str) -> Option<&FakeContainer> {
        self.containers.iter().find(|c| c.id == key || c.name == key)
    }

    fn find_mut(&mut self, key: &str) -> Result<&mut FakeContainer> {
        self.containers
            .iter_mut()
            .find(|c| c.id == key || c.name == key)
            .ok_or_else(|| ProviderError::NotFound(key.to_string()))
    }
}

/// Container engine double backed by plain maps.
///
/// Understands `echo`, `exit N`, `pwd`, `cat`, `mkdir`, `true` and `false`;
/// anything else exits 127 unless a canned response was registered with
/// [`FakeProvider::respond_to`].
pub struct FakeProvider {
    engine: Mutex<Engine>,
    direct_write: bool,
    image_build: bool,
    start_status: ContainerStatus,
    build_failure: Option<String>,
    available: bool,
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            engine: Mutex::new(Engine::default()),
            direct_write: false,
            image_build: true,
            start_status: ContainerStatus::Running,
            build_failure: None,
            available: true,
        }
    }

    /// Advertise and support direct file writes
    pub fn with_direct_write(mut self) -> Self {
        self.direct_write = true;
        self
    }

    /// Advertise an engine that cannot build images
    pub fn without_image_build(mut self) -> Self {
        self.image_build = false;
        self
    }

    /// Status a container lands in once started
    pub fn start_into(mut self, status: ContainerStatus) -> Self {
        self.start_status = status;
        self
    }

    pub fn fail_builds(mut self, message: impl Into<String>) -> Self {
        self.build_failure = Some(message.into());
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    fn engine(&self) -> MutexGuard<'_, Engine> {
        // Recover from poisoning so later assertions still see the state
        self.engine.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_running_container(&self, name: &str) -> String {
        self.add_container(name, ContainerStatus::Running)
    }

    pub fn add_container(&self, name: &str, status: ContainerStatus) -> String {
        let spec = ContainerSpec {
            image: "fake:latest".to_string(),
            name: name.to_string(),
            ..Default::default()
        };
        let mut engine = self.engine();
        let id = Self::insert(&mut *engine, spec);
        if let Ok(container) = engine.find_mut(&id) {
            container.status = status;
        }
        id
    }

    fn insert(engine: &mut Engine, spec: ContainerSpec) -> String {
        engine.next_id += 1;
        let id = format!("fake{:08x}", engine.next_id);
        engine.containers.push(FakeContainer {
            id: id.clone(),
            name: spec.name.clone(),
            spec,
            status: ContainerStatus::Created,
            files: BTreeMap::new(),
            dirs: DEFAULT_DIRS.iter().map(|d| d.to_string()).collect(),
        });
        id
    }

    pub fn set_status(&self, name: &str, status: ContainerStatus) {
        if let Ok(container) = self.engine().find_mut(name) {
            container.status = status;
        }
    }

    pub fn add_dir(&self, name: &str, path: &str) {
        if let Ok(container) = self.engine().find_mut(name) {
            container.dirs.insert(path.to_string());
        }
    }

    pub fn put_file(&self, name: &str, path: &str, content: &str) {
        if let Ok(container) = self.engine().find_mut(name) {
            container.files.insert(path.to_string(), content.to_string());
        }
    }

    /// Canned result for an exact shell command line
    pub fn respond_to(&self, command: &str, exit_code: i64, stdout: &str, stderr: &str) {
        self.engine().responses.insert(
            command.to_string(),
            ExecResult {
                exit_code,
                stdout: stdout.as_bytes().to_vec(),
                stderr: stderr.as_bytes().to_vec(),
            },
        );
    }

    pub fn container(&self, name: &str) -> Option<FakeContainer> {
        self.engine().find(name).cloned()
    }

    pub fn count_named(&self, name: &str) -> usize {
        self.engine()
            .containers
            .iter()
            .filter(|c| c.name == name)
            .count()
    }

    pub fn file(&self, name: &str, path: &str) -> Option<String> {
        self.engine()
            .find(name)
            .and_then(|c| c.files.get(path).cloned())
    }

    pub fn executed(&self) -> Vec<ExecRecord> {
        self.engine().executed.clone()
    }

    pub fn builds(&self) -> Vec<BuildRecord> {
        self.engine().builds.clone()
    }

    /// Number of copy-into-container calls made
    pub fn copies(&self) -> usize {
        self.engine().copies
    }
}

fn ok(stdout: impl Into<String>) -> ExecResult {
    ExecResult {
        exit_code: 0,
        stdout: stdout.into().into_bytes(),
        stderr: Vec::new(),
    }
}

fn fail(exit_code: i64, stderr: impl Into<String>) -> ExecResult {
    ExecResult {
        exit_code,
        stdout: Vec::new(),
        stderr: stderr.into().into_bytes(),
    }
}

fn interpret(container: &mut FakeContainer, script: &str, cwd: &str) -> ExecResult {
    let words = match shlex::split(script) {
        Some(words) if !words.is_empty() => words,
        Some(_) => return ok(""),
        None => return fail(2, format!("sh: 1: Syntax error: {}\n", script)),
    };

    match words[0].as_str() {
        "true" => ok(""),
        "false" => fail(1, ""),
        "pwd" => ok(format!("{}\n", cwd)),
        "echo" => ok(format!("{}\n", words[1..].join(" "))),
        "exit" => {
            let code = words.get(1).and_then(|c| c.parse().ok()).unwrap_or(0);
            ExecResult {
                exit_code: code,
                ..Default::default()
            }
        }
        "cat" => {
            let mut stdout = String::new();
            let mut stderr = String::new();
            for arg in &words[1..] {
                let path = join_container_path(cwd, arg);
                match container.files.get(&path) {
                    Some(content) => stdout.push_str(content),
                    None if container.dirs.contains(&path) => {
                        stderr.push_str(&format!("cat: {}: Is a directory\n", arg))
                    }
                    None => stderr.push_str(&format!("cat: {}: No such file or directory\n", arg)),
                }
            }
            ExecResult {
                exit_code: if stderr.is_empty() { 0 } else { 1 },
                stdout: stdout.into_bytes(),
                stderr: stderr.into_bytes(),
            }
        }
        "mkdir" => {
            let parents = words.iter().any(|w| w == "-p");
            for arg in words[1..].iter().filter(|w| !w.starts_with('-')) {
                let path = join_container_path(cwd, arg);
                if parents {
                    let mut current = String::new();
                    for part in path.split('/').filter(|p| !p.is_empty()) {
                        current = format!("{}/{}", current, part);
                        container.dirs.insert(current.clone());
                    }
                } else {
                    let parent_exists = split_container_path(&path)
                        .map(|(parent, _)| container.dirs.contains(parent))
                        .unwrap_or(false);
                    if !parent_exists {
                        return fail(
                            1,
                            format!("mkdir: cannot create directory '{}': No such file or directory\n", arg),
                        );
                    }
                    container.dirs.insert(path);
                }
            }
            ok("")
        }
        other => fail(127, format!("sh: 1: {}: not found\n", other)),
    }
}

fn tar_file_names(data: &[u8]) -> Vec<String> {
    let mut archive = tar::Archive::new(data);
    let mut names = Vec::new();
    if let Ok(entries) = archive.entries() {
        for mut entry in entries.flatten() {
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let mut sink = Vec::new();
            let _ = entry.read_to_end(&mut sink);
            if let Ok(path) = entry.path() {
                names.push(path.display().to_string().trim_start_matches("./").to_string());
            }
        }
    }
    names.sort();
    names
}

#[async_trait]
impl Provider for FakeProvider {
    async fn is_available(&self) -> Result<bool> {
        Ok(self.available)
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            direct_write: self.direct_write,
            image_build: self.image_build,
        }
    }

    async fn build_image(
        &self,
        context_tar: Vec<u8>,
        dockerfile: &str,
        tag: &str,
    ) -> Result<Vec<String>> {
        let files = tar_file_names(&context_tar);
        self.engine().builds.push(BuildRecord {
            tag: tag.to_string(),
            dockerfile: dockerfile.to_string(),
            files,
        });

        let logs = vec![
            format!("Step 1/1 : FROM scratch ({})", dockerfile),
            format!("Successfully tagged {}", tag),
        ];
        match &self.build_failure {
            Some(message) => Err(ProviderError::BuildFailed {
                message: message.clone(),
                logs: vec![logs[0].clone(), message.clone()],
            }),
            None => Ok(logs),
        }
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let mut engine = self.engine();
        if engine.find(&spec.name).is_some() {
            return Err(ProviderError::ContainerError(format!(
                "Conflict. The container name \"/{}\" is already in use",
                spec.name
            )));
        }
        Ok(Self::insert(&mut *engine, spec.clone()))
    }

    async fn start_container(&self, container: &str) -> Result<()> {
        let status = self.start_status.clone();
        self.engine().find_mut(container)?.status = status;
        Ok(())
    }

    async fn stop_container(&self, container: &str, _timeout_secs: u64) -> Result<()> {
        self.engine().find_mut(container)?.status = ContainerStatus::Stopped;
        Ok(())
    }

    async fn remove_container(&self, container: &str, force: bool) -> Result<()> {
        let mut engine = self.engine();
        let target = engine.find_mut(container)?;
        if target.status.is_running() && !force {
            return Err(ProviderError::ContainerError(format!(
                "You cannot remove a running container {}",
                target.id
            )));
        }
        let id = target.id.clone();
        engine.containers.retain(|c| c.id != id);
        Ok(())
    }

    async fn inspect_container(&self, container: &str) -> Result<ContainerInfo> {
        let engine = self.engine();
        let found = engine
            .find(container)
            .ok_or_else(|| ProviderError::NotFound(container.to_string()))?;
        Ok(ContainerInfo {
            id: found.id.clone(),
            name: found.name.clone(),
            image: Some(found.spec.image.clone()),
            status: found.status.clone(),
            started_at: None,
        })
    }

    async fn exec_command(&self, container: &str, request: &ExecRequest) -> Result<ExecResult> {
        let mut engine = self.engine();
        let target = engine.find_mut(container)?;
        if !target.status.is_running() {
            return Err(ProviderError::NotRunning(container.to_string()));
        }
        let name = target.name.clone();

        let script = match request.command.as_slice() {
            [shell, flag, script] if shell.ends_with("sh") && flag == "-c" => script.clone(),
            argv => argv.join(" "),
        };
        let cwd = request
            .working_dir
            .clone()
            .or_else(|| target.spec.working_dir.clone())
            .unwrap_or_else(|| "/".to_string());
        let cwd_exists = target.dirs.contains(&cwd);
        let canned = engine.responses.get(&script).cloned();

        let result = if !cwd_exists {
            fail(
                126,
                format!("OCI runtime exec failed: chdir to cwd (\"{}\"): no such file or directory\n", cwd),
            )
        } else if let Some(canned) = canned {
            canned
        } else {
            interpret(engine.find_mut(container)?, &script, &cwd)
        };

        engine.executed.push(ExecRecord {
            container: name,
            argv: request.command.clone(),
            working_dir: request.working_dir.clone(),
            env_vars: request.env_vars.clone(),
        });
        Ok(result)
    }

    async fn copy_to_container(&self, container: &str, source: &Path, dest_dir: &str) -> Result<()> {
        let mut sources = Vec::new();
        if source.is_file() {
            sources.push(source.to_path_buf());
        } else if source.is_dir() {
            let entries = std::fs::read_dir(source)
                .map_err(|e| ProviderError::InternalError(e.to_string()))?;
            for entry in entries.flatten() {
                if entry.path().is_file() {
                    sources.push(entry.path());
                }
            }
        } else {
            return Err(ProviderError::InternalError(format!(
                "Source path does not exist: {}",
                source.display()
            )));
        }

        let mut engine = self.engine();
        engine.copies += 1;
        let target = engine.find_mut(container)?;
        if !target.dirs.contains(dest_dir) {
            return Err(ProviderError::ContainerError(format!(
                "Could not find the file {} in container {} (status 404)",
                dest_dir, target.name
            )));
        }
        for path in sources {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| ProviderError::InternalError(e.to_string()))?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            target
                .files
                .insert(join_container_path(dest_dir, &file_name), content);
        }
        Ok(())
    }

    async fn write_file(&self, container: &str, dest_path: &str, content: &[u8]) -> Result<()> {
        if !self.direct_write {
            return Err(ProviderError::NotSupported("direct write".to_string()));
        }
        let mut engine = self.engine();
        let target = engine.find_mut(container)?;
        let parent = split_container_path(dest_path)
            .map(|(parent, _)| parent.to_string())
            .ok_or_else(|| ProviderError::ContainerError(format!("Invalid path {}", dest_path)))?;
        if !target.dirs.contains(&parent) {
            return Err(ProviderError::ContainerError(format!(
                "Could not find the file {} in container {}",
                parent, target.name
            )));
        }
        target.files.insert(
            dest_path.to_string(),
            String::from_utf8_lossy(content).into_owned(),
        );
        Ok(())
    }
}
