//! GLSL to SPIR-V compilation through `shaderc`
//!
//! Compilation is organised in two levels:
//!
//! - one process-wide global session holding the target capabilities
//!   (Vulkan version, SPIR-V version), created by [`ShaderCompiler::initialize`]
//! - any number of [`CompilerSession`]s holding search paths and preprocessor
//!   macros; the facade keeps a main session for everyday compiles
//!
//! A module is a GLSL file that may carry several stages. Each stage lives in
//! a section guarded by `#ifdef <entryName>` and defines `void main()`.
//! Compiling with an [`EntryPoint`] defines that macro and compiles the module
//! for the entry point's stage.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use shaderc::{CompileOptions, Compiler, IncludeType, ResolvedInclude, ShaderKind, SpirvVersion, TargetEnv};
use thiserror::Error;

/// Shader compiler errors
#[derive(Error, Debug)]
pub enum CompileError {
    /// No global session exists yet
    #[error("shader compiler is not initialized")]
    NotInitialized,

    /// Module name did not resolve through any search path
    #[error("module '{0}' not found.")]
    ModuleNotFound(String),

    /// Explicit file path does not exist
    #[error("The shader '{0}' doesn't exist")]
    ShaderMissing(String),

    /// Reading the source failed
    #[error("failed to read shader source: {0}")]
    Io(#[from] std::io::Error),

    /// Module has no section for the requested entry point
    #[error("Error getting entry point {entry_point} in module {module}")]
    EntryPointNotFound {
        /// Requested entry point
        entry_point: String,
        /// Module that was searched
        module: String,
    },

    /// Diagnostic text produced by the compiler, verbatim
    #[error("{0}")]
    Diagnostics(String),

    /// The compiler itself failed
    #[error("shader compiler internal error: {0}")]
    Internal(String),
}

/// Outcome of a compile: SPIR-V on success, a message on failure
pub type CompileResult = Result<SpirvBinary, CompileError>;

/// Pipeline stage a shader is compiled for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex stage
    Vertex,
    /// Fragment stage
    Fragment,
    /// Compute stage
    Compute,
    /// Geometry stage
    Geometry,
    /// Tessellation control stage
    TessControl,
    /// Tessellation evaluation stage
    TessEvaluation,
}

impl ShaderStage {
    /// `shaderc` kind for this stage
    pub fn as_shader_kind(self) -> ShaderKind {
        match self {
            Self::Vertex => ShaderKind::Vertex,
            Self::Fragment => ShaderKind::Fragment,
            Self::Compute => ShaderKind::Compute,
            Self::Geometry => ShaderKind::Geometry,
            Self::TessControl => ShaderKind::TessControl,
            Self::TessEvaluation => ShaderKind::TessEvaluation,
        }
    }

    /// Vulkan stage flag for pipeline creation
    pub fn as_vk_stage(self) -> ash::vk::ShaderStageFlags {
        use ash::vk::ShaderStageFlags;
        match self {
            Self::Vertex => ShaderStageFlags::VERTEX,
            Self::Fragment => ShaderStageFlags::FRAGMENT,
            Self::Compute => ShaderStageFlags::COMPUTE,
            Self::Geometry => ShaderStageFlags::GEOMETRY,
            Self::TessControl => ShaderStageFlags::TESSELLATION_CONTROL,
            Self::TessEvaluation => ShaderStageFlags::TESSELLATION_EVALUATION,
        }
    }
}

/// Named stage section inside a module
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryPoint {
    /// Section name, also defined as a macro while compiling
    pub name: String,
    /// Stage the section is compiled for
    pub stage: ShaderStage,
}

impl EntryPoint {
    /// Create an entry point
    pub fn new(name: impl Into<String>, stage: ShaderStage) -> Self {
        Self {
            name: name.into(),
            stage,
        }
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.name, self.stage)
    }
}

/// Owned SPIR-V words plus the entry point name they export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpirvBinary {
    words: Vec<u32>,
    entry_point: String,
}

impl SpirvBinary {
    /// SPIR-V magic number, first word of every module
    pub const MAGIC: u32 = 0x0723_0203;

    /// Wrap already compiled words
    pub fn new(words: Vec<u32>, entry_point: impl Into<String>) -> Self {
        Self {
            words,
            entry_point: entry_point.into(),
        }
    }

    /// SPIR-V words
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// SPIR-V as bytes
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.words)
    }

    /// Size in bytes
    pub fn len_bytes(&self) -> usize {
        self.words.len() * 4
    }

    /// Exported entry point name
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }
}

/// Target capabilities shared by every session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalSessionDesc {
    /// Vulkan version encoded like `VK_MAKE_API_VERSION`
    pub vulkan_version: u32,
    /// SPIR-V (major, minor)
    pub spirv_version: (u8, u8),
}

impl GlobalSessionDesc {
    fn spirv(&self) -> SpirvVersion {
        match self.spirv_version {
            (1, 0) => SpirvVersion::V1_0,
            (1, 1) => SpirvVersion::V1_1,
            (1, 2) => SpirvVersion::V1_2,
            (1, 3) => SpirvVersion::V1_3,
            (1, 4) => SpirvVersion::V1_4,
            _ => SpirvVersion::V1_5,
        }
    }
}

impl Default for GlobalSessionDesc {
    fn default() -> Self {
        Self {
            vulkan_version: ash::vk::API_VERSION_1_3,
            spirv_version: (1, 4),
        }
    }
}

struct GlobalSession {
    desc: GlobalSessionDesc,
    main_session: Option<CompilerSession>,
}

static GLOBAL: Mutex<Option<GlobalSession>> = Mutex::new(None);
static SEARCH_PATHS: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());
static SESSIONS_IN_USE: AtomicU64 = AtomicU64::new(0);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-compile session: search paths, macros and target
///
/// Holds one `shaderc` compiler reused by every compile in the session.
pub struct CompilerSession {
    compiler: Compiler,
    desc: GlobalSessionDesc,
    search_paths: Vec<PathBuf>,
    macros: Vec<(String, Option<String>)>,
}

impl CompilerSession {
    /// Create a session from the global session and the current search paths
    pub fn new() -> Result<Self, CompileError> {
        let desc = lock(&GLOBAL).as_ref().map(|global| global.desc).ok_or_else(|| {
            log::error!("[SHADER] Cannot create a compiler session before the compiler is initialized");
            CompileError::NotInitialized
        })?;
        Self::from_desc(desc)
    }

    fn from_desc(desc: GlobalSessionDesc) -> Result<Self, CompileError> {
        let compiler = Compiler::new()
            .ok_or_else(|| CompileError::Internal("failed to create shaderc compiler".to_string()))?;
        SESSIONS_IN_USE.fetch_add(1, Ordering::SeqCst);
        Ok(Self {
            compiler,
            desc,
            search_paths: lock(&SEARCH_PATHS).clone(),
            macros: vec![("MVT".to_string(), Some("1".to_string()))],
        })
    }

    /// Add a preprocessor macro for every compile in this session
    pub fn define(&mut self, name: impl Into<String>, value: Option<&str>) {
        self.macros.push((name.into(), value.map(str::to_string)));
    }

    /// Directories searched for modules and includes
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Resolve a module name to a file through the search paths
    ///
    /// A name without extension is looked up as `<name>.glsl`.
    pub fn resolve_module(&self, module: &str) -> Result<PathBuf, CompileError> {
        let file_name = if Path::new(module).extension().is_some() {
            module.to_string()
        } else {
            format!("{module}.glsl")
        };

        self.search_paths
            .iter()
            .map(|dir| dir.join(&file_name))
            .chain(std::iter::once(PathBuf::from(&file_name)))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| CompileError::ModuleNotFound(module.to_string()))
    }

    /// Compile a module found through the search paths
    pub fn compile(&self, module: &str, entry_point: Option<&EntryPoint>) -> CompileResult {
        let result = self
            .resolve_module(module)
            .and_then(|path| Ok((fs::read_to_string(&path)?, path)))
            .and_then(|(source, path)| self.compile_source(&source, module, Some(&path), entry_point));
        log_failure(module, entry_point, result)
    }

    /// Compile a module from an explicit file path
    pub fn compile_by_path<P: AsRef<Path>>(&self, path: P, entry_point: Option<&EntryPoint>) -> CompileResult {
        let path = path.as_ref();
        let module = path
            .file_stem()
            .map_or_else(|| path.display().to_string(), |stem| stem.to_string_lossy().into_owned());

        let result = if path.is_file() {
            fs::read_to_string(path)
                .map_err(CompileError::from)
                .and_then(|source| self.compile_source(&source, &module, Some(path), entry_point))
        } else {
            Err(CompileError::ShaderMissing(path.display().to_string()))
        };
        log_failure(&module, entry_point, result)
    }

    /// Compile GLSL source text
    ///
    /// `origin` is the file the text came from, used for relative includes.
    pub fn compile_source(
        &self,
        source: &str,
        module: &str,
        origin: Option<&Path>,
        entry_point: Option<&EntryPoint>,
    ) -> CompileResult {
        if let Some(entry) = entry_point {
            if !declares_entry_point(source, &entry.name) {
                return Err(CompileError::EntryPointNotFound {
                    entry_point: entry.name.clone(),
                    module: module.to_string(),
                });
            }
        }

        let mut options = CompileOptions::new()
            .ok_or_else(|| CompileError::Internal("failed to create shaderc options".to_string()))?;

        options.set_target_env(TargetEnv::Vulkan, self.desc.vulkan_version);
        options.set_target_spirv(self.desc.spirv());
        for (name, value) in &self.macros {
            options.add_macro_definition(name, value.as_deref());
        }
        if let Some(entry) = entry_point {
            options.add_macro_definition(&entry.name, Some("1"));
        }

        let search_paths = self.search_paths.clone();
        options.set_include_callback(move |requested, include_type, requesting, _depth| {
            resolve_include(requested, include_type, requesting, &search_paths)
        });

        let kind = entry_point.map_or(ShaderKind::InferFromSource, |entry| entry.stage.as_shader_kind());
        let input_name = origin.map_or_else(|| module.to_string(), |path| path.display().to_string());

        let artifact = self
            .compiler
            .compile_into_spirv(source, kind, &input_name, "main", Some(&options))
            .map_err(|e| match e {
                shaderc::Error::CompilationError(_, message) => CompileError::Diagnostics(message),
                other => CompileError::Internal(format!("{:?}", other)),
            })?;

        if artifact.get_num_warnings() > 0 {
            log::warn!("[SHADER] {}: {}", module, artifact.get_warning_messages());
        }

        let binary = SpirvBinary::new(artifact.as_binary().to_vec(), "main");
        log::debug!(
            "[SHADER] Compiled {}{} into {} bytes",
            module,
            entry_point.map(|e| format!(" :: {e}")).unwrap_or_default(),
            binary.len_bytes()
        );
        Ok(binary)
    }
}

impl Drop for CompilerSession {
    fn drop(&mut self) {
        SESSIONS_IN_USE.fetch_sub(1, Ordering::SeqCst);
    }
}

fn log_failure(module: &str, entry_point: Option<&EntryPoint>, result: CompileResult) -> CompileResult {
    if let Err(e) = &result {
        match entry_point {
            Some(entry) => log::error!("[SHADER] Compiling {} :: {} failed: {}", module, entry, e),
            None => log::error!("[SHADER] Compiling {} failed: {}", module, e),
        }
    }
    result
}

fn resolve_include(
    requested: &str,
    include_type: IncludeType,
    requesting: &str,
    search_paths: &[PathBuf],
) -> Result<ResolvedInclude, String> {
    let relative_dir = Path::new(requesting).parent().map(Path::to_path_buf);
    let candidates = match include_type {
        IncludeType::Relative => relative_dir.into_iter().chain(search_paths.iter().cloned()).collect::<Vec<_>>(),
        IncludeType::Standard => search_paths.iter().cloned().chain(relative_dir).collect(),
    };

    candidates
        .into_iter()
        .map(|dir| dir.join(requested))
        .find(|path| path.is_file())
        .ok_or_else(|| format!("include '{requested}' not found (from {requesting})"))
        .and_then(|path| {
            fs::read_to_string(&path)
                .map(|content| ResolvedInclude {
                    resolved_name: path.display().to_string(),
                    content,
                })
                .map_err(|e| format!("failed to read include {}: {}", path.display(), e))
        })
}

/// Whether `source` has a section guarded by `#ifdef <name>` or `defined(<name>)`
pub fn declares_entry_point(source: &str, name: &str) -> bool {
    source.lines().any(|line| {
        let line = line.trim_start();
        let Some(directive) = line.strip_prefix('#') else {
            return false;
        };
        let directive = directive.trim_start();
        if let Some(rest) = directive.strip_prefix("ifdef") {
            return rest.split_whitespace().next() == Some(name);
        }
        if directive.starts_with("if") || directive.starts_with("elif") {
            let compact: String = directive.chars().filter(|c| !c.is_whitespace()).collect();
            return compact.contains(&format!("defined({name})"));
        }
        false
    })
}

/// Process-wide compiler facade
pub struct ShaderCompiler;

impl ShaderCompiler {
    /// Create the global session with default capabilities (Vulkan 1.3, SPIR-V 1.4)
    pub fn initialize() -> Result<(), CompileError> {
        Self::initialize_with(GlobalSessionDesc::default())
    }

    /// Create the global session with explicit capabilities
    pub fn initialize_with(desc: GlobalSessionDesc) -> Result<(), CompileError> {
        let mut global = lock(&GLOBAL);
        if global.is_some() {
            log::warn!("[SHADER] Compiler already initialized, ignoring");
            return Ok(());
        }

        *global = Some(GlobalSession {
            desc,
            main_session: Some(CompilerSession::from_desc(desc)?),
        });
        log::info!(
            "[SHADER] Compiler initialized (Vulkan {}.{}, SPIR-V {}.{})",
            ash::vk::api_version_major(desc.vulkan_version),
            ash::vk::api_version_minor(desc.vulkan_version),
            desc.spirv_version.0,
            desc.spirv_version.1
        );
        Ok(())
    }

    /// Tear down the main and global sessions
    ///
    /// Sessions still alive elsewhere are reported and left to drop on their own.
    pub fn shutdown() {
        let Some(mut global) = lock(&GLOBAL).take() else {
            return;
        };
        global.main_session = None;

        let remaining = Self::sessions_in_use();
        if remaining > 0 {
            log::error!("[SHADER] Shutting down the compiler with {} session(s) still in use", remaining);
        }
        log::info!("[SHADER] Compiler shut down");
    }

    /// Whether [`ShaderCompiler::initialize`] has run
    pub fn is_initialized() -> bool {
        lock(&GLOBAL).is_some()
    }

    /// Live session count, main session included
    pub fn sessions_in_use() -> u64 {
        SESSIONS_IN_USE.load(Ordering::SeqCst)
    }

    /// Append a directory to the search paths of sessions created afterwards
    pub fn add_search_path<P: Into<PathBuf>>(path: P) {
        let path = path.into();
        log::debug!("[SHADER] Adding search path {:?}", path);
        let mut paths = lock(&SEARCH_PATHS);
        if !paths.contains(&path) {
            paths.push(path);
        }
    }

    /// Replace the main session so it picks up current search paths
    pub fn reset_main_session() -> Result<(), CompileError> {
        let mut global = lock(&GLOBAL);
        let global = global.as_mut().ok_or(CompileError::NotInitialized)?;
        global.main_session = None;
        global.main_session = Some(CompilerSession::from_desc(global.desc)?);
        Ok(())
    }

    /// Add `paths` and make sure the main session searches them
    ///
    /// Initializes the compiler with default capabilities when nothing has
    /// yet, otherwise rebuilds the main session.
    pub fn configure_search_paths<P: AsRef<Path>>(paths: &[P]) -> Result<(), CompileError> {
        for path in paths {
            Self::add_search_path(path.as_ref());
        }
        if Self::is_initialized() {
            Self::reset_main_session()
        } else {
            Self::initialize()
        }
    }

    fn with_main_session(f: impl FnOnce(&CompilerSession) -> CompileResult) -> CompileResult {
        let global = lock(&GLOBAL);
        let session = global
            .as_ref()
            .and_then(|global| global.main_session.as_ref())
            .ok_or(CompileError::NotInitialized)?;
        f(session)
    }

    /// Compile a module by name with the main session
    pub fn compile(module: &str, entry_point: Option<&EntryPoint>) -> CompileResult {
        Self::with_main_session(|session| session.compile(module, entry_point))
    }

    /// Compile a file with the main session
    pub fn compile_by_path<P: AsRef<Path>>(path: P, entry_point: Option<&EntryPoint>) -> CompileResult {
        Self::with_main_session(|session| session.compile_by_path(path, entry_point))
    }

    /// Compile a module by name in a throwaway session
    pub fn one_shot_compile(module: &str, entry_point: Option<&EntryPoint>) -> CompileResult {
        CompilerSession::new()?.compile(module, entry_point)
    }

    /// Compile a file in a throwaway session
    pub fn one_shot_compile_by_path<P: AsRef<Path>>(path: P, entry_point: Option<&EntryPoint>) -> CompileResult {
        CompilerSession::new()?.compile_by_path(path, entry_point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The compiler is process-wide; tests touching it run one at a time.
    static COMPILER_LOCK: Mutex<()> = Mutex::new(());

    const MODULE: &str = r"#version 450

#ifdef vertMain
layout(location = 0) in vec3 inPosition;
layout(location = 0) out vec3 fragColor;
void main() {
    gl_Position = vec4(inPosition, 1.0);
    fragColor = vec3(MVT);
}
#endif

#if defined(fragMain)
layout(location = 0) in vec3 fragColor;
layout(location = 0) out vec4 outColor;
void main() {
    outColor = vec4(fragColor, 1.0);
}
#endif
";

    fn serialized() -> MutexGuard<'static, ()> {
        lock(&COMPILER_LOCK)
    }

    fn initialized() -> MutexGuard<'static, ()> {
        let guard = serialized();
        ShaderCompiler::initialize().unwrap();
        guard
    }

    #[test]
    fn test_declares_entry_point() {
        assert!(declares_entry_point(MODULE, "vertMain"));
        assert!(declares_entry_point(MODULE, "fragMain"));
        assert!(!declares_entry_point(MODULE, "computeMain"));
        assert!(!declares_entry_point("#ifdef vertMainX\n#endif", "vertMain"));
        assert!(declares_entry_point("  #  ifdef   geomMain\n", "geomMain"));
        assert!(declares_entry_point("#elif defined( tescMain )\n", "tescMain"));
    }

    #[test]
    fn test_session_requires_global() {
        let _guard = serialized();
        ShaderCompiler::shutdown();
        assert!(matches!(CompilerSession::new(), Err(CompileError::NotInitialized)));
        assert!(matches!(
            ShaderCompiler::compile("mesh", None),
            Err(CompileError::NotInitialized)
        ));
    }

    #[test]
    fn test_session_counter_tracks_lifetimes() {
        let _guard = initialized();
        let before = ShaderCompiler::sessions_in_use();
        {
            let _a = CompilerSession::new().unwrap();
            let _b = CompilerSession::new().unwrap();
            assert_eq!(ShaderCompiler::sessions_in_use(), before + 2);
        }
        assert_eq!(ShaderCompiler::sessions_in_use(), before);
    }

    #[test]
    fn test_shutdown_with_live_session_proceeds() {
        let _guard = initialized();
        let session = CompilerSession::new().unwrap();
        ShaderCompiler::shutdown();
        assert!(!ShaderCompiler::is_initialized());
        assert!(ShaderCompiler::sessions_in_use() >= 1);
        drop(session);
        ShaderCompiler::initialize().unwrap();
        assert!(ShaderCompiler::is_initialized());
    }

    #[test]
    fn test_compile_each_entry_point() {
        let _guard = initialized();
        let session = CompilerSession::new().unwrap();
        for entry in [
            EntryPoint::new("vertMain", ShaderStage::Vertex),
            EntryPoint::new("fragMain", ShaderStage::Fragment),
        ] {
            let binary = session.compile_source(MODULE, "inline", None, Some(&entry)).unwrap();
            assert_eq!(binary.words()[0], SpirvBinary::MAGIC);
            assert_eq!(binary.entry_point(), "main");
            assert_eq!(binary.as_bytes().len(), binary.len_bytes());
        }
    }

    #[test]
    fn test_session_compiles_repeatedly() {
        let _guard = initialized();
        let session = CompilerSession::new().unwrap();
        let entry = EntryPoint::new("fragMain", ShaderStage::Fragment);

        let first = session.compile_source(MODULE, "inline", None, Some(&entry)).unwrap();
        let second = session.compile_source(MODULE, "inline", None, Some(&entry)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_entry_point() {
        let _guard = initialized();
        let session = CompilerSession::new().unwrap();
        let err = session
            .compile_source(MODULE, "mesh", None, Some(&EntryPoint::new("computeMain", ShaderStage::Compute)))
            .unwrap_err();
        assert_eq!(err.to_string(), "Error getting entry point computeMain in module mesh");
    }

    #[test]
    fn test_invalid_source_yields_only_diagnostics() {
        let _guard = initialized();
        let session = CompilerSession::new().unwrap();
        let source = "#version 450\n#pragma shader_stage(fragment)\nvoid main() { undefined_call(); }\n";
        match session.compile_source(source, "broken", None, None) {
            Err(CompileError::Diagnostics(message)) => {
                assert!(message.contains("undefined_call"));
            }
            other => panic!("expected diagnostics, got {:?}", other.map(|b| b.len_bytes())),
        }
    }

    #[test]
    fn test_stage_inferred_from_pragma() {
        let _guard = initialized();
        let session = CompilerSession::new().unwrap();
        let source = "#version 450\n#pragma shader_stage(compute)\nlayout(local_size_x = 1) in;\nvoid main() {}\n";
        let binary = session.compile_source(source, "inferred", None, None).unwrap();
        assert_eq!(binary.words()[0], SpirvBinary::MAGIC);
    }

    #[test]
    fn test_module_resolution_and_includes() {
        let _guard = initialized();
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("common.glsl"), "const float SCALE = 2.0;\n").unwrap();
        fs::write(
            dir.path().join("scaled.glsl"),
            "#version 450\n#extension GL_GOOGLE_include_directive : require\n#include \"common.glsl\"\n\
             #ifdef vertMain\nvoid main() { gl_Position = vec4(SCALE); }\n#endif\n",
        )
        .unwrap();

        ShaderCompiler::add_search_path(dir.path());
        ShaderCompiler::reset_main_session().unwrap();

        let entry = EntryPoint::new("vertMain", ShaderStage::Vertex);
        assert!(ShaderCompiler::compile("scaled", Some(&entry)).is_ok());
        assert!(ShaderCompiler::one_shot_compile("scaled.glsl", Some(&entry)).is_ok());
        assert!(ShaderCompiler::compile_by_path(dir.path().join("scaled.glsl"), Some(&entry)).is_ok());

        assert!(matches!(
            ShaderCompiler::compile("nope", None),
            Err(CompileError::ModuleNotFound(name)) if name == "nope"
        ));
        let missing = dir.path().join("missing.glsl");
        let err = ShaderCompiler::one_shot_compile_by_path(&missing, None).unwrap_err();
        assert_eq!(err.to_string(), format!("The shader '{}' doesn't exist", missing.display()));
    }

    #[test]
    fn test_paths_added_after_initialize_reach_main_session() {
        let _guard = initialized();
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("late_module.glsl"),
            "#version 450\n#ifdef vertMain\nvoid main() { gl_Position = vec4(1.0); }\n#endif\n",
        )
        .unwrap();
        let entry = EntryPoint::new("vertMain", ShaderStage::Vertex);

        ShaderCompiler::add_search_path(dir.path());
        assert!(matches!(
            ShaderCompiler::compile("late_module", Some(&entry)),
            Err(CompileError::ModuleNotFound(_))
        ));

        ShaderCompiler::configure_search_paths(&[dir.path()]).unwrap();
        let binary = ShaderCompiler::compile("late_module", Some(&entry)).unwrap();
        assert_eq!(binary.words()[0], SpirvBinary::MAGIC);
    }

    /// Descriptor bindings decorated in a SPIR-V module
    fn descriptor_bindings(words: &[u32]) -> Vec<u32> {
        const OP_DECORATE: u32 = 71;
        const DECORATION_BINDING: u32 = 33;

        let mut bindings = Vec::new();
        let mut at = 5;
        while at < words.len() {
            let count = (words[at] >> 16) as usize;
            let opcode = words[at] & 0xffff;
            if opcode == OP_DECORATE && count == 4 && words[at + 2] == DECORATION_BINDING {
                bindings.push(words[at + 3]);
            }
            at += count.max(1);
        }
        bindings
    }

    #[test]
    fn test_mesh_shader_stages_declare_only_their_bindings() {
        let _guard = initialized();
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../EngineAssets/Shaders/mesh.glsl");
        let session = CompilerSession::new().unwrap();

        let vertex = session
            .compile_by_path(&path, Some(&EntryPoint::new("vertMain", ShaderStage::Vertex)))
            .unwrap();
        let fragment = session
            .compile_by_path(&path, Some(&EntryPoint::new("fragMain", ShaderStage::Fragment)))
            .unwrap();

        assert_eq!(descriptor_bindings(vertex.words()), vec![0]);
        assert_eq!(descriptor_bindings(fragment.words()), vec![1]);
    }

    #[test]
    fn test_configure_search_paths_initializes_when_needed() {
        let _guard = serialized();
        ShaderCompiler::shutdown();
        let dir = tempfile::tempdir().unwrap();

        ShaderCompiler::configure_search_paths(&[dir.path()]).unwrap();
        assert!(ShaderCompiler::is_initialized());
        let in_main = ShaderCompiler::with_main_session(|session| {
            assert!(session.search_paths().iter().any(|p| p == dir.path()));
            Ok(SpirvBinary::new(Vec::new(), "main"))
        });
        assert!(in_main.is_ok());
    }
}
