use std::borrow::Cow;
use std::fmt;
use std::fs::File;
use std::io::Read as _;
use std::path::{Path, PathBuf};

use crate::ShadingLanguageVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Vertex,
    Fragment,
}

impl Stage {
    pub fn shader_type(self) -> gl::GLenum {
        match self {
            Self::Vertex => gl::VERTEX_SHADER,
            Self::Fragment => gl::FRAGMENT_SHADER,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vertex => "Vertex",
            Self::Fragment => "Fragment",
        })
    }
}

/// everything that a program build can complain about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    SourceOpen { path: PathBuf, reason: String },
    SourceRead { path: PathBuf, reason: String },
    ObjectCreation { what: &'static str, reason: String },
    CompileFailed { stage: Stage },
    /// driver output for a stage. may be present even if compilation succeeded (warnings).
    CompileLog { stage: Stage, log: String },
    LinkFailed,
    LinkLog { log: String },
}

impl Diagnostic {
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::CompileFailed { stage } | Self::CompileLog { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceOpen { path, reason } => {
                write!(f, "Can't open source file: {} ({reason})", path.display())
            }
            Self::SourceRead { path, reason } => {
                write!(f, "Can't read source file: {} ({reason})", path.display())
            }
            Self::ObjectCreation { what, reason } => write!(f, "Can't create {what}: {reason}"),
            Self::CompileFailed { stage } => write!(f, "Compile Error in {stage} Shader."),
            Self::CompileLog { log, .. } | Self::LinkLog { log } => f.write_str(log),
            Self::LinkFailed => f.write_str("Link Error."),
        }
    }
}

fn read_source(path: &Path) -> Result<String, Diagnostic> {
    let mut file = File::open(path).map_err(|err| Diagnostic::SourceOpen {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    let mut source = String::new();
    file.read_to_string(&mut source)
        .map_err(|err| Diagnostic::SourceRead {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
    Ok(source)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    pub vertex: String,
    pub fragment: String,
}

impl ShaderSource {
    pub fn new(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }

    /// reads both stages fully, vertex first. stops at the first file that can't be read.
    pub fn read(
        vertex_path: impl AsRef<Path>,
        fragment_path: impl AsRef<Path>,
    ) -> Result<Self, Diagnostic> {
        let vertex = read_source(vertex_path.as_ref())?;
        let fragment = read_source(fragment_path.as_ref())?;
        Ok(Self { vertex, fragment })
    }

    pub fn get(&self, stage: Stage) -> &str {
        match stage {
            Stage::Vertex => &self.vertex,
            Stage::Fragment => &self.fragment,
        }
    }
}

/// result of a program build.
///
/// a program that failed to compile or link still has a handle, it is up to the caller to decide
/// what to do with a non-functional one. the handle is missing only if nothing was ever handed to
/// the driver (unreadable sources) or if the driver refused to create the program object.
#[derive(Debug, Clone)]
pub struct CompiledProgram<P> {
    handle: Option<P>,
    vertex_compiled: bool,
    fragment_compiled: bool,
    linked: bool,
    diagnostics: Vec<Diagnostic>,
}

impl<P: Copy> CompiledProgram<P> {
    fn invalid(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            handle: None,
            vertex_compiled: false,
            fragment_compiled: false,
            linked: false,
            diagnostics,
        }
    }

    pub fn handle(&self) -> Option<P> {
        self.handle
    }

    pub fn is_valid(&self) -> bool {
        self.handle.is_some()
    }

    pub fn compiled(&self, stage: Stage) -> bool {
        match stage {
            Stage::Vertex => self.vertex_compiled,
            Stage::Fragment => self.fragment_compiled,
        }
    }

    pub fn linked(&self) -> bool {
        self.linked
    }

    pub fn is_functional(&self) -> bool {
        self.is_valid() && self.vertex_compiled && self.fragment_compiled && self.linked
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

fn emit(diagnostics: &mut Vec<Diagnostic>, diagnostic: Diagnostic) {
    log::error!("{diagnostic}");
    diagnostics.push(diagnostic);
}

/// info logs are worth reporting only if there's something besides the terminator.
fn non_trivial_log(info_log: &str) -> Option<&str> {
    let info_log = info_log.trim_end_matches('\0');
    (!info_log.is_empty()).then_some(info_log)
}

/// true if any line is a `#version` directive. comments and a byte order mark may come first.
fn has_version_directive(source: &str) -> bool {
    source.lines().any(|line| {
        line.trim_start_matches('\u{feff}')
            .trim_start()
            .starts_with("#version")
    })
}

pub struct ProgramBuilder<'a, A: gl::Adapter> {
    gl_api: &'a A,
    version: ShadingLanguageVersion,
}

impl<'a, A: gl::Adapter> ProgramBuilder<'a, A> {
    pub fn new(gl_api: &'a A, version: ShadingLanguageVersion) -> Self {
        Self { gl_api, version }
    }

    /// nothing is handed to the driver unless both files are readable.
    pub fn build_from_files(
        &self,
        vertex_path: impl AsRef<Path>,
        fragment_path: impl AsRef<Path>,
    ) -> CompiledProgram<A::Program> {
        match ShaderSource::read(vertex_path, fragment_path) {
            Ok(source) => self.build(&source),
            Err(diagnostic) => {
                let mut diagnostics = Vec::new();
                emit(&mut diagnostics, diagnostic);
                CompiledProgram::invalid(diagnostics)
            }
        }
    }

    /// compiles, attaches and links both stages. failures are recorded, they don't stop the build.
    pub fn build(&self, source: &ShaderSource) -> CompiledProgram<A::Program> {
        let mut diagnostics = Vec::new();

        let program = match unsafe { self.gl_api.create_program() } {
            Ok(program) => program,
            Err(err) => {
                emit(
                    &mut diagnostics,
                    Diagnostic::ObjectCreation {
                        what: "program",
                        reason: format!("{err:#}"),
                    },
                );
                return CompiledProgram::invalid(diagnostics);
            }
        };

        let vertex_compiled =
            self.compile_and_attach(program, Stage::Vertex, source, &mut diagnostics);
        let fragment_compiled =
            self.compile_and_attach(program, Stage::Fragment, source, &mut diagnostics);
        let linked = self.link(program, &mut diagnostics);

        log::debug!(
            "built program {program:?} (vertex compiled: {vertex_compiled}, fragment compiled: \
             {fragment_compiled}, linked: {linked})"
        );

        CompiledProgram {
            handle: Some(program),
            vertex_compiled,
            fragment_compiled,
            linked,
            diagnostics,
        }
    }

    /// prepends the `#version` directive unless the source carries its own anywhere.
    fn versioned<'s>(&self, source: &'s str) -> Cow<'s, str> {
        if has_version_directive(source) {
            Cow::Borrowed(source)
        } else {
            Cow::Owned(format!("{}\n{source}", self.version.directive()))
        }
    }

    fn compile_and_attach(
        &self,
        program: A::Program,
        stage: Stage,
        source: &ShaderSource,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> bool {
        let gl_api = self.gl_api;

        let shader = match unsafe { gl_api.create_shader(stage.shader_type()) } {
            Ok(shader) => shader,
            Err(err) => {
                emit(
                    diagnostics,
                    Diagnostic::ObjectCreation {
                        what: match stage {
                            Stage::Vertex => "vertex shader",
                            Stage::Fragment => "fragment shader",
                        },
                        reason: format!("{err:#}"),
                    },
                );
                return false;
            }
        };

        let compiled = unsafe {
            gl_api.shader_source(shader, &self.versioned(source.get(stage)));
            gl_api.compile_shader(shader);
            gl_api.attach_shader(program, shader);
            gl_api.get_shader_compile_status(shader)
        };
        if !compiled {
            emit(diagnostics, Diagnostic::CompileFailed { stage });
        }

        let info_log = unsafe { gl_api.get_shader_info_log(shader) };
        if let Some(log) = non_trivial_log(&info_log) {
            emit(
                diagnostics,
                Diagnostic::CompileLog {
                    stage,
                    log: log.to_string(),
                },
            );
        }

        // NOTE: an attached shader is only flagged for deletion, the program keeps it alive.
        unsafe { gl_api.delete_shader(shader) };

        compiled
    }

    fn link(&self, program: A::Program, diagnostics: &mut Vec<Diagnostic>) -> bool {
        let gl_api = self.gl_api;

        let linked = unsafe {
            gl_api.link_program(program);
            gl_api.get_program_link_status(program)
        };
        if !linked {
            emit(diagnostics, Diagnostic::LinkFailed);
        }

        let info_log = unsafe { gl_api.get_program_info_log(program) };
        if let Some(log) = non_trivial_log(&info_log) {
            emit(
                diagnostics,
                Diagnostic::LinkLog {
                    log: log.to_string(),
                },
            );
        }

        linked
    }
}

#[cfg(test)]
use crate::testing::{Call, CallLog, RecordingApi, count};

#[cfg(test)]
const VALID_VERTEX: &str = "#version 410 core\nvoid main() { gl_Position = vec4(0.0); }\n";
#[cfg(test)]
const VALID_FRAGMENT: &str = "#version 410 core\nout vec4 c;\nvoid main() { c = vec4(1.0); }\n";

#[test]
fn test_build_clean() {
    let calls = CallLog::default();
    let gl_api = RecordingApi::new(calls.clone());
    let builder = ProgramBuilder::new(&gl_api, ShadingLanguageVersion::default());

    let program = builder.build(&ShaderSource::new(VALID_VERTEX, VALID_FRAGMENT));
    assert!(program.is_valid());
    assert!(program.compiled(Stage::Vertex));
    assert!(program.compiled(Stage::Fragment));
    assert!(program.linked());
    assert!(program.is_functional());
    assert!(program.diagnostics().is_empty());

    assert_eq!(count(&calls, |call| matches!(call, Call::LinkProgram(_))), 1);
}

#[test]
fn test_build_stage_lifecycle() {
    let calls = CallLog::default();
    let gl_api = RecordingApi::new(calls.clone());
    let program = ProgramBuilder::new(&gl_api, ShadingLanguageVersion::default())
        .build(&ShaderSource::new(VALID_VERTEX, VALID_FRAGMENT));
    let handle = program.handle().expect("program handle");

    let calls = calls.borrow();
    assert_eq!(calls[0], Call::CreateProgram(handle));
    assert_eq!(calls[1], Call::CreateShader(gl::VERTEX_SHADER, 2));
    assert_eq!(calls[2], Call::ShaderSource(2, VALID_VERTEX.to_string()));
    assert_eq!(calls[3], Call::CompileShader(2));
    assert_eq!(calls[4], Call::AttachShader(handle, 2));
    assert_eq!(calls[5], Call::GetShaderCompileStatus(2));
    assert_eq!(calls[6], Call::GetShaderInfoLog(2));
    assert_eq!(calls[7], Call::DeleteShader(2));
    assert_eq!(calls[8], Call::CreateShader(gl::FRAGMENT_SHADER, 3));
    assert_eq!(calls[12], Call::GetShaderCompileStatus(3));
    assert_eq!(calls[14], Call::DeleteShader(3));
    assert_eq!(calls[15], Call::LinkProgram(handle));
    assert_eq!(calls[16], Call::GetProgramLinkStatus(handle));
    assert_eq!(calls[17], Call::GetProgramInfoLog(handle));
    assert_eq!(calls.len(), 18);
}

#[test]
fn test_build_vertex_syntax_error() {
    let calls = CallLog::default();
    let gl_api = RecordingApi::new(calls.clone()).with_compile_error(
        gl::VERTEX_SHADER,
        "0:2(1): error: syntax error, unexpected '}'\n\0",
    );
    let program = ProgramBuilder::new(&gl_api, ShadingLanguageVersion::default())
        .build(&ShaderSource::new("void main() { oops }", VALID_FRAGMENT));

    assert!(program.is_valid());
    assert!(!program.is_functional());
    assert!(!program.compiled(Stage::Vertex));
    assert!(program.compiled(Stage::Fragment));
    assert_eq!(
        program.diagnostics(),
        &[
            Diagnostic::CompileFailed {
                stage: Stage::Vertex
            },
            Diagnostic::CompileLog {
                stage: Stage::Vertex,
                log: "0:2(1): error: syntax error, unexpected '}'\n".to_string(),
            },
        ]
    );
    assert!(
        !program
            .diagnostics()
            .iter()
            .any(|diagnostic| diagnostic.stage() == Some(Stage::Fragment))
    );

    // the broken stage still gets attached and the program still gets linked.
    assert_eq!(count(&calls, |call| matches!(call, Call::AttachShader(..))), 2);
    assert_eq!(count(&calls, |call| matches!(call, Call::DeleteShader(_))), 2);
    assert_eq!(count(&calls, |call| matches!(call, Call::LinkProgram(_))), 1);
}

#[test]
fn test_build_link_error() {
    let gl_api = RecordingApi::new(CallLog::default())
        .with_link_error("error: fragment shader lacks `main'");
    let program = ProgramBuilder::new(&gl_api, ShadingLanguageVersion::default())
        .build(&ShaderSource::new(VALID_VERTEX, VALID_FRAGMENT));

    assert!(program.is_valid());
    assert!(!program.linked());
    assert_eq!(
        program.diagnostics(),
        &[
            Diagnostic::LinkFailed,
            Diagnostic::LinkLog {
                log: "error: fragment shader lacks `main'".to_string()
            },
        ]
    );
}

#[test]
fn test_build_compile_warning() {
    let gl_api = RecordingApi::new(CallLog::default())
        .with_compile_warning(gl::FRAGMENT_SHADER, "warning: unused variable `x'");
    let program = ProgramBuilder::new(&gl_api, ShadingLanguageVersion::default())
        .build(&ShaderSource::new(VALID_VERTEX, VALID_FRAGMENT));

    assert!(program.is_functional());
    assert_eq!(
        program.diagnostics(),
        &[Diagnostic::CompileLog {
            stage: Stage::Fragment,
            log: "warning: unused variable `x'".to_string(),
        }]
    );
}

#[test]
fn test_build_terminator_only_log_is_trivial() {
    let gl_api =
        RecordingApi::new(CallLog::default()).with_compile_warning(gl::VERTEX_SHADER, "\0");
    let program = ProgramBuilder::new(&gl_api, ShadingLanguageVersion::default())
        .build(&ShaderSource::new(VALID_VERTEX, VALID_FRAGMENT));

    assert!(program.diagnostics().is_empty());
}

#[test]
fn test_build_whitespace_log_is_reported() {
    let gl_api =
        RecordingApi::new(CallLog::default()).with_compile_warning(gl::VERTEX_SHADER, "\n\0");
    let program = ProgramBuilder::new(&gl_api, ShadingLanguageVersion::default())
        .build(&ShaderSource::new(VALID_VERTEX, VALID_FRAGMENT));

    assert_eq!(
        program.diagnostics(),
        &[Diagnostic::CompileLog {
            stage: Stage::Vertex,
            log: "\n".to_string(),
        }]
    );
}

#[test]
fn test_build_keeps_version_after_comment() {
    let vertex = "// pass-through vertex stage\n#version 410 core\nvoid main() {}\n";
    let fragment = "\u{feff}#version 410 core\nout vec4 c;\nvoid main() { c = vec4(1.0); }\n";

    let calls = CallLog::default();
    let gl_api = RecordingApi::new(calls.clone());
    let program = ProgramBuilder::new(&gl_api, ShadingLanguageVersion::default())
        .build(&ShaderSource::new(vertex, fragment));
    assert!(program.diagnostics().is_empty());

    let calls = calls.borrow();
    let sources: Vec<&str> = calls
        .iter()
        .filter_map(|call| match call {
            Call::ShaderSource(_, source) => Some(source.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(sources, [vertex, fragment]);
    for source in sources {
        assert_eq!(source.matches("#version").count(), 1);
    }
}

#[test]
fn test_build_prepends_version() {
    let calls = CallLog::default();
    let gl_api = RecordingApi::new(calls.clone());
    ProgramBuilder::new(&gl_api, ShadingLanguageVersion::new(3, 3))
        .build(&ShaderSource::new("void main() {}", VALID_FRAGMENT));

    let calls = calls.borrow();
    let sources: Vec<&str> = calls
        .iter()
        .filter_map(|call| match call {
            Call::ShaderSource(_, source) => Some(source.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(sources, ["#version 330 core\nvoid main() {}", VALID_FRAGMENT]);
}

#[test]
fn test_build_create_program_failure() {
    let calls = CallLog::default();
    let gl_api = RecordingApi::new(calls.clone()).with_failing_create_program();
    let program = ProgramBuilder::new(&gl_api, ShadingLanguageVersion::default())
        .build(&ShaderSource::new(VALID_VERTEX, VALID_FRAGMENT));

    assert!(!program.is_valid());
    assert!(matches!(
        program.diagnostics(),
        [Diagnostic::ObjectCreation { what: "program", .. }]
    ));
    assert!(calls.borrow().is_empty());
}

#[test]
fn test_build_from_missing_file() {
    let calls = CallLog::default();
    let gl_api = RecordingApi::new(calls.clone());
    let program = ProgramBuilder::new(&gl_api, ShadingLanguageVersion::default())
        .build_from_files("/nonexistent/shader.vert", "/nonexistent/shader.frag");

    assert!(!program.is_valid());
    assert_eq!(program.handle(), None);
    assert_eq!(count(&calls, Call::is_gl), 0);

    // stops at the first unreadable file.
    assert_eq!(program.diagnostics().len(), 1);
    let Diagnostic::SourceOpen { path, .. } = &program.diagnostics()[0] else {
        panic!("unexpected diagnostic: {:?}", program.diagnostics());
    };
    assert_eq!(path, Path::new("/nonexistent/shader.vert"));
}

#[test]
fn test_build_from_files() {
    let calls = CallLog::default();
    let gl_api = RecordingApi::new(calls.clone());
    let program = ProgramBuilder::new(&gl_api, ShadingLanguageVersion::default())
        .build_from_files(
            concat!(env!("CARGO_MANIFEST_DIR"), "/../shaders/shader.vert"),
            concat!(env!("CARGO_MANIFEST_DIR"), "/../shaders/shader.frag"),
        );

    assert!(program.is_functional());
    assert!(calls.borrow().iter().any(|call| matches!(
        call,
        Call::ShaderSource(_, source) if source.contains("gl_Position")
    )));
}

#[test]
fn test_diagnostic_display() {
    assert_eq!(
        Diagnostic::CompileFailed {
            stage: Stage::Vertex
        }
        .to_string(),
        "Compile Error in Vertex Shader."
    );
    assert_eq!(
        Diagnostic::CompileFailed {
            stage: Stage::Fragment
        }
        .to_string(),
        "Compile Error in Fragment Shader."
    );
    assert_eq!(Diagnostic::LinkFailed.to_string(), "Link Error.");
    assert_eq!(
        Diagnostic::SourceOpen {
            path: PathBuf::from("shader.vert"),
            reason: "not found".to_string(),
        }
        .to_string(),
        "Can't open source file: shader.vert (not found)"
    );
}
