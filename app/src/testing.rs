//! stand-ins for the driver and the host that write everything they are asked to do into one
//! shared call log, so tests can assert on ordering across both.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::{CStr, c_void};
use std::ptr::null;
use std::rc::Rc;

use anyhow::anyhow;
use gl::{GLbitfield, GLboolean, GLenum, GLint, GLsizei, GLuint};
use window::{ErrorCode, ErrorReporter, Host, WindowAttrs};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    // gl
    AttachShader(u32, u32),
    BindBuffer(GLenum, Option<u32>),
    BindVertexArray(Option<u32>),
    BufferData {
        target: GLenum,
        len: usize,
        usage: GLenum,
    },
    Clear(GLbitfield),
    CompileShader(u32),
    CreateBuffer(u32),
    CreateProgram(u32),
    CreateShader(GLenum, u32),
    CreateVertexArray(u32),
    DeleteShader(u32),
    DrawArrays(GLenum, GLint, GLsizei),
    EnableVertexAttribArray(GLuint),
    GetProgramInfoLog(u32),
    GetProgramLinkStatus(u32),
    GetShaderCompileStatus(u32),
    GetShaderInfoLog(u32),
    GetString(GLenum),
    LinkProgram(u32),
    ShaderSource(u32, String),
    UseProgram(Option<u32>),
    VertexAttribPointer {
        index: GLuint,
        size: GLint,
        r#type: GLenum,
        normalized: GLboolean,
        stride: GLsizei,
        offset: GLint,
    },
    Viewport(GLint, GLint, GLsizei, GLsizei),

    // host
    Init,
    CreateWindow(WindowAttrs),
    MakeContextCurrent,
    SetSwapInterval(u32),
    SetTime(f64),
    SwapBuffers,
    PollEvents,
    Terminate,
}

impl Call {
    pub fn is_gl(&self) -> bool {
        !matches!(
            self,
            Call::Init
                | Call::CreateWindow(_)
                | Call::MakeContextCurrent
                | Call::SetSwapInterval(_)
                | Call::SetTime(_)
                | Call::SwapBuffers
                | Call::PollEvents
                | Call::Terminate
        )
    }
}

pub type CallLog = Rc<RefCell<Vec<Call>>>;

pub fn count(calls: &CallLog, f: impl Fn(&Call) -> bool) -> usize {
    calls.borrow().iter().filter(|call| f(call)).count()
}

#[derive(Default)]
pub struct RecordingApi {
    calls: CallLog,
    next_id: Cell<u32>,
    shader_types: RefCell<HashMap<u32, GLenum>>,
    // (compile status, info log) per shader type
    shader_outcomes: HashMap<GLenum, (bool, String)>,
    link_error: Option<String>,
    fail_create_program: bool,
    fail_create_vertex_array: bool,
}

impl RecordingApi {
    pub fn new(calls: CallLog) -> Self {
        Self {
            calls,
            ..Self::default()
        }
    }

    pub fn with_compile_error(mut self, shader_type: GLenum, info_log: &str) -> Self {
        self.shader_outcomes
            .insert(shader_type, (false, info_log.to_string()));
        self
    }

    pub fn with_compile_warning(mut self, shader_type: GLenum, info_log: &str) -> Self {
        self.shader_outcomes
            .insert(shader_type, (true, info_log.to_string()));
        self
    }

    pub fn with_link_error(mut self, info_log: &str) -> Self {
        self.link_error = Some(info_log.to_string());
        self
    }

    pub fn with_failing_create_program(mut self) -> Self {
        self.fail_create_program = true;
        self
    }

    pub fn with_failing_create_vertex_array(mut self) -> Self {
        self.fail_create_vertex_array = true;
        self
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    fn next_id(&self) -> u32 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }

    fn shader_outcome(&self, shader: u32) -> (bool, String) {
        self.shader_types
            .borrow()
            .get(&shader)
            .and_then(|shader_type| self.shader_outcomes.get(shader_type))
            .cloned()
            .unwrap_or((true, String::new()))
    }
}

impl gl::Adapter for RecordingApi {
    type Buffer = u32;
    type Program = u32;
    type Shader = u32;
    type VertexArray = u32;

    unsafe fn attach_shader(&self, program: u32, shader: u32) {
        self.record(Call::AttachShader(program, shader));
    }

    unsafe fn bind_buffer(&self, target: GLenum, buffer: Option<u32>) {
        self.record(Call::BindBuffer(target, buffer));
    }

    unsafe fn bind_vertex_array(&self, vertex_array: Option<u32>) {
        self.record(Call::BindVertexArray(vertex_array));
    }

    unsafe fn buffer_data(&self, target: GLenum, data: &[u8], usage: GLenum) {
        self.record(Call::BufferData {
            target,
            len: data.len(),
            usage,
        });
    }

    unsafe fn clear(&self, mask: GLbitfield) {
        self.record(Call::Clear(mask));
    }

    unsafe fn compile_shader(&self, shader: u32) {
        self.record(Call::CompileShader(shader));
    }

    unsafe fn create_buffer(&self) -> anyhow::Result<u32> {
        let id = self.next_id();
        self.record(Call::CreateBuffer(id));
        Ok(id)
    }

    unsafe fn create_program(&self) -> anyhow::Result<u32> {
        if self.fail_create_program {
            return Err(anyhow!("out of program objects"));
        }
        let id = self.next_id();
        self.record(Call::CreateProgram(id));
        Ok(id)
    }

    unsafe fn create_shader(&self, r#type: GLenum) -> anyhow::Result<u32> {
        let id = self.next_id();
        self.shader_types.borrow_mut().insert(id, r#type);
        self.record(Call::CreateShader(r#type, id));
        Ok(id)
    }

    unsafe fn create_vertex_array(&self) -> anyhow::Result<u32> {
        if self.fail_create_vertex_array {
            return Err(anyhow!("out of vertex arrays"));
        }
        let id = self.next_id();
        self.record(Call::CreateVertexArray(id));
        Ok(id)
    }

    unsafe fn delete_shader(&self, shader: u32) {
        self.record(Call::DeleteShader(shader));
    }

    unsafe fn draw_arrays(&self, mode: GLenum, first: GLint, count: GLsizei) {
        self.record(Call::DrawArrays(mode, first, count));
    }

    unsafe fn enable_vertex_attrib_array(&self, index: GLuint) {
        self.record(Call::EnableVertexAttribArray(index));
    }

    unsafe fn get_program_info_log(&self, program: u32) -> String {
        self.record(Call::GetProgramInfoLog(program));
        self.link_error.clone().unwrap_or_default()
    }

    unsafe fn get_program_link_status(&self, program: u32) -> bool {
        self.record(Call::GetProgramLinkStatus(program));
        self.link_error.is_none()
    }

    unsafe fn get_shader_compile_status(&self, shader: u32) -> bool {
        self.record(Call::GetShaderCompileStatus(shader));
        self.shader_outcome(shader).0
    }

    unsafe fn get_shader_info_log(&self, shader: u32) -> String {
        self.record(Call::GetShaderInfoLog(shader));
        self.shader_outcome(shader).1
    }

    unsafe fn get_string(&self, name: GLenum) -> anyhow::Result<String> {
        self.record(Call::GetString(name));
        Ok("4.1 recording".to_string())
    }

    unsafe fn link_program(&self, program: u32) {
        self.record(Call::LinkProgram(program));
    }

    unsafe fn shader_source(&self, shader: u32, source: &str) {
        self.record(Call::ShaderSource(shader, source.to_string()));
    }

    unsafe fn use_program(&self, program: Option<u32>) {
        self.record(Call::UseProgram(program));
    }

    unsafe fn vertex_attrib_pointer(
        &self,
        index: GLuint,
        size: GLint,
        r#type: GLenum,
        normalized: GLboolean,
        stride: GLsizei,
        offset: GLint,
    ) {
        self.record(Call::VertexAttribPointer {
            index,
            size,
            r#type,
            normalized,
            stride,
            offset,
        });
    }

    unsafe fn viewport(&self, x: GLint, y: GLint, width: GLsizei, height: GLsizei) {
        self.record(Call::Viewport(x, y, width, height));
    }
}

pub struct FakeHost {
    calls: CallLog,
    reporter: Option<ErrorReporter>,
    close_after_polls: usize,
    polls: usize,
    fail_create_window: bool,
    framebuffer_size: (u32, u32),
    time: Cell<f64>,
}

impl FakeHost {
    /// how far the clock moves per `get_time` call.
    pub const TICK: f64 = 1.0 / 60.0;

    /// closes after `close_after_polls` calls to `poll_events`.
    pub fn new(calls: CallLog, close_after_polls: usize) -> Self {
        Self {
            calls,
            reporter: None,
            close_after_polls,
            polls: 0,
            fail_create_window: false,
            framebuffer_size: window::DEFAULT_LOGICAL_SIZE,
            time: Cell::new(0.0),
        }
    }

    pub fn with_failing_create_window(mut self) -> Self {
        self.fail_create_window = true;
        self
    }

    pub fn with_framebuffer_size(mut self, framebuffer_size: (u32, u32)) -> Self {
        self.framebuffer_size = framebuffer_size;
        self
    }

    pub fn with_start_time(self, time: f64) -> Self {
        self.time.set(time);
        self
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

impl Host for FakeHost {
    fn set_error_callback(&mut self, reporter: ErrorReporter) {
        self.reporter = Some(reporter);
    }

    fn init(&mut self) -> anyhow::Result<()> {
        self.record(Call::Init);
        Ok(())
    }

    fn create_window(&mut self, attrs: &WindowAttrs) -> anyhow::Result<()> {
        self.record(Call::CreateWindow(attrs.clone()));
        if self.fail_create_window {
            let description = "no display available";
            if let Some(reporter) = self.reporter.as_mut() {
                reporter(ErrorCode::PlatformError, description);
            }
            return Err(anyhow!(description));
        }
        Ok(())
    }

    fn make_context_current(&mut self) -> anyhow::Result<()> {
        self.record(Call::MakeContextCurrent);
        Ok(())
    }

    fn set_swap_interval(&mut self, interval: u32) -> anyhow::Result<()> {
        self.record(Call::SetSwapInterval(interval));
        Ok(())
    }

    fn get_proc_address(&self, _procname: &CStr) -> *const c_void {
        null()
    }

    fn should_close(&self) -> bool {
        self.polls >= self.close_after_polls
    }

    fn swap_buffers(&mut self) -> anyhow::Result<()> {
        self.record(Call::SwapBuffers);
        Ok(())
    }

    fn poll_events(&mut self) -> anyhow::Result<()> {
        self.record(Call::PollEvents);
        self.polls += 1;
        Ok(())
    }

    fn framebuffer_size(&self) -> (u32, u32) {
        self.framebuffer_size
    }

    // NOTE: every query advances the clock by one tick.
    fn get_time(&self) -> f64 {
        let time = self.time.get() + Self::TICK;
        self.time.set(time);
        time
    }

    fn set_time(&mut self, time: f64) {
        self.record(Call::SetTime(time));
        self.time.set(time);
    }

    fn terminate(&mut self) {
        self.record(Call::Terminate);
    }
}
