use std::ffi::{CStr, c_void};
use std::fmt;

use anyhow::anyhow;
use glow::HasContext as _;

use crate::{GLbitfield, GLboolean, GLenum, GLint, GLsizei, GLuint};

// NOTE: glow is used only as a loader and a thin ffi layer. this trait is what the rest of the
// workspace talks to; its methods mirror gl entry points 1:1 with the exception of things that
// can be rustified (strings, slices, optional handles).
//
// anything that implements this can stand in for the driver, which is how the app crate records
// call sequences in its tests.
pub trait Adapter {
    type Buffer: Copy + fmt::Debug + PartialEq;
    type Program: Copy + fmt::Debug + PartialEq;
    type Shader: Copy + fmt::Debug + PartialEq;
    type VertexArray: Copy + fmt::Debug + PartialEq;

    unsafe fn attach_shader(&self, program: Self::Program, shader: Self::Shader);
    unsafe fn bind_buffer(&self, target: GLenum, buffer: Option<Self::Buffer>);
    unsafe fn bind_vertex_array(&self, vertex_array: Option<Self::VertexArray>);
    unsafe fn buffer_data(&self, target: GLenum, data: &[u8], usage: GLenum);
    unsafe fn clear(&self, mask: GLbitfield);
    unsafe fn compile_shader(&self, shader: Self::Shader);
    unsafe fn create_buffer(&self) -> anyhow::Result<Self::Buffer>;
    unsafe fn create_program(&self) -> anyhow::Result<Self::Program>;
    unsafe fn create_shader(&self, r#type: GLenum) -> anyhow::Result<Self::Shader>;
    unsafe fn create_vertex_array(&self) -> anyhow::Result<Self::VertexArray>;
    unsafe fn delete_shader(&self, shader: Self::Shader);
    unsafe fn draw_arrays(&self, mode: GLenum, first: GLint, count: GLsizei);
    unsafe fn enable_vertex_attrib_array(&self, index: GLuint);
    unsafe fn get_program_info_log(&self, program: Self::Program) -> String;
    unsafe fn get_program_link_status(&self, program: Self::Program) -> bool;
    unsafe fn get_shader_compile_status(&self, shader: Self::Shader) -> bool;
    unsafe fn get_shader_info_log(&self, shader: Self::Shader) -> String;
    unsafe fn get_string(&self, name: GLenum) -> anyhow::Result<String>;
    unsafe fn link_program(&self, program: Self::Program);
    unsafe fn shader_source(&self, shader: Self::Shader, source: &str);
    unsafe fn use_program(&self, program: Option<Self::Program>);
    unsafe fn vertex_attrib_pointer(
        &self,
        index: GLuint,
        size: GLint,
        r#type: GLenum,
        normalized: GLboolean,
        stride: GLsizei,
        offset: GLint,
    );
    unsafe fn viewport(&self, x: GLint, y: GLint, width: GLsizei, height: GLsizei);
}

pub struct Api {
    context: glow::Context,
}

impl fmt::Debug for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Api").finish_non_exhaustive()
    }
}

impl Api {
    /// loads function pointers through `get_proc_address`.
    ///
    /// SAFETY: a gl context must be current on the calling thread and stay current for as long
    /// as the returned api is in use.
    pub unsafe fn load_with<F>(get_proc_address: F) -> Self
    where
        F: FnMut(&CStr) -> *const c_void,
    {
        let context = unsafe { glow::Context::from_loader_function_cstr(get_proc_address) };
        log::debug!("loaded gl functions");
        Self { context }
    }
}

impl Adapter for Api {
    type Buffer = glow::NativeBuffer;
    type Program = glow::NativeProgram;
    type Shader = glow::NativeShader;
    type VertexArray = glow::NativeVertexArray;

    #[inline]
    unsafe fn attach_shader(&self, program: Self::Program, shader: Self::Shader) {
        unsafe { self.context.attach_shader(program, shader) };
    }

    #[inline]
    unsafe fn bind_buffer(&self, target: GLenum, buffer: Option<Self::Buffer>) {
        unsafe { self.context.bind_buffer(target, buffer) };
    }

    #[inline]
    unsafe fn bind_vertex_array(&self, vertex_array: Option<Self::VertexArray>) {
        unsafe { self.context.bind_vertex_array(vertex_array) };
    }

    #[inline]
    unsafe fn buffer_data(&self, target: GLenum, data: &[u8], usage: GLenum) {
        unsafe { self.context.buffer_data_u8_slice(target, data, usage) };
    }

    #[inline]
    unsafe fn clear(&self, mask: GLbitfield) {
        unsafe { self.context.clear(mask) };
    }

    #[inline]
    unsafe fn compile_shader(&self, shader: Self::Shader) {
        unsafe { self.context.compile_shader(shader) };
    }

    #[inline]
    unsafe fn create_buffer(&self) -> anyhow::Result<Self::Buffer> {
        unsafe { self.context.create_buffer() }
            .map_err(|err| anyhow!("could not create buffer: {err}"))
    }

    #[inline]
    unsafe fn create_program(&self) -> anyhow::Result<Self::Program> {
        unsafe { self.context.create_program() }
            .map_err(|err| anyhow!("could not create program: {err}"))
    }

    #[inline]
    unsafe fn create_shader(&self, r#type: GLenum) -> anyhow::Result<Self::Shader> {
        unsafe { self.context.create_shader(r#type) }
            .map_err(|err| anyhow!("could not create shader: {err}"))
    }

    #[inline]
    unsafe fn create_vertex_array(&self) -> anyhow::Result<Self::VertexArray> {
        unsafe { self.context.create_vertex_array() }
            .map_err(|err| anyhow!("could not create vertex array: {err}"))
    }

    #[inline]
    unsafe fn delete_shader(&self, shader: Self::Shader) {
        unsafe { self.context.delete_shader(shader) };
    }

    #[inline]
    unsafe fn draw_arrays(&self, mode: GLenum, first: GLint, count: GLsizei) {
        unsafe { self.context.draw_arrays(mode, first, count) };
    }

    #[inline]
    unsafe fn enable_vertex_attrib_array(&self, index: GLuint) {
        unsafe { self.context.enable_vertex_attrib_array(index) };
    }

    #[inline]
    unsafe fn get_program_info_log(&self, program: Self::Program) -> String {
        unsafe { self.context.get_program_info_log(program) }
    }

    #[inline]
    unsafe fn get_program_link_status(&self, program: Self::Program) -> bool {
        unsafe { self.context.get_program_link_status(program) }
    }

    #[inline]
    unsafe fn get_shader_compile_status(&self, shader: Self::Shader) -> bool {
        unsafe { self.context.get_shader_compile_status(shader) }
    }

    #[inline]
    unsafe fn get_shader_info_log(&self, shader: Self::Shader) -> String {
        unsafe { self.context.get_shader_info_log(shader) }
    }

    #[inline]
    unsafe fn get_string(&self, name: GLenum) -> anyhow::Result<String> {
        let ret = unsafe { self.context.get_parameter_string(name) };
        if ret.is_empty() {
            return Err(anyhow!("could not get string (name 0x{name:x})"));
        }
        Ok(ret)
    }

    #[inline]
    unsafe fn link_program(&self, program: Self::Program) {
        unsafe { self.context.link_program(program) };
    }

    #[inline]
    unsafe fn shader_source(&self, shader: Self::Shader, source: &str) {
        unsafe { self.context.shader_source(shader, source) };
    }

    #[inline]
    unsafe fn use_program(&self, program: Option<Self::Program>) {
        unsafe { self.context.use_program(program) };
    }

    #[inline]
    unsafe fn vertex_attrib_pointer(
        &self,
        index: GLuint,
        size: GLint,
        r#type: GLenum,
        normalized: GLboolean,
        stride: GLsizei,
        offset: GLint,
    ) {
        unsafe {
            self.context
                .vertex_attrib_pointer_f32(index, size, r#type, normalized, stride, offset)
        };
    }

    #[inline]
    unsafe fn viewport(&self, x: GLint, y: GLint, width: GLsizei, height: GLsizei) {
        unsafe { self.context.viewport(x, y, width, height) };
    }
}
