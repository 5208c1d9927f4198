use std::mem::offset_of;

use anyhow::Context as _;

pub const POSITION_LOCATION: gl::GLuint = 0;
pub const COLOR_LOCATION: gl::GLuint = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

#[rustfmt::skip]
pub const TRIANGLE: [Vertex; 3] = [
    Vertex { position: [ 0.0,  0.5, 0.0], color: [1.0, 0.0, 0.0] },
    Vertex { position: [ 0.5, -0.5, 0.0], color: [0.0, 0.0, 1.0] },
    Vertex { position: [-0.5, -0.5, 0.0], color: [0.0, 1.0, 0.0] },
];

/// vertices resident on the device. immutable once uploaded.
pub struct Mesh<A: gl::Adapter> {
    vertex_array: A::VertexArray,
    vertex_buffer: A::Buffer,
    vertex_count: gl::GLsizei,
}

impl<A: gl::Adapter> Mesh<A> {
    pub fn new(gl_api: &A, vertices: &[Vertex]) -> anyhow::Result<Self> {
        let vertex_count =
            gl::GLsizei::try_from(vertices.len()).context("too many vertices")?;

        unsafe {
            let vertex_array = gl_api
                .create_vertex_array()
                .context("could not create vertex array")?;
            gl_api.bind_vertex_array(Some(vertex_array));

            let vertex_buffer = gl_api
                .create_buffer()
                .context("could not create vertex buffer")?;
            gl_api.bind_buffer(gl::ARRAY_BUFFER, Some(vertex_buffer));
            gl_api.buffer_data(
                gl::ARRAY_BUFFER,
                bytemuck::cast_slice(vertices),
                gl::STATIC_DRAW,
            );

            gl_api.enable_vertex_attrib_array(POSITION_LOCATION);
            gl_api.vertex_attrib_pointer(
                POSITION_LOCATION,
                3,
                gl::FLOAT,
                false,
                size_of::<Vertex>() as gl::GLsizei,
                offset_of!(Vertex, position) as gl::GLint,
            );
            gl_api.enable_vertex_attrib_array(COLOR_LOCATION);
            gl_api.vertex_attrib_pointer(
                COLOR_LOCATION,
                3,
                gl::FLOAT,
                false,
                size_of::<Vertex>() as gl::GLsizei,
                offset_of!(Vertex, color) as gl::GLint,
            );

            gl_api.bind_vertex_array(None);
            gl_api.bind_buffer(gl::ARRAY_BUFFER, None);

            Ok(Self {
                vertex_array,
                vertex_buffer,
                vertex_count,
            })
        }
    }

    pub fn triangle(gl_api: &A) -> anyhow::Result<Self> {
        Self::new(gl_api, &TRIANGLE)
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count as usize
    }

    pub fn vertex_buffer(&self) -> A::Buffer {
        self.vertex_buffer
    }

    // TODO: feed delta_time into a uniform once the shaders have something to animate.
    pub fn draw(&self, gl_api: &A, _delta_time: f64) {
        unsafe {
            gl_api.bind_vertex_array(Some(self.vertex_array));
            gl_api.draw_arrays(gl::TRIANGLES, 0, self.vertex_count);
        }
    }
}

#[cfg(test)]
use crate::testing::{Call, CallLog, RecordingApi};

#[test]
fn test_vertex_layout() {
    assert_eq!(size_of::<Vertex>(), 24);
    assert_eq!(offset_of!(Vertex, position), 0);
    assert_eq!(offset_of!(Vertex, color), 12);
}

#[test]
fn test_triangle_upload() {
    let calls = CallLog::default();
    let gl_api = RecordingApi::new(calls.clone());
    let mesh = Mesh::triangle(&gl_api).expect("triangle mesh");
    assert_eq!(mesh.vertex_count(), 3);

    assert_eq!(
        *calls.borrow(),
        [
            Call::CreateVertexArray(1),
            Call::BindVertexArray(Some(1)),
            Call::CreateBuffer(2),
            Call::BindBuffer(gl::ARRAY_BUFFER, Some(2)),
            Call::BufferData {
                target: gl::ARRAY_BUFFER,
                len: 72,
                usage: gl::STATIC_DRAW,
            },
            Call::EnableVertexAttribArray(0),
            Call::VertexAttribPointer {
                index: 0,
                size: 3,
                r#type: gl::FLOAT,
                normalized: false,
                stride: 24,
                offset: 0,
            },
            Call::EnableVertexAttribArray(1),
            Call::VertexAttribPointer {
                index: 1,
                size: 3,
                r#type: gl::FLOAT,
                normalized: false,
                stride: 24,
                offset: 12,
            },
            Call::BindVertexArray(None),
            Call::BindBuffer(gl::ARRAY_BUFFER, None),
        ]
    );
    assert_eq!(mesh.vertex_buffer(), 2);
}

#[test]
fn test_draw() {
    let calls = CallLog::default();
    let gl_api = RecordingApi::new(calls.clone());
    let mesh = Mesh::triangle(&gl_api).expect("triangle mesh");
    calls.borrow_mut().clear();

    mesh.draw(&gl_api, 1.0 / 60.0);
    assert_eq!(
        *calls.borrow(),
        [
            Call::BindVertexArray(Some(1)),
            Call::DrawArrays(gl::TRIANGLES, 0, 3),
        ]
    );
}

#[test]
fn test_upload_failure() {
    let gl_api = RecordingApi::new(CallLog::default()).with_failing_create_vertex_array();
    let err = Mesh::triangle(&gl_api).err().expect("upload failure");
    assert!(format!("{err:#}").contains("could not create vertex array"));
}
