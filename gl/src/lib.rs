mod wrap;

pub use wrap::*;

pub type GLbitfield = u32;
pub type GLboolean = bool;
pub type GLenum = u32;
pub type GLint = i32;
pub type GLsizei = i32;
pub type GLuint = u32;

// NOTE: only the enums that are actually used around the workspace are re-exported. glow carries
// all of them, pull more from there when needed.
pub use glow::{
    ARRAY_BUFFER, COLOR_BUFFER_BIT, FLOAT, FRAGMENT_SHADER, RENDERER, SHADING_LANGUAGE_VERSION,
    STATIC_DRAW, TRIANGLES, VERSION, VERTEX_SHADER,
};
