use std::fmt;
use std::path::PathBuf;

use window::WindowAttrs;

pub const DEFAULT_VERTEX_SHADER_PATH: &str = "shaders/shader.vert";
pub const DEFAULT_FRAGMENT_SHADER_PATH: &str = "shaders/shader.frag";

/// glsl version; also decides which gl context version gets requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadingLanguageVersion {
    pub major: u8,
    pub minor: u8,
}

impl ShadingLanguageVersion {
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// the number that goes after `#version`, e.g. 410 for 4.1.
    pub fn number(self) -> u32 {
        self.major as u32 * 100 + self.minor as u32 * 10
    }

    /// profiles exist since glsl 1.50.
    pub fn directive(self) -> String {
        let number = self.number();
        if number >= 150 {
            format!("#version {number} core")
        } else {
            format!("#version {number}")
        }
    }
}

impl Default for ShadingLanguageVersion {
    fn default() -> Self {
        Self::new(4, 1)
    }
}

impl fmt::Display for ShadingLanguageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub vertex_shader_path: PathBuf,
    pub fragment_shader_path: PathBuf,
    pub shading_language_version: ShadingLanguageVersion,
    pub vsync_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        let (width, height) = window::DEFAULT_LOGICAL_SIZE;
        Self {
            width,
            height,
            title: window::DEFAULT_TITLE.to_string(),
            vertex_shader_path: PathBuf::from(DEFAULT_VERTEX_SHADER_PATH),
            fragment_shader_path: PathBuf::from(DEFAULT_FRAGMENT_SHADER_PATH),
            shading_language_version: ShadingLanguageVersion::default(),
            vsync_enabled: true,
        }
    }
}

impl Config {
    pub fn with_shader_paths(
        vertex_shader_path: impl Into<PathBuf>,
        fragment_shader_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            vertex_shader_path: vertex_shader_path.into(),
            fragment_shader_path: fragment_shader_path.into(),
            ..Self::default()
        }
    }

    pub fn window_attrs(&self) -> WindowAttrs {
        WindowAttrs {
            logical_size: (self.width, self.height),
            title: self.title.clone(),
            gl_version: (
                self.shading_language_version.major,
                self.shading_language_version.minor,
            ),
            resizable: true,
        }
    }

    pub fn swap_interval(&self) -> u32 {
        u32::from(self.vsync_enabled)
    }
}

#[test]
fn test_config_default() {
    let config = Config::default();
    assert_eq!((config.width, config.height), (640, 480));
    assert_eq!(config.title, "Window1");
    assert_eq!(config.vertex_shader_path, PathBuf::from("shaders/shader.vert"));
    assert_eq!(config.fragment_shader_path, PathBuf::from("shaders/shader.frag"));
    assert_eq!(config.shading_language_version, ShadingLanguageVersion::new(4, 1));
    assert!(config.vsync_enabled);
    assert_eq!(config.swap_interval(), 1);
}

#[test]
fn test_config_window_attrs() {
    let mut config = Config::with_shader_paths("a.vert", "b.frag");
    config.width = 800;
    config.height = 600;
    config.shading_language_version = ShadingLanguageVersion::new(3, 3);
    config.vsync_enabled = false;

    let attrs = config.window_attrs();
    assert_eq!(attrs.logical_size, (800, 600));
    assert_eq!(attrs.title, "Window1");
    assert_eq!(attrs.gl_version, (3, 3));
    assert_eq!(config.vertex_shader_path, PathBuf::from("a.vert"));
    assert_eq!(config.swap_interval(), 0);
}

#[test]
fn test_shading_language_directive() {
    assert_eq!(ShadingLanguageVersion::new(4, 1).directive(), "#version 410 core");
    assert_eq!(ShadingLanguageVersion::new(3, 3).directive(), "#version 330 core");
    assert_eq!(ShadingLanguageVersion::new(1, 2).directive(), "#version 120");
    assert_eq!(ShadingLanguageVersion::new(4, 6).to_string(), "4.6");
}
