use std::ffi::{CStr, c_void};
use std::fmt;

mod backend_winit;

pub use backend_winit::WinitHost;

pub const DEFAULT_LOGICAL_SIZE: (u32, u32) = (640, 480);
pub const DEFAULT_TITLE: &str = "Window1";
pub const DEFAULT_GL_VERSION: (u8, u8) = (4, 1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowAttrs {
    pub logical_size: (u32, u32),
    pub title: String,
    /// requested core profile context version (major, minor).
    pub gl_version: (u8, u8),
    pub resizable: bool,
}

impl Default for WindowAttrs {
    fn default() -> Self {
        Self {
            logical_size: DEFAULT_LOGICAL_SIZE,
            title: DEFAULT_TITLE.to_string(),
            gl_version: DEFAULT_GL_VERSION,
            resizable: true,
        }
    }
}

/// what went wrong inside of the host. numeric values are stable and are what gets printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotInitialized,
    NoCurrentContext,
    ApiUnavailable,
    VersionUnavailable,
    PlatformError,
    FormatUnavailable,
    NoWindowContext,
}

impl ErrorCode {
    pub fn code(self) -> i32 {
        match self {
            Self::NotInitialized => 0x10001,
            Self::NoCurrentContext => 0x10002,
            Self::ApiUnavailable => 0x10006,
            Self::VersionUnavailable => 0x10007,
            Self::PlatformError => 0x10008,
            Self::FormatUnavailable => 0x10009,
            Self::NoWindowContext => 0x1000A,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} (0x{:x})", self, self.code())
    }
}

/// receives every error the host runs into, before the failing call returns.
pub type ErrorReporter = Box<dyn FnMut(ErrorCode, &str)>;

pub fn log_error_reporter() -> ErrorReporter {
    Box::new(|code, description| log::error!("{code}: {description}"))
}

/// windowing + gl context library, whatever it is backed by.
///
/// a host owns at most one window and one context. everything is expected to be called from a
/// single thread, in order: `init`, `create_window`, `make_context_current`, then the per frame
/// calls, then `terminate`.
pub trait Host {
    fn set_error_callback(&mut self, reporter: ErrorReporter);
    fn init(&mut self) -> anyhow::Result<()>;
    fn create_window(&mut self, attrs: &WindowAttrs) -> anyhow::Result<()>;
    fn make_context_current(&mut self) -> anyhow::Result<()>;
    /// 0 disables vsync, n waits for n vertical blanks.
    fn set_swap_interval(&mut self, interval: u32) -> anyhow::Result<()>;
    /// returns null for unknown procs or if there's no context.
    fn get_proc_address(&self, procname: &CStr) -> *const c_void;
    fn should_close(&self) -> bool;
    fn swap_buffers(&mut self) -> anyhow::Result<()>;
    /// must not block.
    fn poll_events(&mut self) -> anyhow::Result<()>;
    fn framebuffer_size(&self) -> (u32, u32);
    /// seconds, monotonic.
    fn get_time(&self) -> f64;
    fn set_time(&mut self, time: f64);
    /// releases the window and the context. calling it again is a no-op.
    fn terminate(&mut self);
}

#[test]
fn test_window_attrs_default() {
    let attrs = WindowAttrs::default();
    assert_eq!(attrs.logical_size, (640, 480));
    assert_eq!(attrs.title, "Window1");
    assert_eq!(attrs.gl_version, (4, 1));
    assert!(attrs.resizable);
}

#[test]
fn test_error_code_display() {
    assert_eq!(ErrorCode::PlatformError.code(), 0x10008);
    assert_eq!(
        ErrorCode::NotInitialized.to_string(),
        "NotInitialized (0x10001)"
    );
}
