use std::ffi::{CStr, c_void};
use std::fmt;
use std::num::NonZeroU32;
use std::ptr::null;
use std::time::{Duration, Instant};

use anyhow::{Context as _, anyhow};
use glutin::config::{Config, ConfigTemplate, ConfigTemplateBuilder, GlConfig as _};
use glutin::context::{
    ContextApi, ContextAttributesBuilder, GlProfile, NotCurrentContext, NotCurrentGlContext as _,
    PossiblyCurrentContext, PossiblyCurrentGlContext as _, Version,
};
use glutin::display::{Display, DisplayApiPreference, GetGlDisplay as _, GlDisplay as _};
use glutin::surface::{GlSurface as _, Surface, SwapInterval, WindowSurface};
use glutin_winit::GlWindow as _;
use raw_window_handle as rwh;
use winit::platform::pump_events::{EventLoopExtPumpEvents as _, PumpStatus};

use crate::{ErrorCode, ErrorReporter, Host, WindowAttrs, log_error_reporter};

#[inline]
fn swap_interval(interval: u32) -> SwapInterval {
    NonZeroU32::new(interval).map_or(SwapInterval::DontWait, SwapInterval::Wait)
}

/// the display offered no framebuffer config matching the template.
#[derive(Debug)]
struct NoMatchingConfig;

impl fmt::Display for NoMatchingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("no matching framebuffer config")
    }
}

impl std::error::Error for NoMatchingConfig {}

/// picks the host error code for `err`, looking for a glutin error anywhere in the chain.
fn error_code_of(err: &anyhow::Error, fallback: ErrorCode) -> ErrorCode {
    use glutin::error::ErrorKind;

    if err.chain().any(|cause| cause.is::<NoMatchingConfig>()) {
        return ErrorCode::FormatUnavailable;
    }
    let Some(glutin_err) = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<glutin::error::Error>())
    else {
        return fallback;
    };
    match glutin_err.error_kind() {
        ErrorKind::NotSupported(_) => ErrorCode::ApiUnavailable,
        ErrorKind::BadConfig | ErrorKind::BadAttribute => ErrorCode::FormatUnavailable,
        ErrorKind::BadContext | ErrorKind::ContextLost => ErrorCode::NoWindowContext,
        _ => fallback,
    }
}

/// the config with the most samples, or none if the display offered nothing.
fn pick_config<C: SampleCount>(configs: impl Iterator<Item = C>) -> Option<C> {
    configs.reduce(|acc, config| {
        if config.sample_count() > acc.sample_count() {
            config
        } else {
            acc
        }
    })
}

trait SampleCount {
    fn sample_count(&self) -> u8;
}

impl SampleCount for Config {
    fn sample_count(&self) -> u8 {
        self.num_samples()
    }
}

fn find_config(display: &Display, template: ConfigTemplate) -> anyhow::Result<Config> {
    let configs = unsafe { display.find_configs(template) }
        .context("could not query framebuffer configs")?;
    pick_config(configs).ok_or_else(|| anyhow::Error::new(NoMatchingConfig))
}

fn raw_display_handle(
    event_loop: &winit::event_loop::ActiveEventLoop,
) -> anyhow::Result<rwh::RawDisplayHandle> {
    let handle = rwh::HasDisplayHandle::display_handle(event_loop)
        .context("could not get display handle")?;
    Ok(handle.as_raw())
}

// NOTE: wgl can only pick a config for an existing window.
#[cfg(target_os = "windows")]
fn create_window_and_config(
    event_loop: &winit::event_loop::ActiveEventLoop,
    window_attributes: winit::window::WindowAttributes,
    template: ConfigTemplateBuilder,
) -> anyhow::Result<(winit::window::Window, Config)> {
    let window = event_loop
        .create_window(window_attributes)
        .context("could not create window")?;
    let raw_window_handle = rwh::HasWindowHandle::window_handle(&window)
        .context("could not get window handle")?
        .as_raw();
    let display = unsafe {
        Display::new(
            raw_display_handle(event_loop)?,
            DisplayApiPreference::WglThenEgl(Some(raw_window_handle)),
        )
    }
    .context("could not create gl display")?;
    let template = template
        .compatible_with_native_window(raw_window_handle)
        .build();
    let gl_config = find_config(&display, template)?;
    Ok((window, gl_config))
}

// NOTE: everywhere else the window is created to match the picked config (x11 visuals).
#[cfg(not(target_os = "windows"))]
fn create_window_and_config(
    event_loop: &winit::event_loop::ActiveEventLoop,
    window_attributes: winit::window::WindowAttributes,
    template: ConfigTemplateBuilder,
) -> anyhow::Result<(winit::window::Window, Config)> {
    let display_handle = raw_display_handle(event_loop)?;
    let display = unsafe { Display::new(display_handle, display_api_preference()) }
        .context("could not create gl display")?;
    let gl_config = find_config(&display, template.build())?;
    let window = glutin_winit::finalize_window(event_loop, window_attributes, &gl_config)
        .map_err(|err| anyhow!("{err}"))
        .context("could not create window")?;
    Ok((window, gl_config))
}

#[cfg(target_vendor = "apple")]
fn display_api_preference() -> DisplayApiPreference {
    DisplayApiPreference::Cgl
}

#[cfg(target_os = "android")]
fn display_api_preference() -> DisplayApiPreference {
    DisplayApiPreference::Egl
}

#[cfg(all(unix, not(target_vendor = "apple"), not(target_os = "android")))]
fn display_api_preference() -> DisplayApiPreference {
    DisplayApiPreference::EglThenGlx(Box::new(winit::platform::x11::register_xlib_error_hook))
}

enum ContextState {
    NotCurrent(NotCurrentContext),
    Current {
        context: PossiblyCurrentContext,
        surface: Surface<WindowSurface>,
    },
}

// NOTE: field order matters, the context and the surface must go before the window.
struct GraphicsContext {
    context: Option<ContextState>,
    gl_config: Config,
    window: winit::window::Window,
}

impl GraphicsContext {
    fn new(
        event_loop: &winit::event_loop::ActiveEventLoop,
        attrs: &WindowAttrs,
    ) -> anyhow::Result<Self> {
        let window_attributes = winit::window::Window::default_attributes()
            .with_title(attrs.title.as_str())
            .with_inner_size(winit::dpi::LogicalSize::new(
                attrs.logical_size.0 as f64,
                attrs.logical_size.1 as f64,
            ))
            .with_resizable(attrs.resizable);
        let (window, gl_config) = create_window_and_config(
            event_loop,
            window_attributes,
            ConfigTemplateBuilder::new(),
        )?;

        let raw_window_handle = rwh::HasWindowHandle::window_handle(&window)
            .ok()
            .map(|handle| handle.as_raw());
        let (major, minor) = attrs.gl_version;
        let context_attrs = ContextAttributesBuilder::new()
            .with_profile(GlProfile::Core)
            .with_context_api(ContextApi::OpenGl(Some(Version::new(major, minor))))
            .build(raw_window_handle);
        let not_current = unsafe {
            gl_config
                .display()
                .create_context(&gl_config, &context_attrs)
        }
        .with_context(|| format!("could not create gl {major}.{minor} core context"))?;

        Ok(Self {
            context: Some(ContextState::NotCurrent(not_current)),
            gl_config,
            window,
        })
    }

    fn make_current(&mut self) -> anyhow::Result<()> {
        match self.context.take() {
            Some(ContextState::NotCurrent(not_current)) => {
                let surface_attrs = self
                    .window
                    .build_surface_attributes(Default::default())
                    .context("could not build surface attributes")?;
                let surface = unsafe {
                    self.gl_config
                        .display()
                        .create_window_surface(&self.gl_config, &surface_attrs)
                }
                .context("could not create window surface")?;
                let context = not_current
                    .make_current(&surface)
                    .context("could not make context current")?;
                self.context = Some(ContextState::Current { context, surface });
                Ok(())
            }
            Some(ContextState::Current { context, surface }) => {
                let ret = context
                    .make_current(&surface)
                    .context("could not make context current");
                self.context = Some(ContextState::Current { context, surface });
                ret
            }
            None => Err(anyhow!("context is gone")),
        }
    }

    fn current(&self) -> anyhow::Result<(&PossiblyCurrentContext, &Surface<WindowSurface>)> {
        match self.context {
            Some(ContextState::Current {
                ref context,
                ref surface,
            }) => Ok((context, surface)),
            _ => Err(anyhow!("context is not current")),
        }
    }

    fn resize_surface(&self, width: u32, height: u32) {
        // NOTE: zero sized surfaces are not a thing (minimized windows report those).
        let (Some(width), Some(height)) = (NonZeroU32::new(width), NonZeroU32::new(height)) else {
            return;
        };
        if let Ok((context, surface)) = self.current() {
            surface.resize(context, width, height);
        }
    }
}

#[derive(Default)]
struct App {
    graphics: Option<GraphicsContext>,
    pending_attrs: Option<WindowAttrs>,
    create_error: Option<anyhow::Error>,
    close_requested: bool,
    resized: Option<(u32, u32)>,
}

impl App {
    fn graphics(&self) -> anyhow::Result<&GraphicsContext> {
        self.graphics.as_ref().context("there is no window")
    }
}

impl winit::application::ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &winit::event_loop::ActiveEventLoop) {
        if self.graphics.is_some() {
            return;
        }
        let Some(attrs) = self.pending_attrs.take() else {
            return;
        };

        match GraphicsContext::new(event_loop, &attrs) {
            Ok(graphics) => {
                self.graphics = Some(graphics);
                log::info!("created winit window");
            }
            Err(err) => self.create_error = Some(err),
        }
    }

    fn window_event(
        &mut self,
        _event_loop: &winit::event_loop::ActiveEventLoop,
        _window_id: winit::window::WindowId,
        window_event: winit::event::WindowEvent,
    ) {
        use winit::event::WindowEvent::*;
        match window_event {
            CloseRequested => self.close_requested = true,
            Resized(physical_size) => {
                self.resized = Some((physical_size.width, physical_size.height));
            }
            other => log::trace!("unused window event: {other:?}"),
        }
    }
}

pub struct WinitHost {
    app: App,
    event_loop: Option<winit::event_loop::EventLoop<()>>,
    reporter: ErrorReporter,
    epoch: Instant,
    time_offset: f64,
}

impl Default for WinitHost {
    fn default() -> Self {
        Self::new()
    }
}

impl WinitHost {
    /// nothing is touched until `init`.
    pub fn new() -> Self {
        Self {
            app: App::default(),
            event_loop: None,
            reporter: log_error_reporter(),
            epoch: Instant::now(),
            time_offset: 0.0,
        }
    }

    fn report(&mut self, fallback: ErrorCode, err: anyhow::Error) -> anyhow::Error {
        let code = error_code_of(&err, fallback);
        (self.reporter)(code, &format!("{err:#}"));
        err
    }
}

impl Host for WinitHost {
    fn set_error_callback(&mut self, reporter: ErrorReporter) {
        self.reporter = reporter;
    }

    fn init(&mut self) -> anyhow::Result<()> {
        if self.event_loop.is_some() {
            return Ok(());
        }
        match winit::event_loop::EventLoop::new().context("could not create event loop") {
            Ok(event_loop) => {
                self.event_loop = Some(event_loop);
                Ok(())
            }
            Err(err) => Err(self.report(ErrorCode::PlatformError, err)),
        }
    }

    fn create_window(&mut self, attrs: &WindowAttrs) -> anyhow::Result<()> {
        let Some(event_loop) = self.event_loop.as_mut() else {
            return Err(self.report(ErrorCode::NotInitialized, anyhow!("host is not initialized")));
        };
        if self.app.graphics.is_some() {
            return Err(self.report(ErrorCode::PlatformError, anyhow!("window already exists")));
        }

        self.app.pending_attrs = Some(attrs.clone());
        let status = event_loop.pump_app_events(Some(Duration::ZERO), &mut self.app);

        if let Some(err) = self.app.create_error.take() {
            return Err(self.report(ErrorCode::PlatformError, err));
        }
        if let PumpStatus::Exit(code) = status {
            let err = anyhow!("unexpected exit (code {code})");
            return Err(self.report(ErrorCode::PlatformError, err));
        }
        if self.app.graphics.is_none() {
            let err = anyhow!("window was not created");
            return Err(self.report(ErrorCode::PlatformError, err));
        }

        Ok(())
    }

    fn make_context_current(&mut self) -> anyhow::Result<()> {
        let ret = match self.app.graphics.as_mut() {
            Some(graphics) => graphics.make_current(),
            None => Err(anyhow!("there is no window")),
        };
        ret.map_err(|err| self.report(ErrorCode::NoWindowContext, err))
    }

    fn set_swap_interval(&mut self, interval: u32) -> anyhow::Result<()> {
        let ret = self.app.graphics().and_then(|graphics| {
            let (context, surface) = graphics.current()?;
            surface
                .set_swap_interval(context, swap_interval(interval))
                .context("could not set swap interval")
        });
        ret.map_err(|err| self.report(ErrorCode::NoCurrentContext, err))
    }

    fn get_proc_address(&self, procname: &CStr) -> *const c_void {
        self.app.graphics.as_ref().map_or(null(), |graphics| {
            graphics.gl_config.display().get_proc_address(procname)
        })
    }

    fn should_close(&self) -> bool {
        self.app.close_requested
    }

    fn swap_buffers(&mut self) -> anyhow::Result<()> {
        let ret = self.app.graphics().and_then(|graphics| {
            let (context, surface) = graphics.current()?;
            surface
                .swap_buffers(context)
                .context("could not swap buffers")
        });
        ret.map_err(|err| self.report(ErrorCode::NoCurrentContext, err))
    }

    fn poll_events(&mut self) -> anyhow::Result<()> {
        let Some(event_loop) = self.event_loop.as_mut() else {
            return Err(self.report(ErrorCode::NotInitialized, anyhow!("host is not initialized")));
        };

        if let PumpStatus::Exit(code) =
            event_loop.pump_app_events(Some(Duration::ZERO), &mut self.app)
        {
            log::info!("event loop exited (code {code})");
            self.app.close_requested = true;
        }

        if let (Some((width, height)), Some(graphics)) =
            (self.app.resized.take(), self.app.graphics.as_ref())
        {
            graphics.resize_surface(width, height);
        }

        Ok(())
    }

    fn framebuffer_size(&self) -> (u32, u32) {
        self.app.graphics.as_ref().map_or((0, 0), |graphics| {
            let inner_size = graphics.window.inner_size();
            (inner_size.width, inner_size.height)
        })
    }

    fn get_time(&self) -> f64 {
        self.time_offset + self.epoch.elapsed().as_secs_f64()
    }

    fn set_time(&mut self, time: f64) {
        self.epoch = Instant::now();
        self.time_offset = time;
    }

    fn terminate(&mut self) {
        if self.event_loop.is_none() && self.app.graphics.is_none() {
            return;
        }
        self.app.graphics = None;
        self.app.pending_attrs = None;
        self.event_loop = None;
        log::info!("terminated winit host");
    }
}

#[test]
fn test_swap_interval() {
    assert!(matches!(swap_interval(0), SwapInterval::DontWait));
    assert!(matches!(swap_interval(1), SwapInterval::Wait(n) if n.get() == 1));
    assert!(matches!(swap_interval(2), SwapInterval::Wait(n) if n.get() == 2));
}

#[test]
fn test_error_code_fallback() {
    let err = anyhow!("something else entirely").context("could not swap buffers");
    assert_eq!(
        error_code_of(&err, ErrorCode::NoCurrentContext),
        ErrorCode::NoCurrentContext
    );
}

#[cfg(test)]
#[derive(Debug, PartialEq)]
struct FakeConfig(u8);

#[cfg(test)]
impl SampleCount for FakeConfig {
    fn sample_count(&self) -> u8 {
        self.0
    }
}

#[test]
fn test_pick_config() {
    assert_eq!(pick_config(std::iter::empty::<FakeConfig>()), None);
    assert_eq!(
        pick_config([FakeConfig(0), FakeConfig(4), FakeConfig(2)].into_iter()),
        Some(FakeConfig(4))
    );
}

#[test]
fn test_no_matching_config_is_format_unavailable() {
    let err = anyhow::Error::new(NoMatchingConfig).context("could not create window");
    assert_eq!(
        error_code_of(&err, ErrorCode::PlatformError),
        ErrorCode::FormatUnavailable
    );
}

#[test]
fn test_uninitialized_host_reports() {
    use std::cell::RefCell;
    use std::rc::Rc;

    let reports: Rc<RefCell<Vec<(ErrorCode, String)>>> = Rc::default();
    let mut host = WinitHost::new();
    host.set_error_callback(Box::new({
        let reports = Rc::clone(&reports);
        move |code, description| reports.borrow_mut().push((code, description.to_string()))
    }));

    assert!(host.create_window(&WindowAttrs::default()).is_err());
    assert!(host.poll_events().is_err());
    assert!(host.make_context_current().is_err());
    assert!(host.swap_buffers().is_err());
    assert!(!host.should_close());
    assert!(host.get_proc_address(c"glClear").is_null());
    assert_eq!(host.framebuffer_size(), (0, 0));

    let reports = reports.borrow();
    assert_eq!(reports.len(), 4);
    assert_eq!(reports[0].0, ErrorCode::NotInitialized);
    assert_eq!(reports[1].0, ErrorCode::NotInitialized);
    assert_eq!(reports[2].0, ErrorCode::NoWindowContext);
    assert_eq!(reports[3].0, ErrorCode::NoCurrentContext);
    assert!(reports[3].1.contains("there is no window"));
}

#[test]
fn test_time() {
    let mut host = WinitHost::new();
    host.set_time(0.0);
    let t0 = host.get_time();
    let t1 = host.get_time();
    assert!(t0 >= 0.0);
    assert!(t1 >= t0);

    host.set_time(10.0);
    assert!(host.get_time() >= 10.0);
}

#[test]
fn test_terminate_uninitialized_is_noop() {
    let mut host = WinitHost::new();
    host.terminate();
    host.terminate();
    assert!(!host.should_close());
}
