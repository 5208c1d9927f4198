use anyhow::{Context as _, anyhow};
use window::{ErrorReporter, Host};

use crate::{CompiledProgram, Config, Mesh, ProgramBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Uninitialized,
    Running,
    Terminated,
}

struct Scene<A: gl::Adapter> {
    gl_api: A,
    program: CompiledProgram<A::Program>,
    mesh: Mesh<A>,
    viewport: (u32, u32),
}

impl<A: gl::Adapter> Scene<A> {
    fn resize(&mut self, framebuffer_size: (u32, u32)) {
        if self.viewport == framebuffer_size {
            return;
        }
        let (width, height) = framebuffer_size;
        let width = gl::GLsizei::try_from(width).unwrap_or(gl::GLsizei::MAX);
        let height = gl::GLsizei::try_from(height).unwrap_or(gl::GLsizei::MAX);
        unsafe { self.gl_api.viewport(0, 0, width, height) };
        self.viewport = framebuffer_size;
    }

    fn update(&self, delta_time: f64) {
        unsafe {
            self.gl_api.clear(gl::COLOR_BUFFER_BIT);
            self.gl_api.use_program(self.program.handle());
        }
        self.mesh.draw(&self.gl_api, delta_time);
    }
}

/// called with the frame's delta time in seconds, after drawing and before the swap.
pub type DrawHook = Box<dyn FnMut(f64)>;

/// owns the host and drives it from setup until the window is asked to close.
pub struct FrameLoop<H: Host> {
    config: Config,
    host: H,
    reporter: Option<ErrorReporter>,
    draw_hook: Option<DrawHook>,
    state: State,
    frame_count: u64,
}

impl<H: Host> FrameLoop<H> {
    pub fn new(config: Config, host: H) -> Self {
        Self {
            config,
            host,
            reporter: None,
            draw_hook: None,
            state: State::Uninitialized,
            frame_count: 0,
        }
    }

    /// replaces the host's default error reporter; installed during setup.
    pub fn with_error_reporter(mut self, reporter: ErrorReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn with_draw_hook(mut self, draw_hook: DrawHook) -> Self {
        self.draw_hook = Some(draw_hook);
        self
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// runs setup and then frames until the host signals close.
    ///
    /// `load_gl` is called once the context is current and must resolve the driver entry points.
    /// returns false if setup failed (nothing got drawn then) or if the host broke mid-run.
    pub fn run<A, F>(&mut self, load_gl: F) -> bool
    where
        A: gl::Adapter,
        F: FnOnce(&H) -> anyhow::Result<A>,
    {
        if self.state != State::Uninitialized {
            log::error!("frame loop can only run once (state: {:?})", self.state);
            return false;
        }

        let mut scene = match self.init(load_gl) {
            Ok(scene) => scene,
            Err(err) => {
                log::error!("initialization error: {err:#}");
                self.terminate();
                return false;
            }
        };

        self.state = State::Running;
        log::info!("running");

        let ret = match self.iterate_until_close(&mut scene) {
            Ok(()) => true,
            Err(err) => {
                log::error!("{err:#}");
                false
            }
        };

        self.terminate();
        log::info!("terminated after {} frames", self.frame_count);
        ret
    }

    fn init<A, F>(&mut self, load_gl: F) -> anyhow::Result<Scene<A>>
    where
        A: gl::Adapter,
        F: FnOnce(&H) -> anyhow::Result<A>,
    {
        if let Some(reporter) = self.reporter.take() {
            self.host.set_error_callback(reporter);
        }

        self.host.init().context("could not init host")?;
        self.host
            .create_window(&self.config.window_attrs())
            .context("could not create window")?;
        self.host
            .make_context_current()
            .context("could not make context current")?;
        self.host
            .set_swap_interval(self.config.swap_interval())
            .context("could not set swap interval")?;

        let gl_api = load_gl(&self.host).context("could not load gl")?;
        unsafe {
            let version = gl_api
                .get_string(gl::VERSION)
                .context("could not query gl version, are gl functions loaded?")?;
            log::info!("gl version: {version}");
            match gl_api.get_string(gl::RENDERER) {
                Ok(renderer) => log::info!("gl renderer: {renderer}"),
                Err(err) => log::warn!("{err:#}"),
            }
            if let Ok(glsl_version) = gl_api.get_string(gl::SHADING_LANGUAGE_VERSION) {
                log::info!("glsl version: {glsl_version}");
            }
        }

        let program = ProgramBuilder::new(&gl_api, self.config.shading_language_version)
            .build_from_files(
                &self.config.vertex_shader_path,
                &self.config.fragment_shader_path,
            );
        if !program.is_valid() {
            return Err(anyhow!("could not create shader program"));
        }
        if !program.is_functional() {
            log::warn!("shader program is not functional, expect nothing to be drawn");
        }

        let mesh = Mesh::triangle(&gl_api).context("could not create triangle mesh")?;

        Ok(Scene {
            gl_api,
            program,
            mesh,
            viewport: (0, 0),
        })
    }

    fn iterate_until_close<A: gl::Adapter>(
        &mut self,
        scene: &mut Scene<A>,
    ) -> anyhow::Result<()> {
        self.host.set_time(0.0);
        let mut prev_time = 0.0;

        while !self.host.should_close() {
            let time = self.host.get_time();
            let delta_time = time - prev_time;
            prev_time = time;

            scene.resize(self.host.framebuffer_size());
            scene.update(delta_time);
            if let Some(draw_hook) = self.draw_hook.as_mut() {
                draw_hook(delta_time);
            }

            self.host.swap_buffers().context("could not swap buffers")?;
            self.host.poll_events().context("could not poll events")?;

            self.frame_count += 1;
        }

        Ok(())
    }

    fn terminate(&mut self) {
        if self.state == State::Terminated {
            return;
        }
        self.host.terminate();
        self.state = State::Terminated;
    }
}

#[cfg(test)]
use std::{cell::RefCell, rc::Rc};

#[cfg(test)]
use crate::testing::{Call, CallLog, FakeHost, RecordingApi, count};

#[cfg(test)]
fn shader_config() -> Config {
    Config::with_shader_paths(
        concat!(env!("CARGO_MANIFEST_DIR"), "/../shaders/shader.vert"),
        concat!(env!("CARGO_MANIFEST_DIR"), "/../shaders/shader.frag"),
    )
}

#[test]
fn test_run_until_close() {
    let calls = CallLog::default();
    let mut frame_loop = FrameLoop::new(shader_config(), FakeHost::new(calls.clone(), 3));
    assert_eq!(frame_loop.state(), State::Uninitialized);

    assert!(frame_loop.run(|_| Ok(RecordingApi::new(calls.clone()))));
    assert_eq!(frame_loop.state(), State::Terminated);
    assert_eq!(frame_loop.frame_count(), 3);
    assert_eq!(count(&calls, |call| *call == Call::SwapBuffers), 3);
    assert_eq!(count(&calls, |call| *call == Call::Terminate), 1);
    assert_eq!(calls.borrow().last(), Some(&Call::Terminate));
}

#[test]
fn test_setup_sequence() {
    let calls = CallLog::default();
    let mut frame_loop = FrameLoop::new(shader_config(), FakeHost::new(calls.clone(), 1));
    assert!(frame_loop.run(|_| Ok(RecordingApi::new(calls.clone()))));

    let calls = calls.borrow();
    assert_eq!(calls[0], Call::Init);
    assert_eq!(
        calls[1],
        Call::CreateWindow(window::WindowAttrs {
            logical_size: (640, 480),
            title: "Window1".to_string(),
            gl_version: (4, 1),
            resizable: true,
        })
    );
    assert_eq!(calls[2], Call::MakeContextCurrent);
    assert_eq!(calls[3], Call::SetSwapInterval(1));
    assert_eq!(calls[4], Call::GetString(gl::VERSION));

    // program before mesh, and both before the clock gets reset.
    let link = calls
        .iter()
        .position(|call| matches!(call, Call::LinkProgram(_)))
        .expect("link");
    let upload = calls
        .iter()
        .position(|call| matches!(call, Call::BufferData { .. }))
        .expect("upload");
    let set_time = calls
        .iter()
        .position(|call| *call == Call::SetTime(0.0))
        .expect("loop entry");
    assert!(link < upload);
    assert!(upload < set_time);
}

#[test]
fn test_vsync_disabled() {
    let calls = CallLog::default();
    let mut config = shader_config();
    config.vsync_enabled = false;
    let mut frame_loop = FrameLoop::new(config, FakeHost::new(calls.clone(), 0));
    assert!(frame_loop.run(|_| Ok(RecordingApi::new(calls.clone()))));
    assert_eq!(count(&calls, |call| *call == Call::SetSwapInterval(0)), 1);
}

#[test]
fn test_frame_order() {
    let calls = CallLog::default();
    let mut frame_loop = FrameLoop::new(shader_config(), FakeHost::new(calls.clone(), 2));
    assert!(frame_loop.run(|_| Ok(RecordingApi::new(calls.clone()))));

    let calls = calls.borrow();
    let set_time = calls
        .iter()
        .position(|call| *call == Call::SetTime(0.0))
        .expect("loop entry");
    let frame_calls: Vec<&Call> = calls[set_time..]
        .iter()
        .filter(|call| {
            matches!(
                call,
                Call::Clear(_)
                    | Call::UseProgram(_)
                    | Call::DrawArrays(..)
                    | Call::SwapBuffers
                    | Call::PollEvents
            )
        })
        .collect();

    let program = calls
        .iter()
        .find_map(|call| match call {
            Call::CreateProgram(program) => Some(*program),
            _ => None,
        })
        .expect("program");
    let frame = [
        Call::Clear(gl::COLOR_BUFFER_BIT),
        Call::UseProgram(Some(program)),
        Call::DrawArrays(gl::TRIANGLES, 0, 3),
        Call::SwapBuffers,
        Call::PollEvents,
    ];
    let expected: Vec<&Call> = frame.iter().chain(frame.iter()).collect();
    assert_eq!(frame_calls, expected);

    // viewport is set once, the fake framebuffer never changes size.
    assert_eq!(count_in(&calls, |call| *call == Call::Viewport(0, 0, 640, 480)), 1);
}

#[test]
fn test_delta_time() {
    let calls = CallLog::default();
    let deltas: Rc<RefCell<Vec<f64>>> = Rc::default();
    // a clock left at 100s must not leak into the first frame.
    let host = FakeHost::new(calls.clone(), 4).with_start_time(100.0);
    let mut frame_loop = FrameLoop::new(shader_config(), host).with_draw_hook(Box::new({
        let deltas = Rc::clone(&deltas);
        move |delta_time| deltas.borrow_mut().push(delta_time)
    }));
    assert!(frame_loop.run(|_| Ok(RecordingApi::new(calls.clone()))));

    let deltas = deltas.borrow();
    assert_eq!(deltas.len(), 4);
    assert_eq!(deltas[0], FakeHost::TICK);
    for delta_time in deltas.iter() {
        assert!((delta_time - FakeHost::TICK).abs() < 1e-9, "{delta_time}");
    }
}

#[test]
fn test_oversized_framebuffer_is_clamped() {
    let calls = CallLog::default();
    let host = FakeHost::new(calls.clone(), 1).with_framebuffer_size((u32::MAX, 480));
    let mut frame_loop = FrameLoop::new(shader_config(), host);
    assert!(frame_loop.run(|_| Ok(RecordingApi::new(calls.clone()))));
    assert_eq!(
        count(&calls, |call| *call == Call::Viewport(0, 0, gl::GLsizei::MAX, 480)),
        1
    );
}

#[cfg(test)]
fn count_in(calls: &[Call], f: impl Fn(&Call) -> bool) -> usize {
    calls.iter().filter(|call| f(call)).count()
}

#[test]
fn test_compile_error_still_runs() {
    let calls = CallLog::default();
    let mut frame_loop = FrameLoop::new(shader_config(), FakeHost::new(calls.clone(), 2));
    assert!(frame_loop.run(|_| {
        Ok(RecordingApi::new(calls.clone())
            .with_compile_error(gl::VERTEX_SHADER, "0:1(1): error: syntax error"))
    }));
    assert_eq!(count(&calls, |call| *call == Call::SwapBuffers), 2);
    assert_eq!(count(&calls, |call| matches!(call, Call::DrawArrays(..))), 2);
}

#[test]
fn test_window_failure() {
    let calls = CallLog::default();
    let reports: Rc<RefCell<Vec<(window::ErrorCode, String)>>> = Rc::default();
    let host = FakeHost::new(calls.clone(), 3).with_failing_create_window();
    let mut frame_loop = FrameLoop::new(shader_config(), host).with_error_reporter(Box::new({
        let reports = Rc::clone(&reports);
        move |code, description| reports.borrow_mut().push((code, description.to_string()))
    }));

    assert!(!frame_loop.run(|_| Ok(RecordingApi::new(calls.clone()))));
    assert_eq!(frame_loop.state(), State::Terminated);
    assert_eq!(frame_loop.frame_count(), 0);
    assert_eq!(count(&calls, Call::is_gl), 0);
    assert_eq!(count(&calls, |call| *call == Call::SwapBuffers), 0);
    assert_eq!(count(&calls, |call| *call == Call::Terminate), 1);
    assert_eq!(
        *reports.borrow(),
        [(
            window::ErrorCode::PlatformError,
            "no display available".to_string()
        )]
    );
}

#[test]
fn test_missing_shader_file() {
    let calls = CallLog::default();
    let config =
        Config::with_shader_paths("/nonexistent/shader.vert", "/nonexistent/shader.frag");
    let mut frame_loop = FrameLoop::new(config, FakeHost::new(calls.clone(), 3));

    assert!(!frame_loop.run(|_| Ok(RecordingApi::new(calls.clone()))));
    assert_eq!(frame_loop.state(), State::Terminated);
    assert_eq!(
        count(&calls, |call| matches!(
            call,
            Call::CreateProgram(_) | Call::CreateShader(..)
        )),
        0
    );
    assert_eq!(count(&calls, |call| *call == Call::SwapBuffers), 0);
    assert_eq!(count(&calls, |call| *call == Call::Terminate), 1);
}

#[test]
fn test_gl_load_failure() {
    let calls = CallLog::default();
    let mut frame_loop = FrameLoop::new(shader_config(), FakeHost::new(calls.clone(), 3));
    let ret = frame_loop.run(|host| {
        assert!(host.get_proc_address(c"glClear").is_null());
        Err::<RecordingApi, _>(anyhow!("glClear is not available"))
    });

    assert!(!ret);
    assert_eq!(count(&calls, Call::is_gl), 0);
    assert_eq!(count(&calls, |call| *call == Call::Terminate), 1);
}

#[test]
fn test_mesh_failure() {
    let calls = CallLog::default();
    let mut frame_loop = FrameLoop::new(shader_config(), FakeHost::new(calls.clone(), 3));
    assert!(!frame_loop.run(|_| {
        Ok(RecordingApi::new(calls.clone()).with_failing_create_vertex_array())
    }));
    assert_eq!(count(&calls, |call| *call == Call::SwapBuffers), 0);
}

#[test]
fn test_run_once() {
    let calls = CallLog::default();
    let mut frame_loop = FrameLoop::new(shader_config(), FakeHost::new(calls.clone(), 1));
    assert!(frame_loop.run(|_| Ok(RecordingApi::new(calls.clone()))));
    assert!(!frame_loop.run(|_| Ok(RecordingApi::new(calls.clone()))));

    assert_eq!(count(&calls, |call| *call == Call::Init), 1);
    assert_eq!(count(&calls, |call| *call == Call::Terminate), 1);
    assert_eq!(frame_loop.frame_count(), 1);
    assert!(frame_loop.host().should_close());
}
