use std::env;
use std::process::ExitCode;

use app::{Config, FrameLoop, Logger};
use window::{Host as _, WinitHost};

fn main() -> ExitCode {
    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Trace
    } else {
        log::LevelFilter::Info
    };
    if let Err(err) = Logger::init(level) {
        eprintln!("could not set logger: {err}");
    }

    // usage: trifirst [vertex shader path] [fragment shader path]
    let mut args = env::args().skip(1);
    let mut config = Config::default();
    if let Some(vertex_shader_path) = args.next() {
        config.vertex_shader_path = vertex_shader_path.into();
    }
    if let Some(fragment_shader_path) = args.next() {
        config.fragment_shader_path = fragment_shader_path.into();
    }
    log::debug!("{config:?}");

    let mut frame_loop = FrameLoop::new(config, WinitHost::new());
    let ok = frame_loop.run(|host| {
        Ok(unsafe { gl::Api::load_with(|procname| host.get_proc_address(procname)) })
    });

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
